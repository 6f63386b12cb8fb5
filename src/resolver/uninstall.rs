// src/resolver/uninstall.rs

//! Removal resolution
//!
//! Removing a package breaks whatever still requires it. With `follow` the
//! dependents are removed too, transitively; without it each broken
//! requirement is an error. Greedy mode additionally removes packages that
//! only the removed packages needed.

use crate::config::ResolveConfig;
use crate::error::{Error, Result};
use crate::packages::{Capreq, Package};
use crate::resolver::Resolver;
use crate::resolver::graph::{PackageSet, evr_selects};
use crate::resolver::installed::InstalledSet;
use crate::resolver::order::{OrderMode, order};
use crate::resolver::plan::UninstallPlan;
use crate::version::Evr;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

impl Resolver<'_> {
    /// Plan the removal of the installed packages matched by `masks`
    pub fn resolve_uninstall(&self, masks: &[String], follow: bool) -> Result<UninstallPlan> {
        let config = self.config;
        let mut installed = InstalledSet::new(self.store, config.installed_match_flags());
        let mut plan = UninstallPlan::default();

        let selected = select_installed(&mut installed, masks)?;
        info!("Resolving removal of {} package(s)", selected.len());

        let mut queue = VecDeque::new();
        for recno in selected {
            let Some(pkg) = installed.get(recno).cloned() else {
                continue;
            };
            if config.is_held(&pkg.name) {
                return Err(Error::HeldPackage(pkg.nevra()));
            }
            if installed.add(&pkg)? {
                queue.push_back(pkg);
            }
        }

        let mut removed = Vec::new();
        while let Some(pkg) = queue.pop_front() {
            if config.interrupt.is_requested() {
                plan.interrupted = true;
                break;
            }
            for requirer in broken_requirers(&mut installed, config, &pkg)? {
                if !follow {
                    let err = Error::OrphanUnresolvable {
                        package: requirer.0.nevra(),
                        requirement: requirer.1.to_string(),
                        removed_by: pkg.nevra(),
                    };
                    if config.nodeps {
                        warn!("{} (ignored)", err);
                        plan.tolerated.push(err.to_string());
                        continue;
                    }
                    return Err(err);
                }

                let (dependent, req) = requirer;
                if config.is_held(&dependent.name) {
                    return Err(Error::HeldPackage(dependent.nevra()));
                }
                if installed.add(&dependent)? {
                    debug!("{} needs {} ({}), removed too", dependent, pkg, req);
                    if let Some(recno) = dependent.recno {
                        plan.dep_marked.push(recno);
                    }
                    queue.push_back(dependent);
                }
            }
            removed.push(pkg);
        }

        if config.greedy && !plan.interrupted {
            remove_leftovers(&mut installed, config, removed, &mut plan)?;
        }
        if plan.interrupted {
            warn!("Resolution interrupted, returning partial plan");
        }

        let packages = installed.uninstall_packages();
        let ordered = order_removal(config, packages);
        plan.cycle_count = ordered.1;
        plan.uninstall = ordered.0;

        info!("Plan: remove {} package(s)", plan.uninstall.len());
        Ok(plan)
    }
}

/// Installed records matched by `name`, a glob, or `name#evr`
fn select_installed(installed: &mut InstalledSet<'_>, masks: &[String]) -> Result<Vec<i64>> {
    let all = installed.all()?;
    let mut selected = Vec::new();

    for mask in masks {
        let matcher: Box<dyn Fn(&Package) -> bool> = match mask.split_once('#') {
            Some((name, evr)) => {
                let name = name.to_string();
                let want = Evr::parse(evr)?;
                Box::new(move |p: &Package| p.name == name && evr_selects(&p.evr, &want))
            }
            None => {
                let pattern = glob::Pattern::new(mask)
                    .map_err(|e| Error::ParseError(format!("invalid pattern '{}': {}", mask, e)))?;
                Box::new(move |p: &Package| pattern.matches(&p.name))
            }
        };

        let hits: Vec<i64> = all
            .iter()
            .copied()
            .filter(|r| installed.get(*r).is_some_and(|p| matcher(p)))
            .collect();
        if hits.is_empty() {
            return Err(Error::NoSuchPackage(mask.clone()));
        }
        for recno in hits {
            if !selected.contains(&recno) {
                selected.push(recno);
            }
        }
    }

    Ok(selected)
}

/// Installed packages (not being removed) with a requirement only `removed`
/// satisfied
fn broken_requirers(
    installed: &mut InstalledSet<'_>,
    config: &ResolveConfig,
    removed: &Package,
) -> Result<Vec<(Package, Capreq)>> {
    let flags = config.installed_match_flags();

    let mut caps = vec![Capreq::new(&removed.name)];
    caps.extend(removed.provides.iter().cloned());
    caps.extend(removed.files.iter().map(|f| Capreq::new(&f.path)));

    let mut broken: Vec<(Package, Capreq)> = Vec::new();
    for cap in caps {
        for recno in installed.what_requires(&cap, false)? {
            let Some(requirer) = installed.get(recno).cloned() else {
                continue;
            };
            if broken.iter().any(|(p, _)| p.recno == requirer.recno) {
                continue;
            }
            for req in requirer.requirements_on(&cap, false) {
                if req.is_rpmlib() || requirer.satisfies(req, flags) {
                    continue;
                }
                if !removed.satisfies(req, flags) || installed.provides(req)?.is_some() {
                    continue;
                }
                broken.push((requirer.clone(), req.clone()));
                break;
            }
        }
    }

    Ok(broken)
}

/// Greedy removal: providers of what the removed packages required that
/// nothing else requires any more
fn remove_leftovers(
    installed: &mut InstalledSet<'_>,
    config: &ResolveConfig,
    mut frontier: Vec<Package>,
    plan: &mut UninstallPlan,
) -> Result<()> {
    let flags = config.installed_match_flags();

    for depth in 0..config.greedy_depth {
        let mut next = Vec::new();
        for pkg in &frontier {
            if config.interrupt.is_requested() {
                plan.interrupted = true;
                return Ok(());
            }
            for req in pkg.requires.iter().filter(|r| !r.is_rpmlib()) {
                for recno in installed.matching(req, flags)? {
                    let Some(provider) = installed.get(recno).cloned() else {
                        continue;
                    };
                    if config.is_held(&provider.name) || !is_unneeded(installed, &provider)? {
                        continue;
                    }
                    if installed.add(&provider)? {
                        info!("{} no longer needed (depth {}), removed", provider, depth + 1);
                        plan.dep_marked.push(recno);
                        next.push(provider);
                    }
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    Ok(())
}

fn is_unneeded(installed: &mut InstalledSet<'_>, pkg: &Package) -> Result<bool> {
    let mut caps = vec![Capreq::new(&pkg.name)];
    caps.extend(pkg.provides.iter().cloned());
    for cap in &caps {
        if !installed.what_requires(cap, false)?.is_empty() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Order removals by building a throwaway graph over the removed packages
fn order_removal(config: &ResolveConfig, packages: Vec<Package>) -> (Vec<Package>, u32) {
    let graph_config = ResolveConfig {
        file_conflicts: false,
        ..config.clone()
    };
    let set = PackageSet::new(packages, &graph_config);
    let ids: Vec<_> = set.ids().collect();
    let result = order(&set, &ids, OrderMode::Uninstall);
    let ordered = result
        .ordered
        .iter()
        .map(|id| set.package(*id).clone())
        .collect();
    (ordered, result.cycle_count)
}
