// src/resolver/obsoletes.rs

//! Obsoletes processing and orphan handling
//!
//! A package coming in removes the installed versions of its own name and
//! whatever its obsoletes match. Capabilities the removed packages provided
//! and nothing else provides any more leave orphans behind: installed
//! packages that still require them. Orphans are queued and processed one
//! by one, which may mark further packages and so queue further work.

use crate::error::{Error, Result};
use crate::packages::{Capreq, MatchFlags, Package, PkgId};
use crate::resolver::install::{InstallRun, Orphan};
use crate::version::version_distance;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Split installed instances of one name into (to remove, superseded)
///
/// Only instances not newer than `pkg` can be replaced, unless `downgrade`
/// is set; newer ones are superseded. Of the replaceable instances the one
/// closest in version to `pkg` is removed; when two are equally close the
/// older one wins. Anything still tied is ambiguous, which `force` settles
/// by removing all of them.
pub(crate) fn multi_instance(
    pkg: &Package,
    instances: &[(i64, &Package)],
    force: bool,
    downgrade: bool,
) -> Result<(Vec<i64>, Vec<i64>)> {
    let (eligible, newer): (Vec<&(i64, &Package)>, Vec<&(i64, &Package)>) = instances
        .iter()
        .partition(|(_, inst)| downgrade || inst.evr <= pkg.evr);
    let mut superseded: Vec<i64> = newer.iter().map(|(r, _)| *r).collect();

    if eligible.len() <= 1 {
        return Ok((eligible.iter().map(|(r, _)| *r).collect(), superseded));
    }

    let keyed: Vec<_> = eligible
        .iter()
        .map(|(recno, inst)| {
            let key = (version_distance(&inst.evr, &pkg.evr), inst.evr > pkg.evr);
            (key, *recno, *inst)
        })
        .collect();
    let Some(best) = keyed.iter().map(|(key, _, _)| *key).min() else {
        return Ok((Vec::new(), superseded));
    };

    let (closest, rest): (Vec<_>, Vec<_>) = keyed.into_iter().partition(|(key, _, _)| *key == best);
    if closest.len() > 1 && !force {
        let names: Vec<String> = closest.iter().map(|(_, _, inst)| inst.nevra()).collect();
        return Err(Error::MultiInstanceAmbiguous {
            package: pkg.nevra(),
            instances: names.join(", "),
        });
    }

    superseded.extend(rest.into_iter().map(|(_, recno, _)| recno));
    Ok((closest.into_iter().map(|(_, recno, _)| recno).collect(), superseded))
}

impl InstallRun<'_> {
    /// Slate the installed packages `id` replaces for removal
    pub(crate) fn process_obsoletes(&mut self, id: PkgId) -> Result<()> {
        let set = self.set;
        let pkg = set.package(id);
        let multilib = self.config.multilib;

        let mut same_name: Vec<(i64, Package)> = Vec::new();
        for recno in self.installed.installed_versions(&pkg.name)? {
            if let Some(inst) = self.installed.get(recno) {
                if !multilib || inst.is_colored_like(pkg) {
                    same_name.push((recno, inst.clone()));
                }
            }
        }

        let mut remove = Vec::new();
        if same_name.len() > 1 {
            let refs: Vec<(i64, &Package)> = same_name.iter().map(|(r, p)| (*r, p)).collect();
            let outcome = multi_instance(pkg, &refs, self.config.force, self.config.downgrade);
            match outcome {
                Ok((closest, superseded)) => {
                    remove.extend(closest);
                    self.superseded.extend(superseded);
                }
                Err(err) => {
                    self.fail(err)?;
                    // forced through: replace every instance not newer
                    remove.extend(
                        same_name
                            .iter()
                            .filter(|(_, inst)| inst.evr <= pkg.evr)
                            .map(|(r, _)| *r),
                    );
                }
            }
        } else {
            for (recno, inst) in &same_name {
                let ord = inst.evr.cmp(&pkg.evr);
                if ord != Ordering::Greater || (self.config.downgrade && ord != Ordering::Less) {
                    remove.push(*recno);
                }
            }
        }

        let obsoletes = self.config.obsoletes;
        for cap in pkg.obsoletes().filter(move |_| obsoletes) {
            for recno in self.installed.matching(cap, MatchFlags::STRICT)? {
                let Some(inst) = self.installed.get(recno) else {
                    continue;
                };
                if inst.name == pkg.name || (multilib && !inst.is_colored_like(pkg)) {
                    continue;
                }
                if !remove.contains(&recno) {
                    debug!("{} obsoletes {} ({})", pkg, inst, cap);
                    remove.push(recno);
                }
            }
        }

        for recno in remove {
            let Some(inst) = self.installed.get(recno).cloned() else {
                continue;
            };
            if self.config.is_held(&inst.name) {
                return Err(Error::HeldPackage(inst.nevra()));
            }
            if self.installed.add(&inst)? {
                info!("{} obsoleted by {}", inst, pkg);
                self.collect_orphans(id, &inst)?;
            }
        }

        Ok(())
    }

    /// Queue installed packages left needing something `removed` provided
    fn collect_orphans(&mut self, id: PkgId, removed: &Package) -> Result<()> {
        let set = self.set;
        let pkg = set.package(id);
        let flags = set.match_flags();

        let mut caps = vec![removed.self_cap()];
        caps.extend(removed.provides.iter().cloned());
        caps.extend(removed.files.iter().map(|f| Capreq::new(&f.path)));

        for cap in caps {
            if self.config.is_never_required(&cap.name) {
                continue;
            }
            if pkg.satisfies(&cap, flags) || self.iset.provides(set, &cap).is_some() {
                continue;
            }

            for recno in self.installed.what_requires(&cap, true)? {
                let Some(requirer) = self.installed.get(recno) else {
                    continue;
                };
                let reqs: Vec<Capreq> = requirer.requirements_on(&cap, true).cloned().collect();
                if reqs.is_empty() {
                    continue;
                }
                debug!("{} orphaned by removal of {} ({})", requirer, removed, cap);
                self.orphans.push_back(Orphan {
                    recno,
                    reqs,
                    removed_by: pkg.nevra(),
                });
            }
        }

        Ok(())
    }

    /// Find new providers for an orphan's lost requirements
    pub(crate) fn process_orphan(&mut self, orphan: Orphan) -> Result<()> {
        let Some(requirer) = self.installed.get(orphan.recno).cloned() else {
            return Ok(());
        };

        for req in &orphan.reqs {
            // only needed while the requirer itself is removed
            if req.flags.prereq_un && !req.flags.prereq {
                continue;
            }
            if req.is_rpmlib() {
                continue;
            }
            if self.installed.has(orphan.recno) {
                return Ok(());
            }
            if !self.installed.uninstalled_provides(req) {
                continue;
            }
            if self.is_satisfied(req)? {
                continue;
            }

            if self.config.greedy && self.try_upgrade_orphan(&requirer)? {
                return Ok(());
            }

            let choice = if self.config.follow {
                self.choose_provider(None, req)?
            } else {
                None
            };
            match choice {
                Some(provider) => {
                    info!("{}: {} now provided by {}", requirer, req, self.set.package(provider));
                    self.mark_more(&[provider])?;
                }
                None => {
                    self.fail(Error::OrphanUnresolvable {
                        package: requirer.nevra(),
                        requirement: req.to_string(),
                        removed_by: orphan.removed_by.clone(),
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Mark the newest catalog version of an orphan instead of patching
    /// its requirements
    fn try_upgrade_orphan(&mut self, orphan: &Package) -> Result<bool> {
        let set = self.set;
        for cand in set.find_by_name(&orphan.name) {
            let candidate = set.package(cand);
            if candidate.evr <= orphan.evr
                || self.marker.is_excluded(cand)
                || self.rejected.contains(&cand)
            {
                continue;
            }
            if self.config.multilib && !candidate.is_colored_like(orphan) {
                continue;
            }
            if !self.marker.is_marked(cand) {
                info!("{} upgraded to {} (greedy)", orphan, candidate);
                self.mark_more(&[cand])?;
            }
            return Ok(true);
        }
        Ok(false)
    }
}
