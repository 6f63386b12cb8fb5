// src/resolver/install.rs

//! Installation resolution
//!
//! One `InstallRun` per `Resolver::resolve_install` call. The run marks the
//! selection and its dependencies, then drains a worklist of marked
//! packages: obsoletes processing decides what gets removed and queues the
//! orphans that removal leaves behind, conflict processing checks the
//! survivors against the installed packages. Anything marked along the way
//! is queued again. Once the worklists are empty, every marked package's
//! requirements are re-verified against the final removal set; if that
//! marks something new the whole thing repeats.

use crate::config::ResolveConfig;
use crate::error::{Error, Result};
use crate::packages::{Capreq, PkgId};
use crate::resolver::graph::PackageSet;
use crate::resolver::installed::{InstalledSet, InstalledStore};
use crate::resolver::iset::InstallSet;
use crate::resolver::mark::{MarkOutcome, Marker};
use crate::resolver::order::{OrderMode, order};
use crate::resolver::plan::InstallPlan;
use crate::resolver::select::{InstallPolicy, select_best};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// An installed package left with requirements that removed packages used
/// to satisfy
#[derive(Debug, Clone)]
pub(crate) struct Orphan {
    pub recno: i64,
    pub reqs: Vec<Capreq>,
    pub removed_by: String,
}

pub(crate) struct InstallRun<'a> {
    pub(crate) set: &'a PackageSet,
    pub(crate) config: &'a ResolveConfig,
    pub(crate) marker: Marker<'a>,
    pub(crate) installed: InstalledSet<'a>,
    pub(crate) iset: InstallSet,
    pub(crate) rejected: HashSet<PkgId>,
    pub(crate) queue: VecDeque<PkgId>,
    pub(crate) orphans: VecDeque<Orphan>,
    pub(crate) superseded: BTreeSet<i64>,
    skipped: Vec<PkgId>,
    dropped: Vec<PkgId>,
    tolerated: Vec<String>,
    reported: HashSet<(PkgId, String)>,
    conflict_queue: Vec<PkgId>,
    interrupted: bool,
}

impl<'a> InstallRun<'a> {
    pub(crate) fn new(
        set: &'a PackageSet,
        config: &'a ResolveConfig,
        store: &'a dyn InstalledStore,
    ) -> Self {
        Self {
            set,
            config,
            marker: Marker::new(set, config),
            installed: InstalledSet::new(store, config.installed_match_flags()),
            iset: InstallSet::new(),
            rejected: HashSet::new(),
            queue: VecDeque::new(),
            orphans: VecDeque::new(),
            superseded: BTreeSet::new(),
            skipped: Vec::new(),
            dropped: Vec::new(),
            tolerated: Vec::new(),
            reported: HashSet::new(),
            conflict_queue: Vec::new(),
            interrupted: false,
        }
    }

    pub(crate) fn run(mut self, selection: &[PkgId]) -> Result<InstallPlan> {
        info!("Resolving installation of {} package(s)", selection.len());

        let roots = self.precheck(selection)?;
        if !roots.is_empty() {
            let outcome = {
                let mut policy = InstallPolicy {
                    installed: &mut self.installed,
                    rejected: &self.rejected,
                    config: self.config,
                };
                self.marker.mark(&roots, &mut policy)?
            };
            self.absorb(outcome);

            match self.settle() {
                Ok(()) => {}
                Err(Error::Interrupted) => {
                    warn!("Resolution interrupted, returning partial plan");
                    self.interrupted = true;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(self.into_plan())
    }

    /// Drain the worklists and re-verify until nothing new gets marked
    fn settle(&mut self) -> Result<()> {
        loop {
            self.drain()?;
            if !self.verify()? {
                return Ok(());
            }
        }
    }

    /// Drop selected packages that are already installed in the same or
    /// a newer version
    fn precheck(&mut self, selection: &[PkgId]) -> Result<Vec<PkgId>> {
        let mut roots = Vec::new();

        for &id in selection {
            let pkg = self.set.package(id);
            let mut install = true;

            if self.config.upgrade && self.config.is_held(&pkg.name) {
                let held = self.installed.installed_versions(&pkg.name)?;
                if !held.is_empty() {
                    info!("{} is held, skipped", pkg.name);
                    self.skipped.push(id);
                    continue;
                }
            }

            let mut instances = Vec::new();
            for recno in self.installed.installed_versions(&pkg.name)? {
                if let Some(inst) = self.installed.get(recno) {
                    if !self.config.multilib || inst.is_colored_like(pkg) {
                        instances.push(inst.clone());
                    }
                }
            }

            let mut newer = 0;
            for inst in &instances {
                match inst.evr.cmp(&pkg.evr) {
                    Ordering::Equal if self.config.reinstall => {
                        info!("{} will be reinstalled", inst);
                        self.installed.add(inst)?;
                    }
                    Ordering::Equal => {
                        info!("{} is already installed", inst);
                        install = false;
                    }
                    Ordering::Greater => newer += 1,
                    Ordering::Less => {}
                }
            }

            // an older version only goes in next to an instance it can replace
            if install && newer > 0 && newer == instances.len() && !self.config.downgrade {
                info!("{}: only newer versions are installed, skipped", pkg);
                install = false;
            }

            if install {
                roots.push(id);
            } else {
                self.skipped.push(id);
            }
        }

        Ok(roots)
    }

    /// Take a marking outcome into the install set; true if it added
    /// anything
    fn absorb(&mut self, outcome: MarkOutcome) -> bool {
        let mut added = false;
        for id in outcome.marked {
            if self.iset.add(id) {
                self.queue.push_back(id);
                added = true;
            }
        }
        for id in outcome.dropped {
            self.iset.remove(id);
            self.rejected.insert(id);
            self.dropped.push(id);
        }
        self.tolerated.extend(outcome.tolerated);
        added
    }

    /// Mark `ids` as dependencies of the current plan; true if anything
    /// new entered the install set
    pub(crate) fn mark_more(&mut self, ids: &[PkgId]) -> Result<bool> {
        let outcome = {
            let mut policy = InstallPolicy {
                installed: &mut self.installed,
                rejected: &self.rejected,
                config: self.config,
            };
            self.marker.mark_more(ids, &mut policy)?
        };
        Ok(self.absorb(outcome))
    }

    /// Best catalog provider of `req`, if any is usable
    pub(crate) fn choose_provider(
        &mut self,
        requirer: Option<PkgId>,
        req: &Capreq,
    ) -> Result<Option<PkgId>> {
        let candidates: Vec<PkgId> = self
            .set
            .lookup(req)
            .into_iter()
            .filter(|c| Some(*c) != requirer && !self.marker.is_excluded(*c))
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }
        select_best(
            self.set,
            self.marker.marks(),
            &mut self.installed,
            &self.rejected,
            requirer,
            &candidates,
        )
    }

    /// Tolerate `err` if the configuration allows it
    pub(crate) fn fail(&mut self, err: Error) -> Result<()> {
        let tolerated = (self.config.nodeps && err.is_dependency_error())
            || (self.config.force && err.is_forceable());
        if tolerated {
            warn!("{} (ignored)", err);
            self.tolerated.push(err.to_string());
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Is `req` met by the install set or by installed packages that stay?
    pub(crate) fn is_satisfied(&mut self, req: &Capreq) -> Result<bool> {
        if req.is_rpmlib() || self.iset.provides(self.set, req).is_some() {
            return Ok(true);
        }
        Ok(self.installed.provides(req)?.is_some())
    }

    fn drain(&mut self) -> Result<()> {
        loop {
            while let Some(id) = self.queue.pop_front() {
                self.config.interrupt.check()?;
                if self.config.upgrade {
                    self.process_obsoletes(id)?;
                }
                while let Some(orphan) = self.orphans.pop_front() {
                    self.config.interrupt.check()?;
                    self.process_orphan(orphan)?;
                }
                self.conflict_queue.push(id);
            }

            // conflicts are checked once removals are known
            let pending = std::mem::take(&mut self.conflict_queue);
            if self.config.conflicts {
                for id in pending {
                    self.config.interrupt.check()?;
                    if self.iset.contains(id) {
                        self.process_conflicts(id)?;
                    }
                }
            }

            if self.queue.is_empty() {
                return Ok(());
            }
        }
    }

    /// Re-check every marked package against the current removal set;
    /// true if something new got marked
    fn verify(&mut self) -> Result<bool> {
        let set = self.set;
        let flags = set.match_flags();
        let mut progressed = false;

        for id in self.iset.ids().to_vec() {
            let pkg = set.package(id);
            for req in &pkg.requires {
                if pkg.satisfies(req, flags) || self.is_satisfied(req)? {
                    continue;
                }
                let key = (id, req.to_string());
                if self.reported.contains(&key) {
                    continue;
                }

                let choice = if self.config.follow {
                    self.choose_provider(Some(id), req)?
                } else {
                    None
                };
                if let Some(provider) = choice {
                    debug!("{}: {} no longer satisfied, marking {}", pkg, req, set.package(provider));
                    if self.mark_more(&[provider])? {
                        progressed = true;
                        continue;
                    }
                }

                // nothing new to mark: the requirement stays unmet
                self.reported.insert(key);
                self.fail(Error::UnresolvedRequirement {
                    package: pkg.nevra(),
                    requirement: req.to_string(),
                })?;
            }
        }

        Ok(progressed)
    }

    /// Conflicts of `id` with installed packages that stay
    fn process_conflicts(&mut self, id: PkgId) -> Result<()> {
        let set = self.set;
        let pkg = set.package(id);
        let flags = self.config.installed_match_flags();

        for cnfl in pkg.conflicts.iter().filter(|c| !c.flags.obsoletes) {
            for recno in self.installed.matching(cnfl, flags)? {
                let same_name = self.installed.get(recno).is_some_and(|i| i.name == pkg.name);
                if !same_name {
                    self.resolve_installed_conflict(id, recno, cnfl.to_string())?;
                }
            }
        }

        let mut names = vec![pkg.name.as_str()];
        names.extend(pkg.provides.iter().map(|c| c.name.as_str()));
        names.dedup();

        for name in names {
            for recno in self.installed.conflicting_with(name)? {
                let Some(inst) = self.installed.get(recno) else {
                    continue;
                };
                if inst.name == pkg.name {
                    continue;
                }
                let cause = inst
                    .conflicts
                    .iter()
                    .find(|c| c.name == name && pkg.matches_req(c, flags))
                    .map(|c| c.to_string());
                if let Some(cause) = cause {
                    self.resolve_installed_conflict(id, recno, cause)?;
                }
            }
        }

        Ok(())
    }

    /// Upgrade the installed side of a conflict if the catalog has a newer
    /// version that does not conflict; otherwise report it
    fn resolve_installed_conflict(&mut self, id: PkgId, recno: i64, cause: String) -> Result<()> {
        if self.installed.has(recno) {
            return Ok(());
        }
        let set = self.set;
        let pkg = set.package(id);
        let Some(inst) = self.installed.get(recno).cloned() else {
            return Ok(());
        };
        let flags = set.match_flags();

        if self.config.upgrade {
            for cand in set.find_by_name(&inst.name) {
                let candidate = set.package(cand);
                if candidate.evr <= inst.evr || self.marker.is_excluded(cand) {
                    continue;
                }
                let still_conflicts = pkg.conflicts.iter().any(|c| candidate.matches_req(c, flags))
                    || candidate.conflicts.iter().any(|c| pkg.matches_req(c, flags));
                if still_conflicts {
                    debug!("{} still conflicts with {}, rejected", candidate, pkg);
                    self.rejected.insert(cand);
                    continue;
                }

                if !self.marker.is_marked(cand) {
                    info!("{} conflicts with {}, upgrading to {}", pkg, inst, candidate);
                    self.mark_more(&[cand])?;
                }
                return Ok(());
            }
        }

        self.fail(Error::InstalledConflict {
            package: pkg.nevra(),
            installed: inst.nevra(),
            conflict: cause,
        })
    }

    fn into_plan(self) -> InstallPlan {
        let set = self.set;
        let ordered = order(set, self.iset.ids(), OrderMode::Install);

        let in_plan: HashSet<PkgId> = self.iset.ids().iter().copied().collect();
        let file_conflicts = set
            .file_conflicts()
            .iter()
            .filter(|c| in_plan.contains(&c.first) && in_plan.contains(&c.second))
            .cloned()
            .collect();

        let superseded = self
            .superseded
            .iter()
            .filter(|r| !self.installed.has(**r))
            .filter_map(|r| self.installed.get(*r).cloned())
            .collect();

        let dep_marked = self
            .iset
            .ids()
            .iter()
            .copied()
            .filter(|id| self.marker.marks().is_dep_marked(*id))
            .collect();

        let plan = InstallPlan {
            install: ordered.ordered,
            uninstall: self.installed.uninstall_packages(),
            superseded,
            dep_marked,
            skipped: self.skipped,
            dropped: self.dropped,
            tolerated: self.tolerated,
            cycle_count: ordered.cycle_count,
            cycles: ordered.cycles,
            file_conflicts,
            interrupted: self.interrupted,
        };

        info!(
            "Plan: install {}, remove {}, {} prerequisite loop(s)",
            plan.install.len(),
            plan.uninstall.len(),
            plan.cycle_count
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::Package;
    use crate::resolver::installed::MemoryStore;
    use crate::version::Evr;

    fn pkg(name: &str, evr: &str, provides: &[&str]) -> Package {
        let mut p = Package::new(name, Evr::parse(evr).unwrap());
        for c in provides {
            p.provides.push(c.parse().unwrap());
        }
        p
    }

    #[test]
    fn test_conflicting_upgrade_is_rejected_as_provider() {
        let mut app = pkg("app", "1.0-1", &[]);
        app.conflicts.push("srv < 3.0".parse().unwrap());
        let set = PackageSet::new(
            vec![app, pkg("srv", "2.0-1", &["httpd"]), pkg("lighty", "1.0-1", &["httpd"])],
            &ResolveConfig::default(),
        );
        let store = MemoryStore::new(vec![pkg("srv", "1.0-1", &["httpd"])]);
        let config = ResolveConfig {
            force: true,
            ..ResolveConfig::default()
        };
        let mut run = InstallRun::new(&set, &config, &store);
        let httpd: Capreq = "httpd".parse().unwrap();

        // upgrading an installed package scores best
        assert_eq!(run.choose_provider(None, &httpd).unwrap(), Some(PkgId(1)));

        // srv-2.0-1 cannot settle the conflict, so it is rejected
        run.resolve_installed_conflict(PkgId(0), 1, "srv < 3.0".to_string())
            .unwrap();
        assert!(run.rejected.contains(&PkgId(1)));
        assert_eq!(run.tolerated.len(), 1);
        assert_eq!(run.choose_provider(None, &httpd).unwrap(), Some(PkgId(2)));
    }

    #[test]
    fn test_best_effort_drop_is_rejected() {
        let mut app = pkg("app", "1.0-1", &[]);
        app.requires.push("missing".parse().unwrap());
        let set = PackageSet::new(vec![app], &ResolveConfig::default());
        let store = MemoryStore::default();
        let config = ResolveConfig {
            best_effort: true,
            ..ResolveConfig::default()
        };

        let run = InstallRun::new(&set, &config, &store);
        let plan = run.run(&[PkgId(0)]).unwrap();
        assert!(plan.install.is_empty());
        assert_eq!(plan.dropped, vec![PkgId(0)]);

        let mut run = InstallRun::new(&set, &config, &store);
        let roots = run.precheck(&[PkgId(0)]).unwrap();
        let outcome = {
            let mut policy = InstallPolicy {
                installed: &mut run.installed,
                rejected: &run.rejected,
                config: &config,
            };
            run.marker.mark(&roots, &mut policy).unwrap()
        };
        assert!(!run.absorb(outcome));
        assert!(run.rejected.contains(&PkgId(0)));
    }
}
