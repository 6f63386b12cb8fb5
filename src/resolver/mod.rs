// src/resolver/mod.rs

//! Dependency resolution and transaction planning
//!
//! This module turns a user request into a transaction plan:
//! - `PackageSet`: the catalog arena with its capability and file indexes
//!   and resolved requirement/conflict edges
//! - `Marker`: dependency closure of a selection
//! - `InstalledSet`: cached view over the installed store plus the
//!   packages slated for removal
//! - obsoletes, orphan and conflict processing against installed packages
//! - `order`: transaction ordering with prerequisite loop detection
//!
//! `Resolver` ties them together for one catalog, one configuration and
//! one installed store.

mod capindex;
mod fileindex;
mod graph;
mod install;
mod installed;
mod iset;
mod mark;
mod obsoletes;
mod order;
mod plan;
mod select;
mod uninstall;

pub use fileindex::FileConflict;
pub use graph::{CnflEdge, Edge, PackageSet, ReqEdge};
pub use installed::{InstalledSet, InstalledStore, MemoryStore};
pub use iset::InstallSet;
pub use mark::{CatalogPolicy, MarkOutcome, MarkPolicy, MarkSet, Marker};
pub use order::{OrderMode, OrderResult, order};
pub use plan::{InstallPlan, UninstallPlan};
pub use select::{InstallPolicy, select_best};

use crate::config::ResolveConfig;
use crate::error::Result;
use crate::packages::{Package, PkgId};
use install::InstallRun;

/// Applies a resolved plan
///
/// Implementations receive packages to install in transaction order and
/// installed packages to remove, dependents first.
pub trait TransactionExecutor {
    fn execute(&mut self, install: &[&Package], uninstall: &[Package]) -> Result<()>;
}

/// Resolution context for one catalog, configuration and installed store
pub struct Resolver<'a> {
    set: &'a PackageSet,
    config: &'a ResolveConfig,
    store: &'a dyn InstalledStore,
}

impl<'a> Resolver<'a> {
    pub fn new(
        set: &'a PackageSet,
        config: &'a ResolveConfig,
        store: &'a dyn InstalledStore,
    ) -> Self {
        Self { set, config, store }
    }

    pub fn catalog(&self) -> &'a PackageSet {
        self.set
    }

    pub fn config(&self) -> &'a ResolveConfig {
        self.config
    }

    /// Plan the installation of `selection` and everything it needs
    pub fn resolve_install(&self, selection: &[PkgId]) -> Result<InstallPlan> {
        InstallRun::new(self.set, self.config, self.store).run(selection)
    }

    /// `resolve_install` for selection masks (see `PackageSet::select`)
    pub fn resolve_install_masks(&self, masks: &[String]) -> Result<InstallPlan> {
        let selection = self.set.select(masks)?;
        self.resolve_install(&selection)
    }

    /// Hand a plan to an executor
    pub fn apply(&self, plan: &InstallPlan, executor: &mut dyn TransactionExecutor) -> Result<()> {
        executor.execute(&plan.install_packages(self.set), &plan.uninstall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::packages::Capreq;
    use crate::version::Evr;

    fn pkg(name: &str, evr: &str) -> Package {
        Package::new(name, Evr::parse(evr).unwrap())
    }

    fn with_reqs(mut p: Package, reqs: &[&str]) -> Package {
        for r in reqs {
            p.requires.push(r.parse().unwrap());
        }
        p
    }

    fn with_provides(mut p: Package, caps: &[&str]) -> Package {
        for c in caps {
            p.provides.push(c.parse().unwrap());
        }
        p
    }

    fn names(set: &PackageSet, ids: &[PkgId]) -> Vec<String> {
        ids.iter().map(|id| set.package(*id).name.clone()).collect()
    }

    #[derive(Default)]
    struct Recorder {
        installed: Vec<String>,
        removed: Vec<String>,
    }

    impl TransactionExecutor for Recorder {
        fn execute(&mut self, install: &[&Package], uninstall: &[Package]) -> Result<()> {
            self.installed.extend(install.iter().map(|p| p.nevra()));
            self.removed.extend(uninstall.iter().map(|p| p.nevra()));
            Ok(())
        }
    }

    #[test]
    fn test_install_pulls_dependencies() {
        let config = ResolveConfig::default();
        let set = PackageSet::new(
            vec![
                with_reqs(pkg("app", "1.0-1"), &["libfoo.so.1"]),
                with_provides(pkg("libfoo", "1.0-1"), &["libfoo.so.1"]),
            ],
            &config,
        );
        let store = MemoryStore::default();
        let resolver = Resolver::new(&set, &config, &store);

        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(names(&set, &plan.install).len(), 2);
        assert_eq!(plan.dep_marked, vec![PkgId(1)]);
        assert!(plan.uninstall.is_empty());
    }

    #[test]
    fn test_installed_requirement_not_followed() {
        let config = ResolveConfig::default();
        let set = PackageSet::new(
            vec![
                with_reqs(pkg("app", "1.0-1"), &["libfoo.so.1"]),
                with_provides(pkg("libfoo", "1.0-1"), &["libfoo.so.1"]),
            ],
            &config,
        );
        let store = MemoryStore::new(vec![with_provides(pkg("libfoo", "0.9-1"), &["libfoo.so.1"])]);
        let resolver = Resolver::new(&set, &config, &store);

        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(plan.install, vec![PkgId(0)]);
    }

    #[test]
    fn test_upgrade_replaces_installed() {
        let config = ResolveConfig::default();
        let set = PackageSet::new(vec![pkg("foo", "2.0-1")], &config);
        let store = MemoryStore::new(vec![pkg("foo", "1.0-1")]);
        let resolver = Resolver::new(&set, &config, &store);

        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(plan.install, vec![PkgId(0)]);
        assert_eq!(plan.uninstall.len(), 1);
        assert_eq!(plan.uninstall[0].nevra(), "foo-1.0-1");

        let mut recorder = Recorder::default();
        resolver.apply(&plan, &mut recorder).unwrap();
        assert_eq!(recorder.installed, vec!["foo-2.0-1"]);
        assert_eq!(recorder.removed, vec!["foo-1.0-1"]);
    }

    #[test]
    fn test_already_installed_skipped() {
        let config = ResolveConfig::default();
        let set = PackageSet::new(vec![pkg("foo", "1.0-1"), pkg("bar", "1.0-1")], &config);
        let store = MemoryStore::new(vec![pkg("foo", "1.0-1"), pkg("bar", "2.0-1")]);
        let resolver = Resolver::new(&set, &config, &store);

        let plan = resolver.resolve_install(&[PkgId(0), PkgId(1)]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.skipped.len(), 2);

        let reinstall = ResolveConfig {
            reinstall: true,
            ..ResolveConfig::default()
        };
        let resolver = Resolver::new(&set, &reinstall, &store);
        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(plan.install, vec![PkgId(0)]);
        assert_eq!(plan.uninstall.len(), 1);
    }

    #[test]
    fn test_multi_instance_supersedes() {
        let config = ResolveConfig::default();
        let set = PackageSet::new(vec![pkg("foo", "1.2-1")], &config);
        let store = MemoryStore::new(vec![pkg("foo", "1.0-1"), pkg("foo", "1.4-1")]);
        let resolver = Resolver::new(&set, &config, &store);

        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(plan.uninstall.len(), 1);
        assert_eq!(plan.uninstall[0].nevra(), "foo-1.0-1");
        assert_eq!(plan.superseded.len(), 1);
        assert_eq!(plan.superseded[0].nevra(), "foo-1.4-1");
    }

    #[test]
    fn test_obsoletes_orphan_followed() {
        // newlib obsoletes oldlib; tool needs oldlib.so which only compat provides
        let config = ResolveConfig::default();
        let mut newlib = pkg("newlib", "2.0-1");
        newlib.conflicts.push("oldlib".parse::<Capreq>().unwrap().obsoletes());
        let set = PackageSet::new(
            vec![newlib, with_provides(pkg("oldlib-compat", "1.0-1"), &["oldlib.so"])],
            &config,
        );
        let store = MemoryStore::new(vec![
            with_provides(pkg("oldlib", "1.0-1"), &["oldlib.so"]),
            with_reqs(pkg("tool", "1.0-1"), &["oldlib.so"]),
        ]);
        let resolver = Resolver::new(&set, &config, &store);

        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(names(&set, &plan.install), vec!["newlib", "oldlib-compat"]);
        assert_eq!(plan.uninstall[0].name, "oldlib");

        let no_follow = ResolveConfig {
            follow: false,
            ..ResolveConfig::default()
        };
        let resolver = Resolver::new(&set, &no_follow, &store);
        let err = resolver.resolve_install(&[PkgId(0)]).unwrap_err();
        assert!(matches!(err, Error::OrphanUnresolvable { .. }));
    }

    #[test]
    fn test_installed_conflict_resolved_by_upgrade() {
        let config = ResolveConfig::default();
        let mut app = pkg("app", "2.0-1");
        app.conflicts.push("tool < 2.0".parse().unwrap());
        let set = PackageSet::new(vec![app, pkg("tool", "2.0-1")], &config);
        let store = MemoryStore::new(vec![pkg("tool", "1.0-1")]);
        let resolver = Resolver::new(&set, &config, &store);

        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(plan.install.len(), 2);
        assert_eq!(plan.uninstall[0].nevra(), "tool-1.0-1");

        let no_upgrade = PackageSet::new(vec![set.package(PkgId(0)).clone()], &config);
        let resolver = Resolver::new(&no_upgrade, &config, &store);
        let err = resolver.resolve_install(&[PkgId(0)]).unwrap_err();
        assert!(matches!(err, Error::InstalledConflict { .. }));

        let force = ResolveConfig {
            force: true,
            ..ResolveConfig::default()
        };
        let resolver = Resolver::new(&no_upgrade, &force, &store);
        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(plan.tolerated.len(), 1);
    }

    #[test]
    fn test_interrupted_run_returns_partial_plan() {
        let config = ResolveConfig::default();
        config.interrupt.request();
        let set = PackageSet::new(
            vec![
                with_reqs(pkg("app", "1.0-1"), &["libfoo.so.1"]),
                with_provides(pkg("libfoo", "1.0-1"), &["libfoo.so.1"]),
            ],
            &config,
        );
        let store = MemoryStore::new(vec![pkg("app", "0.9-1")]);
        let resolver = Resolver::new(&set, &config, &store);

        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert!(plan.interrupted);
        // marked before the first poll, obsoletes never processed
        assert_eq!(plan.install.len(), 2);
        assert!(plan.uninstall.is_empty());

        let plan = resolver.resolve_uninstall(&["app".to_string()], true).unwrap();
        assert!(plan.interrupted);
    }

    #[test]
    fn test_unsatisfiable_versioned_provide_terminates() {
        // "feature > 1.0" is provided, but that does not satisfy "> 1.0"
        let config = ResolveConfig::default();
        let set = PackageSet::new(
            vec![
                with_reqs(pkg("app", "1.0-1"), &["feature > 1.0"]),
                with_provides(pkg("prov", "1.0-1"), &["feature > 1.0"]),
            ],
            &config,
        );
        let store = MemoryStore::default();
        let resolver = Resolver::new(&set, &config, &store);

        let err = resolver.resolve_install(&[PkgId(0)]).unwrap_err();
        assert!(matches!(err, Error::UnresolvedRequirement { .. }));

        let nodeps = ResolveConfig {
            nodeps: true,
            ..ResolveConfig::default()
        };
        let resolver = Resolver::new(&set, &nodeps, &store);
        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(plan.install, vec![PkgId(0)]);
        assert!(!plan.tolerated.is_empty());
    }

    #[test]
    fn test_older_than_every_instance_is_skipped() {
        let config = ResolveConfig::default();
        let set = PackageSet::new(vec![pkg("foo", "1.0-1")], &config);
        let store = MemoryStore::new(vec![pkg("foo", "2.0-1"), pkg("foo", "3.0-1")]);
        let resolver = Resolver::new(&set, &config, &store);

        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.skipped, vec![PkgId(0)]);

        let downgrade = ResolveConfig {
            downgrade: true,
            ..ResolveConfig::default()
        };
        let resolver = Resolver::new(&set, &downgrade, &store);
        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(plan.install, vec![PkgId(0)]);
        assert_eq!(plan.uninstall.len(), 1);
        assert_eq!(plan.uninstall[0].nevra(), "foo-2.0-1");
        assert_eq!(plan.superseded.len(), 1);
        assert_eq!(plan.superseded[0].nevra(), "foo-3.0-1");
    }

    #[test]
    fn test_downgrade_single_instance() {
        let config = ResolveConfig::default();
        let set = PackageSet::new(vec![pkg("foo", "1.0-1")], &config);
        let store = MemoryStore::new(vec![pkg("foo", "2.0-1")]);
        let resolver = Resolver::new(&set, &config, &store);

        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.skipped, vec![PkgId(0)]);

        let downgrade = ResolveConfig {
            downgrade: true,
            ..ResolveConfig::default()
        };
        let resolver = Resolver::new(&set, &downgrade, &store);
        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(plan.install, vec![PkgId(0)]);
        assert_eq!(plan.uninstall[0].nevra(), "foo-2.0-1");
    }

    #[test]
    fn test_multilib_obsoletes_same_color_only() {
        let mut incoming = pkg("foo", "2.0-1");
        incoming.arch = Some("x86_64".to_string());
        incoming.color = 2;
        let mut inst32 = pkg("foo", "1.0-1");
        inst32.arch = Some("i686".to_string());
        inst32.color = 1;
        let mut inst64 = pkg("foo", "1.0-1");
        inst64.arch = Some("x86_64".to_string());
        inst64.color = 2;

        let store = MemoryStore::new(vec![inst32, inst64]);
        let multilib = ResolveConfig {
            multilib: true,
            ..ResolveConfig::default()
        };
        let set = PackageSet::new(vec![incoming], &multilib);
        let resolver = Resolver::new(&set, &multilib, &store);

        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(plan.uninstall.len(), 1);
        assert_eq!(plan.uninstall[0].nevra(), "foo-1.0-1.x86_64");
        assert!(plan.superseded.is_empty());

        // without color filtering both instances are equally close
        let config = ResolveConfig::default();
        let resolver = Resolver::new(&set, &config, &store);
        let err = resolver.resolve_install(&[PkgId(0)]).unwrap_err();
        assert!(matches!(err, Error::MultiInstanceAmbiguous { .. }));
    }

    #[test]
    fn test_greedy_upgrades_orphan() {
        let mut newlib = pkg("newlib", "2.0-1");
        newlib.conflicts.push("oldlib".parse::<Capreq>().unwrap().obsoletes());
        let catalog = vec![
            newlib,
            with_provides(pkg("oldlib-compat", "1.0-1"), &["oldlib.so"]),
            with_reqs(pkg("tool", "2.0-1"), &["newlib"]),
        ];
        let store = MemoryStore::new(vec![
            with_provides(pkg("oldlib", "1.0-1"), &["oldlib.so"]),
            with_reqs(pkg("tool", "1.0-1"), &["oldlib.so"]),
        ]);

        let greedy = ResolveConfig {
            greedy: true,
            ..ResolveConfig::default()
        };
        let set = PackageSet::new(catalog, &greedy);
        let resolver = Resolver::new(&set, &greedy, &store);

        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        let mut installed = names(&set, &plan.install);
        installed.sort();
        assert_eq!(installed, vec!["newlib", "tool"]);
        let mut removed: Vec<String> = plan.uninstall.iter().map(|p| p.nevra()).collect();
        removed.sort();
        assert_eq!(removed, vec!["oldlib-1.0-1", "tool-1.0-1"]);

        // without greedy the orphan keeps its version and gets a new provider
        let config = ResolveConfig::default();
        let resolver = Resolver::new(&set, &config, &store);
        let plan = resolver.resolve_install(&[PkgId(0)]).unwrap();
        assert_eq!(names(&set, &plan.install), vec!["newlib", "oldlib-compat"]);
    }

    #[test]
    fn test_resolve_install_masks() {
        let config = ResolveConfig::default();
        let set = PackageSet::new(vec![pkg("foo", "1.0-1"), pkg("foo", "2.0-1")], &config);
        let store = MemoryStore::default();
        let resolver = Resolver::new(&set, &config, &store);

        let plan = resolver.resolve_install_masks(&["foo".to_string()]).unwrap();
        assert_eq!(plan.install.len(), 1);
        assert_eq!(set.package(plan.install[0]).evr.to_string(), "2.0-1");
        assert!(matches!(
            resolver.resolve_install_masks(&["bar".to_string()]),
            Err(Error::NoSuchPackage(_))
        ));
    }
}
