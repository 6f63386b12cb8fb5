// src/resolver/installed.rs

//! Installed-set tracker
//!
//! `InstalledStore` is the read side of the installed-package database.
//! `InstalledSet` wraps a store for one resolver run: it caches the records
//! it has seen, accumulates the packages slated for removal, and caches
//! which record satisfies a requirement. Records slated for removal never
//! satisfy anything.

use crate::error::{Error, Result};
use crate::packages::{Capreq, MatchFlags, Package};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Query interface of the installed-package database
///
/// Every returned package carries its record id.
pub trait InstalledStore {
    fn all(&self) -> Result<Vec<Package>>;

    fn find_by_name(&self, name: &str) -> Result<Vec<Package>>;

    /// Packages named `cap` or providing a capability named `cap`
    fn find_by_provided(&self, cap: &str) -> Result<Vec<Package>>;

    fn find_by_file(&self, path: &str) -> Result<Vec<Package>>;

    /// Packages with a requirement named `cap`
    fn find_by_required(&self, cap: &str) -> Result<Vec<Package>>;

    /// Packages with a conflict (or obsoletes) named `cap`
    fn find_by_conflict(&self, cap: &str) -> Result<Vec<Package>>;
}

/// In-memory store, for tests and for catalogs loaded as "installed"
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    packages: Vec<Package>,
}

impl MemoryStore {
    /// Packages without a record id get sequential ids starting at 1
    pub fn new(packages: Vec<Package>) -> Self {
        let mut store = Self::default();
        for pkg in packages {
            store.insert(pkg);
        }
        store
    }

    pub fn insert(&mut self, mut pkg: Package) -> i64 {
        let recno = match pkg.recno {
            Some(recno) => recno,
            None => self.packages.iter().filter_map(|p| p.recno).max().unwrap_or(0) + 1,
        };
        pkg.recno = Some(recno);
        self.packages.push(pkg);
        recno
    }

    pub fn remove(&mut self, recno: i64) -> Option<Package> {
        let pos = self.packages.iter().position(|p| p.recno == Some(recno))?;
        Some(self.packages.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn filter<F: Fn(&Package) -> bool>(&self, f: F) -> Vec<Package> {
        self.packages.iter().filter(|p| f(p)).cloned().collect()
    }
}

impl InstalledStore for MemoryStore {
    fn all(&self) -> Result<Vec<Package>> {
        Ok(self.packages.clone())
    }

    fn find_by_name(&self, name: &str) -> Result<Vec<Package>> {
        Ok(self.filter(|p| p.name == name))
    }

    fn find_by_provided(&self, cap: &str) -> Result<Vec<Package>> {
        Ok(self.filter(|p| p.name == cap || p.provides.iter().any(|c| c.name == cap)))
    }

    fn find_by_file(&self, path: &str) -> Result<Vec<Package>> {
        Ok(self.filter(|p| p.has_file(path)))
    }

    fn find_by_required(&self, cap: &str) -> Result<Vec<Package>> {
        Ok(self.filter(|p| p.requires.iter().any(|r| r.name == cap)))
    }

    fn find_by_conflict(&self, cap: &str) -> Result<Vec<Package>> {
        Ok(self.filter(|p| p.conflicts.iter().any(|c| c.name == cap)))
    }
}

pub struct InstalledSet<'s> {
    store: &'s dyn InstalledStore,
    records: HashMap<i64, Package>,
    uninstall: BTreeSet<i64>,
    uninstall_order: Vec<i64>,
    cache: HashMap<String, i64>,
    flags: MatchFlags,
}

impl<'s> InstalledSet<'s> {
    pub fn new(store: &'s dyn InstalledStore, flags: MatchFlags) -> Self {
        Self {
            store,
            records: HashMap::new(),
            uninstall: BTreeSet::new(),
            uninstall_order: Vec::new(),
            cache: HashMap::new(),
            flags,
        }
    }

    /// Cache store results; a record id seen twice with different
    /// identities means the store is broken
    fn remember(&mut self, pkgs: Vec<Package>) -> Result<Vec<i64>> {
        let mut recnos = Vec::with_capacity(pkgs.len());
        for pkg in pkgs {
            let Some(recno) = pkg.recno else {
                return Err(Error::DatabaseInconsistent {
                    package: pkg.nevra(),
                    detail: "record without id".to_string(),
                });
            };
            match self.records.get(&recno) {
                Some(known) if !known.same_nevra(&pkg) => {
                    return Err(Error::DatabaseInconsistent {
                        package: pkg.nevra(),
                        detail: format!("record {} already holds {}", recno, known.nevra()),
                    });
                }
                Some(_) => {}
                None => {
                    self.records.insert(recno, pkg);
                }
            }
            if !recnos.contains(&recno) {
                recnos.push(recno);
            }
        }
        recnos.sort_unstable();
        Ok(recnos)
    }

    /// Record previously returned by a query
    pub fn get(&self, recno: i64) -> Option<&Package> {
        self.records.get(&recno)
    }

    /// Is the record slated for removal?
    pub fn has(&self, recno: i64) -> bool {
        self.uninstall.contains(&recno)
    }

    /// Slate `pkg` for removal; false if it already was
    pub fn add(&mut self, pkg: &Package) -> Result<bool> {
        let recno = self.remember(vec![pkg.clone()])?[0];
        if !self.uninstall.insert(recno) {
            return Ok(false);
        }
        self.uninstall_order.push(recno);
        debug!("{} slated for removal", pkg);
        Ok(true)
    }

    pub fn uninstall_packages(&self) -> Vec<Package> {
        self.uninstall_order
            .iter()
            .filter_map(|r| self.records.get(r).cloned())
            .collect()
    }

    /// Does some record slated for removal satisfy `req`?
    pub fn uninstalled_provides(&self, req: &Capreq) -> bool {
        self.uninstall_order
            .iter()
            .filter_map(|r| self.records.get(r))
            .any(|p| p.satisfies(req, self.flags))
    }

    /// Installed record (not slated for removal) satisfying `req`
    pub fn provides(&mut self, req: &Capreq) -> Result<Option<i64>> {
        let key = req.key();
        if let Some(recno) = self.cache.get(&key) {
            if !self.uninstall.contains(recno) {
                return Ok(Some(*recno));
            }
        }

        let found = if req.is_file() {
            let mut found = self.store.find_by_file(&req.name)?;
            found.extend(self.store.find_by_provided(&req.name)?);
            found
        } else {
            self.store.find_by_provided(&req.name)?
        };

        let flags = self.flags;
        for recno in self.remember(found)? {
            if self.uninstall.contains(&recno) {
                continue;
            }
            let satisfies = self
                .records
                .get(&recno)
                .is_some_and(|p| p.satisfies(req, flags));
            if satisfies {
                self.cache.insert(key, recno);
                return Ok(Some(recno));
            }
        }
        Ok(None)
    }

    /// Installed records (not slated for removal) with a requirement on
    /// `cap` that `cap` would satisfy
    ///
    /// Records satisfying `cap` themselves are skipped. With `strict`, a
    /// versioned capability only counts for a matching versioned
    /// requirement.
    pub fn what_requires(&mut self, cap: &Capreq, strict: bool) -> Result<Vec<i64>> {
        let found = self.store.find_by_required(&cap.name)?;
        let flags = self.flags;
        let mut recnos = Vec::new();
        for recno in self.remember(found)? {
            if self.uninstall.contains(&recno) {
                continue;
            }
            let Some(pkg) = self.records.get(&recno) else {
                continue;
            };
            if pkg.satisfies(cap, flags) {
                continue;
            }
            if pkg.requirements_on(cap, strict).next().is_some() {
                recnos.push(recno);
            }
        }
        Ok(recnos)
    }

    /// Installed instances of `name` not slated for removal
    pub fn installed_versions(&mut self, name: &str) -> Result<Vec<i64>> {
        let found = self.store.find_by_name(name)?;
        Ok(self
            .remember(found)?
            .into_iter()
            .filter(|r| !self.uninstall.contains(r))
            .collect())
    }

    /// Installed records (not slated for removal) matched by `cap`
    pub fn matching(&mut self, cap: &Capreq, flags: MatchFlags) -> Result<Vec<i64>> {
        let found = self.store.find_by_provided(&cap.name)?;
        let mut recnos = Vec::new();
        for recno in self.remember(found)? {
            if self.uninstall.contains(&recno) {
                continue;
            }
            if self.records.get(&recno).is_some_and(|p| p.matches_req(cap, flags)) {
                recnos.push(recno);
            }
        }
        Ok(recnos)
    }

    /// Installed records (not slated for removal) declaring a conflict
    /// named `cap`
    pub fn conflicting_with(&mut self, cap: &str) -> Result<Vec<i64>> {
        let found = self.store.find_by_conflict(cap)?;
        Ok(self
            .remember(found)?
            .into_iter()
            .filter(|r| !self.uninstall.contains(r))
            .collect())
    }

    /// Every installed record
    pub fn all(&mut self) -> Result<Vec<i64>> {
        let found = self.store.all()?;
        self.remember(found)
    }
}
