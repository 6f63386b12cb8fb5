// src/resolver/iset.rs

//! The to-install set

use crate::packages::{Capreq, PkgId};
use crate::resolver::graph::PackageSet;
use std::collections::HashMap;

/// Catalog packages the plan is going to install, with a cache of which
/// member satisfies a requirement
#[derive(Debug, Default)]
pub struct InstallSet {
    ids: Vec<PkgId>,
    cache: HashMap<String, PkgId>,
}

impl InstallSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: PkgId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Drop `id`; cached lookups are flushed since any of them may have
    /// pointed at it
    pub fn remove(&mut self, id: PkgId) -> bool {
        let Some(pos) = self.ids.iter().position(|x| *x == id) else {
            return false;
        };
        self.ids.remove(pos);
        self.cache.clear();
        true
    }

    pub fn contains(&self, id: PkgId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &[PkgId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Member satisfying `req`
    pub fn provides(&mut self, set: &PackageSet, req: &Capreq) -> Option<PkgId> {
        let key = req.key();
        if let Some(id) = self.cache.get(&key) {
            return Some(*id);
        }

        let flags = set.match_flags();
        let found = self
            .ids
            .iter()
            .copied()
            .find(|id| set.package(*id).satisfies(req, flags))?;
        self.cache.insert(key, found);
        Some(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolveConfig;
    use crate::packages::Package;
    use crate::version::Evr;

    #[test]
    fn test_provides_and_flush() {
        let mut a = Package::new("a", Evr::parse("1.0-1").unwrap());
        a.provides.push("feature".parse().unwrap());
        let mut b = Package::new("b", Evr::parse("1.0-1").unwrap());
        b.provides.push("feature".parse().unwrap());
        let set = PackageSet::new(vec![a, b], &ResolveConfig::default());

        let mut iset = InstallSet::new();
        let req: Capreq = "feature".parse().unwrap();
        assert_eq!(iset.provides(&set, &req), None);

        assert!(iset.add(PkgId(0)));
        assert!(!iset.add(PkgId(0)));
        iset.add(PkgId(1));
        assert_eq!(iset.provides(&set, &req), Some(PkgId(0)));

        assert!(iset.remove(PkgId(0)));
        assert_eq!(iset.provides(&set, &req), Some(PkgId(1)));
        assert_eq!(iset.len(), 1);
    }
}
