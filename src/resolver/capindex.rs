// src/resolver/capindex.rs

//! Capability index: capability name to providing packages

use crate::packages::{Capreq, MatchFlags, Package, PkgId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct CapEntry {
    cap: Capreq,
    pkg: PkgId,
}

/// Maps capability names (including every package's self-capability) to
/// the packages providing them
#[derive(Debug, Default)]
pub struct CapIndex {
    by_name: HashMap<String, Vec<CapEntry>>,
    by_key: HashMap<String, Vec<PkgId>>,
}

impl CapIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the self-capability and every provide of `pkg`
    pub fn index(&mut self, id: PkgId, pkg: &Package) {
        self.add(id, pkg.self_cap());
        for cap in &pkg.provides {
            self.add(id, cap.clone());
        }
    }

    fn add(&mut self, id: PkgId, cap: Capreq) {
        if cap.is_versioned() {
            let ids = self.by_key.entry(cap.key()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        self.by_name
            .entry(cap.name.clone())
            .or_default()
            .push(CapEntry { cap, pkg: id });
    }

    /// Every package providing something called `name`, unfiltered
    pub fn providers(&self, name: &str) -> Vec<PkgId> {
        let mut ids: Vec<PkgId> = self
            .by_name
            .get(name)
            .map(|entries| entries.iter().map(|e| e.pkg).collect())
            .unwrap_or_default();
        ids.dedup();
        ids
    }

    /// Providers whose capability matches `req`
    ///
    /// An exact versioned key (`foo = 1.0-1`) is tried first; otherwise all
    /// providers of the name are filtered by relation. Key hits are subject
    /// to the same relation check. The result is unsorted and may be empty.
    pub fn lookup(&self, req: &Capreq, flags: MatchFlags) -> Vec<PkgId> {
        let Some(entries) = self.by_name.get(&req.name) else {
            return Vec::new();
        };

        if req.is_versioned() {
            if let Some(ids) = self.by_key.get(&req.key()) {
                let hits: Vec<PkgId> = ids
                    .iter()
                    .copied()
                    .filter(|id| entries.iter().any(|e| e.pkg == *id && e.cap.matches(req, flags)))
                    .collect();
                if !hits.is_empty() {
                    return hits;
                }
            }
        }

        let mut ids = Vec::new();
        for entry in entries {
            if !ids.contains(&entry.pkg) && entry.cap.matches(req, flags) {
                ids.push(entry.pkg);
            }
        }
        ids
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

}
