// src/resolver/mark.rs

//! Dependency marker
//!
//! Computes the transitive closure of packages that must be installed
//! together with a hand-marked selection. Marks live in a side table
//! (`MarkSet`) so the package arena stays shared and immutable.
//!
//! What counts as "already satisfied" and which alternative to take for an
//! OR-edge are decided by a `MarkPolicy`. The default policy knows nothing
//! but the catalog; the resolver supplies one that consults the installed
//! packages.

use crate::config::ResolveConfig;
use crate::error::{Error, Result};
use crate::packages::{Capreq, PkgId};
use crate::resolver::graph::PackageSet;
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MarkState {
    hand: bool,
    dep: bool,
}

/// Hand and dependency marks, keyed by handle, in marking order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkSet {
    states: Vec<MarkState>,
    order: Vec<PkgId>,
}

impl MarkSet {
    pub fn new(size: usize) -> Self {
        Self {
            states: vec![MarkState::default(); size],
            order: Vec::new(),
        }
    }

    pub fn is_marked(&self, id: PkgId) -> bool {
        let s = self.states[id.index()];
        s.hand || s.dep
    }

    pub fn is_dep_marked(&self, id: PkgId) -> bool {
        let s = self.states[id.index()];
        s.dep && !s.hand
    }

    pub fn mark_hand(&mut self, id: PkgId) {
        if !self.is_marked(id) {
            self.order.push(id);
        }
        self.states[id.index()].hand = true;
    }

    pub fn mark_dep(&mut self, id: PkgId) {
        if !self.is_marked(id) {
            self.order.push(id);
        }
        self.states[id.index()].dep = true;
    }

    /// Marked packages in the order they were marked
    pub fn marked(&self) -> &[PkgId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Roll back to the first `len` marks
    fn truncate(&mut self, len: usize) {
        for id in self.order.drain(len..) {
            self.states[id.index()] = MarkState::default();
        }
    }
}

/// Decisions the marker delegates
pub trait MarkPolicy {
    /// Is `req` of `requirer` satisfied without marking anything?
    fn externally_satisfied(
        &mut self,
        _set: &PackageSet,
        _requirer: PkgId,
        _req: &Capreq,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Pick one of `candidates` (never empty, best first) to satisfy a
    /// requirement of `requirer`
    fn choose(
        &mut self,
        _set: &PackageSet,
        _marks: &MarkSet,
        _requirer: PkgId,
        candidates: &[PkgId],
    ) -> Result<Option<PkgId>> {
        Ok(candidates.first().copied())
    }
}

/// Policy that only knows the catalog
#[derive(Debug, Default)]
pub struct CatalogPolicy;

impl MarkPolicy for CatalogPolicy {}

/// Result of one marking call
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MarkOutcome {
    /// Packages marked by this call, in marking order
    pub marked: Vec<PkgId>,
    /// Packages excluded in best-effort mode
    pub dropped: Vec<PkgId>,
    /// Errors tolerated under `nodeps`
    pub tolerated: Vec<String>,
}

pub struct Marker<'a> {
    set: &'a PackageSet,
    config: &'a ResolveConfig,
    marks: MarkSet,
    excluded: BTreeSet<PkgId>,
}

impl<'a> Marker<'a> {
    pub fn new(set: &'a PackageSet, config: &'a ResolveConfig) -> Self {
        Self {
            set,
            config,
            marks: MarkSet::new(set.len()),
            excluded: BTreeSet::new(),
        }
    }

    pub fn marks(&self) -> &MarkSet {
        &self.marks
    }

    pub fn is_marked(&self, id: PkgId) -> bool {
        self.marks.is_marked(id)
    }

    pub fn is_excluded(&self, id: PkgId) -> bool {
        self.excluded.contains(&id)
    }

    /// Hand-mark `roots` and everything they need
    pub fn mark(&mut self, roots: &[PkgId], policy: &mut dyn MarkPolicy) -> Result<MarkOutcome> {
        self.run(roots, true, policy)
    }

    /// Extend the current closure with `roots` as dependency marks
    pub fn mark_more(
        &mut self,
        roots: &[PkgId],
        policy: &mut dyn MarkPolicy,
    ) -> Result<MarkOutcome> {
        self.run(roots, false, policy)
    }

    fn run(
        &mut self,
        roots: &[PkgId],
        hand: bool,
        policy: &mut dyn MarkPolicy,
    ) -> Result<MarkOutcome> {
        let start = self.marks.len();
        let mut dropped = Vec::new();

        loop {
            let mut problems: Vec<(PkgId, Error)> = Vec::new();
            let mut tolerated = Vec::new();

            for root in roots {
                if self.excluded.contains(root) {
                    continue;
                }
                if self.marks.is_marked(*root) {
                    if hand {
                        self.marks.mark_hand(*root);
                    }
                    continue;
                }
                if hand {
                    self.marks.mark_hand(*root);
                } else {
                    self.marks.mark_dep(*root);
                }
                if let Err(err) = self.follow(*root, policy, &mut problems, &mut tolerated) {
                    self.marks.truncate(start);
                    return Err(err);
                }
            }

            self.check_conflicts(start, &mut problems);

            if problems.is_empty() {
                let marked = self.marks.marked()[start..].to_vec();
                debug!("marked {} package(s)", marked.len());
                return Ok(MarkOutcome {
                    marked,
                    dropped,
                    tolerated,
                });
            }

            self.marks.truncate(start);

            if !self.config.best_effort {
                for (_, err) in &problems {
                    error!("{}", err);
                }
                let (_, first) = problems.remove(0);
                return Err(first);
            }

            let mut progress = false;
            let mut first = None;
            for (offender, err) in problems {
                warn!("{} (dropping {})", err, self.set.package(offender));
                if self.excluded.insert(offender) {
                    dropped.push(offender);
                    progress = true;
                }
                first.get_or_insert(err);
            }
            if !progress {
                if let Some(err) = first {
                    return Err(err);
                }
            }
        }
    }

    /// Depth-first walk from `root`, marking what its requirements need
    fn follow(
        &mut self,
        root: PkgId,
        policy: &mut dyn MarkPolicy,
        problems: &mut Vec<(PkgId, Error)>,
        tolerated: &mut Vec<String>,
    ) -> Result<()> {
        let set = self.set;
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let pkg = set.package(id);

            for req in set.unresolved(id) {
                if policy.externally_satisfied(set, id, req)? {
                    continue;
                }
                let err = Error::UnresolvedRequirement {
                    package: pkg.nevra(),
                    requirement: req.to_string(),
                };
                self.report(id, err, problems, tolerated);
            }

            for edge in set.requirements(id) {
                let targets = edge.target.targets();
                if targets.iter().any(|t| self.marks.is_marked(*t)) {
                    continue;
                }

                let mut external = true;
                for req in &edge.reqs {
                    if !policy.externally_satisfied(set, id, req)? {
                        external = false;
                        break;
                    }
                }
                if external {
                    continue;
                }

                let requirement = edge
                    .reqs
                    .first()
                    .map(|r| r.to_string())
                    .unwrap_or_default();

                let candidates: Vec<PkgId> = targets
                    .iter()
                    .copied()
                    .filter(|t| !self.excluded.contains(t))
                    .collect();

                let chosen = if candidates.is_empty() || !self.config.follow {
                    None
                } else {
                    policy.choose(set, &self.marks, id, &candidates)?
                };

                match chosen {
                    Some(next) => {
                        debug!("{} marks {} ({})", pkg, set.package(next), requirement);
                        self.marks.mark_dep(next);
                        stack.push(next);
                    }
                    None => {
                        let err = Error::UnresolvedRequirement {
                            package: pkg.nevra(),
                            requirement,
                        };
                        self.report(id, err, problems, tolerated);
                    }
                }
            }
        }

        Ok(())
    }

    fn report(
        &self,
        id: PkgId,
        err: Error,
        problems: &mut Vec<(PkgId, Error)>,
        tolerated: &mut Vec<String>,
    ) {
        if self.config.nodeps && err.is_dependency_error() {
            warn!("{} (ignored)", err);
            tolerated.push(err.to_string());
        } else {
            problems.push((id, err));
        }
    }

    /// Every conflict between a package marked since `start` and any
    /// marked package
    fn check_conflicts(&self, start: usize, problems: &mut Vec<(PkgId, Error)>) {
        let set = self.set;
        let order = self.marks.marked();
        let mut seen: BTreeSet<(PkgId, PkgId)> = BTreeSet::new();

        for (pos, &id) in order.iter().enumerate().skip(start) {
            let mut clash = |a: PkgId, b: PkgId, cause: &str, problems: &mut Vec<(PkgId, Error)>| {
                let key = if a < b { (a, b) } else { (b, a) };
                if !seen.insert(key) {
                    return;
                }
                // the later of the two is the one to drop
                let other = if a == id { b } else { a };
                let later = match order.iter().position(|x| *x == other) {
                    Some(p) if p > pos => other,
                    _ => id,
                };
                problems.push((
                    later,
                    Error::InSetConflict {
                        package: set.package(a).nevra(),
                        other: set.package(b).nevra(),
                        conflict: cause.to_string(),
                    },
                ));
            };

            for edge in set.conflicts(id) {
                if self.marks.is_marked(edge.pkg) {
                    clash(id, edge.pkg, &edge.cause, problems);
                }
            }
            for &other in set.conflicted_by(id) {
                if !self.marks.is_marked(other) {
                    continue;
                }
                if let Some(edge) = set.conflict_between(other, id) {
                    clash(other, id, &edge.cause, problems);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::Package;
    use crate::version::Evr;

    fn pkg(name: &str, reqs: &[&str]) -> Package {
        let mut p = Package::new(name, Evr::parse("1.0-1").unwrap());
        p.requires = reqs.iter().map(|s| s.parse().unwrap()).collect();
        p
    }

    fn provides(mut p: Package, caps: &[&str]) -> Package {
        p.provides = caps.iter().map(|s| s.parse().unwrap()).collect();
        p
    }

    fn conflicts(mut p: Package, caps: &[&str]) -> Package {
        p.conflicts = caps.iter().map(|s| s.parse().unwrap()).collect();
        p
    }

    fn chain() -> PackageSet {
        PackageSet::new(
            vec![
                pkg("app", &["lib", "MTA"]),
                pkg("lib", &["base"]),
                pkg("base", &[]),
                provides(pkg("exim", &[]), &["MTA"]),
                provides(pkg("postfix", &[]), &["MTA"]),
                pkg("unrelated", &[]),
            ],
            &ResolveConfig::default(),
        )
    }

    #[test]
    fn test_closure() {
        let set = chain();
        let config = ResolveConfig::default();
        let mut marker = Marker::new(&set, &config);

        let outcome = marker.mark(&[PkgId(0)], &mut CatalogPolicy).unwrap();
        assert_eq!(outcome.marked.len(), 4);
        assert!(marker.is_marked(PkgId(0)) && !marker.marks().is_dep_marked(PkgId(0)));
        assert!(marker.marks().is_dep_marked(PkgId(1)));
        assert!(marker.is_marked(PkgId(2)));
        // first alternative wins
        assert!(marker.is_marked(PkgId(3)));
        assert!(!marker.is_marked(PkgId(4)));
        assert!(!marker.is_marked(PkgId(5)));

        // every dependency mark is required by something marked
        for id in marker.marks().marked() {
            if marker.marks().is_dep_marked(*id) {
                assert!(
                    set.required_by(*id)
                        .iter()
                        .any(|r| marker.is_marked(*r))
                );
            }
        }
    }

    #[test]
    fn test_marking_is_idempotent() {
        let set = chain();
        let config = ResolveConfig::default();
        let mut marker = Marker::new(&set, &config);

        marker.mark(&[PkgId(0)], &mut CatalogPolicy).unwrap();
        let first = marker.marks().clone();
        let mut again = Marker::new(&set, &config);
        again.mark(&[PkgId(0)], &mut CatalogPolicy).unwrap();
        assert_eq!(&first, again.marks());
    }

    #[test]
    fn test_marked_alternative_is_not_followed() {
        let set = chain();
        let config = ResolveConfig::default();
        let mut marker = Marker::new(&set, &config);

        marker.mark(&[PkgId(4), PkgId(0)], &mut CatalogPolicy).unwrap();
        assert!(marker.is_marked(PkgId(4)));
        assert!(!marker.is_marked(PkgId(3)));
    }

    #[test]
    fn test_unresolved_strict_rolls_back() {
        let set = PackageSet::new(
            vec![pkg("app", &["lib"]), pkg("lib", &["missing"])],
            &ResolveConfig::default(),
        );
        let config = ResolveConfig::default();
        let mut marker = Marker::new(&set, &config);

        let err = marker.mark(&[PkgId(0)], &mut CatalogPolicy).unwrap_err();
        assert!(matches!(err, Error::UnresolvedRequirement { .. }));
        assert!(marker.marks().is_empty());
    }

    #[test]
    fn test_unresolved_nodeps_tolerated() {
        let set = PackageSet::new(vec![pkg("app", &["missing"])], &ResolveConfig::default());
        let config = ResolveConfig {
            nodeps: true,
            ..ResolveConfig::default()
        };
        let mut marker = Marker::new(&set, &config);

        let outcome = marker.mark(&[PkgId(0)], &mut CatalogPolicy).unwrap();
        assert_eq!(outcome.marked, vec![PkgId(0)]);
        assert_eq!(outcome.tolerated.len(), 1);
    }

    #[test]
    fn test_best_effort_drops_offender() {
        let set = PackageSet::new(
            vec![pkg("good", &[]), pkg("bad", &["missing"])],
            &ResolveConfig::default(),
        );
        let config = ResolveConfig {
            best_effort: true,
            ..ResolveConfig::default()
        };
        let mut marker = Marker::new(&set, &config);

        let outcome = marker.mark(&[PkgId(0), PkgId(1)], &mut CatalogPolicy).unwrap();
        assert_eq!(outcome.marked, vec![PkgId(0)]);
        assert_eq!(outcome.dropped, vec![PkgId(1)]);
    }

    #[test]
    fn test_in_set_conflict() {
        let set = PackageSet::new(
            vec![conflicts(pkg("a", &[]), &["b"]), pkg("b", &[])],
            &ResolveConfig::default(),
        );
        let config = ResolveConfig::default();
        let mut marker = Marker::new(&set, &config);

        let err = marker.mark(&[PkgId(1), PkgId(0)], &mut CatalogPolicy).unwrap_err();
        assert!(matches!(err, Error::InSetConflict { .. }));

        // force does not help
        let forced = ResolveConfig {
            force: true,
            ..ResolveConfig::default()
        };
        let mut marker = Marker::new(&set, &forced);
        assert!(marker.mark(&[PkgId(0), PkgId(1)], &mut CatalogPolicy).is_err());
    }

    #[test]
    fn test_in_set_conflict_best_effort_keeps_first() {
        let set = PackageSet::new(
            vec![conflicts(pkg("a", &[]), &["b"]), pkg("b", &[])],
            &ResolveConfig::default(),
        );
        let config = ResolveConfig {
            best_effort: true,
            ..ResolveConfig::default()
        };
        let mut marker = Marker::new(&set, &config);

        let outcome = marker.mark(&[PkgId(1), PkgId(0)], &mut CatalogPolicy).unwrap();
        assert_eq!(outcome.marked, vec![PkgId(1)]);
        assert_eq!(outcome.dropped, vec![PkgId(0)]);
    }

    #[test]
    fn test_no_follow() {
        let set = chain();
        let config = ResolveConfig {
            follow: false,
            ..ResolveConfig::default()
        };
        let mut marker = Marker::new(&set, &config);
        assert!(marker.mark(&[PkgId(1)], &mut CatalogPolicy).is_err());
        assert!(marker.mark(&[PkgId(2)], &mut CatalogPolicy).is_ok());
    }

    struct Everything;

    impl MarkPolicy for Everything {
        fn externally_satisfied(&mut self, _: &PackageSet, _: PkgId, _: &Capreq) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_externally_satisfied_not_followed() {
        let set = chain();
        let config = ResolveConfig::default();
        let mut marker = Marker::new(&set, &config);

        let outcome = marker.mark(&[PkgId(0)], &mut Everything).unwrap();
        assert_eq!(outcome.marked, vec![PkgId(0)]);

        let more = marker.mark_more(&[PkgId(5)], &mut Everything).unwrap();
        assert_eq!(more.marked, vec![PkgId(5)]);
        assert!(marker.marks().is_dep_marked(PkgId(5)));
    }
}
