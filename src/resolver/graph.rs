// src/resolver/graph.rs

//! Package graph
//!
//! A `PackageSet` owns the catalog packages in an arena and, for every
//! package, its resolved requirement edges, reverse edges, conflict edges
//! and unresolved requirements. Edges are resolved once, when the set is
//! built; everything downstream (marking, ordering, queries) reads them.

use crate::config::ResolveConfig;
use crate::error::{Error, Result};
use crate::packages::{Capreq, MatchFlags, Package, PkgId};
use crate::resolver::capindex::CapIndex;
use crate::resolver::fileindex::{FileConflict, FileIndex};
use crate::version::Evr;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Resolved target of a requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edge {
    Single(PkgId),
    /// Several alternative providers, best first
    AnyOf(Vec<PkgId>),
}

impl Edge {
    fn from_candidates(mut candidates: Vec<PkgId>) -> Option<Self> {
        match candidates.len() {
            0 => None,
            1 => candidates.pop().map(Edge::Single),
            _ => Some(Edge::AnyOf(candidates)),
        }
    }

    pub fn targets(&self) -> &[PkgId] {
        match self {
            Edge::Single(id) => std::slice::from_ref(id),
            Edge::AnyOf(ids) => ids,
        }
    }

    pub fn contains(&self, id: PkgId) -> bool {
        self.targets().contains(&id)
    }
}

/// A requirement edge; requirements resolving to the same providers share one
#[derive(Debug, Clone)]
pub struct ReqEdge {
    pub target: Edge,
    /// Some requirement on this edge is Requires(pre)
    pub prereq: bool,
    /// Some requirement on this edge is Requires(preun/postun)
    pub prereq_un: bool,
    pub reqs: Vec<Capreq>,
}

/// A conflict edge from the declaring package to `pkg`
#[derive(Debug, Clone)]
pub struct CnflEdge {
    pub pkg: PkgId,
    pub obsoletes: bool,
    /// Synthesized by the file-conflict scan
    pub file: bool,
    /// The conflict capability, or the clashing path
    pub cause: String,
}

/// The catalog arena with its indexes and resolved edges
#[derive(Debug)]
pub struct PackageSet {
    packages: Vec<Package>,
    caps: CapIndex,
    files: FileIndex,
    reqs: Vec<Vec<ReqEdge>>,
    revreqs: Vec<Vec<PkgId>>,
    cnfls: Vec<Vec<CnflEdge>>,
    revcnfls: Vec<Vec<PkgId>>,
    unresolved: Vec<Vec<Capreq>>,
    file_conflicts: Vec<FileConflict>,
    flags: MatchFlags,
}

impl PackageSet {
    /// Index `packages` and resolve every requirement and conflict
    pub fn new(packages: Vec<Package>, config: &ResolveConfig) -> Self {
        let n = packages.len();
        let mut set = Self {
            packages,
            caps: CapIndex::new(),
            files: FileIndex::new(),
            reqs: vec![Vec::new(); n],
            revreqs: vec![Vec::new(); n],
            cnfls: vec![Vec::new(); n],
            revcnfls: vec![Vec::new(); n],
            unresolved: vec![Vec::new(); n],
            file_conflicts: Vec::new(),
            flags: config.match_flags(),
        };

        for (i, pkg) in set.packages.iter().enumerate() {
            set.caps.index(PkgId(i), pkg);
            set.files.index(PkgId(i), pkg);
        }
        set.files.setup();

        set.resolve_requirements();
        set.resolve_conflicts();
        if config.file_conflicts {
            set.scan_file_conflicts();
        }

        let nunresolved: usize = set.unresolved.iter().map(Vec::len).sum();
        info!(
            "Package set: {} packages, {} unresolved requirements, {} file conflicts",
            n,
            nunresolved,
            set.file_conflicts.len()
        );
        set
    }

    fn resolve_requirements(&mut self) {
        for i in 0..self.packages.len() {
            let id = PkgId(i);
            let mut edges: Vec<ReqEdge> = Vec::new();
            let mut unresolved = Vec::new();

            for req in &self.packages[i].requires {
                if req.is_rpmlib() || self.packages[i].satisfies(req, self.flags) {
                    continue;
                }

                let mut candidates = self.lookup(req);
                candidates.retain(|c| *c != id);

                let Some(target) = Edge::from_candidates(candidates) else {
                    debug!("{}: unresolved requirement {}", self.packages[i], req);
                    unresolved.push(req.clone());
                    continue;
                };

                match edges.iter_mut().find(|e| e.target == target) {
                    Some(edge) => {
                        edge.prereq |= req.flags.prereq;
                        edge.prereq_un |= req.flags.prereq_un;
                        edge.reqs.push(req.clone());
                    }
                    None => edges.push(ReqEdge {
                        target,
                        prereq: req.flags.prereq,
                        prereq_un: req.flags.prereq_un,
                        reqs: vec![req.clone()],
                    }),
                }
            }

            for edge in &edges {
                for target in edge.target.targets() {
                    let rev = &mut self.revreqs[target.index()];
                    if !rev.contains(&id) {
                        rev.push(id);
                    }
                }
            }
            self.reqs[i] = edges;
            self.unresolved[i] = unresolved;
        }
    }

    fn resolve_conflicts(&mut self) {
        for i in 0..self.packages.len() {
            let id = PkgId(i);
            let pkg = &self.packages[i];
            let mut edges: Vec<CnflEdge> = Vec::new();

            for cnfl in &pkg.conflicts {
                for other in self.caps.lookup(cnfl, self.flags) {
                    if other == id {
                        continue;
                    }
                    let target = &self.packages[other.index()];
                    // the same build for another arch is not a conflict
                    if target.name == pkg.name && target.evr == pkg.evr {
                        continue;
                    }
                    if cnfl.flags.bastard && target.name != pkg.name {
                        continue;
                    }

                    match edges.iter_mut().find(|e| e.pkg == other) {
                        Some(edge) => edge.obsoletes |= cnfl.flags.obsoletes,
                        None => edges.push(CnflEdge {
                            pkg: other,
                            obsoletes: cnfl.flags.obsoletes,
                            file: false,
                            cause: cnfl.to_string(),
                        }),
                    }
                }
            }

            for edge in &edges {
                self.revcnfls[edge.pkg.index()].push(id);
            }
            self.cnfls[i] = edges;
        }
    }

    fn scan_file_conflicts(&mut self) {
        let found = {
            let cnfls = &self.cnfls;
            let packages = &self.packages;
            let declared = |a: PkgId, b: PkgId| {
                let by_edge = cnfls[a.index()].iter().any(|e| e.pkg == b)
                    || cnfls[b.index()].iter().any(|e| e.pkg == a);
                let (pa, pb) = (&packages[a.index()], &packages[b.index()]);
                by_edge
                    || pa.conflicts.iter().any(|c| c.name == pb.name)
                    || pb.conflicts.iter().any(|c| c.name == pa.name)
            };
            self.files.find_conflicts(&self.packages, declared)
        };

        for conflict in &found {
            for (from, to) in [
                (conflict.first, conflict.second),
                (conflict.second, conflict.first),
            ] {
                let edges = &mut self.cnfls[from.index()];
                if edges.iter().any(|e| e.pkg == to) {
                    continue;
                }
                edges.push(CnflEdge {
                    pkg: to,
                    obsoletes: false,
                    file: true,
                    cause: conflict.path.clone(),
                });
                self.revcnfls[to.index()].push(from);
            }
        }
        self.file_conflicts = found;
    }

    pub fn package(&self, id: PkgId) -> &Package {
        &self.packages[id.index()]
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PkgId> + '_ {
        (0..self.packages.len()).map(PkgId)
    }

    pub fn match_flags(&self) -> MatchFlags {
        self.flags
    }

    /// Sort handles by name ascending, newest first
    pub fn sort_ids(&self, ids: &mut [PkgId]) {
        ids.sort_by(|a, b| self.cmp_ids(*a, *b));
    }

    fn cmp_ids(&self, a: PkgId, b: PkgId) -> Ordering {
        self.package(a)
            .cmp_name_evr_rev(self.package(b))
            .then(a.cmp(&b))
    }

    /// All versions of `name`, newest first
    pub fn find_by_name(&self, name: &str) -> Vec<PkgId> {
        let mut ids: Vec<PkgId> = self
            .ids()
            .filter(|id| self.package(*id).name == name)
            .collect();
        self.sort_ids(&mut ids);
        ids
    }

    /// Providers of `req`, sorted by name then newest first
    pub fn lookup(&self, req: &Capreq) -> Vec<PkgId> {
        let mut ids = self.caps.lookup(req, self.flags);
        if req.is_file() {
            for id in self.files.lookup_path(&req.name) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        self.sort_ids(&mut ids);
        ids
    }

    /// Owners of exactly `path`
    pub fn lookup_path(&self, path: &str) -> Vec<PkgId> {
        let mut ids = self.files.lookup_path(path);
        self.sort_ids(&mut ids);
        ids
    }

    /// Every package providing a capability called `name`
    pub fn providers(&self, name: &str) -> Vec<PkgId> {
        let mut ids = self.caps.providers(name);
        self.sort_ids(&mut ids);
        ids.dedup();
        ids
    }

    /// Packages whose name matches the shell glob `pattern`
    pub fn search(&self, pattern: &str) -> Result<Vec<PkgId>> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| Error::ParseError(format!("invalid pattern '{}': {}", pattern, e)))?;
        let mut ids: Vec<PkgId> = self
            .ids()
            .filter(|id| pattern.matches(&self.package(*id).name))
            .collect();
        self.sort_ids(&mut ids);
        Ok(ids)
    }

    pub fn requirements(&self, id: PkgId) -> &[ReqEdge] {
        &self.reqs[id.index()]
    }

    /// Packages with a requirement edge to `id`
    pub fn required_by(&self, id: PkgId) -> &[PkgId] {
        &self.revreqs[id.index()]
    }

    /// Conflicts declared by `id` (plus synthesized file conflicts)
    pub fn conflicts(&self, id: PkgId) -> &[CnflEdge] {
        &self.cnfls[id.index()]
    }

    /// Packages whose conflict edges point at `id`
    pub fn conflicted_by(&self, id: PkgId) -> &[PkgId] {
        &self.revcnfls[id.index()]
    }

    /// The edge through which `a` conflicts with `b`, if any
    pub fn conflict_between(&self, a: PkgId, b: PkgId) -> Option<&CnflEdge> {
        self.cnfls[a.index()].iter().find(|e| e.pkg == b)
    }

    /// Requirements no package in the set provides
    pub fn unresolved(&self, id: PkgId) -> &[Capreq] {
        &self.unresolved[id.index()]
    }

    pub fn has_bad_reqs(&self, id: PkgId) -> bool {
        !self.unresolved[id.index()].is_empty()
    }

    pub fn file_conflicts(&self) -> &[FileConflict] {
        &self.file_conflicts
    }

    /// Resolve selection masks to handles
    ///
    /// A mask is a name or shell glob (newest version of each matching
    /// name), or `name#[epoch:]version[-release]` for an exact version.
    pub fn select(&self, masks: &[String]) -> Result<Vec<PkgId>> {
        let mut selected = Vec::new();

        for mask in masks {
            let found = match mask.split_once('#') {
                Some((name, evr)) => {
                    let want = Evr::parse(evr)?;
                    self.find_by_name(name)
                        .into_iter()
                        .filter(|id| evr_selects(&self.package(*id).evr, &want))
                        .take(1)
                        .collect::<Vec<_>>()
                }
                None => {
                    let mut newest: Vec<PkgId> = Vec::new();
                    for id in self.search(mask)? {
                        let name = &self.package(id).name;
                        // search output is newest first within a name
                        if !newest.iter().any(|n| &self.package(*n).name == name) {
                            newest.push(id);
                        }
                    }
                    newest
                }
            };

            if found.is_empty() {
                return Err(Error::NoSuchPackage(mask.clone()));
            }
            for id in found {
                if !selected.contains(&id) {
                    selected.push(id);
                }
            }
        }

        Ok(selected)
    }
}

/// Does `have` match a user-typed version: parts the user left out match
/// anything
pub(crate) fn evr_selects(have: &Evr, want: &Evr) -> bool {
    if want.epoch.is_some() && have.epoch_or_zero() != want.epoch_or_zero() {
        return false;
    }
    if crate::version::rpmvercmp(&have.version, &want.version) != Ordering::Equal {
        return false;
    }
    match (&want.release, &have.release) {
        (Some(w), Some(h)) => crate::version::rpmvercmp(h, w) == Ordering::Equal,
        (Some(_), None) => false,
        (None, _) => true,
    }
}
