// src/packages/mod.rs

//! Package records and package format readers
//!
//! `Package` is the shape every loader produces: catalog loaders, the RPM
//! header reader and the installed store all hand the resolver the same
//! record, installed ones additionally carrying their record id.

pub mod capreq;
pub mod rpm;
pub mod traits;

pub use capreq::{Capreq, CapreqFlags, MatchFlags, Relation};
pub use traits::PackageFormat;

use crate::version::Evr;
use std::cmp::Ordering;
use std::fmt;

/// Stable handle of a package inside a `PackageSet`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PkgId(pub(crate) usize);

impl PkgId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PkgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A file shipped by a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub path: String,
    pub size: i64,
    pub mode: u32,
    pub link_to: Option<String>,
}

impl PackageFile {
    pub fn new(path: &str, size: i64, mode: u32) -> Self {
        Self {
            path: path.to_string(),
            size,
            mode,
            link_to: None,
        }
    }

    /// Split into (directory, basename); `/foo` lives in `/`
    pub fn split(&self) -> (&str, &str) {
        split_path(&self.path)
    }

    /// Same content as far as package metadata can tell
    pub fn same_metadata(&self, other: &PackageFile) -> bool {
        self.mode == other.mode && self.size == other.size && self.link_to == other.link_to
    }
}

pub(crate) fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("", path),
    }
}

/// A binary package
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub evr: Evr,
    pub arch: Option<String>,
    /// Multilib color; 0 means colorless (compatible with everything)
    pub color: u32,
    /// Ordering priority, lower sorts first
    pub priority: i32,
    /// Record id in the installed store
    pub recno: Option<i64>,
    pub summary: Option<String>,
    pub provides: Vec<Capreq>,
    pub requires: Vec<Capreq>,
    /// Conflicts and obsoletes (the latter flagged)
    pub conflicts: Vec<Capreq>,
    pub files: Vec<PackageFile>,
}

impl Package {
    pub fn new(name: &str, evr: Evr) -> Self {
        Self {
            name: name.to_string(),
            evr,
            arch: None,
            color: 0,
            priority: 0,
            recno: None,
            summary: None,
            provides: Vec::new(),
            requires: Vec::new(),
            conflicts: Vec::new(),
            files: Vec::new(),
        }
    }

    /// The implicit `name = evr` capability every package provides
    pub fn self_cap(&self) -> Capreq {
        Capreq::versioned(&self.name, Relation::Eq, self.evr.clone())
    }

    /// Drop explicit copies of the self-capability from the provides list
    ///
    /// RPM headers list `name = evr` among the provides; the index adds it
    /// implicitly, and listing it again would show it as a real provide.
    pub fn strip_self_cap(&mut self) {
        let name = self.name.clone();
        let evr = self.evr.clone();
        self.provides.retain(|cap| {
            !(cap.name == name && matches!(&cap.constraint, Some((Relation::Eq, e)) if *e == evr))
        });
    }

    /// `name-[epoch:]version-release[.arch]`
    pub fn nevra(&self) -> String {
        match &self.arch {
            Some(arch) => format!("{}-{}.{}", self.name, self.evr, arch),
            None => format!("{}-{}", self.name, self.evr),
        }
    }

    /// Name ascending, then newest first
    pub fn cmp_name_evr_rev(&self, other: &Package) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| other.evr.cmp(&self.evr))
    }

    /// Priority, then name ascending, then newest first
    pub fn cmp_pri_name_evr_rev(&self, other: &Package) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.cmp_name_evr_rev(other))
    }

    /// Same identity (name, EVR, arch)
    pub fn same_nevra(&self, other: &Package) -> bool {
        self.name == other.name && self.evr == other.evr && self.arch == other.arch
    }

    /// Multilib compatibility: colors overlap, or either side is colorless
    pub fn is_colored_like(&self, other: &Package) -> bool {
        self.color == 0 || other.color == 0 || (self.color & other.color) != 0
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    /// Match `req` against the package's own name and EVR
    pub fn evr_matches(&self, req: &Capreq, flags: MatchFlags) -> bool {
        if req.name != self.name {
            return false;
        }
        let Some((relation, want)) = &req.constraint else {
            return true;
        };

        // rpm promotes the requirement's epoch only
        let own = MatchFlags {
            promote_epoch: flags.promote_epoch,
            promote_req_epoch: flags.promote_epoch,
            ..MatchFlags::STRICT
        };
        if capreq::evr_match(&self.evr, *relation, want, own) {
            return true;
        }
        if (flags.promote_version || flags.promote_epoch) && self.evr.has_epoch() {
            let promoted = MatchFlags {
                promote_epoch: true,
                promote_req_epoch: true,
                ..MatchFlags::STRICT
            };
            return capreq::evr_match(&self.evr, *relation, want, promoted);
        }
        false
    }

    /// Match `req` against the provides only
    pub fn caps_match(&self, req: &Capreq, flags: MatchFlags) -> bool {
        self.provides.iter().any(|cap| cap.matches(req, flags))
    }

    /// Match `req` by name/EVR first, then by provides
    pub fn matches_req(&self, req: &Capreq, flags: MatchFlags) -> bool {
        if self.name == req.name && self.evr_matches(req, flags) {
            return true;
        }
        self.caps_match(req, flags)
    }

    /// Does the package satisfy `req`; file requirements look at files
    pub fn satisfies(&self, req: &Capreq, flags: MatchFlags) -> bool {
        if req.is_file() && self.has_file(&req.name) {
            return true;
        }
        self.matches_req(req, flags)
    }

    /// Requirements of this package that `cap` would satisfy
    pub fn requirements_on<'a>(
        &'a self,
        cap: &'a Capreq,
        strict: bool,
    ) -> impl Iterator<Item = &'a Capreq> + 'a {
        self.requires.iter().filter(move |req| {
            if req.name != cap.name {
                return false;
            }
            if !strict || !cap.is_versioned() {
                return true;
            }
            // a versioned capability only counts for a matching requirement
            req.is_versioned() && cap.matches(req, MatchFlags::STRICT)
        })
    }

    /// Obsoletes-flagged conflicts
    pub fn obsoletes(&self) -> impl Iterator<Item = &Capreq> {
        self.conflicts.iter().filter(|c| c.flags.obsoletes)
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nevra())
    }
}
