// src/packages/capreq.rs

//! Capabilities, requirements and conflicts
//!
//! A `Capreq` is a name plus an optional versioned relation. The same type
//! is used for provided capabilities, requirements and conflicts; what it
//! means depends on which list of a package it sits in.

use crate::error::{Error, Result};
use crate::version::{Evr, rpmvercmp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Version relation of a capability or requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Relation {
    pub fn as_str(&self) -> &str {
        match self {
            Relation::Lt => "<",
            Relation::Le => "<=",
            Relation::Eq => "=",
            Relation::Ge => ">=",
            Relation::Gt => ">",
        }
    }

    /// Does the relation accept `candidate <ord> wanted`?
    pub fn accepts(&self, ord: Ordering) -> bool {
        match ord {
            Ordering::Equal => matches!(self, Relation::Le | Relation::Eq | Relation::Ge),
            Ordering::Greater => matches!(self, Relation::Gt | Relation::Ge),
            Ordering::Less => matches!(self, Relation::Lt | Relation::Le),
        }
    }

    /// Parse either an operator (`>=`) or a repodata flag (`GE`)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "<" | "LT" => Some(Relation::Lt),
            "<=" | "=<" | "LE" => Some(Relation::Le),
            "=" | "==" | "EQ" => Some(Relation::Eq),
            ">=" | "=>" | "GE" => Some(Relation::Ge),
            ">" | "GT" => Some(Relation::Gt),
            _ => None,
        }
    }
}

/// Flags carried by a capability entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapreqFlags {
    /// Requires(pre): the provider must be installed first
    pub prereq: bool,
    /// Requires(preun/postun): the provider must be removed last
    pub prereq_un: bool,
    /// Conflict entry that came from an Obsoletes tag
    pub obsoletes: bool,
    /// Conflict synthesized from a file-level clash
    pub bastard: bool,
}

/// Matching knobs for `Capreq::matches`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchFlags {
    /// A capability lacking a version the requirement names still matches
    pub promote_version: bool,
    /// Enable epoch promotion at all
    pub promote_epoch: bool,
    /// Missing requirement epoch is assumed equal (needs `promote_epoch`)
    pub promote_req_epoch: bool,
    /// Missing capability epoch is assumed equal (needs `promote_epoch`)
    pub promote_cap_epoch: bool,
}

impl MatchFlags {
    /// Exact comparison, no promotion
    pub const STRICT: MatchFlags = MatchFlags {
        promote_version: false,
        promote_epoch: false,
        promote_req_epoch: false,
        promote_cap_epoch: false,
    };

    /// Unversioned capabilities satisfy versioned requirements
    pub const LOOSE: MatchFlags = MatchFlags {
        promote_version: true,
        promote_epoch: false,
        promote_req_epoch: false,
        promote_cap_epoch: false,
    };

    pub fn strict(strict: bool) -> Self {
        if strict { Self::STRICT } else { Self::LOOSE }
    }

    /// Used for installed-store lookups, where a missing epoch in an old
    /// record is usually not a real difference
    pub fn with_cap_epoch_promotion(mut self) -> Self {
        self.promote_epoch = true;
        self.promote_cap_epoch = true;
        self
    }
}

/// A capability, requirement or conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capreq {
    pub name: String,
    pub constraint: Option<(Relation, Evr)>,
    pub flags: CapreqFlags,
}

impl Capreq {
    /// An unversioned capability
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            constraint: None,
            flags: CapreqFlags::default(),
        }
    }

    pub fn versioned(name: &str, relation: Relation, evr: Evr) -> Self {
        Self {
            name: name.to_string(),
            constraint: Some((relation, evr)),
            flags: CapreqFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: CapreqFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn prereq(mut self) -> Self {
        self.flags.prereq = true;
        self
    }

    pub fn obsoletes(mut self) -> Self {
        self.flags.obsoletes = true;
        self
    }

    pub fn is_versioned(&self) -> bool {
        self.constraint.is_some()
    }

    /// Absolute path capability, resolved through the file index
    pub fn is_file(&self) -> bool {
        self.name.starts_with('/')
    }

    /// Package-manager-internal capability, always satisfied
    pub fn is_rpmlib(&self) -> bool {
        self.name.starts_with("rpmlib(")
    }

    pub fn relation(&self) -> Option<Relation> {
        self.constraint.as_ref().map(|(rel, _)| *rel)
    }

    pub fn evr(&self) -> Option<&Evr> {
        self.constraint.as_ref().map(|(_, evr)| evr)
    }

    /// Does this capability (as provided) satisfy `req`?
    pub fn matches(&self, req: &Capreq, flags: MatchFlags) -> bool {
        if self.name != req.name {
            return false;
        }

        let (relation, want) = match &req.constraint {
            None => return true,
            Some((rel, evr)) => (*rel, evr),
        };

        // an unversioned capability has no EVR to compare against
        let have = match &self.constraint {
            Some((_, evr)) => evr,
            None => return flags.promote_version,
        };

        evr_match(have, relation, want, flags)
    }

    /// Key used for exact versioned lookups, e.g. `foo = 1:2.0-1`
    pub fn key(&self) -> String {
        self.to_string()
    }
}

/// Compare a concrete EVR against a requirement's relation and EVR
pub(crate) fn evr_match(have: &Evr, relation: Relation, want: &Evr, flags: MatchFlags) -> bool {
    let mut compared = false;
    let mut ord = Ordering::Equal;

    if have.has_epoch() || want.has_epoch() {
        let mut promote = false;
        if flags.promote_epoch {
            if !want.has_epoch() && flags.promote_req_epoch {
                promote = true;
            }
            if !have.has_epoch() && flags.promote_cap_epoch {
                promote = true;
            }
        }

        if !promote {
            ord = have.epoch_or_zero().cmp(&want.epoch_or_zero());
            if ord != Ordering::Equal {
                return relation.accepts(ord);
            }
        }
        compared = true;
    }

    if !want.version.is_empty() {
        if have.version.is_empty() {
            return flags.promote_version;
        }
        ord = rpmvercmp(&have.version, &want.version);
        if ord != Ordering::Equal {
            return relation.accepts(ord);
        }
        compared = true;
    }

    if want.has_release() {
        if !have.has_release() {
            return flags.promote_version;
        }
        let (a, b) = (
            have.release.as_deref().unwrap_or(""),
            want.release.as_deref().unwrap_or(""),
        );
        ord = rpmvercmp(a, b);
        if ord != Ordering::Equal {
            return relation.accepts(ord);
        }
        compared = true;
    }

    if compared { relation.accepts(ord) } else { true }
}

impl fmt::Display for Capreq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some((rel, evr)) = &self.constraint {
            write!(f, " {} {}", rel.as_str(), evr)?;
        }
        Ok(())
    }
}

impl FromStr for Capreq {
    type Err = Error;

    /// Parse `name`, `name >= [e:]v[-r]` or `name=1.0`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::ParseError("empty capability".to_string()));
        }

        // rpmlib(Foo) <= 1.0 and paths never contain an operator
        let op_start = s.find(['<', '>', '=']);
        let Some(pos) = op_start else {
            return Ok(Capreq::new(s));
        };

        let name = s[..pos].trim();
        let rest = &s[pos..];
        let op_len = rest
            .find(|c: char| !matches!(c, '<' | '>' | '='))
            .unwrap_or(rest.len());
        let relation = Relation::parse(&rest[..op_len]).ok_or_else(|| {
            Error::ParseError(format!("invalid relation in capability '{}'", s))
        })?;
        let evr = rest[op_len..].trim();

        if name.is_empty() || evr.is_empty() {
            return Err(Error::ParseError(format!("invalid capability '{}'", s)));
        }

        Ok(Capreq::versioned(name, relation, Evr::parse(evr)?))
    }
}
