// src/repository/parsers/json.rs

//! JSON catalog parser
//!
//! A JSON catalog is an array of package records. Capabilities are written
//! the way RPM prints them (`"glibc >= 2.34"`); prerequisites get
//! their own list.
//!
//! ```json
//! [{"name": "foo", "version": "1.0", "release": "1", "arch": "x86_64",
//!   "provides": ["libfoo.so.1"], "requires": ["bar >= 2"],
//!   "prereqs": ["/bin/sh"], "obsoletes": ["oldfoo < 1.0"],
//!   "files": [{"path": "/usr/bin/foo", "size": 1024, "mode": 33261}]}]
//! ```

use super::CatalogParser;
use crate::error::{Error, Result};
use crate::packages::{Capreq, Package, PackageFile};
use crate::version::Evr;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One package in a JSON catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogRecord {
    pub name: String,
    pub epoch: Option<u32>,
    pub version: String,
    pub release: Option<String>,
    pub arch: Option<String>,
    pub color: u32,
    pub priority: i32,
    pub summary: Option<String>,
    pub provides: Vec<String>,
    pub requires: Vec<String>,
    /// Requirements that must be installed before this package
    pub prereqs: Vec<String>,
    /// Requirements only needed by the removal scripts
    pub prereqs_un: Vec<String>,
    pub conflicts: Vec<String>,
    pub obsoletes: Vec<String>,
    pub files: Vec<FileRecord>,
}

/// One file of a `CatalogRecord`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRecord {
    pub path: String,
    pub size: i64,
    pub mode: u32,
    pub link_to: Option<String>,
}

fn parse_caps(list: &[String], pkg: &str) -> Result<Vec<Capreq>> {
    list.iter()
        .map(|s| {
            s.parse::<Capreq>()
                .map_err(|e| Error::ParseError(format!("{}: {}", pkg, e)))
        })
        .collect()
}

fn cap_strings<'a>(caps: impl Iterator<Item = &'a Capreq>) -> Vec<String> {
    caps.map(|c| c.to_string()).collect()
}

impl CatalogRecord {
    /// Convert into the record the resolver works on
    pub fn into_package(self) -> Result<Package> {
        if self.name.is_empty() || self.version.is_empty() {
            return Err(Error::ParseError(format!(
                "catalog record needs name and version (got '{}' '{}')",
                self.name, self.version
            )));
        }

        let evr = Evr::new(self.epoch, &self.version, self.release.as_deref());
        let mut pkg = Package::new(&self.name, evr);
        pkg.arch = self.arch;
        pkg.color = self.color;
        pkg.priority = self.priority;
        pkg.summary = self.summary;

        pkg.provides = parse_caps(&self.provides, &self.name)?;
        pkg.requires = parse_caps(&self.requires, &self.name)?;
        for req in parse_caps(&self.prereqs, &self.name)? {
            pkg.requires.push(req.prereq());
        }
        for mut req in parse_caps(&self.prereqs_un, &self.name)? {
            req.flags.prereq_un = true;
            pkg.requires.push(req);
        }
        pkg.conflicts = parse_caps(&self.conflicts, &self.name)?;
        for obsolete in parse_caps(&self.obsoletes, &self.name)? {
            pkg.conflicts.push(obsolete.obsoletes());
        }

        pkg.files = self
            .files
            .into_iter()
            .map(|f| PackageFile {
                path: f.path,
                size: f.size,
                mode: f.mode,
                link_to: f.link_to,
            })
            .collect();

        pkg.strip_self_cap();
        Ok(pkg)
    }

    /// Record describing `pkg`; inverse of `into_package`
    pub fn from_package(pkg: &Package) -> Self {
        Self {
            name: pkg.name.clone(),
            epoch: pkg.evr.epoch,
            version: pkg.evr.version.clone(),
            release: pkg.evr.release.clone(),
            arch: pkg.arch.clone(),
            color: pkg.color,
            priority: pkg.priority,
            summary: pkg.summary.clone(),
            provides: cap_strings(pkg.provides.iter()),
            requires: cap_strings(
                pkg.requires
                    .iter()
                    .filter(|r| !r.flags.prereq && !r.flags.prereq_un),
            ),
            prereqs: cap_strings(pkg.requires.iter().filter(|r| r.flags.prereq)),
            prereqs_un: cap_strings(
                pkg.requires
                    .iter()
                    .filter(|r| !r.flags.prereq && r.flags.prereq_un),
            ),
            conflicts: cap_strings(pkg.conflicts.iter().filter(|c| !c.flags.obsoletes)),
            obsoletes: cap_strings(pkg.obsoletes()),
            files: pkg
                .files
                .iter()
                .map(|f| FileRecord {
                    path: f.path.clone(),
                    size: f.size,
                    mode: f.mode,
                    link_to: f.link_to.clone(),
                })
                .collect(),
        }
    }
}

/// JSON catalog parser
#[derive(Debug, Default)]
pub struct JsonCatalogParser;

impl CatalogParser for JsonCatalogParser {
    fn parse_catalog(&self, content: &str) -> Result<Vec<Package>> {
        let records: Vec<CatalogRecord> = serde_json::from_str(content)
            .map_err(|e| Error::ParseError(format!("Invalid JSON catalog: {}", e)))?;

        let packages = records
            .into_iter()
            .map(CatalogRecord::into_package)
            .collect::<Result<Vec<_>>>()?;

        debug!("Parsed {} packages from JSON catalog", packages.len());
        Ok(packages)
    }
}
