// src/packages/rpm.rs

//! RPM package header reader

use crate::error::{Error, Result};
use crate::packages::capreq::{Capreq, CapreqFlags, Relation};
use crate::packages::traits::PackageFormat;
use crate::packages::{Package, PackageFile};
use crate::version::Evr;
use rpm::{DependencyFlags, Package as RpmFile};
use std::fs::File;
use std::io::BufReader;
use tracing::debug;

/// Metadata read from an RPM header
pub struct RpmPackage {
    name: String,
    evr: Evr,
    architecture: Option<String>,
    summary: Option<String>,
    provides: Vec<Capreq>,
    requires: Vec<Capreq>,
    conflicts: Vec<Capreq>,
    files: Vec<PackageFile>,
}

impl RpmPackage {
    /// Extract file list from RPM package with detailed metadata
    fn extract_files(pkg: &RpmFile) -> Vec<PackageFile> {
        let mut files = Vec::new();

        if let Ok(file_entries) = pkg.metadata.get_file_entries() {
            for entry in file_entries {
                files.push(PackageFile::new(
                    &entry.path.to_string_lossy(),
                    entry.size as i64,
                    entry.mode.raw_mode() as u32,
                ));
            }
        }

        files
    }

    /// Convert an rpm dependency entry into a capability
    fn convert_dependency(dep: &rpm::Dependency) -> Result<Capreq> {
        let flags = dep.flags;
        let relation = match (
            flags.contains(DependencyFlags::LESS),
            flags.contains(DependencyFlags::EQUAL),
            flags.contains(DependencyFlags::GREATER),
        ) {
            (true, true, _) => Some(Relation::Le),
            (true, false, _) => Some(Relation::Lt),
            (_, true, true) => Some(Relation::Ge),
            (false, false, true) => Some(Relation::Gt),
            (false, true, false) => Some(Relation::Eq),
            _ => None,
        };

        let mut cap = match relation {
            Some(rel) if !dep.version.is_empty() => {
                Capreq::versioned(&dep.name, rel, Evr::parse(&dep.version)?)
            }
            _ => Capreq::new(&dep.name),
        };

        cap.flags = CapreqFlags {
            prereq: flags.contains(DependencyFlags::PREREQ)
                || flags.contains(DependencyFlags::SCRIPT_PRE)
                || flags.contains(DependencyFlags::SCRIPT_POST),
            prereq_un: flags.contains(DependencyFlags::SCRIPT_PREUN)
                || flags.contains(DependencyFlags::SCRIPT_POSTUN),
            ..CapreqFlags::default()
        };

        Ok(cap)
    }

    fn convert_all(deps: Vec<rpm::Dependency>) -> Result<Vec<Capreq>> {
        deps.iter().map(Self::convert_dependency).collect()
    }
}

impl PackageFormat for RpmPackage {
    fn parse(path: &str) -> Result<Self> {
        debug!("Parsing RPM package: {}", path);

        let file = File::open(path)
            .map_err(|e| Error::InitError(format!("Failed to open RPM file: {}", e)))?;

        let mut buf_reader = BufReader::new(file);

        let pkg = RpmFile::parse(&mut buf_reader)
            .map_err(|e| Error::ParseError(format!("Failed to parse RPM: {}", e)))?;

        let meta = &pkg.metadata;
        let name = meta
            .get_name()
            .map_err(|e| Error::ParseError(format!("Failed to get package name: {}", e)))?
            .to_string();
        let version = meta
            .get_version()
            .map_err(|e| Error::ParseError(format!("Failed to get package version: {}", e)))?;
        let release = meta
            .get_release()
            .map_err(|e| Error::ParseError(format!("Failed to get package release: {}", e)))?;
        let epoch = meta.get_epoch().ok();

        let architecture = meta.get_arch().ok().map(|s| s.to_string());
        let summary = meta.get_summary().ok().map(|s| s.to_string());

        let parse_err = |what: &str, e: rpm::Error| {
            Error::ParseError(format!("Failed to read {} of {}: {}", what, name, e))
        };
        let provides = Self::convert_all(meta.get_provides().map_err(|e| parse_err("provides", e))?)?;
        let requires = Self::convert_all(meta.get_requires().map_err(|e| parse_err("requires", e))?)?;
        let mut conflicts =
            Self::convert_all(meta.get_conflicts().map_err(|e| parse_err("conflicts", e))?)?;
        for mut obsolete in
            Self::convert_all(meta.get_obsoletes().map_err(|e| parse_err("obsoletes", e))?)?
        {
            obsolete.flags.obsoletes = true;
            conflicts.push(obsolete);
        }

        let files = Self::extract_files(&pkg);

        debug!(
            "Parsed RPM: {} {}-{} ({} files, {} requirements)",
            name,
            version,
            release,
            files.len(),
            requires.len()
        );

        Ok(Self {
            evr: Evr::new(epoch, version, Some(release)),
            name,
            architecture,
            summary,
            provides,
            requires,
            conflicts,
            files,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> String {
        self.evr.to_string()
    }

    fn architecture(&self) -> Option<&str> {
        self.architecture.as_deref()
    }

    fn to_package(&self) -> Package {
        let mut pkg = Package::new(&self.name, self.evr.clone());
        pkg.arch = self.architecture.clone();
        pkg.summary = self.summary.clone();
        pkg.provides = self.provides.clone();
        pkg.requires = self.requires.clone();
        pkg.conflicts = self.conflicts.clone();
        pkg.files = self.files.clone();
        pkg.strip_self_cap();
        pkg
    }
}
