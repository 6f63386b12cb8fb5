// src/resolver/plan.rs

//! Resolution results

use crate::error::Error;
use crate::packages::{Package, PkgId};
use crate::resolver::fileindex::FileConflict;
use crate::resolver::graph::PackageSet;

/// What an installation request turns into
#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
    /// Catalog packages to install, in transaction order
    pub install: Vec<PkgId>,
    /// Installed packages to remove
    pub uninstall: Vec<Package>,
    /// Installed instances that stay although a newer one comes in
    pub superseded: Vec<Package>,
    /// Packages pulled in as dependencies
    pub dep_marked: Vec<PkgId>,
    /// Selected packages left out because they are already installed
    pub skipped: Vec<PkgId>,
    /// Packages excluded in best-effort mode
    pub dropped: Vec<PkgId>,
    /// Errors tolerated by `nodeps` or `force`
    pub tolerated: Vec<String>,
    pub cycle_count: u32,
    pub cycles: Vec<Vec<PkgId>>,
    /// File conflicts among the packages to install
    pub file_conflicts: Vec<FileConflict>,
    /// Resolution was cancelled; the plan holds what was decided so far
    pub interrupted: bool,
}

impl InstallPlan {
    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.uninstall.is_empty()
    }

    /// The packages to install, in transaction order
    pub fn install_packages<'s>(&self, set: &'s PackageSet) -> Vec<&'s Package> {
        self.install.iter().map(|id| set.package(*id)).collect()
    }

    /// Prerequisite loops as errors, for callers that treat them as fatal
    pub fn cycle_errors(&self, set: &PackageSet) -> Vec<Error> {
        cycle_errors(set, &self.cycles)
    }
}

/// What a removal request turns into
#[derive(Debug, Clone, Default)]
pub struct UninstallPlan {
    /// Installed packages to remove, dependents first
    pub uninstall: Vec<Package>,
    /// Record ids removed because something else was
    pub dep_marked: Vec<i64>,
    pub tolerated: Vec<String>,
    pub cycle_count: u32,
    pub interrupted: bool,
}

pub(crate) fn cycle_errors(set: &PackageSet, cycles: &[Vec<PkgId>]) -> Vec<Error> {
    cycles
        .iter()
        .filter_map(|members| {
            let first = members.first()?;
            let names: Vec<&str> = members
                .iter()
                .chain(std::iter::once(first))
                .map(|id| set.package(*id).name.as_str())
                .collect();
            Some(Error::OrderingCycle {
                package: set.package(*first).nevra(),
                cycle: names.join(" <- "),
            })
        })
        .collect()
}
