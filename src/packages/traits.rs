// src/packages/traits.rs

//! Common traits for package format readers

use crate::error::Result;
use crate::packages::Package;

/// Common interface for binary package readers
pub trait PackageFormat {
    /// Parse a package file from the given path
    fn parse(path: &str) -> Result<Self>
    where
        Self: Sized;

    /// Get the package name
    fn name(&self) -> &str;

    /// Get the package version as `[epoch:]version-release`
    fn version(&self) -> String;

    /// Get the package architecture (e.g., "x86_64", "noarch")
    fn architecture(&self) -> Option<&str>;

    /// Convert into the record the resolver works on
    fn to_package(&self) -> Package;
}
