// src/repository/parsers/mod.rs

//! Catalog metadata parsers
//!
//! This module provides parsers for the catalog formats the loader accepts:
//! - RPM repodata: primary.xml (plain, .gz or .zst)
//! - JSON: an array of package records

pub mod json;
pub mod primary;

use crate::error::Result;
use crate::packages::Package;

/// Catalog metadata parser trait
pub trait CatalogParser {
    /// Parse decompressed catalog content into package records
    ///
    /// Records come back with their self-capability stripped from the
    /// provides list and without a record id.
    fn parse_catalog(&self, content: &str) -> Result<Vec<Package>>;
}

pub use json::{CatalogRecord, JsonCatalogParser};
pub use primary::PrimaryXmlParser;
