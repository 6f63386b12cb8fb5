// src/repository/mod.rs

//! Catalog loading
//!
//! This module turns local catalog files into package records:
//! - RPM repodata `primary.xml`, plain or compressed (.gz, .zst)
//! - A repository directory, resolved through `repodata/repomd.xml`
//! - JSON catalogs (arrays of `CatalogRecord`)
//! - Single `.rpm` files, read through their header

pub mod parsers;

use crate::error::{Error, Result};
use crate::packages::{Package, PackageFormat, rpm::RpmPackage};
use flate2::read::GzDecoder;
use parsers::{CatalogParser, JsonCatalogParser, PrimaryXmlParser};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Compression of a catalog file, from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => Compression::Gzip,
            Some("zst") => Compression::Zstd,
            _ => Compression::None,
        }
    }
}

/// Load every package of the catalog at `path`
///
/// `path` may be a repository directory, a primary.xml (optionally
/// compressed), a JSON catalog or a single `.rpm` file.
pub fn load_catalog(path: &Path) -> Result<Vec<Package>> {
    if path.is_dir() {
        let primary = primary_location(path)?;
        return load_catalog(&primary);
    }

    if path.extension().and_then(|e| e.to_str()) == Some("rpm") {
        let path_str = path
            .to_str()
            .ok_or_else(|| Error::ParseError(format!("Non UTF-8 path: {}", path.display())))?;
        let rpm = RpmPackage::parse(path_str)?;
        return Ok(vec![rpm.to_package()]);
    }

    let content = read_catalog(path)?;
    let packages = if is_json(path, &content) {
        JsonCatalogParser.parse_catalog(&content)?
    } else {
        PrimaryXmlParser::new().parse_catalog(&content)?
    };

    info!("Loaded {} packages from {}", packages.len(), path.display());
    Ok(packages)
}

/// Read and decompress a catalog file
pub fn read_catalog(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| io_context(e, path))?;

    let content = match Compression::from_path(path) {
        Compression::Zstd => {
            debug!("Decompressing zstd-compressed {}", path.display());
            let decompressed = zstd::decode_all(bytes.as_slice()).map_err(|e| {
                Error::ParseError(format!("Failed to decompress {}: {}", path.display(), e))
            })?;
            String::from_utf8(decompressed).map_err(|e| {
                Error::ParseError(format!("Invalid UTF-8 in {}: {}", path.display(), e))
            })?
        }
        Compression::Gzip => {
            debug!("Decompressing gzip-compressed {}", path.display());
            let mut gz = GzDecoder::new(bytes.as_slice());
            let mut decompressed = String::new();
            gz.read_to_string(&mut decompressed).map_err(|e| {
                Error::ParseError(format!("Failed to decompress {}: {}", path.display(), e))
            })?;
            decompressed
        }
        Compression::None => String::from_utf8(bytes).map_err(|e| {
            Error::ParseError(format!("Invalid UTF-8 in {}: {}", path.display(), e))
        })?,
    };

    debug!("Read catalog {}: {} bytes", path.display(), content.len());
    Ok(content)
}

fn io_context(e: std::io::Error, path: &Path) -> Error {
    Error::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
}

fn is_json(path: &Path, content: &str) -> bool {
    let stem = match Compression::from_path(path) {
        Compression::None => path.to_path_buf(),
        _ => path.with_extension(""),
    };
    stem.extension().and_then(|e| e.to_str()) == Some("json")
        || content.trim_start().starts_with('[')
}

/// Find the primary.xml of the repository at `repo_dir` via repomd.xml
pub fn primary_location(repo_dir: &Path) -> Result<PathBuf> {
    let repomd_path = repo_dir.join("repodata").join("repomd.xml");
    debug!("Reading {}", repomd_path.display());

    let xml_content = fs::read_to_string(&repomd_path).map_err(|e| io_context(e, &repomd_path))?;

    let href = primary_href(&xml_content)?;
    Ok(repo_dir.join(href))
}

/// The `location href` of the `primary` data entry of a repomd.xml
fn primary_href(xml_content: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_primary = false;
    let mut location = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"data" => {
                in_primary = e
                    .attributes()
                    .filter_map(|a| a.ok())
                    .any(|a| a.key.as_ref() == b"type" && a.value.as_ref() == b"primary");
            }
            Ok(Event::Start(e) | Event::Empty(e))
                if in_primary && e.name().as_ref() == b"location" =>
            {
                location = e
                    .attributes()
                    .filter_map(|a| a.ok())
                    .find(|a| a.key.as_ref() == b"href")
                    .map(|a| String::from_utf8_lossy(a.value.as_ref()).to_string());
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"data" => {
                in_primary = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!("Failed to parse repomd.xml: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    location.ok_or_else(|| {
        Error::ParseError("Could not find primary data location in repomd.xml".to_string())
    })
}
