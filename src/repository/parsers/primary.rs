// src/repository/parsers/primary.rs

//! RPM repodata primary.xml parser
//!
//! Parses the `primary.xml` file of an RPM repository into package records:
//! identity from `<name>`, `<arch>` and `<version>`, capabilities from the
//! `<rpm:provides>`, `<rpm:requires>`, `<rpm:conflicts>` and
//! `<rpm:obsoletes>` sections, and the file list from `<file>` entries.

use super::CatalogParser;
use crate::error::{Error, Result};
use crate::packages::{Capreq, Package, PackageFile, Relation};
use crate::version::Evr;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

const MODE_REGULAR: u32 = 0o100644;
const MODE_DIR: u32 = 0o040755;

/// primary.xml parser
#[derive(Debug, Default)]
pub struct PrimaryXmlParser {
    /// Drop `rpmlib(...)` requirements while parsing
    skip_rpmlib: bool,
}

impl PrimaryXmlParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_rpmlib(mut self, skip: bool) -> Self {
        self.skip_rpmlib = skip;
        self
    }
}

/// Capability section of the `<format>` block being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Provides,
    Requires,
    Conflicts,
    Obsoletes,
}

impl Section {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"rpm:provides" => Some(Section::Provides),
            b"rpm:requires" => Some(Section::Requires),
            b"rpm:conflicts" => Some(Section::Conflicts),
            b"rpm:obsoletes" => Some(Section::Obsoletes),
            _ => None,
        }
    }
}

fn attr(e: &BytesStart, key: &str) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

fn parse_epoch(value: Option<String>, context: &str) -> Result<Option<u32>> {
    match value {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|e| Error::ParseError(format!("Invalid epoch '{}' in {}: {}", v, context, e))),
    }
}

/// Convert an `<rpm:entry>` element into a capability
fn entry_capreq(e: &BytesStart) -> Result<Capreq> {
    let name = attr(e, "name")
        .ok_or_else(|| Error::ParseError("rpm:entry without name".to_string()))?;

    let relation = attr(e, "flags").and_then(|flags| Relation::parse(&flags));
    let mut cap = match (relation, attr(e, "ver")) {
        (Some(relation), Some(ver)) => {
            let epoch = parse_epoch(attr(e, "epoch"), &name)?;
            let release = attr(e, "rel");
            Capreq::versioned(&name, relation, Evr::new(epoch, &ver, release.as_deref()))
        }
        _ => Capreq::new(&name),
    };

    if attr(e, "pre").as_deref() == Some("1") {
        cap.flags.prereq = true;
    }
    Ok(cap)
}

/// Builder for constructing a `Package` from XML parsing
#[derive(Default)]
struct PackageBuilder {
    name: Option<String>,
    epoch: Option<u32>,
    ver: Option<String>,
    rel: Option<String>,
    arch: Option<String>,
    summary: Option<String>,
    provides: Vec<Capreq>,
    requires: Vec<Capreq>,
    conflicts: Vec<Capreq>,
    files: Vec<PackageFile>,
}

impl PackageBuilder {
    fn new() -> Self {
        Self::default()
    }

    fn build(self) -> Result<Package> {
        let name = self
            .name
            .ok_or_else(|| Error::ParseError("Missing package name".to_string()))?;
        let ver = self
            .ver
            .ok_or_else(|| Error::ParseError(format!("Missing version of {}", name)))?;

        let mut pkg = Package::new(&name, Evr::new(self.epoch, &ver, self.rel.as_deref()));
        // source packages share the catalog format but never get installed
        pkg.arch = self.arch.filter(|a| a != "src");
        pkg.summary = self.summary;
        pkg.provides = self.provides;
        pkg.requires = self.requires;
        pkg.conflicts = self.conflicts;
        pkg.files = self.files;
        pkg.strip_self_cap();
        Ok(pkg)
    }
}

impl CatalogParser for PrimaryXmlParser {
    fn parse_catalog(&self, xml_content: &str) -> Result<Vec<Package>> {
        let mut reader = Reader::from_str(xml_content);
        reader.trim_text(true);

        let mut packages = Vec::new();
        let mut buf = Vec::new();

        // Current package being built
        let mut current_package: Option<PackageBuilder> = None;
        let mut current_tag = Vec::new();
        let mut current_file_mode = MODE_REGULAR;
        let mut section = Section::None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let tag = e.name().as_ref().to_vec();
                    match tag.as_slice() {
                        b"package" => current_package = Some(PackageBuilder::new()),
                        b"file" => {
                            current_file_mode = match attr(&e, "type").as_deref() {
                                Some("dir") => MODE_DIR,
                                _ => MODE_REGULAR,
                            };
                        }
                        other => {
                            if let Some(s) = Section::from_tag(other) {
                                section = s;
                            }
                        }
                    }
                    current_tag = tag;
                }
                Ok(Event::Empty(e)) => {
                    if let Some(ref mut pkg) = current_package {
                        match e.name().as_ref() {
                            b"version" => {
                                pkg.epoch = parse_epoch(attr(&e, "epoch"), "package version")?;
                                pkg.ver = attr(&e, "ver");
                                pkg.rel = attr(&e, "rel");
                            }
                            b"rpm:entry" => {
                                let mut cap = entry_capreq(&e)?;
                                match section {
                                    _ if self.skip_rpmlib && cap.is_rpmlib() => {}
                                    Section::Provides => pkg.provides.push(cap),
                                    Section::Requires => pkg.requires.push(cap),
                                    Section::Conflicts => pkg.conflicts.push(cap),
                                    Section::Obsoletes => {
                                        cap.flags.obsoletes = true;
                                        pkg.conflicts.push(cap);
                                    }
                                    Section::None => {
                                        warn!("rpm:entry {} outside a capability section", cap);
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
                Ok(Event::Text(e)) => {
                    if let Some(ref mut pkg) = current_package {
                        let text = e
                            .unescape()
                            .map_err(|err| Error::ParseError(format!("Bad text in primary.xml: {}", err)))?
                            .to_string();
                        match current_tag.as_slice() {
                            b"name" => pkg.name = Some(text),
                            b"arch" => pkg.arch = Some(text),
                            b"summary" => pkg.summary = Some(text),
                            b"file" => pkg.files.push(PackageFile::new(&text, 0, current_file_mode)),
                            _ => {}
                        }
                    }
                }
                Ok(Event::End(e)) => {
                    let tag = e.name();
                    if tag.as_ref() == b"package" {
                        if let Some(builder) = current_package.take() {
                            packages.push(builder.build()?);
                        }
                    } else if Section::from_tag(tag.as_ref()).is_some() {
                        section = Section::None;
                    }
                    current_tag.clear();
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::ParseError(format!("Failed to parse primary.xml: {}", e)));
                }
                _ => {}
            }
            buf.clear();
        }

        debug!("Parsed {} packages from primary.xml", packages.len());
        Ok(packages)
    }
}
