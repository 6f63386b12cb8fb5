// src/config.rs

//! Resolver configuration
//!
//! Every knob the engine honours lives in `ResolveConfig`, which is passed
//! explicitly to the package set and the resolver. It can be loaded from a
//! TOML or JSON file; missing keys take their defaults.
//!
//! ```toml
//! follow = true
//! nodeps = false
//! multilib = true
//! hold = ["kernel*", "glibc"]
//! ```

use crate::error::{Error, Result};
use crate::packages::MatchFlags;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Paths and capabilities nobody is assumed to depend on
pub const DEFAULT_NEVER_REQUIRED: &[&str] = &[
    "/usr/share/doc/*/*",
    "/usr/share/doc/*",
    "/usr/share/man/*.[0-9]",
    "/usr/src/examples/*",
    "*.desktop",
    "*.mo",
    "*.gz",
    "*.bz2",
    "*.pdf",
    "*.txt",
    "*.png",
    "*.gif",
    "*.jpg",
    "*.c",
    "*.h",
    "*.pc",
    "*.pm",
    "*.py",
    "*.rb",
];

/// Cooperative cancellation flag
///
/// Clones share the flag, so a signal handler can hold one while the
/// resolver polls another.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` once cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_requested() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// A list of shell-style globs, kept both as text and compiled
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct PatternList {
    sources: Vec<String>,
    patterns: Vec<glob::Pattern>,
}

impl PatternList {
    pub fn new<S: AsRef<str>>(sources: &[S]) -> Result<Self> {
        let mut list = PatternList::default();
        for source in sources {
            let source = source.as_ref();
            let pattern = glob::Pattern::new(source).map_err(|e| {
                Error::ConfigError(format!("invalid pattern '{}': {}", source, e))
            })?;
            list.sources.push(source.to_string());
            list.patterns.push(pattern);
        }
        Ok(list)
    }

    pub fn matches(&self, s: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(s))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl TryFrom<Vec<String>> for PatternList {
    type Error = Error;

    fn try_from(sources: Vec<String>) -> Result<Self> {
        PatternList::new(&sources)
    }
}

impl From<PatternList> for Vec<String> {
    fn from(list: PatternList) -> Self {
        list.sources
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Replace installed versions instead of installing alongside them
    pub upgrade: bool,
    /// Pull in whatever the selection needs
    pub follow: bool,
    /// Tolerate unresolved and orphaned requirements
    pub nodeps: bool,
    /// Tolerate conflicts with installed packages and ambiguous instances
    pub force: bool,
    /// Drop packages with broken requirements instead of failing
    pub best_effort: bool,
    /// Honour Obsoletes tags
    pub obsoletes: bool,
    /// Check conflicts against installed packages
    pub conflicts: bool,
    /// Apply architecture color filtering
    pub multilib: bool,
    pub promote_epoch: bool,
    /// Unversioned capabilities do not satisfy versioned requirements
    pub strict: bool,
    pub reinstall: bool,
    pub downgrade: bool,
    /// Upgrade orphans and remove packages left behind by removals
    pub greedy: bool,
    pub greedy_depth: usize,
    /// Scan the catalog for file conflicts when building the package set
    pub file_conflicts: bool,
    pub never_required: PatternList,
    /// Names that are never removed
    pub hold: PatternList,
    #[serde(skip)]
    pub interrupt: Interrupt,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            upgrade: true,
            follow: true,
            nodeps: false,
            force: false,
            best_effort: false,
            obsoletes: true,
            conflicts: true,
            multilib: false,
            promote_epoch: false,
            strict: true,
            reinstall: false,
            downgrade: false,
            greedy: false,
            greedy_depth: 1,
            file_conflicts: true,
            never_required: PatternList::new(DEFAULT_NEVER_REQUIRED).unwrap_or_default(),
            hold: PatternList::default(),
            interrupt: Interrupt::default(),
        }
    }
}

impl ResolveConfig {
    /// Load from a `.toml` or `.json` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        debug!("Loaded resolver configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Flags for matching catalog requirements
    pub fn match_flags(&self) -> MatchFlags {
        let mut flags = MatchFlags::strict(self.strict);
        if self.promote_epoch {
            flags.promote_epoch = true;
            flags.promote_req_epoch = true;
        }
        flags
    }

    /// Flags for matching against installed records
    pub fn installed_match_flags(&self) -> MatchFlags {
        if self.promote_epoch {
            self.match_flags().with_cap_epoch_promotion()
        } else {
            self.match_flags()
        }
    }

    pub fn is_never_required(&self, name: &str) -> bool {
        self.never_required.matches(name)
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.hold.matches(name)
    }
}
