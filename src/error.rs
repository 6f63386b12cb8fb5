// src/error.rs

use thiserror::Error;

/// Core error types for rpmsolve
#[derive(Error, Debug)]
pub enum Error {
    /// A marked package requires something no package provides
    #[error("{package}: unresolved requirement {requirement}")]
    UnresolvedRequirement { package: String, requirement: String },

    /// Two packages selected for installation conflict with each other
    #[error("{package} conflicts with {other} ({conflict})")]
    InSetConflict {
        package: String,
        other: String,
        conflict: String,
    },

    /// A package to install conflicts with an installed package that stays
    #[error("{package} ({conflict}) conflicts with installed {installed}")]
    InstalledConflict {
        package: String,
        installed: String,
        conflict: String,
    },

    /// Several installed instances of a name and no way to pick one
    #[error("{package}: multiple instances installed ({instances}), give up")]
    MultiInstanceAmbiguous { package: String, instances: String },

    /// A capability removed by the transaction is still required
    #[error("{requirement} is required by {package} (removed by {removed_by})")]
    OrphanUnresolvable {
        package: String,
        requirement: String,
        removed_by: String,
    },

    /// A genuine Requires(pre) loop
    #[error("Requires(pre) loop: {cycle}")]
    OrderingCycle { package: String, cycle: String },

    /// The installed store reports an impossible state
    #[error("installed database inconsistent: {package}: {detail}")]
    DatabaseInconsistent { package: String, detail: String },

    /// Removal of a held package was requested
    #[error("{0}: refusing to uninstall held package")]
    HeldPackage(String),

    /// A selection mask matched nothing
    #[error("{0}: no such package")]
    NoSuchPackage(String),

    /// Cooperative cancellation was requested
    #[error("interrupted")]
    Interrupted,

    /// Catalog or version parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid resolver configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),
}

impl Error {
    /// Dependency-class errors are tolerated under `nodeps`
    pub fn is_dependency_error(&self) -> bool {
        matches!(
            self,
            Error::UnresolvedRequirement { .. } | Error::OrphanUnresolvable { .. }
        )
    }

    /// Errors tolerated under `force`; in-set conflicts never are
    pub fn is_forceable(&self) -> bool {
        matches!(
            self,
            Error::InstalledConflict { .. } | Error::MultiInstanceAmbiguous { .. }
        )
    }
}

/// Result type alias using rpmsolve's Error type
pub type Result<T> = std::result::Result<T, Error>;
