// src/lib.rs

//! rpmsolve: dependency resolution and transaction planning for RPM-style
//! packages
//!
//! Given a catalog of available packages and a store of installed ones,
//! rpmsolve decides which packages to install, upgrade or remove and in
//! what order.
//!
//! # Architecture
//!
//! - Arena: the catalog is an immutable `PackageSet`; packages are
//!   addressed by `PkgId`, with capability and file indexes built once
//! - Side tables: marks, DAG colors and exclusions live next to the
//!   arena, never inside package records
//! - Installed store: a trait, backed by SQLite (`db`) or memory
//! - Plans, not actions: resolution produces an `InstallPlan` or
//!   `UninstallPlan`; a `TransactionExecutor` carries it out

pub mod config;
pub mod db;
mod error;
pub mod packages;
pub mod repository;
pub mod resolver;
pub mod version;

pub use config::ResolveConfig;
pub use error::{Error, Result};
pub use packages::{Capreq, Package, PkgId};
pub use resolver::{InstallPlan, PackageSet, Resolver, UninstallPlan};
