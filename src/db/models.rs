// src/db/models.rs

//! Data models for installed store entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting records.

use crate::error::{Error, Result};
use crate::packages::{Capreq, CapreqFlags, Package, PackageFile, Relation};
use crate::version::Evr;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// Turn a string-parse failure in column `idx` into a rusqlite error
fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
    )
}

/// An installed package row
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub id: Option<i64>,
    pub name: String,
    pub epoch: Option<u32>,
    pub version: String,
    pub release: Option<String>,
    pub architecture: Option<String>,
    pub color: u32,
    pub summary: Option<String>,
    pub installed_at: Option<String>,
    pub installed_by_changeset_id: Option<i64>,
}

const PACKAGE_COLUMNS: &str = "id, name, epoch, version, release, architecture, color, summary, installed_at, installed_by_changeset_id";

impl InstalledPackage {
    /// Row for `pkg`; the id is assigned on insert
    pub fn from_package(pkg: &Package) -> Self {
        Self {
            id: None,
            name: pkg.name.clone(),
            epoch: pkg.evr.epoch,
            version: pkg.evr.version.clone(),
            release: pkg.evr.release.clone(),
            architecture: pkg.arch.clone(),
            color: pkg.color,
            summary: pkg.summary.clone(),
            installed_at: None,
            installed_by_changeset_id: None,
        }
    }

    pub fn evr(&self) -> Evr {
        Evr::new(self.epoch, &self.version, self.release.as_deref())
    }

    /// Insert this package into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO packages (name, epoch, version, release, architecture, color, summary, installed_by_changeset_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &self.name,
                &self.epoch,
                &self.version,
                &self.release,
                &self.architecture,
                &self.color,
                &self.summary,
                &self.installed_by_changeset_id,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE id = ?1",
            PACKAGE_COLUMNS
        ))?;

        let pkg = stmt.query_row([id], Self::from_row).optional()?;
        Ok(pkg)
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE name = ?1 ORDER BY id",
            PACKAGE_COLUMNS
        ))?;

        let pkgs = stmt
            .query_map([name], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pkgs)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages ORDER BY name, id",
            PACKAGE_COLUMNS
        ))?;

        let pkgs = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pkgs)
    }

    /// Ids of packages with a capability of `kind` named `name`
    pub fn find_ids_by_capability(
        conn: &Connection,
        kind: CapabilityKind,
        name: &str,
    ) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT package_id FROM capabilities WHERE kind = ?1 AND name = ?2 ORDER BY package_id",
        )?;
        let ids = stmt
            .query_map(params![kind.as_str(), name], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Ids of packages shipping `path`
    pub fn find_ids_by_path(conn: &Connection, path: &str) -> Result<Vec<i64>> {
        let mut stmt =
            conn.prepare("SELECT DISTINCT package_id FROM files WHERE path = ?1 ORDER BY package_id")?;
        let ids = stmt
            .query_map([path], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Delete a package; capabilities and files cascade
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        let deleted = conn.execute("DELETE FROM packages WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(Error::DatabaseInconsistent {
                package: format!("record {}", id),
                detail: "no such installed package".to_string(),
            });
        }
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            epoch: row.get(2)?,
            version: row.get(3)?,
            release: row.get(4)?,
            architecture: row.get(5)?,
            color: row.get(6)?,
            summary: row.get(7)?,
            installed_at: row.get(8)?,
            installed_by_changeset_id: row.get(9)?,
        })
    }
}

/// Which list of a package a capability row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Provide,
    Require,
    Conflict,
    Obsolete,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &str {
        match self {
            CapabilityKind::Provide => "provide",
            CapabilityKind::Require => "require",
            CapabilityKind::Conflict => "conflict",
            CapabilityKind::Obsolete => "obsolete",
        }
    }
}

impl FromStr for CapabilityKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "provide" => Ok(CapabilityKind::Provide),
            "require" => Ok(CapabilityKind::Require),
            "conflict" => Ok(CapabilityKind::Conflict),
            "obsolete" => Ok(CapabilityKind::Obsolete),
            _ => Err(format!("Invalid capability kind: {}", s)),
        }
    }
}

/// A provides/requires/conflicts/obsoletes row
#[derive(Debug, Clone)]
pub struct CapabilityEntry {
    pub id: Option<i64>,
    pub package_id: i64,
    pub kind: CapabilityKind,
    pub name: String,
    pub relation: Option<String>,
    pub evr: Option<String>,
    pub prereq: bool,
    pub prereq_un: bool,
}

impl CapabilityEntry {
    pub fn from_capreq(package_id: i64, kind: CapabilityKind, cap: &Capreq) -> Self {
        Self {
            id: None,
            package_id,
            kind,
            name: cap.name.clone(),
            relation: cap.relation().map(|r| r.as_str().to_string()),
            evr: cap.evr().map(|e| e.to_string()),
            prereq: cap.flags.prereq,
            prereq_un: cap.flags.prereq_un,
        }
    }

    /// Back to a `Capreq`; obsoletes come back as flagged conflicts
    pub fn to_capreq(&self) -> Result<Capreq> {
        let mut cap = match (&self.relation, &self.evr) {
            (Some(rel), Some(evr)) => {
                let relation = Relation::parse(rel).ok_or_else(|| {
                    Error::ParseError(format!("invalid relation '{}' for {}", rel, self.name))
                })?;
                Capreq::versioned(&self.name, relation, Evr::parse(evr)?)
            }
            _ => Capreq::new(&self.name),
        };
        cap = cap.with_flags(CapreqFlags {
            prereq: self.prereq,
            prereq_un: self.prereq_un,
            obsoletes: self.kind == CapabilityKind::Obsolete,
            ..CapreqFlags::default()
        });
        Ok(cap)
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO capabilities (package_id, kind, name, relation, evr, prereq, prereq_un)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &self.package_id,
                self.kind.as_str(),
                &self.name,
                &self.relation,
                &self.evr,
                &self.prereq,
                &self.prereq_un,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_package(conn: &Connection, package_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, kind, name, relation, evr, prereq, prereq_un
             FROM capabilities WHERE package_id = ?1 ORDER BY id",
        )?;

        let caps = stmt
            .query_map([package_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(caps)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind_str: String = row.get(2)?;
        let kind = kind_str
            .parse::<CapabilityKind>()
            .map_err(|e| conversion_error(2, e))?;

        Ok(Self {
            id: Some(row.get(0)?),
            package_id: row.get(1)?,
            kind,
            name: row.get(3)?,
            relation: row.get(4)?,
            evr: row.get(5)?,
            prereq: row.get(6)?,
            prereq_un: row.get(7)?,
        })
    }
}

/// A file shipped by an installed package
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub id: Option<i64>,
    pub package_id: i64,
    pub path: String,
    pub size: i64,
    pub mode: u32,
    pub link_to: Option<String>,
}

impl FileEntry {
    pub fn from_file(package_id: i64, file: &PackageFile) -> Self {
        Self {
            id: None,
            package_id,
            path: file.path.clone(),
            size: file.size,
            mode: file.mode,
            link_to: file.link_to.clone(),
        }
    }

    pub fn to_file(&self) -> PackageFile {
        PackageFile {
            path: self.path.clone(),
            size: self.size,
            mode: self.mode,
            link_to: self.link_to.clone(),
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO files (package_id, path, size, mode, link_to) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.package_id,
                &self.path,
                &self.size,
                &self.mode,
                &self.link_to
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_package(conn: &Connection, package_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, path, size, mode, link_to FROM files WHERE package_id = ?1 ORDER BY path",
        )?;

        let files = stmt
            .query_map([package_id], |row| {
                Ok(Self {
                    id: Some(row.get(0)?),
                    package_id: row.get(1)?,
                    path: row.get(2)?,
                    size: row.get(3)?,
                    mode: row.get(4)?,
                    link_to: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }
}

/// Changeset status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangesetStatus {
    Pending,
    Applied,
    Failed,
}

impl ChangesetStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ChangesetStatus::Pending => "pending",
            ChangesetStatus::Applied => "applied",
            ChangesetStatus::Failed => "failed",
        }
    }
}

impl FromStr for ChangesetStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChangesetStatus::Pending),
            "applied" => Ok(ChangesetStatus::Applied),
            "failed" => Ok(ChangesetStatus::Failed),
            _ => Err(format!("Invalid changeset status: {}", s)),
        }
    }
}

/// One applied (or attempted) plan
#[derive(Debug, Clone)]
pub struct Changeset {
    pub id: Option<i64>,
    pub description: String,
    pub status: ChangesetStatus,
    pub created_at: Option<String>,
    pub applied_at: Option<String>,
}

impl Changeset {
    pub fn new(description: String) -> Self {
        Self {
            id: None,
            description,
            status: ChangesetStatus::Pending,
            created_at: None,
            applied_at: None,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO changesets (description, status) VALUES (?1, ?2)",
            params![&self.description, self.status.as_str()],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, description, status, created_at, applied_at FROM changesets WHERE id = ?1",
        )?;

        let changeset = stmt.query_row([id], Self::from_row).optional()?;
        Ok(changeset)
    }

    /// Newest first
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, description, status, created_at, applied_at FROM changesets ORDER BY id DESC",
        )?;

        let changesets = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(changesets)
    }

    pub fn update_status(&mut self, conn: &Connection, new_status: ChangesetStatus) -> Result<()> {
        let id = self
            .id
            .ok_or_else(|| Error::InitError("Cannot update changeset without ID".to_string()))?;

        if new_status == ChangesetStatus::Applied {
            conn.execute(
                "UPDATE changesets SET status = ?1, applied_at = CURRENT_TIMESTAMP WHERE id = ?2",
                params![new_status.as_str(), id],
            )?;
        } else {
            conn.execute(
                "UPDATE changesets SET status = ?1 WHERE id = ?2",
                params![new_status.as_str(), id],
            )?;
        }

        self.status = new_status;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let status_str: String = row.get(2)?;
        let status = status_str
            .parse::<ChangesetStatus>()
            .map_err(|e| conversion_error(2, e))?;

        Ok(Self {
            id: Some(row.get(0)?),
            description: row.get(1)?,
            status,
            created_at: row.get(3)?,
            applied_at: row.get(4)?,
        })
    }
}

/// What a changeset did to one package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Install,
    Remove,
}

impl ChangeAction {
    pub fn as_str(&self) -> &str {
        match self {
            ChangeAction::Install => "install",
            ChangeAction::Remove => "remove",
        }
    }
}

impl FromStr for ChangeAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "install" => Ok(ChangeAction::Install),
            "remove" => Ok(ChangeAction::Remove),
            _ => Err(format!("Invalid change action: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangesetEntry {
    pub id: Option<i64>,
    pub changeset_id: i64,
    pub action: ChangeAction,
    pub nevra: String,
    /// Position in the transaction order
    pub position: i64,
}

impl ChangesetEntry {
    pub fn new(changeset_id: i64, action: ChangeAction, nevra: String, position: i64) -> Self {
        Self {
            id: None,
            changeset_id,
            action,
            nevra,
            position,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO changeset_entries (changeset_id, action, nevra, position) VALUES (?1, ?2, ?3, ?4)",
            params![
                &self.changeset_id,
                self.action.as_str(),
                &self.nevra,
                &self.position
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Entries of a changeset in transaction order
    pub fn find_by_changeset(conn: &Connection, changeset_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, changeset_id, action, nevra, position FROM changeset_entries
             WHERE changeset_id = ?1 ORDER BY position",
        )?;

        let entries = stmt
            .query_map([changeset_id], |row| {
                let action_str: String = row.get(2)?;
                let action = action_str
                    .parse::<ChangeAction>()
                    .map_err(|e| conversion_error(2, e))?;
                Ok(Self {
                    id: Some(row.get(0)?),
                    changeset_id: row.get(1)?,
                    action,
                    nevra: row.get(3)?,
                    position: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_package_crud() {
        let (_temp, conn) = create_test_db();

        let mut pkg = Package::new("bash", Evr::parse("1:5.2-3").unwrap());
        pkg.arch = Some("x86_64".to_string());
        let mut row = InstalledPackage::from_package(&pkg);
        let id = row.insert(&conn).unwrap();

        let found = InstalledPackage::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(found.name, "bash");
        assert_eq!(found.epoch, Some(1));
        assert_eq!(found.evr(), pkg.evr);
        assert!(found.installed_at.is_some());

        assert_eq!(InstalledPackage::find_by_name(&conn, "bash").unwrap().len(), 1);
        InstalledPackage::delete(&conn, id).unwrap();
        assert!(InstalledPackage::find_by_id(&conn, id).unwrap().is_none());
        assert!(InstalledPackage::delete(&conn, id).is_err());
    }

    #[test]
    fn test_capability_round_trip() {
        let (_temp, conn) = create_test_db();
        let mut row = InstalledPackage::from_package(&Package::new("app", Evr::parse("1.0").unwrap()));
        let id = row.insert(&conn).unwrap();

        let req: Capreq = "libfoo >= 1:2.0-1".parse().unwrap();
        let req = req.prereq();
        CapabilityEntry::from_capreq(id, CapabilityKind::Require, &req)
            .insert(&conn)
            .unwrap();
        let obs: Capreq = "oldapp".parse().unwrap();
        CapabilityEntry::from_capreq(id, CapabilityKind::Obsolete, &obs)
            .insert(&conn)
            .unwrap();

        let entries = CapabilityEntry::find_by_package(&conn, id).unwrap();
        assert_eq!(entries.len(), 2);
        let back = entries[0].to_capreq().unwrap();
        assert_eq!(back.to_string(), "libfoo >= 1:2.0-1");
        assert!(back.flags.prereq);
        assert!(entries[1].to_capreq().unwrap().flags.obsoletes);

        let ids = InstalledPackage::find_ids_by_capability(&conn, CapabilityKind::Require, "libfoo").unwrap();
        assert_eq!(ids, vec![id]);
    }

    #[test]
    fn test_delete_cascades() {
        let (_temp, conn) = create_test_db();
        let mut row = InstalledPackage::from_package(&Package::new("app", Evr::parse("1.0").unwrap()));
        let id = row.insert(&conn).unwrap();
        FileEntry::from_file(id, &PackageFile::new("/usr/bin/app", 10, 0o100755))
            .insert(&conn)
            .unwrap();
        assert_eq!(InstalledPackage::find_ids_by_path(&conn, "/usr/bin/app").unwrap(), vec![id]);

        InstalledPackage::delete(&conn, id).unwrap();
        assert!(FileEntry::find_by_package(&conn, id).unwrap().is_empty());
    }

    #[test]
    fn test_changeset_lifecycle() {
        let (_temp, conn) = create_test_db();
        let mut changeset = Changeset::new("Install app".to_string());
        let id = changeset.insert(&conn).unwrap();
        ChangesetEntry::new(id, ChangeAction::Remove, "app-0.9".to_string(), 0)
            .insert(&conn)
            .unwrap();
        ChangesetEntry::new(id, ChangeAction::Install, "app-1.0".to_string(), 1)
            .insert(&conn)
            .unwrap();

        changeset.update_status(&conn, ChangesetStatus::Applied).unwrap();
        let found = Changeset::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(found.status, ChangesetStatus::Applied);
        assert!(found.applied_at.is_some());

        let entries = ChangesetEntry::find_by_changeset(&conn, id).unwrap();
        assert_eq!(entries[0].action, ChangeAction::Remove);
        assert_eq!(entries[1].nevra, "app-1.0");
    }
}
