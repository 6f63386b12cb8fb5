// src/db/store.rs

//! SQLite-backed `InstalledStore`
//!
//! Every query returns fully loaded packages (capabilities and files
//! included) carrying their row id as record id.

use crate::db::models::{CapabilityEntry, CapabilityKind, FileEntry, InstalledPackage};
use crate::error::{Error, Result};
use crate::packages::Package;
use crate::resolver::InstalledStore;
use rusqlite::Connection;
use tracing::debug;

pub struct DbStore<'c> {
    conn: &'c Connection,
}

impl<'c> DbStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Installed package with record id `id`
    pub fn load(&self, id: i64) -> Result<Option<Package>> {
        match InstalledPackage::find_by_id(self.conn, id)? {
            Some(row) => Ok(Some(load_package(self.conn, row)?)),
            None => Ok(None),
        }
    }

    fn load_ids(&self, mut ids: Vec<i64>) -> Result<Vec<Package>> {
        ids.sort_unstable();
        ids.dedup();
        let mut pkgs = Vec::with_capacity(ids.len());
        for id in ids {
            let pkg = self.load(id)?.ok_or_else(|| Error::DatabaseInconsistent {
                package: format!("record {}", id),
                detail: "referenced by an index row but missing".to_string(),
            })?;
            pkgs.push(pkg);
        }
        Ok(pkgs)
    }
}

/// Assemble a `Package` from its rows
pub fn load_package(conn: &Connection, row: InstalledPackage) -> Result<Package> {
    let id = row.id.ok_or_else(|| Error::DatabaseInconsistent {
        package: row.name.clone(),
        detail: "row without id".to_string(),
    })?;

    let mut pkg = Package::new(&row.name, row.evr());
    pkg.arch = row.architecture;
    pkg.color = row.color;
    pkg.summary = row.summary;
    pkg.recno = Some(id);

    for entry in CapabilityEntry::find_by_package(conn, id)? {
        let cap = entry.to_capreq()?;
        match entry.kind {
            CapabilityKind::Provide => pkg.provides.push(cap),
            CapabilityKind::Require => pkg.requires.push(cap),
            CapabilityKind::Conflict | CapabilityKind::Obsolete => pkg.conflicts.push(cap),
        }
    }
    pkg.files = FileEntry::find_by_package(conn, id)?
        .iter()
        .map(FileEntry::to_file)
        .collect();

    Ok(pkg)
}

/// Store `pkg` as installed; returns its record id
pub fn insert_package(conn: &Connection, pkg: &Package, changeset_id: Option<i64>) -> Result<i64> {
    let mut row = InstalledPackage::from_package(pkg);
    row.installed_by_changeset_id = changeset_id;
    let id = row.insert(conn)?;

    for cap in &pkg.provides {
        CapabilityEntry::from_capreq(id, CapabilityKind::Provide, cap).insert(conn)?;
    }
    for req in &pkg.requires {
        CapabilityEntry::from_capreq(id, CapabilityKind::Require, req).insert(conn)?;
    }
    for cnfl in &pkg.conflicts {
        let kind = if cnfl.flags.obsoletes {
            CapabilityKind::Obsolete
        } else {
            CapabilityKind::Conflict
        };
        CapabilityEntry::from_capreq(id, kind, cnfl).insert(conn)?;
    }
    for file in &pkg.files {
        FileEntry::from_file(id, file).insert(conn)?;
    }

    debug!("Stored {} as record {}", pkg, id);
    Ok(id)
}

impl InstalledStore for DbStore<'_> {
    fn all(&self) -> Result<Vec<Package>> {
        InstalledPackage::list_all(self.conn)?
            .into_iter()
            .map(|row| load_package(self.conn, row))
            .collect()
    }

    fn find_by_name(&self, name: &str) -> Result<Vec<Package>> {
        InstalledPackage::find_by_name(self.conn, name)?
            .into_iter()
            .map(|row| load_package(self.conn, row))
            .collect()
    }

    fn find_by_provided(&self, cap: &str) -> Result<Vec<Package>> {
        let mut ids: Vec<i64> = InstalledPackage::find_by_name(self.conn, cap)?
            .iter()
            .filter_map(|row| row.id)
            .collect();
        ids.extend(InstalledPackage::find_ids_by_capability(
            self.conn,
            CapabilityKind::Provide,
            cap,
        )?);
        self.load_ids(ids)
    }

    fn find_by_file(&self, path: &str) -> Result<Vec<Package>> {
        let ids = InstalledPackage::find_ids_by_path(self.conn, path)?;
        self.load_ids(ids)
    }

    fn find_by_required(&self, cap: &str) -> Result<Vec<Package>> {
        let ids = InstalledPackage::find_ids_by_capability(self.conn, CapabilityKind::Require, cap)?;
        self.load_ids(ids)
    }

    fn find_by_conflict(&self, cap: &str) -> Result<Vec<Package>> {
        let mut ids =
            InstalledPackage::find_ids_by_capability(self.conn, CapabilityKind::Conflict, cap)?;
        ids.extend(InstalledPackage::find_ids_by_capability(
            self.conn,
            CapabilityKind::Obsolete,
            cap,
        )?);
        self.load_ids(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use crate::packages::{Capreq, PackageFile};
    use crate::version::Evr;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    fn sample() -> Package {
        let mut pkg = Package::new("libfoo", Evr::parse("1.0-1").unwrap());
        pkg.arch = Some("x86_64".to_string());
        pkg.color = 2;
        pkg.provides.push("libfoo.so.1()(64bit)".parse().unwrap());
        pkg.requires.push("glibc >= 2.34".parse::<Capreq>().unwrap().prereq());
        pkg.conflicts.push("libfoo-compat < 1.0".parse().unwrap());
        pkg.conflicts.push("oldfoo".parse::<Capreq>().unwrap().obsoletes());
        pkg.files.push(PackageFile::new("/usr/lib64/libfoo.so.1", 4096, 0o100755));
        pkg
    }

    #[test]
    fn test_store_round_trip() {
        let (_temp, conn) = create_test_db();
        let id = insert_package(&conn, &sample(), None).unwrap();

        let store = DbStore::new(&conn);
        let loaded = store.load(id).unwrap().unwrap();
        assert_eq!(loaded.recno, Some(id));
        assert!(loaded.same_nevra(&sample()));
        assert_eq!(loaded.color, 2);
        assert_eq!(loaded.provides, sample().provides);
        assert_eq!(loaded.requires, sample().requires);
        assert_eq!(loaded.conflicts, sample().conflicts);
        assert_eq!(loaded.files, sample().files);
    }

    #[test]
    fn test_store_queries() {
        let (_temp, conn) = create_test_db();
        insert_package(&conn, &sample(), None).unwrap();
        let mut app = Package::new("app", Evr::parse("2.0-1").unwrap());
        app.requires.push("libfoo.so.1()(64bit)".parse().unwrap());
        insert_package(&conn, &app, None).unwrap();

        let store = DbStore::new(&conn);
        assert_eq!(store.all().unwrap().len(), 2);
        assert_eq!(store.find_by_name("app").unwrap().len(), 1);
        assert_eq!(store.find_by_provided("libfoo").unwrap()[0].name, "libfoo");
        assert_eq!(store.find_by_provided("libfoo.so.1()(64bit)").unwrap().len(), 1);
        assert_eq!(store.find_by_file("/usr/lib64/libfoo.so.1").unwrap().len(), 1);
        assert_eq!(store.find_by_required("libfoo.so.1()(64bit)").unwrap()[0].name, "app");
        assert_eq!(store.find_by_conflict("oldfoo").unwrap().len(), 1);
        assert_eq!(store.find_by_conflict("libfoo-compat").unwrap().len(), 1);
        assert!(store.find_by_required("nothing").unwrap().is_empty());
    }
}
