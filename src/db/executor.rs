// src/db/executor.rs

//! Recording plans in the installed database
//!
//! `DbExecutor` applies a plan to the package records only: removals are
//! deleted, installs are stored, and the whole thing is one changeset in
//! one SQLite transaction. Putting files on disk is somebody else's job.

use crate::db::models::{ChangeAction, Changeset, ChangesetEntry, ChangesetStatus, InstalledPackage};
use crate::db::store::insert_package;
use crate::error::{Error, Result};
use crate::packages::Package;
use crate::resolver::TransactionExecutor;
use rusqlite::Connection;
use tracing::info;

pub struct DbExecutor<'c> {
    conn: &'c mut Connection,
    description: String,
    last_changeset: Option<i64>,
}

impl<'c> DbExecutor<'c> {
    pub fn new(conn: &'c mut Connection, description: impl Into<String>) -> Self {
        Self {
            conn,
            description: description.into(),
            last_changeset: None,
        }
    }

    /// Id of the changeset written by the last `execute`
    pub fn last_changeset(&self) -> Option<i64> {
        self.last_changeset
    }
}

impl TransactionExecutor for DbExecutor<'_> {
    fn execute(&mut self, install: &[&Package], uninstall: &[Package]) -> Result<()> {
        let description = self.description.clone();

        let changeset_id = crate::db::transaction(self.conn, |tx| {
            let mut changeset = Changeset::new(description);
            let changeset_id = changeset.insert(tx)?;
            let mut position = 0;

            // removals first so a reinstall does not clash with itself
            for pkg in uninstall {
                let recno = pkg.recno.ok_or_else(|| Error::DatabaseInconsistent {
                    package: pkg.nevra(),
                    detail: "removal of a package without record id".to_string(),
                })?;
                InstalledPackage::delete(tx, recno)?;
                ChangesetEntry::new(changeset_id, ChangeAction::Remove, pkg.nevra(), position)
                    .insert(tx)?;
                position += 1;
            }

            for pkg in install {
                insert_package(tx, pkg, Some(changeset_id))?;
                ChangesetEntry::new(changeset_id, ChangeAction::Install, pkg.nevra(), position)
                    .insert(tx)?;
                position += 1;
            }

            changeset.update_status(tx, ChangesetStatus::Applied)?;
            Ok(changeset_id)
        })?;

        info!(
            "Changeset {}: {} installed, {} removed",
            changeset_id,
            install.len(),
            uninstall.len()
        );
        self.last_changeset = Some(changeset_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::DbStore;
    use crate::resolver::InstalledStore;
    use crate::version::Evr;
    use tempfile::NamedTempFile;

    fn pkg(name: &str, evr: &str) -> Package {
        Package::new(name, Evr::parse(evr).unwrap())
    }

    #[test]
    fn test_execute_records_changeset() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        crate::db::init(db_path).unwrap();
        let mut conn = crate::db::open(db_path).unwrap();

        let old = pkg("foo", "1.0-1");
        {
            let mut executor = DbExecutor::new(&mut conn, "Import");
            executor.execute(&[&old], &[]).unwrap();
        }
        let installed = DbStore::new(&conn).find_by_name("foo").unwrap();
        assert_eq!(installed.len(), 1);

        let new = pkg("foo", "2.0-1");
        let changeset_id = {
            let mut executor = DbExecutor::new(&mut conn, "Upgrade foo");
            executor.execute(&[&new], &installed).unwrap();
            executor.last_changeset().unwrap()
        };

        let now = DbStore::new(&conn).find_by_name("foo").unwrap();
        assert_eq!(now.len(), 1);
        assert_eq!(now[0].evr.to_string(), "2.0-1");

        let entries = ChangesetEntry::find_by_changeset(&conn, changeset_id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, ChangeAction::Remove);
        assert_eq!(entries[0].nevra, "foo-1.0-1");
        assert_eq!(entries[1].action, ChangeAction::Install);
    }

    #[test]
    fn test_execute_rolls_back_on_missing_record() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        crate::db::init(db_path).unwrap();
        let mut conn = crate::db::open(db_path).unwrap();

        let mut ghost = pkg("ghost", "1.0-1");
        ghost.recno = Some(42);
        let new = pkg("bar", "1.0-1");
        let mut executor = DbExecutor::new(&mut conn, "Broken");
        let err = executor.execute(&[&new], &[ghost]).unwrap_err();
        assert!(matches!(err, Error::DatabaseInconsistent { .. }));
        drop(executor);

        assert!(DbStore::new(&conn).all().unwrap().is_empty());
        assert!(Changeset::list_all(&conn).unwrap().is_empty());
    }
}
