//! Per-file diff statistics of pull requests

use crate::db::base::{opt_text, text, BaseRepository};
use crate::db::connection::{Connection, Row};
use crate::db::queries::{
    BULK_UPSERT_FILE_CHANGES, GET_FILE_CHANGE, GET_FILE_CHANGES_BY_PR, SET_FILE_CHANGE,
};
use crate::error::Result;
use crate::types::{FileChange, FileStatus};
use rusqlite::types::Value;
use std::sync::Arc;

/// Column names a file change is read from.
///
/// Plain reads use the table's own names; the pull request join readers
/// alias them with an `fc_` prefix so they cannot collide with PR columns.
pub(crate) struct FileChangeColumns {
    pub id: &'static str,
    pub filename: &'static str,
    pub changes: &'static str,
    pub additions: &'static str,
    pub deletions: &'static str,
    pub status: &'static str,
    pub patch: &'static str,
    pub file_extension: &'static str,
}

pub(crate) const PLAIN_COLUMNS: FileChangeColumns = FileChangeColumns {
    id: "id",
    filename: "filename",
    changes: "changes",
    additions: "additions",
    deletions: "deletions",
    status: "status",
    patch: "patch",
    file_extension: "file_extension",
};

pub(crate) const JOINED_COLUMNS: FileChangeColumns = FileChangeColumns {
    id: "fc_id",
    filename: "fc_filename",
    changes: "fc_changes",
    additions: "fc_additions",
    deletions: "fc_deletions",
    status: "fc_status",
    patch: "fc_patch",
    file_extension: "fc_file_extension",
};

/// Map a row to a file change owned by `(pr_number, repository_full_name)`.
///
/// The stored extension is kept as is rather than re-derived from the
/// filename.
pub(crate) fn row_to_file_change(
    row: &Row,
    cols: &FileChangeColumns,
    pr_number: i64,
    repository_full_name: &str,
) -> Result<FileChange> {
    let status: String = row.get(cols.status)?;
    Ok(FileChange {
        id: row.get(cols.id)?,
        pr_number,
        repository_full_name: repository_full_name.to_string(),
        filename: row.get(cols.filename)?,
        changes: row.get(cols.changes)?,
        additions: row.get(cols.additions)?,
        deletions: row.get(cols.deletions)?,
        status: FileStatus::from(status),
        patch: row.get(cols.patch)?,
        file_extension: row
            .get::<Option<String>>(cols.file_extension)?
            .unwrap_or_default(),
    })
}

pub struct FileChangesRepository {
    base: BaseRepository,
}

impl FileChangesRepository {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            base: BaseRepository::new(conn, "file_changes"),
        }
    }

    fn row_to_file_change(row: &Row) -> Result<FileChange> {
        let pr_number: i64 = row.get("pr_number")?;
        let repository_full_name: String = row.get("repository_full_name")?;
        row_to_file_change(row, &PLAIN_COLUMNS, pr_number, &repository_full_name)
    }

    /// Bind a file change to the PR it is being stored under. The owner
    /// fields on `change` are ignored in favour of the arguments.
    fn params(pr_number: i64, repository_full_name: &str, change: &FileChange) -> Vec<Value> {
        vec![
            Value::Integer(pr_number),
            text(repository_full_name),
            text(change.filename.as_str()),
            Value::Integer(change.changes),
            Value::Integer(change.additions),
            Value::Integer(change.deletions),
            text(change.status.as_str()),
            opt_text(change.patch.as_deref()),
            text(change.file_extension.as_str()),
        ]
    }

    pub fn get_file_change(&self, id: i64) -> Result<Option<FileChange>> {
        self.base
            .query_one(GET_FILE_CHANGE, &[Value::Integer(id)], Self::row_to_file_change)
    }

    /// File changes of one pull request, by filename.
    pub fn get_file_changes_by_pr(
        &self,
        pr_number: i64,
        repository_full_name: &str,
    ) -> Result<Vec<FileChange>> {
        self.base.query_many(
            GET_FILE_CHANGES_BY_PR,
            &[Value::Integer(pr_number), text(repository_full_name)],
            Self::row_to_file_change,
        )
    }

    pub fn try_set_file_change(
        &self,
        pr_number: i64,
        repository_full_name: &str,
        change: &FileChange,
    ) -> Result<()> {
        self.base.try_execute(
            SET_FILE_CHANGE,
            &Self::params(pr_number, repository_full_name, change),
        )?;
        Ok(())
    }

    pub fn set_file_change(
        &self,
        pr_number: i64,
        repository_full_name: &str,
        change: &FileChange,
    ) -> bool {
        self.base
            .report(
                "set_file_change",
                self.try_set_file_change(pr_number, repository_full_name, change),
            )
            .is_some()
    }

    /// Store every file change of one pull request as a single unit of work.
    pub fn try_set_file_changes_for_pr(
        &self,
        pr_number: i64,
        repository_full_name: &str,
        changes: &[FileChange],
    ) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let statements: Vec<(&str, Vec<Value>)> = changes
            .iter()
            .map(|c| (SET_FILE_CHANGE, Self::params(pr_number, repository_full_name, c)))
            .collect();
        self.base.try_execute_all(&statements)?;
        Ok(())
    }

    pub fn set_file_changes_for_pr(
        &self,
        pr_number: i64,
        repository_full_name: &str,
        changes: &[FileChange],
    ) -> bool {
        self.base
            .report(
                "set_file_changes_for_pr",
                self.try_set_file_changes_for_pr(pr_number, repository_full_name, changes),
            )
            .is_some()
    }

    /// Store file changes of any number of pull requests, each under the
    /// owner it names.
    pub fn try_store_file_changes_bulk(&self, changes: &[FileChange]) -> Result<usize> {
        let rows = changes
            .iter()
            .map(|c| Self::params(c.pr_number, &c.repository_full_name, c))
            .collect();
        self.base.execute_bulk(&BULK_UPSERT_FILE_CHANGES, rows)
    }

    pub fn store_file_changes_bulk(&self, changes: &[FileChange]) -> usize {
        self.base
            .report(
                "store_file_changes_bulk",
                self.try_store_file_changes_bulk(changes),
            )
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup;
    use crate::types::{FileChange, FileStatus};

    fn change(filename: &str) -> FileChange {
        FileChange::new(7, "octo/widgets", filename, 4, 1, FileStatus::Modified)
    }

    #[test]
    fn test_set_file_change_derives_extension() {
        let db = setup();
        let repo = db.file_changes();

        assert!(repo.set_file_change(7, "octo/widgets", &change("src/Main.RS")));
        let stored = repo.get_file_changes_by_pr(7, "octo/widgets").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].file_extension, "rs");
        assert_eq!(stored[0].changes, 5);

        let id = stored[0].id.unwrap();
        assert_eq!(repo.get_file_change(id).unwrap(), Some(stored[0].clone()));
    }

    #[test]
    fn test_set_file_changes_for_pr_is_atomic() {
        let db = setup();
        let repo = db.file_changes();

        assert!(repo.set_file_changes_for_pr(7, "octo/widgets", &[]));
        assert!(repo.set_file_changes_for_pr(
            7,
            "octo/widgets",
            &[change("b.py"), change("a.md")]
        ));
        let names: Vec<String> = repo
            .get_file_changes_by_pr(7, "octo/widgets")
            .unwrap()
            .into_iter()
            .map(|c| c.filename)
            .collect();
        assert_eq!(names, vec!["a.md", "b.py"]);

        // Unknown repository: nothing from this batch lands
        assert!(!repo.set_file_changes_for_pr(8, "ghost/repo", &[change("c.go")]));
        assert!(repo.get_file_changes_by_pr(8, "ghost/repo").unwrap().is_empty());
    }

    #[test]
    fn test_store_file_changes_bulk_ignores_duplicates() {
        let db = setup();
        let repo = db.file_changes();
        let batch = vec![change("x.ts"), change("x.ts"), change("y.ts")];

        assert_eq!(repo.store_file_changes_bulk(&batch), 3);
        assert_eq!(repo.get_file_changes_by_pr(7, "octo/widgets").unwrap().len(), 2);
    }
}
