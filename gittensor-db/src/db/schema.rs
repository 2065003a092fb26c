//! Database schema and migrations
//!
//! The schema is six SQL scripts under `src/db/sql/`, applied in dependency
//! order (referenced tables first). Scripts are embedded in the binary; a
//! scripts directory can be configured to override them from disk.
//!
//! Applied scripts are recorded in `schema_migrations` together with a
//! SHA-256 of the text that ran. A script is skipped only while its checksum
//! matches, so a statement added to a script (embedded or overridden) reaches
//! existing databases on the next run. Every script is written with
//! `IF NOT EXISTS`, so re-applying one is safe.

use super::base::{bind_timestamp, text, BaseRepository};
use super::connection::Connection;
use crate::error::{Error, Result};
use chrono::Utc;
use rusqlite::types::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Scripts in the order they must run.
pub const MIGRATION_ORDER: [&str; 6] = [
    "repositories",
    "miners",
    "miner_evaluations",
    "pull_requests",
    "issues",
    "file_changes",
];

const EMBEDDED_SCRIPTS: [(&str, &str); 6] = [
    ("repositories", include_str!("sql/repositories.sql")),
    ("miners", include_str!("sql/miners.sql")),
    ("miner_evaluations", include_str!("sql/miner_evaluations.sql")),
    ("pull_requests", include_str!("sql/pull_requests.sql")),
    ("issues", include_str!("sql/issues.sql")),
    ("file_changes", include_str!("sql/file_changes.sql")),
];

const CREATE_LEDGER: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    name             TEXT PRIMARY KEY,
    checksum         TEXT NOT NULL,
    applied_at       DATETIME NOT NULL
)
"#;

const GET_APPLIED: &str = "SELECT name, checksum FROM schema_migrations";

const RECORD_MIGRATION: &str = r#"
INSERT INTO schema_migrations (name, checksum, applied_at)
VALUES (?1, ?2, ?3)
ON CONFLICT (name) DO UPDATE SET
    checksum = excluded.checksum,
    applied_at = excluded.applied_at
"#;

/// Where a migrator is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

/// What one [`Migrator::migrate`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Scripts applied by this run, in order
    pub applied: Vec<String>,
    /// Scripts recorded in the ledger with an unchanged checksum
    pub skipped: Vec<String>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applies the schema scripts to a connection.
pub struct Migrator {
    base: BaseRepository,
    scripts_dir: Option<PathBuf>,
    state: MigrationState,
}

impl Migrator {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            base: BaseRepository::new(conn, "migrator"),
            scripts_dir: None,
            state: MigrationState::NotStarted,
        }
    }

    /// Read `<name>.sql` from `dir` when present there, instead of the
    /// embedded copy.
    pub fn with_scripts_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.scripts_dir = dir;
        self
    }

    /// Directory the embedded scripts were built from.
    pub fn default_scripts_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/db/sql")
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Apply every script that is missing from the ledger or whose text
    /// changed since it was recorded.
    ///
    /// Each script commits together with its ledger row. On failure the
    /// scripts before it stay applied and the state becomes `Failed`.
    pub fn migrate(&mut self) -> Result<MigrationReport> {
        self.state = MigrationState::Running;
        match self.run() {
            Ok(report) => {
                self.state = MigrationState::Completed;
                if report.is_noop() {
                    tracing::debug!("Schema is up to date");
                } else {
                    tracing::info!(applied = ?report.applied, "Migrations complete");
                }
                Ok(report)
            }
            Err(e) => {
                self.state = MigrationState::Failed;
                tracing::error!(error = %e, "Migration failed");
                Err(e)
            }
        }
    }

    /// Alias of [`Migrator::migrate`].
    pub fn create_tables(&mut self) -> Result<MigrationReport> {
        self.migrate()
    }

    fn run(&self) -> Result<MigrationReport> {
        self.base
            .try_execute(CREATE_LEDGER, &[])
            .map_err(|e| migration_error("schema_migrations", e))?;

        let applied: HashMap<String, String> = self
            .base
            .query_many(GET_APPLIED, &[], |row| {
                Ok((row.get::<String>("name")?, row.get::<String>("checksum")?))
            })?
            .into_iter()
            .collect();

        let mut report = MigrationReport::default();
        for name in MIGRATION_ORDER {
            let sql = self.load_script(name)?;
            let checksum = script_checksum(&sql);
            match applied.get(name) {
                Some(recorded) if *recorded == checksum => {
                    report.skipped.push(name.to_string());
                    continue;
                }
                Some(_) => tracing::info!(script = name, "Migration changed since last run"),
                None => {}
            }

            let statements = split_statements(&sql);
            let mut unit: Vec<(&str, Vec<Value>)> = statements
                .iter()
                .map(|s| (s.as_str(), Vec::new()))
                .collect();
            unit.push((
                RECORD_MIGRATION,
                vec![text(name), text(&checksum), bind_timestamp(&Utc::now())],
            ));

            tracing::info!(script = name, statements = statements.len(), "Running migration");
            self.base
                .try_execute_all(&unit)
                .map_err(|e| migration_error(name, e))?;
            report.applied.push(name.to_string());
        }

        Ok(report)
    }

    fn load_script(&self, name: &str) -> Result<String> {
        if let Some(dir) = &self.scripts_dir {
            let path = dir.join(format!("{}.sql", name));
            if path.is_file() {
                tracing::debug!(path = %path.display(), "Loading migration from disk");
                return std::fs::read_to_string(&path).map_err(|e| migration_error(name, e.into()));
            }
        }

        EMBEDDED_SCRIPTS
            .iter()
            .find(|(script, _)| *script == name)
            .map(|(_, sql)| sql.to_string())
            .ok_or_else(|| {
                migration_error(
                    name,
                    Error::Config(format!("no script named {}.sql", name)),
                )
            })
    }
}

/// Hex SHA-256 of a script's text.
fn script_checksum(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    hex::encode(hasher.finalize())
}

fn migration_error(script: &str, source: Error) -> Error {
    Error::Migration {
        script: format!("{}.sql", script),
        source: Box::new(source),
    }
}

/// Split a script into statements: `--` comment lines are dropped, the rest
/// is split on `;` and blank pieces are skipped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let stripped: Vec<&str> = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect();

    stripped
        .join("\n")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Names of the tables the scripts create.
pub fn table_names() -> &'static [&'static str] {
    &MIGRATION_ORDER
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::SqliteConnection;

    fn setup() -> (Arc<dyn Connection>, Migrator) {
        crate::logging::init_test();
        let conn: Arc<dyn Connection> = Arc::new(SqliteConnection::open_in_memory().unwrap());
        let migrator = Migrator::new(Arc::clone(&conn));
        (conn, migrator)
    }

    fn index_exists(conn: &Arc<dyn Connection>, index: &str) -> bool {
        let rows = conn
            .query(
                "SELECT COUNT(*) AS c FROM sqlite_master WHERE type = 'index' AND name = ?1",
                &[text(index)],
            )
            .unwrap();
        rows[0].get::<i64>("c").unwrap() == 1
    }

    fn table_exists(conn: &Arc<dyn Connection>, table: &str) -> bool {
        let rows = conn
            .query(
                "SELECT COUNT(*) AS c FROM sqlite_master WHERE type = 'table' AND name = ?1",
                &[text(table)],
            )
            .unwrap();
        rows[0].get::<i64>("c").unwrap() == 1
    }

    #[test]
    fn test_split_statements() {
        let sql = "-- leading comment\nCREATE TABLE a (x INTEGER);\n\n  -- another\nCREATE INDEX i ON a(x);\n;\n";
        let statements = split_statements(sql);
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (x INTEGER)", "CREATE INDEX i ON a(x)"]
        );
    }

    #[test]
    fn test_tables_created() {
        let (conn, mut migrator) = setup();
        assert_eq!(migrator.state(), MigrationState::NotStarted);

        let report = migrator.migrate().unwrap();
        assert_eq!(migrator.state(), MigrationState::Completed);
        assert_eq!(report.applied, MIGRATION_ORDER.to_vec());

        for table in table_names() {
            assert!(table_exists(&conn, table), "Table {} should exist", table);
        }
        assert!(table_exists(&conn, "schema_migrations"));
    }

    #[test]
    fn test_migrations_idempotent() {
        let (_conn, mut migrator) = setup();
        migrator.migrate().unwrap();

        let second = migrator.migrate().unwrap();
        assert!(second.is_noop());
        assert_eq!(second.skipped.len(), MIGRATION_ORDER.len());
    }

    #[test]
    fn test_rerun_without_ledger_is_safe() {
        let (conn, mut migrator) = setup();
        migrator.migrate().unwrap();
        conn.execute("DELETE FROM schema_migrations", &[]).unwrap();

        let report = migrator.create_tables().unwrap();
        assert_eq!(report.applied.len(), MIGRATION_ORDER.len());
    }

    #[test]
    fn test_failed_script_stops_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("miners.sql"), "CREATE TABLE miners (;").unwrap();

        let (conn, migrator) = setup();
        let mut migrator = migrator.with_scripts_dir(Some(dir.path().to_path_buf()));

        match migrator.migrate() {
            Err(Error::Migration { script, .. }) => assert_eq!(script, "miners.sql"),
            other => panic!("expected migration error, got {:?}", other),
        }
        assert_eq!(migrator.state(), MigrationState::Failed);

        // The script before the failure stays applied
        assert!(table_exists(&conn, "repositories"));
        assert!(!table_exists(&conn, "miners"));
        assert!(!table_exists(&conn, "pull_requests"));
    }

    #[test]
    fn test_scripts_dir_without_override_uses_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, migrator) = setup();
        let mut migrator = migrator.with_scripts_dir(Some(dir.path().to_path_buf()));

        migrator.migrate().unwrap();
        assert!(table_exists(&conn, "file_changes"));
    }

    #[test]
    fn test_changed_script_is_reapplied() {
        let (conn, mut migrator) = setup();
        migrator.migrate().unwrap();
        assert!(!index_exists(&conn, "idx_pull_requests_author"));

        let dir = tempfile::tempdir().unwrap();
        let embedded = include_str!("sql/pull_requests.sql");
        std::fs::write(
            dir.path().join("pull_requests.sql"),
            format!(
                "{}\nCREATE INDEX IF NOT EXISTS idx_pull_requests_author ON pull_requests(author_login);\n",
                embedded
            ),
        )
        .unwrap();
        let mut migrator = migrator.with_scripts_dir(Some(dir.path().to_path_buf()));

        let report = migrator.migrate().unwrap();
        assert_eq!(report.applied, vec!["pull_requests"]);
        assert_eq!(report.skipped.len(), MIGRATION_ORDER.len() - 1);
        assert!(index_exists(&conn, "idx_pull_requests_author"));

        let rows = conn
            .query(
                "SELECT checksum FROM schema_migrations WHERE name = 'pull_requests'",
                &[],
            )
            .unwrap();
        let recorded: String = rows[0].get("checksum").unwrap();
        assert_ne!(recorded, script_checksum(embedded));

        assert!(migrator.migrate().unwrap().is_noop());
    }

    #[test]
    fn test_embedded_scripts_match_disk() {
        let dir = Migrator::default_scripts_dir();
        for (name, sql) in EMBEDDED_SCRIPTS {
            let on_disk = std::fs::read_to_string(dir.join(format!("{}.sql", name))).unwrap();
            assert_eq!(on_disk, sql, "{}.sql", name);
        }
    }

    #[test]
    fn test_foreign_keys() {
        let (conn, mut migrator) = setup();
        migrator.migrate().unwrap();

        for table in ["pull_requests", "issues", "file_changes"] {
            let rows = conn
                .query(&format!("PRAGMA foreign_key_list({})", table), &[])
                .unwrap();
            let targets: Vec<String> = rows.iter().map(|r| r.get("table").unwrap()).collect();
            assert_eq!(targets, vec!["repositories"], "{} references", table);
        }
    }

    #[test]
    fn test_full_name_check_constraint() {
        let (conn, mut migrator) = setup();
        migrator.migrate().unwrap();

        let bad = conn.execute(
            "INSERT INTO repositories (full_name, name, owner) VALUES ('a/b', 'c', 'a')",
            &[],
        );
        assert!(matches!(bad, Err(Error::Query(_))));
    }
}
