//! Connection handle shared by every repository
//!
//! Repositories never talk to SQLite directly: they go through the
//! [`Connection`] trait so that a test can hand them a recording double and a
//! host can wrap its own pooled handle. [`SqliteConnection`] is the shipped
//! implementation.

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use rusqlite::types::{FromSql, Value, ValueRef};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Storage handle with positional parameters and explicit transaction
/// boundaries.
///
/// A handle serves one logical caller at a time: `begin`/`commit` pairs
/// from two threads on the same handle would interleave.
pub trait Connection: Send + Sync {
    /// Run a statement that produces rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement that produces no rows. Returns the affected row count.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;
}

/// One result row, detached from the statement that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Values pair with columns by position. A column without a value
    /// decodes as an error rather than as NULL.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw value of a column.
    pub fn value(&self, column: &str) -> Result<&Value> {
        let index = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| Error::decode(column, "no such column in result"))?;
        self.values
            .get(index)
            .ok_or_else(|| Error::decode(column, "row has no value for column"))
    }

    /// Typed value of a column. Missing columns and type mismatches are
    /// decode errors naming the column.
    pub fn get<T: FromSql>(&self, column: &str) -> Result<T> {
        let value = self.value(column)?;
        T::column_result(ValueRef::from(value)).map_err(|e| Error::decode(column, e))
    }

    pub fn is_null(&self, column: &str) -> Result<bool> {
        Ok(matches!(self.value(column)?, Value::Null))
    }
}

/// SQLite-backed [`Connection`].
pub struct SqliteConnection {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteConnection {
    /// Open or create a database file.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, Duration::from_millis(5000))
    }

    /// Open the database described by `config`.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::open_with_timeout(
            &config.resolved_path(),
            Duration::from_millis(config.busy_timeout_ms),
        )
    }

    fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = rusqlite::Connection::open(path).map_err(|e| {
            Error::ConnectionUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        tracing::debug!(path = %path.display(), "Opened SQLite database");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| Error::ConnectionUnavailable(e.to_string()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::ConnectionUnavailable("connection lock poisoned".to_string()))
    }
}

impl Connection for SqliteConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();

        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, Value>(i)?);
            }
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        Ok(stmt.execute(rusqlite::params_from_iter(params.iter()))?)
    }

    fn begin(&self) -> Result<()> {
        self.lock()?.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.lock()?.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let conn = self.lock()?;
        // Nothing to undo when SQLite already ended the transaction itself
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

/// Open the configured database and run a trivial statement.
pub fn check_connection(config: &DatabaseConfig) -> bool {
    let result = SqliteConnection::from_config(config)
        .and_then(|conn| conn.query("SELECT 1 AS ok", &[]));
    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(error = %e, "Database connection check failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_returns_named_columns() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        let rows = conn
            .query(
                "SELECT ?1 AS n, ?2 AS s, NULL AS missing",
                &[Value::Integer(7), Value::Text("x".into())],
            )
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.columns(), &["n", "s", "missing"]);
        assert_eq!(row.get::<i64>("n").unwrap(), 7);
        assert_eq!(row.get::<String>("s").unwrap(), "x");
        assert_eq!(row.get::<Option<String>>("missing").unwrap(), None);
        assert!(row.is_null("missing").unwrap());
    }

    #[test]
    fn test_row_decode_errors_name_column() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        let rows = conn.query("SELECT 'abc' AS n", &[]).unwrap();

        match rows[0].get::<i64>("n") {
            Err(Error::Decode { column, .. }) => assert_eq!(column, "n"),
            other => panic!("expected decode error, got {:?}", other),
        }
        match rows[0].get::<i64>("absent") {
            Err(Error::Decode { column, .. }) => assert_eq!(column, "absent"),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_short_row_is_decode_error() {
        let columns: Arc<[String]> = vec!["uid".to_string(), "hotkey".to_string()].into();
        let row = Row::new(columns, vec![Value::Integer(3)]);

        assert_eq!(row.get::<i64>("uid").unwrap(), 3);
        match row.get::<String>("hotkey") {
            Err(Error::Decode { column, .. }) => assert_eq!(column, "hotkey"),
            other => panic!("expected decode error, got {:?}", other),
        }
        assert!(matches!(row.is_null("hotkey"), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_rollback_discards_changes() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (v INTEGER)", &[]).unwrap();

        conn.begin().unwrap();
        conn.execute("INSERT INTO t (v) VALUES (?1)", &[Value::Integer(1)])
            .unwrap();
        conn.rollback().unwrap();

        let rows = conn.query("SELECT COUNT(*) AS c FROM t", &[]).unwrap();
        assert_eq!(rows[0].get::<i64>("c").unwrap(), 0);

        // Rolling back with no open transaction is harmless
        conn.rollback().unwrap();
    }

    #[test]
    fn test_malformed_statement_is_query_error() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        assert!(matches!(
            conn.query("SELEC nonsense", &[]),
            Err(Error::Query(_))
        ));
    }

    #[test]
    fn test_check_connection() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: Some(dir.path().join("nested/check.db")),
            ..Default::default()
        };
        assert!(check_connection(&config));
    }
}
