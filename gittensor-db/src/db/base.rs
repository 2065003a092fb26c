//! Shared repository plumbing
//!
//! [`BaseRepository`] owns a reference to the shared [`Connection`] and
//! provides the three primitives every entity repository is built from:
//! single-row reads, multi-row reads and committed writes.
//!
//! Writes come in two flavours. The `try_` methods return the cause of a
//! failure; the plain methods log it and report `false` / `0`, which is what
//! most callers (best-effort persistence after a scoring round) want.

use super::connection::{Connection, Row};
use super::queries::BulkStatement;
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use std::sync::Arc;

/// Rows per multi-row `INSERT`
pub const BULK_PAGE_SIZE: usize = 100;

/// Open transaction on a shared connection.
///
/// Rolled back on drop unless [`UnitOfWork::commit`] was called, so an early
/// return or a panic between `begin` and `commit` never leaves a half-applied
/// write behind.
pub struct UnitOfWork<'a> {
    conn: &'a dyn Connection,
    finished: bool,
}

impl<'a> UnitOfWork<'a> {
    pub fn begin(conn: &'a dyn Connection) -> Result<Self> {
        conn.begin()?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.conn.execute(sql, params)
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        if let Err(e) = self.conn.commit() {
            let _ = self.conn.rollback();
            return Err(e);
        }
        Ok(())
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.rollback() {
                tracing::error!(error = %e, "Rollback failed");
            }
        }
    }
}

/// Connection-scoped helpers shared by the entity repositories.
#[derive(Clone)]
pub struct BaseRepository {
    conn: Arc<dyn Connection>,
    component: &'static str,
}

impl BaseRepository {
    /// `component` names the owning repository in log output.
    pub fn new(conn: Arc<dyn Connection>, component: &'static str) -> Self {
        Self { conn, component }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// At most one row, mapped. Zero rows is `Ok(None)`.
    pub fn query_one<T, F>(&self, sql: &str, params: &[Value], mapper: F) -> Result<Option<T>>
    where
        F: Fn(&Row) -> Result<T>,
    {
        let rows = self.conn.query(sql, params)?;
        rows.first().map(mapper).transpose()
    }

    /// Every row, mapped, in the order storage returned them.
    pub fn query_many<T, F>(&self, sql: &str, params: &[Value], mapper: F) -> Result<Vec<T>>
    where
        F: Fn(&Row) -> Result<T>,
    {
        self.conn.query(sql, params)?.iter().map(mapper).collect()
    }

    /// Unmapped rows, for readers that fold several rows into one entity.
    pub fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.conn.query(sql, params)
    }

    /// Run one write in its own transaction. Returns the affected row count.
    pub fn try_execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let tx = UnitOfWork::begin(self.conn.as_ref())?;
        let affected = tx.execute(sql, params)?;
        tx.commit()?;
        Ok(affected)
    }

    /// Best-effort [`BaseRepository::try_execute`]: `false` after logging and
    /// rolling back on any failure.
    pub fn execute(&self, sql: &str, params: &[Value]) -> bool {
        self.report("execute", self.try_execute(sql, params)).is_some()
    }

    /// Run several writes as one unit of work.
    pub fn try_execute_all(&self, statements: &[(&str, Vec<Value>)]) -> Result<usize> {
        let tx = UnitOfWork::begin(self.conn.as_ref())?;
        let mut affected = 0;
        for (sql, params) in statements {
            affected += tx.execute(sql, params)?;
        }
        tx.commit()?;
        Ok(affected)
    }

    /// Multi-row insert of `rows`, paged by [`BULK_PAGE_SIZE`], all pages in
    /// one transaction.
    ///
    /// Returns the number of rows submitted. Rows skipped by a `DO NOTHING`
    /// conflict clause are still counted. Empty input touches nothing.
    pub fn execute_bulk(&self, stmt: &BulkStatement, rows: Vec<Vec<Value>>) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != stmt.columns) {
            return Err(Error::InvalidValue(format!(
                "bulk row has {} values, statement expects {}",
                bad.len(),
                stmt.columns
            )));
        }

        let submitted = rows.len();
        let tx = UnitOfWork::begin(self.conn.as_ref())?;
        for page in rows.chunks(BULK_PAGE_SIZE) {
            let sql = stmt.render(page.len());
            let params: Vec<Value> = page.iter().flatten().cloned().collect();
            tx.execute(&sql, &params)?;
        }
        tx.commit()?;

        tracing::debug!(component = self.component, rows = submitted, "Bulk insert committed");
        Ok(submitted)
    }

    /// Log a failed operation and turn the result into an `Option`.
    pub fn report<T>(&self, operation: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(
                    component = self.component,
                    operation,
                    error = %e,
                    "Database write failed"
                );
                None
            }
        }
    }
}

// ============================================
// Binding and decoding helpers
// ============================================

/// Narrow a miner uid to the storage integer.
pub fn bind_uid(uid: u64) -> Result<Value> {
    i64::try_from(uid)
        .map(Value::Integer)
        .map_err(|_| Error::InvalidValue(format!("uid {} does not fit a storage integer", uid)))
}

/// Read a uid column back.
pub fn decode_uid(row: &Row, column: &str) -> Result<u64> {
    let raw: i64 = row.get(column)?;
    u64::try_from(raw).map_err(|_| Error::decode(column, format!("negative uid {}", raw)))
}

pub fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

pub fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::Text(v.to_string()))
}

/// Fixed-width RFC 3339 (`2024-01-15T10:30:00.000000Z`). Sub-microsecond
/// digits are truncated, so a value read back equals
/// `ts.trunc_subsecs(6)`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn bind_timestamp(ts: &DateTime<Utc>) -> Value {
    Value::Text(format_timestamp(ts))
}

pub fn bind_opt_timestamp(ts: Option<&DateTime<Utc>>) -> Value {
    ts.map_or(Value::Null, bind_timestamp)
}

/// Parse a stored timestamp. Accepts RFC 3339 and SQLite's
/// `CURRENT_TIMESTAMP` format (UTC, no offset).
pub fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::decode(column, format!("bad timestamp {:?}: {}", raw, e)))
}

pub fn decode_timestamp(row: &Row, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_timestamp(column, &raw)
}

pub fn decode_opt_timestamp(row: &Row, column: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| parse_timestamp(column, &s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::SqliteConnection;
    use chrono::TimeZone;

    fn setup() -> BaseRepository {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE t (k TEXT PRIMARY KEY, v INTEGER NOT NULL)",
            &[],
        )
        .unwrap();
        BaseRepository::new(Arc::new(conn), "test")
    }

    fn map_kv(row: &Row) -> Result<(String, i64)> {
        Ok((row.get("k")?, row.get("v")?))
    }

    #[test]
    fn test_query_one_absent_is_none() {
        let base = setup();
        let found = base
            .query_one("SELECT k, v FROM t WHERE k = ?1", &[text("x")], map_kv)
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_query_many_preserves_order() {
        let base = setup();
        for (k, v) in [("b", 2), ("a", 1), ("c", 3)] {
            assert!(base.execute(
                "INSERT INTO t (k, v) VALUES (?1, ?2)",
                &[text(k), Value::Integer(v)]
            ));
        }

        let rows = base
            .query_many("SELECT k, v FROM t ORDER BY v DESC", &[], map_kv)
            .unwrap();
        let keys: Vec<_> = rows.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_execute_failure_returns_false_and_rolls_back() {
        let base = setup();
        // NOT NULL violation
        assert!(!base.execute(
            "INSERT INTO t (k, v) VALUES (?1, NULL)",
            &[text("x")]
        ));
        assert!(base.try_execute("INSERT INTO t (k, v) VALUES ('x', NULL)", &[]).is_err());

        // Connection is usable afterwards, with nothing left open
        assert!(base.execute(
            "INSERT INTO t (k, v) VALUES (?1, ?2)",
            &[text("x"), Value::Integer(1)]
        ));
    }

    #[test]
    fn test_execute_all_is_atomic() {
        let base = setup();
        let result = base.try_execute_all(&[
            ("INSERT INTO t (k, v) VALUES ('a', 1)", vec![]),
            ("INSERT INTO t (k, v) VALUES ('a', 2)", vec![]),
        ]);
        assert!(result.is_err());

        let count = base
            .query_one("SELECT COUNT(*) AS c FROM t", &[], |r| r.get::<i64>("c"))
            .unwrap();
        assert_eq!(count, Some(0));
    }

    #[test]
    fn test_execute_bulk_pages_and_counts() {
        let base = setup();
        let stmt = BulkStatement {
            head: "INSERT INTO t (k, v) VALUES",
            columns: 2,
            tail: "ON CONFLICT (k) DO NOTHING",
        };
        let rows: Vec<Vec<Value>> = (0..250)
            .map(|i| vec![text(format!("k{}", i % 240)), Value::Integer(i)])
            .collect();

        // Submitted count includes the 10 ignored duplicates
        assert_eq!(base.execute_bulk(&stmt, rows).unwrap(), 250);
        let count = base
            .query_one("SELECT COUNT(*) AS c FROM t", &[], |r| r.get::<i64>("c"))
            .unwrap();
        assert_eq!(count, Some(240));

        assert_eq!(base.execute_bulk(&stmt, Vec::new()).unwrap(), 0);
    }

    #[test]
    fn test_execute_bulk_rejects_ragged_rows() {
        let base = setup();
        let stmt = BulkStatement {
            head: "INSERT INTO t (k, v) VALUES",
            columns: 2,
            tail: "ON CONFLICT (k) DO NOTHING",
        };
        let err = base.execute_bulk(&stmt, vec![vec![text("k")]]).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[test]
    fn test_bind_uid_bounds() {
        assert_eq!(bind_uid(42).unwrap(), Value::Integer(42));
        assert!(matches!(bind_uid(u64::MAX), Err(Error::InvalidValue(_))));
    }

    #[test]
    fn test_timestamp_formats() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let stored = format_timestamp(&ts);
        assert_eq!(stored, "2024-01-15T10:30:00.000000Z");
        assert_eq!(parse_timestamp("c", &stored).unwrap(), ts);
        assert_eq!(parse_timestamp("c", "2024-01-15 10:30:00").unwrap(), ts);
        assert!(matches!(
            parse_timestamp("c", "yesterday"),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_timestamp_truncates_to_microseconds() {
        use chrono::{Duration, SubsecRound};

        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
            + Duration::nanoseconds(123_456_789);
        let stored = format_timestamp(&ts);
        assert_eq!(stored, "2024-01-15T10:30:00.123456Z");

        let read_back = parse_timestamp("c", &stored).unwrap();
        assert_ne!(read_back, ts);
        assert_eq!(read_back, ts.trunc_subsecs(6));
    }
}
