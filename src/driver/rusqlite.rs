//! Synchronous SQLite driver using [`rusqlite`].
//!
//! # Example
//!
//! ```no_run
//! use sqlprof::driver::rusqlite::SqliteConnection;
//! use sqlprof::prelude::*;
//!
//! fn main() -> Result<(), rusqlite::Error> {
//!     let conn = ProfiledConnection::new(SqliteConnection::open("./app.db")?, CurrentProfiler);
//!     conn.execute("CREATE TABLE IF NOT EXISTS users (name TEXT)", &[])?;
//!
//!     conn.transaction(IsolationLevel::Unspecified, |tx| {
//!         tx.connection()
//!             .command("INSERT INTO users (name) VALUES (?1)")
//!             .bind("Alice")
//!             .execute_non_query()?;
//!         Ok::<_, rusqlite::Error>(())
//!     })?;
//!     Ok(())
//! }
//! ```

use std::path::Path;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{OptionalExtension, params_from_iter};

use crate::driver::{Connection, IsolationLevel, Row, Transaction, Value};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(
                String::from_utf8(t.to_vec()).map_err(|e| FromSqlError::Other(Box::new(e)))?,
            ),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        })
    }
}

/// A rusqlite connection implementing [`Connection`].
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        rusqlite::Connection::open(path).map(Self::from_raw)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        rusqlite::Connection::open_in_memory().map(Self::from_raw)
    }

    pub const fn from_raw(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Gets a reference to the underlying connection
    #[inline]
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl From<rusqlite::Connection> for SqliteConnection {
    fn from(conn: rusqlite::Connection) -> Self {
        Self::from_raw(conn)
    }
}

impl Connection for SqliteConnection {
    type Error = rusqlite::Error;
    type Transaction<'c> = SqliteTransaction<'c>;

    const DRIVER: &'static str = "sqlite.rusqlite";

    fn execute(&self, sql: &str, params: &[Value]) -> rusqlite::Result<usize> {
        self.conn.execute(sql, params_from_iter(params))
    }

    fn query(&self, sql: &str, params: &[Value]) -> rusqlite::Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = stmt.column_count();

        let rows = stmt.query_map(params_from_iter(params), |row| {
            (0..columns)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Row>>()
        })?;

        rows.collect()
    }

    fn query_scalar(&self, sql: &str, params: &[Value]) -> rusqlite::Result<Option<Value>> {
        self.conn
            .query_row(sql, params_from_iter(params), |row| row.get::<_, Value>(0))
            .optional()
    }

    fn begin(&self, level: IsolationLevel) -> rusqlite::Result<SqliteTransaction<'_>> {
        // SQLite is always serializable; the stricter levels take the write
        // lock up front instead of on first write.
        let sql = match level {
            IsolationLevel::RepeatableRead
            | IsolationLevel::Serializable
            | IsolationLevel::Snapshot => "BEGIN IMMEDIATE",
            _ => "BEGIN DEFERRED",
        };
        self.conn.execute_batch(sql)?;

        Ok(SqliteTransaction {
            conn: self,
            level,
            state: TxState::Active,
        })
    }

    fn close(self) -> rusqlite::Result<()> {
        self.conn.close().map_err(|(_, e)| e)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TxState {
    Active,
    Finished,
    Released,
}

/// A transaction driven by `BEGIN`/`COMMIT`/`ROLLBACK` on a borrowed connection.
///
/// Dropping an active transaction rolls it back. Once committed, rolled back
/// or released, further commit/rollback calls fail with `SQLITE_MISUSE`.
#[derive(Debug)]
pub struct SqliteTransaction<'c> {
    conn: &'c SqliteConnection,
    level: IsolationLevel,
    state: TxState,
}

impl<'c> SqliteTransaction<'c> {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == TxState::Active
    }

    // The connection is shared, so a finished handle must not issue
    // COMMIT/ROLLBACK: it would end whichever transaction is open now.
    fn ensure_active(&self) -> rusqlite::Result<()> {
        if self.is_active() {
            return Ok(());
        }
        Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_MISUSE),
            Some("transaction already finished".to_string()),
        ))
    }
}

impl<'c> Transaction for SqliteTransaction<'c> {
    type Error = rusqlite::Error;
    type Connection = SqliteConnection;

    fn connection(&self) -> &SqliteConnection {
        self.conn
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.level
    }

    fn commit(&mut self) -> rusqlite::Result<()> {
        self.ensure_active()?;
        self.conn.conn.execute_batch("COMMIT")?;
        self.state = TxState::Finished;
        Ok(())
    }

    fn rollback(&mut self) -> rusqlite::Result<()> {
        self.ensure_active()?;
        self.conn.conn.execute_batch("ROLLBACK")?;
        self.state = TxState::Finished;
        Ok(())
    }

    fn release(&mut self) -> rusqlite::Result<()> {
        let was_active = self.state == TxState::Active;
        self.state = TxState::Released;
        if was_active {
            self.conn.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.is_active() {
            return;
        }
        if let Err(e) = self.release() {
            sqlprof_core::sqlprof_trace_dropped_error!("sqlite transaction release failed", e);
        }
    }
}
