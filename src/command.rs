use sqlprof_core::DbProfiler;

use crate::connection::ProfiledConnection;
use crate::driver::{Connection, Row, Value};

/// SQL text plus bound parameters, executed through a [`ProfiledConnection`].
///
/// ```ignore
/// let rows = conn
///     .command("SELECT name FROM users WHERE id = ?1")
///     .bind(42)
///     .execute_reader()?;
/// ```
#[derive(Debug)]
pub struct ProfiledCommand<'c, C, P> {
    connection: &'c ProfiledConnection<C, P>,
    sql: String,
    params: Vec<Value>,
}

impl<'c, C, P> ProfiledCommand<'c, C, P>
where
    C: Connection,
    P: DbProfiler,
{
    pub(crate) fn new(connection: &'c ProfiledConnection<C, P>, sql: impl Into<String>) -> Self {
        Self {
            connection,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Appends a positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    #[inline]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[inline]
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    #[inline]
    pub fn connection(&self) -> &'c ProfiledConnection<C, P> {
        self.connection
    }

    /// Runs the command and returns the number of affected rows
    pub fn execute_non_query(&self) -> Result<usize, C::Error> {
        self.connection.execute(&self.sql, &self.params)
    }

    /// Runs the command and returns the first column of the first row
    pub fn execute_scalar(&self) -> Result<Option<Value>, C::Error> {
        self.connection.query_scalar(&self.sql, &self.params)
    }

    /// Runs the command and returns all rows
    pub fn execute_reader(&self) -> Result<Vec<Row>, C::Error> {
        self.connection.query(&self.sql, &self.params)
    }
}
