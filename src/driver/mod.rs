//! Capability traits every driver family implements.
//!
//! The profiled wrappers are generic over these traits, so adding a driver
//! means implementing [`Connection`] and [`Transaction`] once; the wrappers
//! then instrument it without knowing anything about it.

#[cfg(feature = "rusqlite")]
pub mod rusqlite;

/// A single column value passed to or read from a driver.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// One result row, in column order.
pub type Row = Vec<Value>;

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Transaction isolation requested when beginning a transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    #[default]
    Unspecified,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Snapshot,
}

/// A live connection to a data store.
pub trait Connection {
    type Error: std::error::Error;

    type Transaction<'c>: Transaction<Error = Self::Error>
    where
        Self: 'c;

    /// Label used in tracing events, e.g. `"sqlite.rusqlite"`.
    const DRIVER: &'static str;

    /// Runs a statement and returns the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, Self::Error>;

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Self::Error>;

    /// First column of the first row, or `None` when there are no rows.
    fn query_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>, Self::Error>;

    fn begin(&self, level: IsolationLevel) -> Result<Self::Transaction<'_>, Self::Error>;

    fn close(self) -> Result<(), Self::Error>
    where
        Self: Sized;
}

/// A unit of work started on a [`Connection`].
///
/// `commit`, `rollback` and `release` take `&mut self` so that a wrapper can
/// keep forwarding after the delegate has finished; what a finished
/// transaction does with a late call is up to the driver.
pub trait Transaction {
    type Error: std::error::Error;

    /// The connection this transaction reports as its owner.
    type Connection: ?Sized;

    fn connection(&self) -> &Self::Connection;

    fn isolation_level(&self) -> IsolationLevel;

    fn commit(&mut self) -> Result<(), Self::Error>;

    fn rollback(&mut self) -> Result<(), Self::Error>;

    /// Releases the underlying resource, rolling back uncommitted work.
    fn release(&mut self) -> Result<(), Self::Error>;
}
