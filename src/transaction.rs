//! Transparent wrapper around a driver transaction.
//!
//! [`ProfiledTransaction`] forwards every call to the transaction it wraps
//! and changes nothing about the outcome: the delegate's errors come back as
//! the same values, late calls after release are still forwarded, and the
//! only thing the wrapper checks itself is that it was given both halves at
//! construction. What it adds is timing (commit and rollback show up as
//! custom timings on the owning connection's profiler) and a
//! [`connection`](ProfiledTransaction::connection) that answers with the
//! *profiled* connection, so that work issued through it stays instrumented.
//!
//! Lifecycle: active → committed or rolled back → released. Release happens
//! exactly once, either through [`release`](ProfiledTransaction::release) or
//! when the wrapper is dropped.

use sqlprof_core::{DbProfiler, ExecuteType, ProfilerError};

use crate::connection::{ProfiledConnection, timed};
use crate::driver::{Connection, IsolationLevel, Transaction};

/// Transaction wrapper owned by a [`ProfiledConnection`].
pub struct ProfiledTransaction<'c, C, P>
where
    C: Connection + 'c,
{
    inner: C::Transaction<'c>,
    connection: &'c ProfiledConnection<C, P>,
    released: bool,
}

impl<'c, C, P> ProfiledTransaction<'c, C, P>
where
    C: Connection + 'c,
    P: DbProfiler,
{
    /// Wraps `transaction`, reporting `connection` as its owner.
    pub fn new(transaction: C::Transaction<'c>, connection: &'c ProfiledConnection<C, P>) -> Self {
        Self {
            inner: transaction,
            connection,
            released: false,
        }
    }

    /// Like [`new`](Self::new) for callers holding possibly-absent parts.
    ///
    /// # Errors
    ///
    /// [`ProfilerError::InvalidArgument`] naming `"transaction"` or
    /// `"connection"`, whichever is missing first.
    pub fn try_new(
        transaction: Option<C::Transaction<'c>>,
        connection: Option<&'c ProfiledConnection<C, P>>,
    ) -> Result<Self, ProfilerError> {
        let transaction = transaction.ok_or(ProfilerError::InvalidArgument {
            param: "transaction",
        })?;
        let connection = connection.ok_or(ProfilerError::InvalidArgument {
            param: "connection",
        })?;
        Ok(Self::new(transaction, connection))
    }

    /// Gets a reference to the wrapped transaction
    #[inline]
    pub fn inner(&self) -> &C::Transaction<'c> {
        &self.inner
    }

    /// The profiled connection this transaction belongs to.
    #[inline]
    pub fn connection(&self) -> &'c ProfiledConnection<C, P> {
        self.connection
    }

    #[inline]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.inner.isolation_level()
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Commits the transaction
    pub fn commit(&mut self) -> Result<(), C::Error> {
        sqlprof_core::sqlprof_trace_tx!("commit", C::DRIVER);
        let inner = &mut self.inner;
        timed(self.connection.profiler(), "COMMIT", ExecuteType::Commit, || {
            inner.commit()
        })
    }

    /// Rolls back the transaction
    pub fn rollback(&mut self) -> Result<(), C::Error> {
        sqlprof_core::sqlprof_trace_tx!("rollback", C::DRIVER);
        let inner = &mut self.inner;
        timed(self.connection.profiler(), "ROLLBACK", ExecuteType::Rollback, || {
            inner.rollback()
        })
    }

    /// Releases the wrapped transaction.
    ///
    /// Only the first call reaches the delegate; later calls return `Ok(())`.
    pub fn release(&mut self) -> Result<(), C::Error> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        sqlprof_core::sqlprof_trace_tx!("release", C::DRIVER);
        sqlprof_core::sqlprof_profile_scope!("sqlprof.transaction", "release");
        self.inner.release()
    }
}

impl<'c, C, P> Transaction for ProfiledTransaction<'c, C, P>
where
    C: Connection + 'c,
    P: DbProfiler,
{
    type Error = C::Error;
    type Connection = ProfiledConnection<C, P>;

    fn connection(&self) -> &ProfiledConnection<C, P> {
        self.connection
    }

    fn isolation_level(&self) -> IsolationLevel {
        ProfiledTransaction::isolation_level(self)
    }

    fn commit(&mut self) -> Result<(), C::Error> {
        ProfiledTransaction::commit(self)
    }

    fn rollback(&mut self) -> Result<(), C::Error> {
        ProfiledTransaction::rollback(self)
    }

    fn release(&mut self) -> Result<(), C::Error> {
        ProfiledTransaction::release(self)
    }
}

impl<'c, C, P> Drop for ProfiledTransaction<'c, C, P>
where
    C: Connection + 'c,
{
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.inner.release() {
            sqlprof_core::sqlprof_trace_dropped_error!("transaction release failed", e);
        }
    }
}

impl<'c, C, P> std::fmt::Debug for ProfiledTransaction<'c, C, P>
where
    C: Connection + 'c,
    C::Transaction<'c>: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfiledTransaction")
            .field("inner", &self.inner)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
