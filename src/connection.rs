use sqlprof_core::{DbProfiler, ExecuteType};

use crate::command::ProfiledCommand;
use crate::driver::{Connection, IsolationLevel, Row, Value};
use crate::transaction::ProfiledTransaction;

/// Runs `f` as a timed call on `profiler`, flagging the timing when it fails.
///
/// The result is returned untouched.
pub(crate) fn timed<P, T, E>(
    profiler: &P,
    command: &str,
    execute_type: ExecuteType,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E>
where
    P: DbProfiler + ?Sized,
{
    sqlprof_core::sqlprof_trace_command!(command, execute_type);
    sqlprof_core::sqlprof_profile_command!("sqlprof.command", command);

    let timing = profiler.execute_start(command, execute_type);
    let result = f();
    if let (Err(_), Some(timing)) = (&result, &timing) {
        timing.errored();
    }
    result
}

/// Connection wrapper that times every call through it.
///
/// Commands, transactions and the connection's own open/close are reported
/// to `P` as custom timings; results and errors are those of the wrapped
/// connection, unchanged.
#[derive(Debug)]
pub struct ProfiledConnection<C, P = sqlprof_core::CurrentProfiler> {
    inner: C,
    profiler: P,
}

impl<C, P> ProfiledConnection<C, P>
where
    C: Connection,
    P: DbProfiler,
{
    pub const fn new(inner: C, profiler: P) -> Self {
        Self { inner, profiler }
    }

    /// Opens the connection through `open`, timing it as `open`.
    pub fn open_with<E>(profiler: P, open: impl FnOnce() -> Result<C, E>) -> Result<Self, E> {
        let inner = if profiler.tracks_open_close() {
            timed(&profiler, "Connection Open()", ExecuteType::Open, open)?
        } else {
            open()?
        };
        Ok(Self::new(inner, profiler))
    }

    /// Gets a reference to the underlying connection
    #[inline]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    #[inline]
    pub fn into_inner(self) -> C {
        self.inner
    }

    #[inline]
    pub fn profiler(&self) -> &P {
        &self.profiler
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, C::Error> {
        timed(&self.profiler, sql, ExecuteType::NonQuery, || {
            self.inner.execute(sql, params)
        })
    }

    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, C::Error> {
        timed(&self.profiler, sql, ExecuteType::Reader, || {
            self.inner.query(sql, params)
        })
    }

    pub fn query_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>, C::Error> {
        timed(&self.profiler, sql, ExecuteType::Scalar, || {
            self.inner.query_scalar(sql, params)
        })
    }

    /// Creates a command bound to this connection.
    pub fn command(&self, sql: impl Into<String>) -> ProfiledCommand<'_, C, P> {
        ProfiledCommand::new(self, sql)
    }

    /// Begins a transaction whose [`connection`](ProfiledTransaction::connection)
    /// is this wrapper.
    pub fn begin_transaction(
        &self,
        level: IsolationLevel,
    ) -> Result<ProfiledTransaction<'_, C, P>, C::Error> {
        sqlprof_core::sqlprof_trace_tx!("begin", C::DRIVER);
        sqlprof_core::sqlprof_profile_scope!("sqlprof.transaction", "begin");
        let tx = self.inner.begin(level)?;
        Ok(ProfiledTransaction::new(tx, self))
    }

    /// Executes a transaction with the given callback
    ///
    /// Commits when the callback returns `Ok`, rolls back when it returns
    /// `Err` or panics.
    pub fn transaction<'c, F, R, E>(&'c self, level: IsolationLevel, f: F) -> Result<R, E>
    where
        F: FnOnce(&ProfiledTransaction<'c, C, P>) -> Result<R, E>,
        E: From<C::Error>,
    {
        let mut transaction = self.begin_transaction(level)?;

        let result =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&transaction)));

        match result {
            Ok(callback_result) => match callback_result {
                Ok(value) => {
                    transaction.commit()?;
                    Ok(value)
                }
                Err(e) => {
                    transaction.rollback()?;
                    Err(e)
                }
            },
            Err(panic_payload) => {
                let _ = transaction.rollback();
                std::panic::resume_unwind(panic_payload);
            }
        }
    }

    /// Closes the underlying connection, timing it as `close`.
    pub fn close(self) -> Result<(), C::Error> {
        let Self { inner, profiler } = self;
        if profiler.tracks_open_close() {
            timed(&profiler, "Connection Close()", ExecuteType::Close, || {
                inner.close()
            })
        } else {
            inner.close()
        }
    }
}

impl<C, P> Connection for ProfiledConnection<C, P>
where
    C: Connection,
    P: DbProfiler,
{
    type Error = C::Error;
    type Transaction<'c>
        = ProfiledTransaction<'c, C, P>
    where
        Self: 'c;

    const DRIVER: &'static str = C::DRIVER;

    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, C::Error> {
        ProfiledConnection::execute(self, sql, params)
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, C::Error> {
        ProfiledConnection::query(self, sql, params)
    }

    fn query_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>, C::Error> {
        ProfiledConnection::query_scalar(self, sql, params)
    }

    fn begin(&self, level: IsolationLevel) -> Result<ProfiledTransaction<'_, C, P>, C::Error> {
        self.begin_transaction(level)
    }

    fn close(self) -> Result<(), C::Error> {
        ProfiledConnection::close(self)
    }
}
