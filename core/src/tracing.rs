//! Tracing utilities for command, transaction and session observability.
//!
//! Enable the `tracing` feature to emit spans and events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate
//! at every call site.

/// Emit a debug-level tracing event with the command text and execute type.
///
/// ```ignore
/// sqlprof_trace_command!(sql, ExecuteType::NonQuery);
/// ```
#[macro_export]
macro_rules! sqlprof_trace_command {
    ($sql:expr, $execute_type:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql = %$sql, execute_type = %$execute_type, "sqlprof.command");
    };
}

/// Emit an info-level tracing event for transaction lifecycle
/// (begin, commit, rollback, release).
///
/// ```ignore
/// sqlprof_trace_tx!("begin", "sqlite.rusqlite");
/// ```
#[macro_export]
macro_rules! sqlprof_trace_tx {
    ($event:literal, $driver:expr) => {
        #[cfg(feature = "tracing")]
        tracing::info!(event = $event, driver = $driver, "sqlprof.transaction");
    };
}

/// Emit a debug-level tracing event for profiler session lifecycle.
#[macro_export]
macro_rules! sqlprof_trace_session {
    ($event:literal, $id:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(event = $event, id = %$id, "sqlprof.session");
    };
}

/// Emit a warn-level tracing event for an error that cannot be propagated,
/// such as a release failure inside `Drop`.
#[macro_export]
macro_rules! sqlprof_trace_dropped_error {
    ($what:literal, $err:expr) => {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %$err, $what);
        #[cfg(not(feature = "tracing"))]
        let _ = &$err;
    };
}
