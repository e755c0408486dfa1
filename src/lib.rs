//! # sqlprof
//!
//! Request-scoped database profiling. Wrap a driver connection in a
//! [`ProfiledConnection`], run your request under a profiler, and every
//! command, commit and rollback lands in that request's timing tree.
//!
//! ## Quick Start
//!
//! ```rust
//! # #[cfg(feature = "rusqlite")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use sqlprof::prelude::*;
//! use sqlprof::driver::rusqlite::SqliteConnection;
//!
//! let provider = ProfilerProvider::with_memory_storage(ProfilerOptions::default());
//! let (profiler, _scope) = provider.start_scoped("GET /users").unwrap();
//!
//! let conn = ProfiledConnection::new(SqliteConnection::open_in_memory()?, CurrentProfiler);
//! {
//!     let _step = sqlprof::step("create schema");
//!     conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[])?;
//! }
//! conn.transaction(IsolationLevel::Unspecified, |tx| {
//!     tx.connection()
//!         .command("INSERT INTO users (name) VALUES (?1)")
//!         .bind("Alice")
//!         .execute_non_query()?;
//!     Ok::<_, rusqlite::Error>(())
//! })?;
//!
//! let session = provider.stop(profiler.id(), false)?.unwrap();
//! assert_eq!(session.root.children[0].name, "create schema");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "rusqlite"))]
//! # fn main() {}
//! ```
//!
//! ## Database Support
//!
//! | Database   | Driver         | Feature Flag     |
//! |------------|----------------|------------------|
//! | SQLite     | rusqlite       | `rusqlite`       |
//!
//! Other drivers plug in by implementing [`driver::Connection`] and
//! [`driver::Transaction`].

mod command;
mod connection;
pub mod driver;
mod transaction;

// =============================================================================
// Root-level exports
// =============================================================================

pub use command::ProfiledCommand;
pub use connection::ProfiledConnection;
pub use transaction::ProfiledTransaction;

/// Result type for profiler operations
pub use sqlprof_core::Result;

/// Error types
pub mod error {
    pub use sqlprof_core::ProfilerError;
}

pub use sqlprof_core::{
    CurrentProfiler, CustomTiming, DbProfiler, ExecuteType, ListOrder, MemoryStorage,
    NoopProfiler, ProfileSession, Profiler, ProfilerOptions, ProfilerProvider, ProfilerScope,
    SQL_CATEGORY, Step, Storage, Timing, step,
};

/// Core timing model, re-exported whole.
pub use sqlprof_core as core;

pub mod prelude {
    pub use crate::driver::{Connection, IsolationLevel, Row, Transaction, Value};
    pub use crate::{ProfiledCommand, ProfiledConnection, ProfiledTransaction};
    pub use sqlprof_core::{
        CurrentProfiler, DbProfiler, ExecuteType, NoopProfiler, Profiler, ProfilerOptions,
        ProfilerProvider, ProfilerScope,
    };
}
