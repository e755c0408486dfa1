//! Core of sqlprof: the timing tree, per-request profilers, the profiler
//! registry and session storage. Driver-agnostic; database wrappers live in
//! the `sqlprof` crate and report here through [`DbProfiler`].

pub mod db_profiler;
pub mod error;
pub mod options;
pub mod profiler;
pub mod profiling;
pub mod provider;
pub mod storage;
pub mod timing;
pub mod tracing;

// Re-export key types and traits
pub use db_profiler::{CurrentProfiler, DbProfiler, NoopProfiler};
pub use error::{ProfilerError, Result};
pub use options::ProfilerOptions;
pub use profiler::{
    CustomTimingGuard, ProfileSession, Profiler, ProfilerScope, Step, Suppression, step,
};
pub use provider::ProfilerProvider;
pub use storage::{ListOrder, MemoryStorage, Storage};
pub use timing::{CustomTiming, CustomTimingStats, ExecuteType, SQL_CATEGORY, Timing};
