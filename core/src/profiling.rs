//! Profiling utilities for sqlprof operations
//!
//! Mirrors timed database work into the puffin profiler when the "profiling"
//! feature is enabled, so the same calls that land in a [`crate::Profiler`]
//! timing tree also show up in a puffin frame.

/// Re-export puffin macros for convenience
#[cfg(feature = "profiling")]
pub use puffin::{profile_function, profile_scope};

/// Generic profiling scope macro for high-level operation instrumentation.
#[macro_export]
macro_rules! sqlprof_profile_scope {
    ($category:literal, $operation:literal) => {
        #[cfg(feature = "profiling")]
        puffin::profile_scope!($category, $operation);
    };
}

/// Profiling scope carrying the command text as scope data.
#[macro_export]
macro_rules! sqlprof_profile_command {
    ($category:literal, $command:expr) => {
        #[cfg(feature = "profiling")]
        puffin::profile_scope!($category, $command);
    };
}
