#![allow(dead_code)]

use std::sync::Arc;

use sqlprof::{Profiler, ProfilerOptions};

pub mod fake;

#[cfg(feature = "rusqlite")]
mod rusqlite;
#[cfg(feature = "rusqlite")]
pub use self::rusqlite::*;

pub fn profiler(name: &str) -> Arc<Profiler> {
    Arc::new(Profiler::new(name, Arc::new(ProfilerOptions::default())))
}
