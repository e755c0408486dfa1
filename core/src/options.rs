//! Profiler configuration
//!
//! Options are plain data with defaults for every field, so a TOML file only
//! has to name what it changes:
//!
//! ```toml
//! trivial_duration_threshold_ms = 5.0
//! max_unviewed_profiles = 50
//! ignored_duplicate_execute_types = ["open", "close", "commit"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProfilerError, Result};
use crate::timing::ExecuteType;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilerOptions {
    /// When false, providers hand out no profilers at all.
    pub enabled: bool,
    /// Timings faster than this are considered trivial.
    pub trivial_duration_threshold_ms: f64,
    /// Execute types excluded from duplicate detection.
    pub ignored_duplicate_execute_types: Vec<ExecuteType>,
    /// Record `open`/`close` timings for profiled connections.
    pub track_connection_open_close: bool,
    /// Maximum unviewed sessions remembered per user.
    pub max_unviewed_profiles: usize,
    /// How long in-memory storage keeps a session.
    pub storage_cache_duration_secs: u64,
    /// Reported machine name; `HOSTNAME` or `"unknown"` when unset.
    pub machine_name: Option<String>,
}

impl Default for ProfilerOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            trivial_duration_threshold_ms: 2.0,
            ignored_duplicate_execute_types: vec![
                ExecuteType::Open,
                ExecuteType::Close,
                ExecuteType::Commit,
                ExecuteType::Rollback,
            ],
            track_connection_open_close: true,
            max_unviewed_profiles: 20,
            storage_cache_duration_secs: 30 * 60,
            machine_name: None,
        }
    }
}

impl ProfilerOptions {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| ProfilerError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProfilerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_trivial_duration_threshold_ms(mut self, threshold: f64) -> Self {
        self.trivial_duration_threshold_ms = threshold;
        self
    }

    pub fn with_ignored_duplicate_execute_types(
        mut self,
        types: impl IntoIterator<Item = ExecuteType>,
    ) -> Self {
        self.ignored_duplicate_execute_types = types.into_iter().collect();
        self
    }

    pub fn with_track_connection_open_close(mut self, track: bool) -> Self {
        self.track_connection_open_close = track;
        self
    }

    pub fn with_max_unviewed_profiles(mut self, max: usize) -> Self {
        self.max_unviewed_profiles = max;
        self
    }

    pub fn with_storage_cache_duration(mut self, duration: Duration) -> Self {
        self.storage_cache_duration_secs = duration.as_secs();
        self
    }

    pub fn with_machine_name(mut self, name: impl Into<String>) -> Self {
        self.machine_name = Some(name.into());
        self
    }

    #[inline]
    pub fn storage_cache_duration(&self) -> Duration {
        Duration::from_secs(self.storage_cache_duration_secs)
    }

    pub fn resolved_machine_name(&self) -> String {
        self.machine_name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
