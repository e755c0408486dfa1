//! Serializable timing tree: [`Timing`] nodes carrying [`CustomTiming`]s.

use std::collections::BTreeMap;
use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category under which database commands are recorded.
pub const SQL_CATEGORY: &str = "sql";

/// What kind of call a [`CustomTiming`] measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecuteType {
    #[default]
    None,
    NonQuery,
    Scalar,
    Reader,
    Open,
    Close,
    Commit,
    Rollback,
}

impl ExecuteType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ExecuteType::None => "none",
            ExecuteType::NonQuery => "nonquery",
            ExecuteType::Scalar => "scalar",
            ExecuteType::Reader => "reader",
            ExecuteType::Open => "open",
            ExecuteType::Close => "close",
            ExecuteType::Commit => "commit",
            ExecuteType::Rollback => "rollback",
        }
    }
}

impl fmt::Display for ExecuteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timed call to something outside the process, usually a database command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomTiming {
    pub id: Uuid,
    pub command_string: String,
    pub execute_type: ExecuteType,
    /// Offset from the profiler start.
    pub start_milliseconds: f64,
    /// `None` while the call is still running.
    pub duration_milliseconds: Option<f64>,
    #[serde(default)]
    pub errored: bool,
}

/// Count and total duration of the custom timings in one category.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CustomTimingStats {
    pub count: usize,
    pub duration_milliseconds: f64,
}

/// One node of the timing tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Timing {
    pub id: Uuid,
    pub name: String,
    pub start_milliseconds: f64,
    pub duration_milliseconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Timing>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_timings: BTreeMap<String, Vec<CustomTiming>>,
}

impl Timing {
    #[inline]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    #[inline]
    pub fn has_custom_timings(&self) -> bool {
        self.custom_timings.values().any(|timings| !timings.is_empty())
    }

    /// A timing is trivial when it finished faster than `threshold_ms`.
    /// Unfinished timings are never trivial.
    pub fn is_trivial(&self, threshold_ms: f64) -> bool {
        self.duration_milliseconds
            .is_some_and(|duration| duration < threshold_ms)
    }

    pub fn duration_without_children_milliseconds(&self) -> f64 {
        let own = self.duration_milliseconds.unwrap_or(0.0);
        let children: f64 = self
            .children
            .iter()
            .filter_map(|child| child.duration_milliseconds)
            .sum();
        (own - children).max(0.0)
    }

    pub fn custom_timing_stats(&self) -> BTreeMap<&str, CustomTimingStats> {
        self.custom_timings
            .iter()
            .map(|(category, timings)| {
                let stats = CustomTimingStats {
                    count: timings.len(),
                    duration_milliseconds: timings
                        .iter()
                        .filter_map(|t| t.duration_milliseconds)
                        .sum(),
                };
                (category.as_str(), stats)
            })
            .collect()
    }

    /// Command strings run more than once in the same category of this timing.
    ///
    /// Timings whose execute type is in `ignored` are not counted.
    pub fn duplicate_custom_timings(&self, ignored: &[ExecuteType]) -> Vec<&str> {
        let mut duplicates = Vec::new();
        for timings in self.custom_timings.values() {
            let mut seen: HashMap<&str, usize> = HashMap::new();
            for timing in timings {
                if ignored.contains(&timing.execute_type) {
                    continue;
                }
                let count = seen.entry(timing.command_string.as_str()).or_default();
                *count += 1;
                if *count == 2 {
                    duplicates.push(timing.command_string.as_str());
                }
            }
        }
        duplicates
    }

    /// Depth-first iterator over this timing and all of its descendants.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Timing>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Timing;

    fn next(&mut self) -> Option<Self::Item> {
        let timing = self.stack.pop()?;
        self.stack.extend(timing.children.iter().rev());
        Some(timing)
    }
}
