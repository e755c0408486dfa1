//! The per-request profiler and its RAII guards.
//!
//! A [`Profiler`] owns a tree of timings. [`Profiler::step`] opens a child of
//! the current head and moves the head down; dropping the returned [`Step`]
//! closes it and moves the head back up. Custom timings (database commands)
//! attach to whatever step is the head when they start.
//!
//! ```
//! use std::sync::Arc;
//! use sqlprof_core::{ExecuteType, Profiler, ProfilerOptions};
//!
//! let profiler = Arc::new(Profiler::new("GET /users", Arc::new(ProfilerOptions::default())));
//! {
//!     let _load = profiler.step("load users");
//!     let _query = profiler.custom_timing("sql", "SELECT * FROM users", ExecuteType::Reader);
//! }
//! profiler.stop();
//!
//! let session = profiler.session();
//! assert_eq!(session.root.children[0].name, "load users");
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::options::ProfilerOptions;
use crate::timing::{CustomTiming, ExecuteType, SQL_CATEGORY, Timing};

const ROOT: usize = 0;

thread_local! {
    static CURRENT: RefCell<Option<Arc<Profiler>>> = const { RefCell::new(None) };
}

#[derive(Debug)]
struct Node {
    id: Uuid,
    name: String,
    parent: Option<usize>,
    start: Duration,
    duration: Option<Duration>,
    children: Vec<usize>,
    custom_timings: BTreeMap<String, Vec<usize>>,
}

#[derive(Debug)]
struct State {
    nodes: Vec<Node>,
    custom_timings: Vec<CustomTiming>,
    head: usize,
    stopped: bool,
    suppressed: usize,
    user: Option<String>,
}

impl State {
    /// Nearest ancestor of `index` that is still open.
    fn open_ancestor(&self, index: usize) -> usize {
        let mut cursor = self.nodes[index].parent;
        while let Some(parent) = cursor {
            if self.nodes[parent].duration.is_none() {
                return parent;
            }
            cursor = self.nodes[parent].parent;
        }
        ROOT
    }

    fn build(&self, index: usize) -> Timing {
        let node = &self.nodes[index];
        let custom_timings = node
            .custom_timings
            .iter()
            .map(|(category, indices)| {
                let timings = indices
                    .iter()
                    .map(|&i| self.custom_timings[i].clone())
                    .collect();
                (category.clone(), timings)
            })
            .collect();

        Timing {
            id: node.id,
            name: node.name.clone(),
            start_milliseconds: millis(node.start),
            duration_milliseconds: node.duration.map(millis),
            children: node.children.iter().map(|&c| self.build(c)).collect(),
            custom_timings,
        }
    }
}

#[inline]
fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Request-scoped timing collector.
#[derive(Debug)]
pub struct Profiler {
    id: Uuid,
    name: String,
    started: DateTime<Utc>,
    clock: Instant,
    machine_name: String,
    options: Arc<ProfilerOptions>,
    state: Mutex<State>,
}

impl Profiler {
    pub fn new(name: impl Into<String>, options: Arc<ProfilerOptions>) -> Self {
        let name = name.into();
        let root = Node {
            id: Uuid::new_v4(),
            name: name.clone(),
            parent: None,
            start: Duration::ZERO,
            duration: None,
            children: Vec::new(),
            custom_timings: BTreeMap::new(),
        };

        Self {
            id: Uuid::new_v4(),
            name,
            started: Utc::now(),
            clock: Instant::now(),
            machine_name: options.resolved_machine_name(),
            options,
            state: Mutex::new(State {
                nodes: vec![root],
                custom_timings: Vec::new(),
                head: ROOT,
                stopped: false,
                suppressed: 0,
                user: None,
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    #[inline]
    pub fn options(&self) -> &ProfilerOptions {
        &self.options
    }

    pub fn is_active(&self) -> bool {
        !self.state.lock().stopped
    }

    pub fn set_user(&self, user: impl Into<String>) {
        self.state.lock().user = Some(user.into());
    }

    pub fn user(&self) -> Option<String> {
        self.state.lock().user.clone()
    }

    /// The thread's current profiler, installed by a [`ProfilerScope`].
    pub fn current() -> Option<Arc<Profiler>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Opens a child step of the current head.
    ///
    /// Returns `None` once the profiler is stopped or while suppressed.
    pub fn step(self: &Arc<Self>, name: impl Into<String>) -> Option<Step> {
        let start = self.clock.elapsed();
        let mut state = self.state.lock();
        if state.stopped || state.suppressed > 0 {
            return None;
        }

        let index = state.nodes.len();
        let parent = state.head;
        state.nodes.push(Node {
            id: Uuid::new_v4(),
            name: name.into(),
            parent: Some(parent),
            start,
            duration: None,
            children: Vec::new(),
            custom_timings: BTreeMap::new(),
        });
        state.nodes[parent].children.push(index);
        state.head = index;

        Some(Step {
            profiler: Arc::clone(self),
            index,
            done: false,
        })
    }

    /// Starts a custom timing on the current head under `category`.
    pub fn custom_timing(
        self: &Arc<Self>,
        category: &str,
        command: impl Into<String>,
        execute_type: ExecuteType,
    ) -> Option<CustomTimingGuard> {
        let start = self.clock.elapsed();
        let mut state = self.state.lock();
        if state.stopped || state.suppressed > 0 {
            return None;
        }

        let index = state.custom_timings.len();
        state.custom_timings.push(CustomTiming {
            id: Uuid::new_v4(),
            command_string: command.into(),
            execute_type,
            start_milliseconds: millis(start),
            duration_milliseconds: None,
            errored: false,
        });
        let head = state.head;
        state.nodes[head]
            .custom_timings
            .entry(category.to_string())
            .or_default()
            .push(index);

        Some(CustomTimingGuard {
            profiler: Arc::clone(self),
            index,
            start,
            done: false,
        })
    }

    /// Suppresses steps and custom timings until the guard is dropped.
    pub fn ignore(self: &Arc<Self>) -> Suppression {
        self.state.lock().suppressed += 1;
        Suppression {
            profiler: Arc::clone(self),
        }
    }

    /// Stops the profiler, closing every open timing at this instant.
    ///
    /// Returns `false` if it was already stopped.
    pub fn stop(&self) -> bool {
        let now = self.clock.elapsed();
        let mut state = self.state.lock();
        if state.stopped {
            return false;
        }

        for node in state.nodes.iter_mut().filter(|n| n.duration.is_none()) {
            node.duration = Some(now.saturating_sub(node.start));
        }
        state.head = ROOT;
        state.stopped = true;

        crate::sqlprof_trace_session!("stop", self.id);
        true
    }

    /// Immutable snapshot of everything recorded so far.
    pub fn session(&self) -> ProfileSession {
        let elapsed = self.clock.elapsed();
        let state = self.state.lock();
        let root = state.build(ROOT);

        ProfileSession {
            id: self.id,
            name: self.name.clone(),
            started: self.started,
            duration_milliseconds: root.duration_milliseconds.unwrap_or(millis(elapsed)),
            machine_name: self.machine_name.clone(),
            user: state.user.clone(),
            has_user_viewed: false,
            root,
        }
    }

    /// Whether any finished timing beat the configured
    /// `trivial_duration_threshold_ms`.
    pub fn has_trivial_timings(&self) -> bool {
        self.session()
            .has_trivial_timings(self.options.trivial_duration_threshold_ms)
    }

    fn close_step(&self, index: usize) {
        let now = self.clock.elapsed();
        let mut state = self.state.lock();
        if state.stopped || state.nodes[index].duration.is_some() {
            return;
        }

        let start = state.nodes[index].start;
        state.nodes[index].duration = Some(now.saturating_sub(start));

        // An inner step left open keeps the head; otherwise climb to the
        // nearest still-open ancestor.
        let head = state.head;
        if head == index || state.nodes[head].duration.is_some() {
            state.head = state.open_ancestor(index);
        }
    }

    fn close_custom_timing(&self, index: usize, start: Duration) {
        let now = self.clock.elapsed();
        let mut state = self.state.lock();
        let timing = &mut state.custom_timings[index];
        if timing.duration_milliseconds.is_none() {
            timing.duration_milliseconds = Some(millis(now.saturating_sub(start)));
        }
    }
}

/// Opens a step on the thread's current profiler, if there is one.
pub fn step(name: impl Into<String>) -> Option<Step> {
    Profiler::current().and_then(|profiler| profiler.step(name))
}

/// An open step; closes on drop.
#[must_use = "a step closes as soon as it is dropped"]
#[derive(Debug)]
pub struct Step {
    profiler: Arc<Profiler>,
    index: usize,
    done: bool,
}

impl Step {
    pub fn stop(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            self.profiler.close_step(self.index);
        }
    }
}

impl Drop for Step {
    fn drop(&mut self) {
        self.finish();
    }
}

/// A running custom timing; records its duration once, on drop or [`stop`](Self::stop).
#[must_use = "a custom timing stops as soon as it is dropped"]
#[derive(Debug)]
pub struct CustomTimingGuard {
    profiler: Arc<Profiler>,
    index: usize,
    start: Duration,
    done: bool,
}

impl CustomTimingGuard {
    /// Flags the timed call as failed.
    pub fn errored(&self) {
        self.profiler.state.lock().custom_timings[self.index].errored = true;
    }

    pub fn stop(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            self.profiler.close_custom_timing(self.index, self.start);
        }
    }
}

impl Drop for CustomTimingGuard {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Keeps a profiler from recording while alive.
#[derive(Debug)]
pub struct Suppression {
    profiler: Arc<Profiler>,
}

impl Drop for Suppression {
    fn drop(&mut self) {
        let mut state = self.profiler.state.lock();
        state.suppressed = state.suppressed.saturating_sub(1);
    }
}

/// Installs a profiler as the thread's current one until dropped,
/// then restores whatever was current before.
#[must_use = "the profiler is only current while the scope is alive"]
#[derive(Debug)]
pub struct ProfilerScope {
    previous: Option<Arc<Profiler>>,
    // Tied to the thread whose slot it swapped.
    _not_send: PhantomData<*const ()>,
}

impl ProfilerScope {
    pub fn enter(profiler: Arc<Profiler>) -> Self {
        let previous = CURRENT.with(|current| current.replace(Some(profiler)));
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ProfilerScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// A finished (or in-progress) profiling session, ready to store or serialize.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProfileSession {
    pub id: Uuid,
    pub name: String,
    pub started: DateTime<Utc>,
    pub duration_milliseconds: f64,
    pub machine_name: String,
    pub user: Option<String>,
    pub has_user_viewed: bool,
    pub root: Timing,
}

impl ProfileSession {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Every timing in the tree, depth first, starting at the root.
    pub fn all_timings(&self) -> impl Iterator<Item = &Timing> {
        self.root.descendants()
    }

    /// Total time spent in `"sql"` custom timings across the tree.
    pub fn sql_duration_milliseconds(&self) -> f64 {
        self.all_timings()
            .filter_map(|timing| timing.custom_timings.get(SQL_CATEGORY))
            .flatten()
            .filter_map(|custom| custom.duration_milliseconds)
            .sum()
    }

    pub fn has_trivial_timings(&self, threshold_ms: f64) -> bool {
        self.all_timings().any(|timing| timing.is_trivial(threshold_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiler(name: &str) -> Arc<Profiler> {
        Arc::new(Profiler::new(name, Arc::new(ProfilerOptions::default())))
    }

    #[test]
    fn test_trivial_threshold_comes_from_options() {
        let strict = Arc::new(Profiler::new(
            "strict",
            Arc::new(ProfilerOptions::default().with_trivial_duration_threshold_ms(0.0)),
        ));
        if let Some(step) = strict.step("quick") {
            step.stop();
        }
        strict.stop();
        assert!(!strict.has_trivial_timings());

        let lenient = Arc::new(Profiler::new(
            "lenient",
            Arc::new(ProfilerOptions::default().with_trivial_duration_threshold_ms(60_000.0)),
        ));
        if let Some(step) = lenient.step("quick") {
            step.stop();
        }
        lenient.stop();
        assert!(lenient.has_trivial_timings());
    }

    #[test]
    fn test_steps_nest() {
        let profiler = profiler("request");
        {
            let _outer = profiler.step("outer");
            {
                let _inner = profiler.step("inner");
            }
            let _sibling = profiler.step("sibling");
        }
        profiler.stop();

        let session = profiler.session();
        assert_eq!(session.root.name, "request");
        assert_eq!(session.root.children.len(), 1);

        let outer = &session.root.children[0];
        assert_eq!(outer.name, "outer");
        let names: Vec<&str> = outer.children.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["inner", "sibling"]);
        assert!(session.all_timings().all(|t| t.duration_milliseconds.unwrap() >= 0.0));
    }

    #[test]
    fn test_custom_timing_attaches_to_head() {
        let profiler = profiler("request");
        {
            let _step = profiler.step("load");
            let guard = profiler
                .custom_timing(SQL_CATEGORY, "SELECT 1", ExecuteType::Scalar)
                .unwrap();
            guard.errored();
        }
        profiler.stop();

        let session = profiler.session();
        let load = &session.root.children[0];
        let sql = &load.custom_timings[SQL_CATEGORY];
        assert_eq!(sql.len(), 1);
        assert_eq!(sql[0].command_string, "SELECT 1");
        assert_eq!(sql[0].execute_type, ExecuteType::Scalar);
        assert!(sql[0].errored);
        assert!(sql[0].duration_milliseconds.is_some());
        assert!(!session.root.has_custom_timings());
    }

    #[test]
    fn test_stop_is_idempotent_and_closes_open_steps() {
        let profiler = profiler("request");
        let step = profiler.step("left open");

        assert!(profiler.stop());
        assert!(!profiler.stop());
        assert!(!profiler.is_active());
        assert!(profiler.step("late").is_none());
        assert!(
            profiler
                .custom_timing(SQL_CATEGORY, "SELECT 1", ExecuteType::Scalar)
                .is_none()
        );
        drop(step);

        let session = profiler.session();
        assert!(session.root.children[0].duration_milliseconds.is_some());
        assert_eq!(
            session.duration_milliseconds,
            session.root.duration_milliseconds.unwrap()
        );
    }

    #[test]
    fn test_out_of_order_drop_keeps_inner_head() {
        let profiler = profiler("request");
        let outer = profiler.step("outer").unwrap();
        let inner = profiler.step("inner").unwrap();

        outer.stop();
        let _query = profiler.custom_timing(SQL_CATEGORY, "SELECT 2", ExecuteType::Reader);
        inner.stop();
        let _after = profiler.step("after");
        drop(_after);
        profiler.stop();

        let session = profiler.session();
        let outer = &session.root.children[0];
        let inner = &outer.children[0];
        assert!(inner.custom_timings.contains_key(SQL_CATEGORY));
        assert_eq!(session.root.children[1].name, "after");
    }

    #[test]
    fn test_ignore_suppresses_recording() {
        let profiler = profiler("request");
        {
            let _quiet = profiler.ignore();
            assert!(profiler.step("hidden").is_none());
            assert!(
                profiler
                    .custom_timing(SQL_CATEGORY, "SELECT 1", ExecuteType::Scalar)
                    .is_none()
            );
        }
        assert!(profiler.step("visible").is_some());
    }

    #[test]
    fn test_current_scope_restores_previous() {
        assert!(Profiler::current().is_none());
        let first = profiler("first");
        let second = profiler("second");

        let outer = ProfilerScope::enter(Arc::clone(&first));
        assert_eq!(Profiler::current().unwrap().id(), first.id());
        {
            let _inner = ProfilerScope::enter(Arc::clone(&second));
            assert_eq!(Profiler::current().unwrap().id(), second.id());
            let _step = step("via current");
        }
        assert_eq!(Profiler::current().unwrap().id(), first.id());
        drop(outer);
        assert!(Profiler::current().is_none());

        assert_eq!(second.session().root.children[0].name, "via current");
        assert!(step("no profiler").is_none());
    }

    #[test]
    fn test_session_json_round_trip() {
        let profiler = profiler("GET /");
        profiler.set_user("alice");
        {
            let _step = profiler.step("render");
            let _sql = profiler.custom_timing(SQL_CATEGORY, "SELECT 1", ExecuteType::Scalar);
        }
        profiler.stop();

        let session = profiler.session();
        let json = session.to_json().unwrap();
        assert!(json.contains("\"DurationMilliseconds\""));
        assert!(json.contains("\"CommandString\":\"SELECT 1\""));

        let parsed = ProfileSession::from_json(&json).unwrap();
        assert_eq!(parsed, session);
        assert_eq!(parsed.user.as_deref(), Some("alice"));
        assert!(parsed.sql_duration_milliseconds() >= 0.0);
    }
}
