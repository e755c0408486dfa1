//! Registry of in-flight profilers, one per request.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{ProfilerError, Result};
use crate::options::ProfilerOptions;
use crate::profiler::{ProfileSession, Profiler, ProfilerScope};
use crate::storage::{MemoryStorage, Storage};

/// Hands out profilers, tracks the ones still running, and saves them when stopped.
///
/// Safe to share between threads; each request thread typically calls
/// [`start_scoped`](Self::start_scoped) and later [`stop`](Self::stop).
pub struct ProfilerProvider {
    options: Arc<ProfilerOptions>,
    storage: Arc<dyn Storage>,
    in_flight: RwLock<HashMap<Uuid, Arc<Profiler>>>,
}

impl ProfilerProvider {
    pub fn new(options: ProfilerOptions, storage: Arc<dyn Storage>) -> Self {
        Self {
            options: Arc::new(options),
            storage,
            in_flight: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_memory_storage(options: ProfilerOptions) -> Self {
        let storage = Arc::new(MemoryStorage::new(options.storage_cache_duration()));
        Self::new(options, storage)
    }

    #[inline]
    pub fn options(&self) -> &ProfilerOptions {
        &self.options
    }

    #[inline]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Starts and registers a profiler; `None` when profiling is disabled.
    pub fn start(&self, name: impl Into<String>) -> Option<Arc<Profiler>> {
        if !self.options.enabled {
            return None;
        }

        let profiler = Arc::new(Profiler::new(name, Arc::clone(&self.options)));
        self.in_flight
            .write()
            .insert(profiler.id(), Arc::clone(&profiler));

        crate::sqlprof_trace_session!("start", profiler.id());
        Some(profiler)
    }

    /// Like [`start`](Self::start), and makes the profiler current on this thread.
    pub fn start_scoped(&self, name: impl Into<String>) -> Option<(Arc<Profiler>, ProfilerScope)> {
        let profiler = self.start(name)?;
        let scope = ProfilerScope::enter(Arc::clone(&profiler));
        Some((profiler, scope))
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Profiler>> {
        self.in_flight.read().get(&id).cloned()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.read().len()
    }

    /// Stops a registered profiler and, unless `discard`, saves its session.
    ///
    /// Returns `Ok(None)` for a discarded session.
    pub fn stop(&self, id: Uuid, discard: bool) -> Result<Option<ProfileSession>> {
        let profiler = self
            .in_flight
            .write()
            .remove(&id)
            .ok_or(ProfilerError::NotFound(id))?;

        profiler.stop();
        if discard {
            return Ok(None);
        }

        let session = profiler.session();
        self.storage.save(&session)?;

        if let Some(user) = &session.user {
            self.storage.set_unviewed(user, session.id)?;
            self.trim_unviewed(user)?;
        }

        Ok(Some(session))
    }

    fn trim_unviewed(&self, user: &str) -> Result<()> {
        let unviewed = self.storage.unviewed_ids(user)?;
        let excess = unviewed
            .len()
            .saturating_sub(self.options.max_unviewed_profiles);
        for id in unviewed.into_iter().take(excess) {
            self.storage.set_viewed(user, id)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProfilerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilerProvider")
            .field("options", &self.options)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
