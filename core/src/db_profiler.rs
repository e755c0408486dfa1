//! The seam between instrumented database wrappers and a timing collector.

use std::sync::Arc;

use crate::profiler::{CustomTimingGuard, Profiler};
use crate::timing::{ExecuteType, SQL_CATEGORY};

/// Receives timing events from profiled connections, commands and transactions.
///
/// `execute_start` returns a guard that records the duration when dropped;
/// `None` means the call is not being timed.
pub trait DbProfiler {
    fn is_active(&self) -> bool;

    fn execute_start(&self, command: &str, execute_type: ExecuteType)
    -> Option<CustomTimingGuard>;

    /// Whether connection open/close should be timed.
    fn tracks_open_close(&self) -> bool {
        true
    }
}

impl DbProfiler for Arc<Profiler> {
    fn is_active(&self) -> bool {
        Profiler::is_active(self)
    }

    fn execute_start(
        &self,
        command: &str,
        execute_type: ExecuteType,
    ) -> Option<CustomTimingGuard> {
        self.custom_timing(SQL_CATEGORY, command, execute_type)
    }

    fn tracks_open_close(&self) -> bool {
        self.options().track_connection_open_close
    }
}

/// Reports to whichever profiler is current on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct CurrentProfiler;

impl DbProfiler for CurrentProfiler {
    fn is_active(&self) -> bool {
        Profiler::current().is_some_and(|profiler| profiler.is_active())
    }

    fn execute_start(
        &self,
        command: &str,
        execute_type: ExecuteType,
    ) -> Option<CustomTimingGuard> {
        Profiler::current()?.execute_start(command, execute_type)
    }

    fn tracks_open_close(&self) -> bool {
        Profiler::current().is_some_and(|profiler| profiler.tracks_open_close())
    }
}

/// Never times anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProfiler;

impl DbProfiler for NoopProfiler {
    fn is_active(&self) -> bool {
        false
    }

    fn execute_start(&self, _: &str, _: ExecuteType) -> Option<CustomTimingGuard> {
        None
    }

    fn tracks_open_close(&self) -> bool {
        false
    }
}

impl<P: DbProfiler> DbProfiler for Option<P> {
    fn is_active(&self) -> bool {
        self.as_ref().is_some_and(P::is_active)
    }

    fn execute_start(
        &self,
        command: &str,
        execute_type: ExecuteType,
    ) -> Option<CustomTimingGuard> {
        self.as_ref()?.execute_start(command, execute_type)
    }

    fn tracks_open_close(&self) -> bool {
        self.as_ref().is_some_and(P::tracks_open_close)
    }
}

impl<P: DbProfiler + ?Sized> DbProfiler for &P {
    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn execute_start(
        &self,
        command: &str,
        execute_type: ExecuteType,
    ) -> Option<CustomTimingGuard> {
        (**self).execute_start(command, execute_type)
    }

    fn tracks_open_close(&self) -> bool {
        (**self).tracks_open_close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ProfilerOptions;
    use crate::profiler::ProfilerScope;

    #[test]
    fn test_current_profiler_follows_scope() {
        let profiler = Arc::new(Profiler::new("req", Arc::new(ProfilerOptions::default())));
        assert!(!CurrentProfiler.is_active());
        assert!(CurrentProfiler.execute_start("SELECT 1", ExecuteType::Scalar).is_none());

        {
            let _scope = ProfilerScope::enter(Arc::clone(&profiler));
            assert!(CurrentProfiler.is_active());
            let _timing = CurrentProfiler.execute_start("SELECT 1", ExecuteType::Scalar);
        }

        let session = profiler.session();
        assert_eq!(session.root.custom_timings[SQL_CATEGORY].len(), 1);
    }

    #[test]
    fn test_noop_and_option() {
        assert!(!NoopProfiler.is_active());
        assert!(NoopProfiler.execute_start("x", ExecuteType::None).is_none());

        let none: Option<Arc<Profiler>> = None;
        assert!(!none.is_active());
        assert!(!none.tracks_open_close());

        let options = ProfilerOptions::default().with_track_connection_open_close(false);
        let some = Some(Arc::new(Profiler::new("req", Arc::new(options))));
        assert!(some.is_active());
        assert!(!some.tracks_open_close());
    }
}
