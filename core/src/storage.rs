//! Storage for finished profiling sessions.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::profiler::ProfileSession;

/// Ordering for [`Storage::list`], by session start time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListOrder {
    #[default]
    Descending,
    Ascending,
}

pub trait Storage: Send + Sync {
    fn save(&self, session: &ProfileSession) -> Result<()>;

    fn load(&self, id: Uuid) -> Result<Option<ProfileSession>>;

    /// Ids of at most `max` sessions started within `[start, finish]`.
    fn list(
        &self,
        max: usize,
        start: Option<DateTime<Utc>>,
        finish: Option<DateTime<Utc>>,
        order: ListOrder,
    ) -> Result<Vec<Uuid>>;

    fn set_unviewed(&self, user: &str, id: Uuid) -> Result<()>;

    fn set_viewed(&self, user: &str, id: Uuid) -> Result<()>;

    /// Unviewed ids for `user`, oldest first.
    fn unviewed_ids(&self, user: &str) -> Result<Vec<Uuid>>;
}

struct Entry {
    session: ProfileSession,
    saved_at: Instant,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, Entry>,
    by_started: BTreeSet<(DateTime<Utc>, Uuid)>,
    unviewed: HashMap<String, Vec<Uuid>>,
}

impl Inner {
    fn purge_expired(&mut self, cache_duration: Duration) {
        let expired: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|(_, entry)| entry.saved_at.elapsed() > cache_duration)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(entry) = self.sessions.remove(&id) {
                self.by_started.remove(&(entry.session.started, id));
            }
            for ids in self.unviewed.values_mut() {
                ids.retain(|unviewed| *unviewed != id);
            }
        }
    }
}

/// Keeps sessions in memory for a sliding cache duration.
///
/// A session expires once `cache_duration` passes without it being saved,
/// loaded, or marked viewed or unviewed.
pub struct MemoryStorage {
    cache_duration: Duration,
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new(cache_duration: Duration) -> Self {
        Self {
            cache_duration,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn len(&self) -> usize {
        let mut inner = self.inner.write();
        inner.purge_expired(self.cache_duration);
        inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("cache_duration", &self.cache_duration)
            .field("sessions", &self.inner.read().sessions.len())
            .finish()
    }
}

impl Storage for MemoryStorage {
    fn save(&self, session: &ProfileSession) -> Result<()> {
        let mut inner = self.inner.write();
        inner.purge_expired(self.cache_duration);

        if let Some(previous) = inner.sessions.insert(
            session.id,
            Entry {
                session: session.clone(),
                saved_at: Instant::now(),
            },
        ) {
            inner.by_started.remove(&(previous.session.started, session.id));
        }
        inner.by_started.insert((session.started, session.id));
        Ok(())
    }

    fn load(&self, id: Uuid) -> Result<Option<ProfileSession>> {
        let mut inner = self.inner.write();
        inner.purge_expired(self.cache_duration);
        Ok(inner.sessions.get_mut(&id).map(|entry| {
            entry.saved_at = Instant::now();
            entry.session.clone()
        }))
    }

    fn list(
        &self,
        max: usize,
        start: Option<DateTime<Utc>>,
        finish: Option<DateTime<Utc>>,
        order: ListOrder,
    ) -> Result<Vec<Uuid>> {
        let mut inner = self.inner.write();
        inner.purge_expired(self.cache_duration);

        let in_range = |(started, _): &&(DateTime<Utc>, Uuid)| {
            start.is_none_or(|s| *started >= s) && finish.is_none_or(|f| *started <= f)
        };
        let ids = match order {
            ListOrder::Ascending => inner
                .by_started
                .iter()
                .filter(in_range)
                .take(max)
                .map(|(_, id)| *id)
                .collect(),
            ListOrder::Descending => inner
                .by_started
                .iter()
                .rev()
                .filter(in_range)
                .take(max)
                .map(|(_, id)| *id)
                .collect(),
        };
        Ok(ids)
    }

    // Ids of sessions that are not (or no longer) stored are not recorded.
    fn set_unviewed(&self, user: &str, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write();
        inner.purge_expired(self.cache_duration);

        let Some(entry) = inner.sessions.get_mut(&id) else {
            return Ok(());
        };
        entry.session.has_user_viewed = false;
        entry.saved_at = Instant::now();

        let ids = inner.unviewed.entry(user.to_string()).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
        Ok(())
    }

    fn set_viewed(&self, user: &str, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write();
        inner.purge_expired(self.cache_duration);

        if let Some(ids) = inner.unviewed.get_mut(user) {
            ids.retain(|unviewed| *unviewed != id);
        }
        if let Some(entry) = inner.sessions.get_mut(&id) {
            entry.session.has_user_viewed = true;
            entry.saved_at = Instant::now();
        }
        Ok(())
    }

    fn unviewed_ids(&self, user: &str) -> Result<Vec<Uuid>> {
        let mut inner = self.inner.write();
        inner.purge_expired(self.cache_duration);
        Ok(inner.unviewed.get(user).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::Timing;
    use std::collections::BTreeMap;

    fn session(started: DateTime<Utc>) -> ProfileSession {
        ProfileSession {
            id: Uuid::new_v4(),
            name: "GET /".to_string(),
            started,
            duration_milliseconds: 1.0,
            machine_name: "test".to_string(),
            user: None,
            has_user_viewed: false,
            root: Timing {
                id: Uuid::new_v4(),
                name: "GET /".to_string(),
                start_milliseconds: 0.0,
                duration_milliseconds: Some(1.0),
                children: Vec::new(),
                custom_timings: BTreeMap::new(),
            },
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let storage = MemoryStorage::new(Duration::from_secs(60));
        let s = session(at(0));
        storage.save(&s).unwrap();

        assert_eq!(storage.load(s.id).unwrap(), Some(s));
        assert_eq!(storage.load(Uuid::new_v4()).unwrap(), None);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_list_order_range_and_max() {
        let storage = MemoryStorage::new(Duration::from_secs(60));
        let sessions: Vec<_> = (0..4).map(|i| session(at(i * 10))).collect();
        for s in &sessions {
            storage.save(s).unwrap();
        }

        let desc = storage.list(10, None, None, ListOrder::Descending).unwrap();
        assert_eq!(desc, sessions.iter().rev().map(|s| s.id).collect::<Vec<_>>());

        let asc = storage.list(2, None, None, ListOrder::Ascending).unwrap();
        assert_eq!(asc, vec![sessions[0].id, sessions[1].id]);

        let ranged = storage
            .list(10, Some(at(10)), Some(at(20)), ListOrder::Ascending)
            .unwrap();
        assert_eq!(ranged, vec![sessions[1].id, sessions[2].id]);
    }

    #[test]
    fn test_viewed_tracking() {
        let storage = MemoryStorage::new(Duration::from_secs(60));
        let a = session(at(0));
        let b = session(at(1));
        storage.save(&a).unwrap();
        storage.save(&b).unwrap();

        storage.set_unviewed("alice", a.id).unwrap();
        storage.set_unviewed("alice", b.id).unwrap();
        storage.set_unviewed("alice", b.id).unwrap();
        assert_eq!(storage.unviewed_ids("alice").unwrap(), vec![a.id, b.id]);
        assert!(storage.unviewed_ids("bob").unwrap().is_empty());

        storage.set_viewed("alice", a.id).unwrap();
        assert_eq!(storage.unviewed_ids("alice").unwrap(), vec![b.id]);
        assert!(storage.load(a.id).unwrap().unwrap().has_user_viewed);
    }

    #[test]
    fn test_expired_sessions_are_purged() {
        let storage = MemoryStorage::new(Duration::from_millis(50));
        let s = session(at(0));
        storage.save(&s).unwrap();
        storage.set_unviewed("alice", s.id).unwrap();
        assert_eq!(storage.unviewed_ids("alice").unwrap(), vec![s.id]);

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(storage.load(s.id).unwrap(), None);
        assert!(storage.unviewed_ids("alice").unwrap().is_empty());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_access_extends_expiry() {
        let storage = MemoryStorage::new(Duration::from_millis(300));
        let s = session(at(0));
        storage.save(&s).unwrap();

        // Each load lands inside the window and restarts it; together the
        // sleeps outlast a fixed expiry measured from save.
        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(150));
            assert!(storage.load(s.id).unwrap().is_some());
        }

        std::thread::sleep(Duration::from_millis(600));
        assert_eq!(storage.load(s.id).unwrap(), None);
    }

    #[test]
    fn test_set_unviewed_ignores_expired_or_unknown_sessions() {
        let storage = MemoryStorage::new(Duration::from_millis(50));
        let s = session(at(0));
        storage.save(&s).unwrap();
        std::thread::sleep(Duration::from_millis(150));

        storage.set_unviewed("alice", s.id).unwrap();
        storage.set_unviewed("alice", Uuid::new_v4()).unwrap();
        assert!(storage.unviewed_ids("alice").unwrap().is_empty());
        assert!(storage.is_empty());
    }
}
