//! Session state store.
//!
//! Every piece of per-conversation mutable state - the memory lattice, the
//! coreference entity tracker, the reward history - lives in an explicit
//! [`SessionState`] handed out by this store, never in process-wide globals.
//! Handles are created on first access; idle sessions are evicted on a TTL
//! and the store is capped at a maximum session count, dropping the least
//! recently used first.
//!
//! Each state sits behind its own async `RwLock`, so concurrent requests
//! against the same session serialize their mutations instead of
//! interleaving them.

use crate::lattice::MemoryLattice;
use crate::rewrite::EntityTracker;
use crate::router::RewardTracker;
use colloquy_core::EngineConfig;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Mutable per-session state.
pub struct SessionState {
    pub lattice: MemoryLattice,
    pub entities: EntityTracker,
    pub rewards: RewardTracker,
}

impl SessionState {
    fn new(config: &EngineConfig) -> Self {
        Self {
            lattice: MemoryLattice::new(config),
            entities: EntityTracker::new(config.entity_window),
            rewards: RewardTracker::new(),
        }
    }
}

/// Shared handle to one session's state.
pub type SessionHandle = Arc<RwLock<SessionState>>;

struct SessionEntry {
    handle: SessionHandle,
    last_active_ms: AtomicU64,
}

/// Concurrent map of session id to state, with TTL and capacity eviction.
pub struct SessionStore {
    sessions: DashMap<String, SessionEntry>,
    config: EngineConfig,
    start: Instant,
}

impl SessionStore {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            start: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Fetch the session's handle, creating fresh state on first access.
    /// Touches the session's activity clock and runs eviction.
    pub fn get(&self, session_id: &str) -> SessionHandle {
        self.evict_idle();

        let now = self.now_ms();
        let entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session = %session_id, "session created");
                SessionEntry {
                    handle: Arc::new(RwLock::new(SessionState::new(&self.config))),
                    last_active_ms: AtomicU64::new(now),
                }
            });
        entry.last_active_ms.store(now, Ordering::Relaxed);
        let handle = entry.handle.clone();
        drop(entry);

        self.enforce_capacity(session_id);
        handle
    }

    /// Drop a session outright.
    pub fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Evict sessions idle past the TTL.
    pub fn evict_idle(&self) {
        let ttl_ms = self.config.session_ttl.as_millis() as u64;
        let now = self.now_ms();
        self.sessions.retain(|id, entry| {
            let idle = now.saturating_sub(entry.last_active_ms.load(Ordering::Relaxed));
            let keep = idle <= ttl_ms;
            if !keep {
                tracing::debug!(session = %id, idle_ms = idle, "session evicted (ttl)");
            }
            keep
        });
    }

    /// Drop the least-recently-used sessions when over capacity. The
    /// session named by `protect` survives even when it is the oldest.
    fn enforce_capacity(&self, protect: &str) {
        let over = self.sessions.len().saturating_sub(self.config.max_sessions);
        if over == 0 {
            return;
        }

        let mut by_age: Vec<(String, u64)> = self
            .sessions
            .iter()
            .filter(|entry| entry.key() != protect)
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().last_active_ms.load(Ordering::Relaxed),
                )
            })
            .collect();
        by_age.sort_by_key(|(_, last_active)| *last_active);

        for (id, _) in by_age.into_iter().take(over) {
            tracing::debug!(session = %id, "session evicted (capacity)");
            self.sessions.remove(&id);
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .field("max_sessions", &self.config.max_sessions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::{Insight, InsightType};
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_access_creates_state() {
        let store = SessionStore::new(EngineConfig::default());
        assert!(store.is_empty());

        let session = store.get("thread-1");
        assert_eq!(store.len(), 1);
        assert!(session.read().await.lattice.is_empty());
    }

    #[tokio::test]
    async fn test_same_id_returns_same_state() {
        let store = SessionStore::new(EngineConfig::default());
        let first = store.get("thread-1");
        {
            let mut state = first.write().await;
            state.lattice.add_insight(Insight::new(
                "remembered across accesses",
                InsightType::Fact,
                "m",
                0.8,
                vec![],
            ));
        }

        let second = store.get("thread-1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.read().await.lattice.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new(EngineConfig::default());
        let first = store.get("thread-1");
        first.write().await.entities.observe("Purdue University", "university", "");

        let second = store.get("thread-2");
        assert!(second.read().await.entities.is_empty());
    }

    #[test]
    fn test_ttl_eviction() {
        let mut config = EngineConfig::default();
        config.session_ttl = Duration::from_millis(0);
        let store = SessionStore::new(config);

        store.get("thread-1");
        std::thread::sleep(Duration::from_millis(5));
        store.evict_idle();
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let mut config = EngineConfig::default();
        config.max_sessions = 2;
        let store = SessionStore::new(config);

        store.get("oldest");
        std::thread::sleep(Duration::from_millis(2));
        store.get("middle");
        std::thread::sleep(Duration::from_millis(2));
        store.get("newest");

        assert_eq!(store.len(), 2);
        assert!(store.sessions.contains_key("newest"));
        assert!(!store.sessions.contains_key("oldest"));
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::new(EngineConfig::default());
        store.get("thread-1");
        store.remove("thread-1");
        assert!(store.is_empty());
    }
}
