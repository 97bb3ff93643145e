//! Adapter-side session cache.
//!
//! The buyer engine never reads from here; every reply is computed from the
//! conversation in the request. The store only remembers what was last said so callers
//! can inspect or drop a session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pitchsim_core::domain::Scenario;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub scenario: Scenario,
    /// Turns in the conversation including the reply just produced.
    pub turn_count: usize,
    pub last_buyer_line: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Option<SessionSnapshot>;
    async fn save(&self, snapshot: SessionSnapshot);
    /// Returns `true` when a live entry was removed.
    async fn evict(&self, session_id: &str) -> bool;
    /// Drops every entry older than the store's TTL as of `now`; returns how many.
    async fn evict_expired(&self, now: DateTime<Utc>) -> usize;
    async fn len(&self) -> usize;
}

pub struct InMemorySessionStore {
    ttl: chrono::Duration,
    sessions: RwLock<HashMap<String, SessionSnapshot>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self { ttl, sessions: RwLock::new(HashMap::new()) }
    }

    fn is_expired(&self, snapshot: &SessionSnapshot, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(snapshot.updated_at) > self.ttl
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).filter(|snapshot| !self.is_expired(snapshot, Utc::now())).cloned()
    }

    async fn save(&self, snapshot: SessionSnapshot) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(snapshot.session_id.clone(), snapshot);
    }

    async fn evict(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.remove(session_id) {
            Some(snapshot) => !self.is_expired(&snapshot, Utc::now()),
            None => false,
        }
    }

    async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, snapshot| !self.is_expired(snapshot, now));
        before - sessions.len()
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Periodically evicts expired sessions until the returned handle is aborted.
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = store.evict_expired(Utc::now()).await;
            if evicted > 0 {
                debug!(
                    event_name = "server.sessions.swept",
                    correlation_id = "sweeper",
                    evicted,
                    "expired sessions evicted"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use pitchsim_core::domain::{Difficulty, Scenario, Vertical};

    use super::{spawn_sweeper, InMemorySessionStore, SessionSnapshot, SessionStore};

    fn snapshot(session_id: &str, age: chrono::Duration) -> SessionSnapshot {
        SessionSnapshot {
            session_id: session_id.to_string(),
            scenario: Scenario::new(Vertical::Tech, Difficulty::Hard),
            turn_count: 3,
            last_buyer_line: "What would kickoff look like?".to_string(),
            updated_at: Utc::now() - age,
        }
    }

    #[tokio::test]
    async fn save_then_get_returns_snapshot() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        store.save(snapshot("s-1", chrono::Duration::zero())).await;

        let found = store.get("s-1").await.expect("session should be present");
        assert_eq!(found.turn_count, 3);
        assert_eq!(found.scenario.vertical, Vertical::Tech);
        assert!(store.get("s-2").await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_hidden_and_swept() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        store.save(snapshot("fresh", chrono::Duration::seconds(5))).await;
        store.save(snapshot("stale", chrono::Duration::seconds(120))).await;

        assert!(store.get("stale").await.is_none());
        assert_eq!(store.len().await, 2);

        assert_eq!(store.evict_expired(Utc::now()).await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn evict_reports_whether_a_live_session_was_removed() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        store.save(snapshot("live", chrono::Duration::zero())).await;
        store.save(snapshot("stale", chrono::Duration::seconds(600))).await;

        assert!(store.evict("live").await);
        assert!(!store.evict("live").await);
        assert!(!store.evict("stale").await);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_on_interval() {
        let store = Arc::new(InMemorySessionStore::new(Duration::from_secs(60)));
        store.save(snapshot("stale", chrono::Duration::seconds(600))).await;

        let handle = spawn_sweeper(store.clone(), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;

        assert_eq!(store.len().await, 0);
        handle.abort();
    }
}
