//! Session-scoped conversation memory.
//!
//! A session is an ordered list of turns keyed by a client-supplied id.
//! Sessions expire after a configurable period of inactivity and the store
//! holds at most a configured number of live sessions; above the cap the
//! least-recently-active session is evicted first. Expiry runs
//! opportunistically on every store access, so no background task is needed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Time source for TTL decisions, injectable for deterministic tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time. The production clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

/// One message within a session. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

struct SessionEntry {
    turns: Vec<Turn>,
    last_activity: DateTime<Utc>,
}

/// In-memory session store with TTL and cap eviction.
///
/// The map lock is held only for short read/modify/write sections; no
/// network or disk I/O happens under it.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, SessionEntry>>>,
    ttl: Duration,
    cap: usize,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(ttl: Duration, cap: usize) -> Self {
        Self::with_clock(ttl, cap, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, cap: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            cap,
            clock,
        }
    }

    /// Return the live history for a session, creating an empty one for an
    /// unseen (or expired) id. Refreshes the last-activity timestamp.
    pub async fn get_or_create(&self, session_id: &str) -> Vec<Turn> {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;
        sweep_expired(&mut inner, now, self.ttl);

        let entry = inner
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                turns: Vec::new(),
                last_activity: now,
            });
        entry.last_activity = now;
        let turns = entry.turns.clone();

        enforce_cap(&mut inner, self.cap, session_id);
        turns
    }

    /// Append a turn and refresh the last-activity timestamp. An unknown id
    /// gets a fresh session; append can never fail on a missing session.
    pub async fn append(&self, session_id: &str, turn: Turn) {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;
        sweep_expired(&mut inner, now, self.ttl);

        let entry = inner
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                turns: Vec::new(),
                last_activity: now,
            });
        entry.turns.push(turn);
        entry.last_activity = now;

        enforce_cap(&mut inner, self.cap, session_id);
    }

    /// Discard a session's history, keeping the id allocated.
    pub async fn reset(&self, session_id: &str) {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;
        sweep_expired(&mut inner, now, self.ttl);

        let entry = inner
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                turns: Vec::new(),
                last_activity: now,
            });
        entry.turns.clear();
        entry.last_activity = now;

        enforce_cap(&mut inner, self.cap, session_id);
    }

    /// Drop sessions idle longer than the TTL, as of `now`.
    pub async fn evict_expired(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        sweep_expired(&mut inner, now, self.ttl);
    }

    /// Number of live sessions (expired ones may still be counted until the
    /// next sweep).
    pub async fn active_sessions(&self) -> usize {
        self.inner.read().await.len()
    }
}

fn sweep_expired(map: &mut HashMap<String, SessionEntry>, now: DateTime<Utc>, ttl: Duration) {
    map.retain(|_, entry| {
        (now - entry.last_activity)
            .to_std()
            .map(|idle| idle <= ttl)
            // last_activity in the future means a clock rewind; keep the session
            .unwrap_or(true)
    });
}

fn enforce_cap(map: &mut HashMap<String, SessionEntry>, cap: usize, keep: &str) {
    while map.len() > cap {
        let oldest = map
            .iter()
            .filter(|(id, _)| id.as_str() != keep)
            .min_by_key(|(_, entry)| entry.last_activity)
            .map(|(id, _)| id.clone());
        match oldest {
            Some(id) => {
                tracing::debug!(session = %id, "evicting least-recently-active session over cap");
                map.remove(&id);
            }
            // only the just-touched session is left
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl MockClock {
        fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self { now: Mutex::new(now) })
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().expect("clock lock");
            *now += chrono::Duration::from_std(by).expect("duration fits");
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().expect("clock lock")
        }
    }

    fn store_with_clock(ttl_secs: u64, cap: usize) -> (SessionStore, Arc<MockClock>) {
        let clock = MockClock::starting_at(Utc::now());
        let store = SessionStore::with_clock(
            Duration::from_secs(ttl_secs),
            cap,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        (store, clock)
    }

    fn turn(content: &str) -> Turn {
        Turn::user(content)
    }

    #[tokio::test]
    async fn unseen_session_starts_empty() {
        let (store, _clock) = store_with_clock(1800, 500);
        let history = store.get_or_create("fresh").await;
        assert!(history.is_empty());
        assert_eq!(store.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn appends_preserve_order() {
        let (store, _clock) = store_with_clock(1800, 500);
        for i in 0..5 {
            store.append("s", turn(&format!("message {}", i))).await;
        }
        let history = store.get_or_create("s").await;
        assert_eq!(history.len(), 5);
        for (i, t) in history.iter().enumerate() {
            assert_eq!(t.content, format!("message {}", i));
        }
    }

    #[tokio::test]
    async fn append_to_unknown_id_creates_the_session() {
        let (store, _clock) = store_with_clock(1800, 500);
        store.append("never-seen", turn("hello")).await;
        assert_eq!(store.get_or_create("never-seen").await.len(), 1);
    }

    #[tokio::test]
    async fn expired_session_is_treated_as_new() {
        let (store, clock) = store_with_clock(60, 500);
        store.append("s", turn("old message")).await;

        clock.advance(Duration::from_secs(61));
        let history = store.get_or_create("s").await;
        assert!(history.is_empty(), "expired history must not be returned");
    }

    #[tokio::test]
    async fn session_within_ttl_survives() {
        let (store, clock) = store_with_clock(60, 500);
        store.append("s", turn("recent")).await;

        clock.advance(Duration::from_secs(59));
        assert_eq!(store.get_or_create("s").await.len(), 1);
    }

    #[tokio::test]
    async fn activity_refreshes_the_ttl_window() {
        let (store, clock) = store_with_clock(60, 500);
        store.append("s", turn("first")).await;

        clock.advance(Duration::from_secs(45));
        store.append("s", turn("second")).await;

        // 45 + 45 > TTL from first activity, but < TTL from the refresh
        clock.advance(Duration::from_secs(45));
        assert_eq!(store.get_or_create("s").await.len(), 2);
    }

    #[tokio::test]
    async fn access_sweeps_other_expired_sessions() {
        let (store, clock) = store_with_clock(60, 500);
        store.append("stale", turn("x")).await;

        clock.advance(Duration::from_secs(61));
        store.get_or_create("fresh").await;
        assert_eq!(store.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn evict_expired_drops_idle_sessions() {
        let (store, clock) = store_with_clock(60, 500);
        store.append("s", turn("x")).await;

        clock.advance(Duration::from_secs(120));
        store.evict_expired(clock.now()).await;
        assert_eq!(store.active_sessions().await, 0);
    }

    #[tokio::test]
    async fn cap_evicts_least_recently_active_first() {
        let (store, clock) = store_with_clock(3600, 2);
        store.append("s1", turn("one")).await;
        clock.advance(Duration::from_secs(1));
        store.append("s2", turn("two")).await;
        clock.advance(Duration::from_secs(1));
        store.append("s3", turn("three")).await;

        assert_eq!(store.active_sessions().await, 2);
        // s1 was the least recently active; s2 and s3 keep their history
        assert_eq!(store.get_or_create("s2").await.len(), 1);
        assert_eq!(store.get_or_create("s3").await.len(), 1);
    }

    #[tokio::test]
    async fn cap_never_evicts_the_session_being_touched() {
        let (store, _clock) = store_with_clock(3600, 1);
        store.append("s1", turn("one")).await;
        store.append("s2", turn("two")).await;

        assert_eq!(store.active_sessions().await, 1);
        assert_eq!(store.get_or_create("s2").await.len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_history_but_keeps_the_id() {
        let (store, _clock) = store_with_clock(1800, 500);
        for i in 0..5 {
            store.append("s", turn(&format!("m{}", i))).await;
        }
        store.reset("s").await;

        assert_eq!(store.get_or_create("s").await.len(), 0);
        assert_eq!(store.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let (store, _clock) = store_with_clock(1800, 500);
        store.append("a", turn("for a")).await;
        store.append("b", turn("for b")).await;

        let a = store.get_or_create("a").await;
        let b = store.get_or_create("b").await;
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].content, "for a");
        assert_eq!(b[0].content, "for b");
    }
}
