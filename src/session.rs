//! Per-session conversation state.
//!
//! The id→session map sits behind a short-lived std mutex; each session is an
//! `Arc<tokio::sync::Mutex<Session>>` that request handlers hold across
//! awaits. Two requests on one session therefore run one after the other,
//! while requests on different sessions only meet at the map lookup.
//!
//! Unknown ids are never an error: [`SessionStore::get_or_create`] starts an
//! empty conversation. Sessions can be bounded in number (least recently used
//! evicted first) and expire after an idle period. A session whose handle is
//! held outside the store, i.e. one with a request in flight, is never
//! evicted or expired; the bound may be exceeded until it is released.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use helpdesk_rag_core::{Role, Turn};

use crate::config::SessionsConfig;

/// Ordered turns of one conversation.
#[derive(Debug, Default)]
pub struct Session {
    turns: Vec<Turn>,
}

impl Session {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn {
            role,
            content: content.into(),
        });
    }

    /// Append a user turn and its assistant reply together.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push(Turn::user(user));
        self.turns.push(Turn::assistant(assistant));
    }

    /// Turn contents in order.
    pub fn transcript(&self) -> Vec<String> {
        self.turns.iter().map(|t| t.content.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// Bounds on live sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionPolicy {
    /// `0` means unbounded.
    pub max_sessions: usize,
    pub idle_ttl: Option<Duration>,
}

impl SessionPolicy {
    pub fn from_config(config: &SessionsConfig) -> Self {
        Self {
            max_sessions: config.max_sessions,
            idle_ttl: config.idle_ttl(),
        }
    }
}

struct Entry {
    session: SessionHandle,
    touched: Instant,
}

impl Entry {
    /// Someone besides the store holds the handle.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.session) > 1
    }
}

pub struct SessionStore {
    policy: SessionPolicy,
    sessions: Mutex<LruCache<String, Entry>>,
}

impl SessionStore {
    pub fn new(policy: SessionPolicy) -> Self {
        // Eviction is done by hand so busy sessions can be skipped.
        Self {
            policy,
            sessions: Mutex::new(LruCache::unbounded()),
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        !entry.in_use()
            && self
                .policy
                .idle_ttl
                .map(|ttl| now.duration_since(entry.touched) > ttl)
                .unwrap_or(false)
    }

    /// Evict idle sessions, least recently used first, until one more fits.
    fn make_room(&self, map: &mut LruCache<String, Entry>) {
        let Some(cap) = NonZeroUsize::new(self.policy.max_sessions) else {
            return;
        };
        while map.len() >= cap.get() {
            let victim = map
                .iter()
                .rev()
                .find(|(_, entry)| !entry.in_use())
                .map(|(id, _)| id.clone());
            match victim {
                Some(id) => {
                    map.pop(&id);
                    debug!(session = %id, "evicted least recently used session");
                }
                None => {
                    debug!(live = map.len(), cap = cap.get(), "all sessions busy, exceeding bound");
                    break;
                }
            }
        }
    }

    fn map(&self) -> std::sync::MutexGuard<'_, LruCache<String, Entry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Existing live session for `id`, or a fresh empty one.
    pub fn get_or_create(&self, id: &str) -> SessionHandle {
        let now = Instant::now();
        let mut map = self.map();

        if let Some(entry) = map.get_mut(id) {
            if !self.is_expired(entry, now) {
                entry.touched = now;
                return Arc::clone(&entry.session);
            }
            debug!(session = id, "session expired, starting fresh");
            map.pop(id);
        }

        self.make_room(&mut map);
        let session: SessionHandle = Arc::new(tokio::sync::Mutex::new(Session::default()));
        map.put(
            id.to_string(),
            Entry {
                session: Arc::clone(&session),
                touched: now,
            },
        );
        session
    }

    /// Mark `id` as used now, so its idle time restarts.
    pub fn touch(&self, id: &str) {
        if let Some(entry) = self.map().get_mut(id) {
            entry.touched = Instant::now();
        }
    }

    /// Live session for `id` without creating or touching it.
    fn peek(&self, id: &str) -> Option<SessionHandle> {
        let map = self.map();
        map.peek(id)
            .filter(|entry| !self.is_expired(entry, Instant::now()))
            .map(|entry| Arc::clone(&entry.session))
    }

    /// Snapshot of the turns of `id`; empty for unknown sessions.
    pub async fn history(&self, id: &str) -> Vec<Turn> {
        match self.peek(id) {
            Some(session) => session.lock().await.turns().to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn append(&self, id: &str, role: Role, content: impl Into<String>) {
        let session = self.get_or_create(id);
        session.lock().await.push(role, content);
    }

    /// Append a user/assistant pair under one lock acquisition.
    pub async fn append_exchange(
        &self,
        id: &str,
        user: impl Into<String>,
        assistant: impl Into<String>,
    ) {
        let session = self.get_or_create(id);
        session.lock().await.push_exchange(user, assistant);
    }

    /// Drop every idle session past the TTL. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        if self.policy.idle_ttl.is_none() {
            return 0;
        }

        let now = Instant::now();
        let mut map = self.map();
        let expired: Vec<String> = map
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            map.pop(id);
        }
        if !expired.is_empty() {
            debug!(purged = expired.len(), remaining = map.len(), "purged idle sessions");
        }
        expired.len()
    }

    pub fn remove(&self, id: &str) -> bool {
        self.map().pop(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_session_starts_empty() {
        let store = SessionStore::default();
        assert!(store.history("nobody").await.is_empty());
        let session = store.get_or_create("s1");
        assert!(session.lock().await.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::default();
        store.append_exchange("a", "hi from a", "hello a").await;
        store.append("b", Role::User, "hi from b").await;

        let a = store.history("a").await;
        let b = store.history("b").await;
        assert_eq!(a, vec![Turn::user("hi from a"), Turn::assistant("hello a")]);
        assert_eq!(b, vec![Turn::user("hi from b")]);
    }

    #[tokio::test]
    async fn test_lru_bound_evicts_oldest() {
        let store = SessionStore::new(SessionPolicy {
            max_sessions: 2,
            idle_ttl: None,
        });
        store.append("one", Role::User, "1").await;
        store.append("two", Role::User, "2").await;
        // Touch "one" so "two" becomes least recently used.
        store.get_or_create("one");
        store.append("three", Role::User, "3").await;

        assert_eq!(store.len(), 2);
        assert_eq!(store.history("one").await.len(), 1);
        assert!(store.history("two").await.is_empty());
        assert_eq!(store.history("three").await.len(), 1);
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let store = SessionStore::new(SessionPolicy {
            max_sessions: 0,
            idle_ttl: Some(Duration::from_millis(30)),
        });
        store.append_exchange("old", "q", "a").await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        store.append("fresh", Role::User, "q").await;

        assert!(store.history("old").await.is_empty());
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);

        // Expired id comes back as an empty conversation.
        assert!(store.get_or_create("old").lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_purge_without_ttl_is_noop() {
        let store = SessionStore::default();
        store.append("a", Role::User, "q").await;
        assert_eq!(store.purge_expired(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_exchanges_stay_paired() {
        let store = Arc::new(SessionStore::default());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store
                    .append_exchange("shared", format!("q{}", i), format!("a{}", i))
                    .await;
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let turns = store.history("shared").await;
        assert_eq!(turns.len(), 32);
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[0].content[1..], pair[1].content[1..]);
        }
    }

    #[tokio::test]
    async fn test_busy_session_survives_eviction() {
        let store = SessionStore::new(SessionPolicy {
            max_sessions: 1,
            idle_ttl: None,
        });
        let busy = store.get_or_create("busy");
        let mut guard = busy.lock().await;

        store.append("other", Role::User, "q").await;
        assert_eq!(store.len(), 2);

        guard.push_exchange("q", "a");
        drop(guard);
        drop(busy);
        assert_eq!(store.history("busy").await.len(), 2);

        // Once released, the next new session brings the store back to its bound.
        store.get_or_create("third");
        assert_eq!(store.len(), 1);
        assert!(store.history("busy").await.is_empty());
    }

    #[tokio::test]
    async fn test_busy_session_does_not_expire() {
        let store = SessionStore::new(SessionPolicy {
            max_sessions: 0,
            idle_ttl: Some(Duration::from_millis(20)),
        });
        let held = store.get_or_create("slow");
        held.lock().await.push_exchange("q", "a");
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.purge_expired(), 0);
        assert!(Arc::ptr_eq(&held, &store.get_or_create("slow")));
        drop(held);

        store.touch("slow");
        assert_eq!(store.purge_expired(), 0);
        assert_eq!(store.history("slow").await.len(), 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SessionStore::default();
        store.append("a", Role::User, "q").await;
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.is_empty());
    }
}
