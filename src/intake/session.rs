//! Session storage: one in-progress form per user.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::model::Submission;
use super::state::IntakeStep;
use crate::error::StoreError;

/// A user's position in the form plus the answers so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub step: IntakeStep,
    pub submission: Submission,
    /// Last time the user moved the conversation.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            step: IntakeStep::default(),
            submission: Submission::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.updated_at).to_std().unwrap_or_default()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of [`SessionStore::get_or_create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEntry {
    /// The user was mid-conversation.
    Existing(Session),
    /// No session existed; a fresh one was stored.
    Created(Session),
}

/// Backend-agnostic session storage keyed by user id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<Session>, StoreError>;

    /// Return the user's session, or store and return a fresh one.
    ///
    /// This is the recovery policy for events that arrive without a session
    /// (never started, cancelled, completed, or evicted).
    async fn get_or_create(&self, user_id: &str) -> Result<SessionEntry, StoreError>;

    async fn put(&self, user_id: &str, session: Session) -> Result<(), StoreError>;

    /// Remove a session. Returns whether one existed.
    async fn delete(&self, user_id: &str) -> Result<bool, StoreError>;

    /// Drop sessions untouched for longer than `max_idle`.
    /// Returns the number of sessions removed.
    async fn evict_idle(&self, max_idle: Duration) -> Result<usize, StoreError>;

    /// Number of live sessions.
    async fn len(&self) -> usize;
}

/// Process-memory session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(user_id).cloned())
    }

    async fn get_or_create(&self, user_id: &str) -> Result<SessionEntry, StoreError> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(user_id) {
            return Ok(SessionEntry::Existing(existing.clone()));
        }
        let session = Session::new();
        sessions.insert(user_id.to_string(), session.clone());
        Ok(SessionEntry::Created(session))
    }

    async fn put(&self, user_id: &str, session: Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(user_id.to_string(), session);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(user_id).is_some())
    }

    async fn evict_idle(&self, max_idle: Duration) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.idle_for(now) <= max_idle);
        Ok(before - sessions.len())
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Per-user mutexes so one user's events never interleave.
#[derive(Default)]
pub struct UserLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`.
    pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(user_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Forget locks nobody holds or waits on. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_reports_fresh_sessions() {
        let store = InMemorySessionStore::new();
        assert!(store.get("u1").await.unwrap().is_none());

        let created = match store.get_or_create("u1").await.unwrap() {
            SessionEntry::Created(session) => session,
            other => panic!("expected a fresh session, got {other:?}"),
        };
        assert_eq!(created.step, IntakeStep::AwaitingName);
        assert_eq!(store.len().await, 1);

        let again = store.get_or_create("u1").await.unwrap();
        assert_eq!(again, SessionEntry::Existing(created));
    }

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemorySessionStore::new();
        let mut session = Session::new();
        session.step = IntakeStep::AwaitingBranch;
        store.put("u1", session.clone()).await.unwrap();

        assert_eq!(store.get("u1").await.unwrap(), Some(session));
        assert!(store.delete("u1").await.unwrap());
        assert!(!store.delete("u1").await.unwrap());
        assert!(store.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_are_per_user() {
        let store = InMemorySessionStore::new();
        let mut a = Session::new();
        a.step = IntakeStep::AwaitingPhone;
        store.put("a", a).await.unwrap();
        store.get_or_create("b").await.unwrap();

        assert_eq!(store.get("a").await.unwrap().unwrap().step, IntakeStep::AwaitingPhone);
        assert_eq!(store.get("b").await.unwrap().unwrap().step, IntakeStep::AwaitingName);
    }

    #[tokio::test]
    async fn evict_idle_drops_only_stale_sessions() {
        let store = InMemorySessionStore::new();
        let mut stale = Session::new();
        stale.updated_at = Utc::now() - chrono::Duration::hours(2);
        store.put("stale", stale).await.unwrap();
        store.put("fresh", Session::new()).await.unwrap();

        let evicted = store.evict_idle(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(evicted, 1);
        assert!(store.get("stale").await.unwrap().is_none());
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[test]
    fn session_serde_roundtrip() {
        let mut session = Session::new();
        session.step = IntakeStep::AwaitingTimeSlot;
        session.submission.age_group = Some("10+ лет".into());

        let json = serde_json::to_string(&session).unwrap();
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
    }

    #[tokio::test]
    async fn user_locks_serialize_same_user() {
        let locks = Arc::new(UserLocks::new());
        let guard = locks.lock("u1").await;

        let locks2 = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock("u1").await;
        });

        // Another user is not blocked.
        let other = tokio::time::timeout(Duration::from_millis(100), locks.lock("u2")).await;
        assert!(other.is_ok());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = UserLocks::new();
        let held = locks.lock("busy").await;
        drop(locks.lock("idle").await);

        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}
