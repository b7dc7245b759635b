//! Per-session async locks.
//!
//! Every mutation of a session (and of the payments hanging off it) runs
//! while holding that session's lock, so HTTP requests, provider callbacks
//! and the expiry sweep touching the same session are serialized in-process.
//! The repository's version check covers writers in other processes.
//!
//! A session's entry is removed when its last holder releases it, so the map
//! only holds sessions with a request in flight.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use salon_types::SessionId;

/// Exclusive access to one session. Dropping it releases the lock and
/// forgets the entry when nobody else is waiting.
pub struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    id: SessionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone of the Arc
        self.locks
            .locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `id`.
    pub async fn acquire(&self, id: SessionId) -> SessionGuard<'_> {
        let lock = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        SessionGuard {
            locks: self,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Drops locks nobody holds or waits on. Release already does this; the
    /// expiry sweep calls it to catch entries left by cancelled acquires.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_is_serialized() {
        let locks = Arc::new(SessionLocks::new());
        let id = SessionId::new();

        let guard = locks.acquire(id).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_sessions_do_not_block() {
        let locks = SessionLocks::new();
        let _a = locks.acquire(SessionId::new()).await;
        let _b = locks.acquire(SessionId::new()).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_release_forgets_idle_sessions() {
        let locks = SessionLocks::new();
        let held = locks.acquire(SessionId::new()).await;
        drop(locks.acquire(SessionId::new()).await);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert!(locks.is_empty());
        assert_eq!(locks.prune(), 0);
    }

    #[tokio::test]
    async fn test_release_keeps_entry_for_waiters() {
        let locks = Arc::new(SessionLocks::new());
        let id = SessionId::new();

        let guard = locks.acquire(id).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
                locks.len()
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        drop(guard);
        assert_eq!(waiter.await.unwrap(), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_prune_drops_entries_left_by_cancelled_waiters() {
        let locks = Arc::new(SessionLocks::new());
        let id = SessionId::new();

        let guard = locks.acquire(id).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Released while the waiter still holds a clone, then the waiter goes away
        drop(guard);
        waiter.abort();
        let _ = waiter.await;

        locks.prune();
        assert!(locks.is_empty());
    }
}
