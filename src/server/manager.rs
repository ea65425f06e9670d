//! Session registry.
//!
//! Every accepted connection is tracked here so shutdown can reach into
//! sessions parked on blocked reads and tell them to stop. Handles are
//! slab-keyed; a session unregisters itself when it finishes on its own.

use slab::Slab;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Per-session stop signal shared between the session's event loop and
/// the manager.
///
/// `stop` is permit-storing: a signal sent before the session reaches
/// its await point is not lost.
pub struct SessionHandle {
    shutdown: Notify,
    stopped: AtomicBool,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            shutdown: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Ask the session to stop. Idempotent; only the first call notifies.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.shutdown.notify_one();
        }
    }

    /// Resolves once [`stop`] has been called.
    ///
    /// [`stop`]: SessionHandle::stop
    pub async fn stopped(&self) {
        if self.is_stopped() {
            return;
        }
        self.shutdown.notified().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Registry of live sessions, shared across all event loops.
#[derive(Default)]
pub struct ConnectionManager {
    sessions: Mutex<Slab<Arc<SessionHandle>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session; returns its key and stop handle.
    pub fn track(&self) -> (usize, Arc<SessionHandle>) {
        let handle = Arc::new(SessionHandle::new());
        let key = match self.sessions.lock() {
            Ok(mut sessions) => sessions.insert(Arc::clone(&handle)),
            // A poisoned registry only loses shutdown reach, not the session.
            Err(poisoned) => poisoned.into_inner().insert(Arc::clone(&handle)),
        };
        (key, handle)
    }

    /// Stop one session and drop it from the registry.
    pub fn untrack(&self, key: usize) {
        if let Some(handle) = self.remove(key) {
            handle.stop();
        }
    }

    /// Drop a finished session from the registry without signaling it.
    pub fn release(&self, key: usize) {
        let _ = self.remove(key);
    }

    fn remove(&self, key: usize) -> Option<Arc<SessionHandle>> {
        let mut sessions = match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        };
        sessions.try_remove(key)
    }

    /// Signal every tracked session to stop and clear the registry.
    pub fn stop_all(&self) {
        let drained: Vec<Arc<SessionHandle>> = {
            let mut sessions = match self.sessions.lock() {
                Ok(sessions) => sessions,
                Err(poisoned) => poisoned.into_inner(),
            };
            sessions.drain().collect()
        };
        for handle in drained {
            handle.stop();
        }
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        match self.sessions.lock() {
            Ok(sessions) => sessions.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn track_release_roundtrip() {
        let manager = ConnectionManager::new();
        let (key, handle) = manager.track();
        assert_eq!(manager.len(), 1);

        manager.release(key);
        assert_eq!(manager.len(), 0);
        // Release does not signal the session.
        assert!(!handle.is_stopped());
    }

    #[test]
    fn untrack_signals_the_session() {
        let manager = ConnectionManager::new();
        let (key, handle) = manager.track();
        manager.untrack(key);
        assert!(handle.is_stopped());
        assert!(manager.is_empty());
    }

    #[test]
    fn stop_all_reaches_every_session() {
        let manager = ConnectionManager::new();
        let handles: Vec<_> = (0..8).map(|_| manager.track().1).collect();

        manager.stop_all();
        assert!(manager.is_empty());
        assert!(handles.iter().all(|h| h.is_stopped()));
    }

    #[test]
    fn removing_an_unknown_key_is_harmless() {
        let manager = ConnectionManager::new();
        let (key, _) = manager.track();
        manager.release(key);
        manager.untrack(key);
        manager.release(key);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn stop_before_wait_is_not_lost() {
        let handle = Arc::new(SessionHandle::new());
        handle.stop();
        // Must resolve immediately even though nobody was waiting yet.
        tokio::time::timeout(Duration::from_secs(1), handle.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stop_wakes_a_parked_waiter() {
        let handle = Arc::new(SessionHandle::new());
        let waiter = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.stopped().await })
        };

        tokio::task::yield_now().await;
        handle.stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
