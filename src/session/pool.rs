//! Keyed session pool with idle eviction.
//!
//! The pool is the only shared mutable state in the crate. It owns its
//! lifecycle explicitly: created by the embedder, passed to the execution
//! engine, emptied by [`SessionPool::shutdown`]. Eviction is advisory
//! cleanup to bound resource retention; a caller that finds no entry simply
//! reconnects.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use tokio::task::AbortHandle;

use super::{SessionHandle, SessionKey};
use crate::config::PoolSettings;

struct Entry {
    handle: Arc<SessionHandle>,
    /// Idle watchdog for this entry. Aborted on every reset and on removal.
    timer: Option<AbortHandle>,
}

/// Keyed table of transport handles, the unit of connection reuse.
pub struct SessionPool {
    settings: PoolSettings,
    entries: Mutex<HashMap<SessionKey, Entry>>,
    /// Per-key guards serializing the lookup-or-connect decision. Execution
    /// itself is never serialized by these.
    connect_locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl SessionPool {
    /// Create an empty pool.
    pub fn new(settings: PoolSettings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            entries: Mutex::new(HashMap::new()),
            connect_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Look up the handle for a key.
    pub async fn get(&self, key: &SessionKey) -> Option<Arc<SessionHandle>> {
        let entries = self.entries.lock().await;
        entries.get(key).map(|e| Arc::clone(&e.handle))
    }

    /// Install a handle under its key and start its idle timer.
    ///
    /// Replaces any prior entry for the key; the caller is responsible for
    /// having torn down a prior entry first.
    pub async fn insert(self: &Arc<Self>, handle: Arc<SessionHandle>) {
        let key = handle.key().clone();
        let timer = self.spawn_idle_timer(&key);

        let mut entries = self.entries.lock().await;
        if let Some(prior) = entries.insert(key, Entry { handle, timer: Some(timer) }) {
            if let Some(t) = prior.timer {
                t.abort();
            }
        }
    }

    /// Clear the idle timer and delete the entry for a key.
    ///
    /// Does not close the transport; the caller closes it first, or it has
    /// already been closed.
    pub async fn remove(&self, key: &SessionKey) -> Option<Arc<SessionHandle>> {
        let mut entries = self.entries.lock().await;
        let entry = entries.remove(key)?;
        if let Some(t) = entry.timer {
            t.abort();
        }
        Some(entry.handle)
    }

    /// Tear down and remove the entry for a key, if present.
    pub async fn discard(&self, key: &SessionKey) {
        if let Some(handle) = self.remove(key).await {
            handle.close().await;
        }
    }

    /// (Re)start the fixed-duration idle timer for a key.
    ///
    /// Called on every successful use of a session, and again when output
    /// data arrives so long-running commands are not expired mid-flight.
    pub async fn reset_idle_timer(self: &Arc<Self>, key: &SessionKey) {
        let timer = self.spawn_idle_timer(key);
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            if let Some(t) = entry.timer.replace(timer) {
                t.abort();
            }
        } else {
            timer.abort();
        }
    }

    /// Per-key mutual-exclusion guard for the lookup-or-connect decision.
    ///
    /// Without it, two concurrent calls for the same key both observing a
    /// miss would race to connect, and the last `insert` would silently
    /// orphan the other caller's transport.
    pub async fn connect_lock(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        let mut locks = self.connect_locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Close every transport, clear every timer, and empty the pool.
    pub async fn shutdown(&self) {
        let entries: Vec<Entry> = {
            let mut map = self.entries.lock().await;
            map.drain().map(|(_, e)| e).collect()
        };
        for entry in entries {
            if let Some(t) = entry.timer {
                t.abort();
            }
            entry.handle.close().await;
        }
        self.connect_locks.lock().await.clear();
        tracing::info!("session pool shut down");
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the pool holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn spawn_idle_timer(self: &Arc<Self>, key: &SessionKey) -> AbortHandle {
        let pool = Arc::downgrade(self);
        let key = key.clone();
        let idle = self.settings.idle_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            if let Some(pool) = Weak::upgrade(&pool) {
                tracing::info!(%key, "evicting idle session");
                pool.discard(&key).await;
            }
        })
        .abort_handle()
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("idle_timeout", &self.settings.idle_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::HandleState;
    use std::time::Duration;

    fn short_lived_pool(idle_ms: u64) -> Arc<SessionPool> {
        SessionPool::new(PoolSettings {
            idle_timeout: Duration::from_millis(idle_ms),
        })
    }

    fn local_handle() -> Arc<SessionHandle> {
        Arc::new(SessionHandle::local(SessionKey::local(), HashMap::new()))
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let pool = short_lived_pool(10_000);
        let handle = local_handle();
        pool.insert(Arc::clone(&handle)).await;

        let found = pool.get(&SessionKey::local()).await.unwrap();
        assert!(Arc::ptr_eq(&found, &handle));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_clears_entry_without_closing() {
        let pool = short_lived_pool(10_000);
        let handle = local_handle();
        pool.insert(Arc::clone(&handle)).await;

        let removed = pool.remove(&SessionKey::local()).await.unwrap();
        assert!(Arc::ptr_eq(&removed, &handle));
        assert!(pool.is_empty().await);
        assert_eq!(removed.state(), HandleState::Connected);
    }

    #[tokio::test]
    async fn test_idle_eviction_removes_and_closes() {
        let pool = short_lived_pool(30);
        let handle = local_handle();
        pool.insert(Arc::clone(&handle)).await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(pool.is_empty().await);
        assert_eq!(handle.state(), HandleState::Closed);
    }

    #[tokio::test]
    async fn test_reset_idle_timer_defers_eviction() {
        let pool = short_lived_pool(80);
        let handle = local_handle();
        pool.insert(handle).await;

        // Keep touching the session more often than the idle timeout
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            pool.reset_idle_timer(&SessionKey::local()).await;
        }
        assert_eq!(pool.len().await, 1);

        // Stop touching; eviction should now fire
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let pool = short_lived_pool(10_000);
        let a = local_handle();
        let b = Arc::new(SessionHandle::local(
            SessionKey::for_host("b"),
            HashMap::new(),
        ));
        pool.insert(Arc::clone(&a)).await;
        pool.insert(Arc::clone(&b)).await;

        pool.shutdown().await;
        assert!(pool.is_empty().await);
        assert_eq!(a.state(), HandleState::Closed);
        assert_eq!(b.state(), HandleState::Closed);
    }

    #[tokio::test]
    async fn test_connect_lock_is_per_key() {
        let pool = short_lived_pool(10_000);
        let lock_a1 = pool.connect_lock(&SessionKey::for_host("a")).await;
        let lock_a2 = pool.connect_lock(&SessionKey::for_host("a")).await;
        let lock_b = pool.connect_lock(&SessionKey::for_host("b")).await;

        assert!(Arc::ptr_eq(&lock_a1, &lock_a2));
        assert!(!Arc::ptr_eq(&lock_a1, &lock_b));
    }

    #[tokio::test]
    async fn test_connect_lock_serializes() {
        let pool = short_lived_pool(10_000);
        let key = SessionKey::for_host("a");

        let lock = pool.connect_lock(&key).await;
        let guard = lock.lock().await;

        let second = pool.connect_lock(&key).await;
        assert!(second.try_lock().is_err());
        drop(guard);
        assert!(second.try_lock().is_ok());
    }
}
