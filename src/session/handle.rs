//! Transport handles: one live connection (or local marker) per session key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use super::SessionKey;
use crate::ssh::RemoteSession;

/// Lifecycle state of a transport handle.
///
/// Tracked as an explicit field flipped by lifecycle transitions, never
/// inferred from transport-internal bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Transport is (believed) usable. A liveness probe still runs before
    /// any remote reuse.
    Connected,
    /// Transport has been torn down; the handle must not be reused.
    Closed,
}

/// In-memory record pairing a live transport (or local marker) with its
/// accumulated environment overlay.
///
/// Remote handles carry no overlay (environment is passed per call); local
/// handles exist solely to accumulate one across calls. At most one handle
/// exists per [`SessionKey`] at any instant.
pub struct SessionHandle {
    key: SessionKey,
    /// `None` means local execution.
    remote: Option<RemoteSession>,
    /// Resolved host alias, remote handles only.
    host: Option<String>,
    /// Accumulated environment overlay for local handles.
    env: Mutex<HashMap<String, String>>,
    connected: AtomicBool,
}

impl SessionHandle {
    /// Wrap an established remote transport.
    pub fn remote(key: SessionKey, host: impl Into<String>, transport: RemoteSession) -> Self {
        Self {
            key,
            remote: Some(transport),
            host: Some(host.into()),
            env: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Create a local handle seeded with an initial environment overlay.
    pub fn local(key: SessionKey, env: HashMap<String, String>) -> Self {
        Self {
            key,
            remote: None,
            host: None,
            env: Mutex::new(env),
            connected: AtomicBool::new(true),
        }
    }

    /// The session key this handle is stored under.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// The remote transport, if any. `None` means local execution.
    pub fn transport(&self) -> Option<&RemoteSession> {
        self.remote.as_ref()
    }

    /// Resolved host alias for remote handles.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandleState {
        if self.connected.load(Ordering::Acquire) {
            HandleState::Connected
        } else {
            HandleState::Closed
        }
    }

    /// Merge variables into the accumulated overlay.
    ///
    /// Later calls' keys override earlier ones; unspecified keys persist.
    pub async fn merge_env(&self, vars: &HashMap<String, String>) {
        let mut env = self.env.lock().await;
        env.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Snapshot of the accumulated overlay.
    pub async fn env_snapshot(&self) -> HashMap<String, String> {
        self.env.lock().await.clone()
    }

    /// Tear down the transport (if remote) and mark the handle closed.
    ///
    /// Idempotent: closing an already-closed handle is a no-op.
    pub async fn close(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            if let Some(remote) = &self.remote {
                remote.disconnect().await;
            }
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("key", &self.key)
            .field("remote", &self.remote.is_some())
            .field("host", &self.host)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_handle() -> SessionHandle {
        SessionHandle::local(SessionKey::local(), HashMap::new())
    }

    #[tokio::test]
    async fn test_local_handle_has_no_transport() {
        let handle = local_handle();
        assert!(handle.transport().is_none());
        assert!(handle.host().is_none());
        assert_eq!(handle.state(), HandleState::Connected);
    }

    #[tokio::test]
    async fn test_env_accumulates_and_overrides() {
        let handle = local_handle();

        let mut first = HashMap::new();
        first.insert("A".to_string(), "1".to_string());
        first.insert("B".to_string(), "x".to_string());
        handle.merge_env(&first).await;

        let mut second = HashMap::new();
        second.insert("B".to_string(), "2".to_string());
        handle.merge_env(&second).await;

        let env = handle.env_snapshot().await;
        assert_eq!(env.get("A").map(String::as_str), Some("1"));
        assert_eq!(env.get("B").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn test_close_marks_closed() {
        let handle = local_handle();
        handle.close().await;
        assert_eq!(handle.state(), HandleState::Closed);
        // Second close is a no-op
        handle.close().await;
        assert_eq!(handle.state(), HandleState::Closed);
    }
}
