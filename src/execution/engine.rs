//! Command execution over pooled sessions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::env::build_remote_command;
use super::ExecOutput;
use crate::config;
use crate::error::{RelayError, Result};
use crate::session::{HandleState, SessionHandle, SessionKey, SessionPool};
use crate::ssh::Connector;

/// Options for one `execute` call.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Target host alias. `None` runs the command locally.
    pub host: Option<String>,
    /// Environment overlay for this call.
    pub env: HashMap<String, String>,
}

impl ExecOptions {
    /// Target a remote host alias.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Add one environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// The execution engine: resolves a session for each call, reusing pooled
/// transports where possible, and runs the command remotely or locally.
pub struct ExecutionEngine {
    pool: Arc<SessionPool>,
    connector: Connector,
    /// Default working directory for local execution.
    local_cwd: Option<PathBuf>,
}

impl ExecutionEngine {
    /// Create an engine over the given pool and connector.
    ///
    /// The local working directory comes from [`config::LOCAL_CWD_ENV`] when
    /// set; otherwise local commands run in the process's own cwd.
    pub fn new(pool: Arc<SessionPool>, connector: Connector) -> Self {
        Self {
            pool,
            connector,
            local_cwd: config::local_working_dir(),
        }
    }

    /// Override the default working directory for local execution.
    pub fn with_local_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_cwd = Some(dir.into());
        self
    }

    /// The pool this engine executes against.
    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Execute a command and collect its separated output streams.
    ///
    /// The sole entry point surfaced to the outer protocol layer. One
    /// command maps to one session: remote when `options.host` is set,
    /// local otherwise.
    pub async fn execute(&self, command: &str, options: &ExecOptions) -> Result<ExecOutput> {
        match options.host.as_deref() {
            Some(host) => self.execute_remote(command, host, &options.env).await,
            None => self.execute_local(command, &options.env).await,
        }
    }

    async fn execute_remote(
        &self,
        command: &str,
        host: &str,
        env: &HashMap<String, String>,
    ) -> Result<ExecOutput> {
        let key = SessionKey::for_host(host);

        // The per-key guard covers only the lookup-or-connect decision;
        // execution itself runs unserialized.
        let handle = {
            let lock = self.pool.connect_lock(&key).await;
            let _guard = lock.lock().await;

            let existing = self.pool.get(&key).await;
            let reusable = match &existing {
                Some(handle) => self.reusable(handle, host).await,
                None => false,
            };

            match (existing, reusable) {
                (Some(handle), true) => {
                    tracing::debug!(%host, "reusing pooled ssh session");
                    handle
                }
                (existing, _) => {
                    if existing.is_some() {
                        tracing::debug!(%host, "discarding stale ssh session");
                        self.pool.discard(&key).await;
                    }
                    let transport = self.connector.establish(host).await?;
                    let handle = Arc::new(SessionHandle::remote(key.clone(), host, transport));
                    self.pool.insert(Arc::clone(&handle)).await;
                    handle
                }
            }
        };

        self.pool.reset_idle_timer(&key).await;

        let remote_command = build_remote_command(command, env)?;
        let transport = handle
            .transport()
            .ok_or_else(|| RelayError::Exec("remote handle lost its transport".to_string()))?;

        // Refresh the idle timer whenever output arrives, so long-running
        // commands are not evicted mid-flight.
        let (activity_tx, mut activity_rx) = mpsc::unbounded_channel::<()>();
        let refresher = {
            let pool = Arc::clone(&self.pool);
            let key = key.clone();
            tokio::spawn(async move {
                while activity_rx.recv().await.is_some() {
                    pool.reset_idle_timer(&key).await;
                }
            })
        };

        let result = transport
            .exec(&remote_command, move || {
                let _ = activity_tx.send(());
            })
            .await;
        let _ = refresher.await;

        if result.is_ok() {
            self.pool.reset_idle_timer(&key).await;
        }
        result
    }

    /// Whether a pooled handle may serve a request for `host`.
    async fn reusable(&self, handle: &Arc<SessionHandle>, host: &str) -> bool {
        if handle.state() != HandleState::Connected || handle.host() != Some(host) {
            return false;
        }
        match handle.transport() {
            Some(transport) => transport.is_alive().await,
            None => false,
        }
    }

    async fn execute_local(
        &self,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<ExecOutput> {
        let key = SessionKey::local();

        let handle = {
            let lock = self.pool.connect_lock(&key).await;
            let _guard = lock.lock().await;

            match self.pool.get(&key).await {
                Some(existing) => {
                    existing.merge_env(env).await;
                    existing
                }
                None => {
                    let handle = Arc::new(SessionHandle::local(key.clone(), env.clone()));
                    self.pool.insert(Arc::clone(&handle)).await;
                    handle
                }
            }
        };

        self.pool.reset_idle_timer(&key).await;

        let overlay = handle.env_snapshot().await;
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .envs(&overlay)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.local_cwd {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| RelayError::Exec(format!("failed to run command: {e}")))?;

        self.pool.reset_idle_timer(&key).await;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_status = output.status.code().map(|c| c as u32);

        // Mirror the remote path: a failed command is data, not an error,
        // but never a silent one.
        if !output.status.success() && stderr.trim().is_empty() {
            stderr = match output.status.code() {
                Some(code) => format!("command exited with status {code}"),
                None => "command terminated by signal".to_string(),
            };
        }

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_status,
        })
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("local_cwd", &self.local_cwd)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectSettings, HostConfig, PoolSettings};

    fn engine() -> ExecutionEngine {
        let pool = SessionPool::new(PoolSettings::default());
        let connector = Connector::new(
            HostConfig::new("/nonexistent-config"),
            ConnectSettings::default(),
        );
        ExecutionEngine::new(pool, connector)
    }

    #[tokio::test]
    async fn test_local_echo() {
        let engine = engine();
        let out = engine
            .execute("echo hello", &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello\n");
        assert!(out.stderr.is_empty());
        assert_eq!(out.exit_status, Some(0));
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_local_nonzero_exit_is_data_not_error() {
        let engine = engine();
        let out = engine
            .execute("exit 3", &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(out.exit_status, Some(3));
        assert!(out.stderr.contains("status 3"));
    }

    #[tokio::test]
    async fn test_local_stderr_preserved_on_failure() {
        let engine = engine();
        let out = engine
            .execute("echo oops >&2; exit 1", &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.exit_status, Some(1));
    }

    #[tokio::test]
    async fn test_local_session_reused() {
        let engine = engine();
        engine.execute("true", &ExecOptions::default()).await.unwrap();
        engine.execute("true", &ExecOptions::default()).await.unwrap();
        assert_eq!(engine.pool().len().await, 1);
    }

    #[tokio::test]
    async fn test_local_env_overlay_accumulates() {
        let engine = engine();

        let out = engine
            .execute("echo $A", &ExecOptions::default().with_env("A", "1"))
            .await
            .unwrap();
        assert_eq!(out.stdout, "1\n");

        let out = engine
            .execute("echo $A $B", &ExecOptions::default().with_env("B", "2"))
            .await
            .unwrap();
        assert_eq!(out.stdout, "1 2\n");
    }

    #[tokio::test]
    async fn test_local_cwd_override() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine().with_local_cwd(dir.path());
        let out = engine.execute("pwd", &ExecOptions::default()).await.unwrap();
        let reported = PathBuf::from(out.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_remote_missing_credential_errors_before_network() {
        use std::io::Write;

        let mut config = tempfile::NamedTempFile::new().unwrap();
        config
            .write_all(b"Host nowhere\n\tHostName 127.0.0.1\n\tIdentityFile /no/such/key\n")
            .unwrap();

        let pool = SessionPool::new(PoolSettings::default());
        let connector = Connector::new(HostConfig::new(config.path()), ConnectSettings::default());
        let engine = ExecutionEngine::new(pool, connector);

        let err = engine
            .execute("true", &ExecOptions::default().with_host("nowhere"))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Credential(_)));
        assert!(engine.pool().is_empty().await);
    }
}
