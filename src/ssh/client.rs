//! SSH client handler and remote command channels.

use russh::client::{self, Handle};
use russh::keys::ssh_key;
use russh::{ChannelMsg, Disconnect};
use tokio::sync::Mutex;

use crate::error::{RelayError, Result};
use crate::execution::ExecOutput;

/// Round-trip command issued to verify a cached transport before reuse.
const PROBE_COMMAND: &str = "echo ok";

/// Expected probe output (trimmed).
const PROBE_EXPECTED: &str = "ok";

/// Stream id of stderr in SSH extended data messages.
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// russh event handler for client connections.
///
/// Host key verification is accepted unconditionally, matching the trust
/// model of the alias-based host configuration this crate consumes.
pub(crate) struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// One live SSH connection, shared by every execution targeting its key.
///
/// Wraps the russh handle behind a mutex so channel opens and disconnects
/// from concurrent executions do not interleave mid-operation.
pub struct RemoteSession {
    handle: Mutex<Handle<ClientHandler>>,
}

impl RemoteSession {
    pub(crate) fn new(handle: Handle<ClientHandler>) -> Self {
        Self {
            handle: Mutex::new(handle),
        }
    }

    /// Run a command over a fresh exec channel.
    ///
    /// Standard output and standard error accumulate independently until the
    /// channel closes; both are returned verbatim. `on_data` fires on every
    /// received chunk so the caller can refresh its idle timer mid-command.
    /// A non-zero remote exit status is not an error, but a transport that
    /// dies mid-command (channel ends with no exit status, connection gone)
    /// is.
    pub async fn exec(&self, command: &str, mut on_data: impl FnMut()) -> Result<ExecOutput> {
        let mut channel = {
            let handle = self.handle.lock().await;
            handle
                .channel_open_session()
                .await
                .map_err(|e| RelayError::Exec(format!("failed to open channel: {e}")))?
        };

        channel
            .exec(true, command)
            .await
            .map_err(|e| RelayError::Exec(format!("failed to start command: {e}")))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => {
                    stdout.extend_from_slice(data);
                    on_data();
                }
                ChannelMsg::ExtendedData { ref data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                    stderr.extend_from_slice(data);
                    on_data();
                }
                ChannelMsg::ExitStatus { exit_status: code } => {
                    exit_status = Some(code);
                }
                _ => {}
            }
        }

        if exit_status.is_none() {
            let handle = self.handle.lock().await;
            if handle.is_closed() {
                return Err(RelayError::Exec(
                    "transport closed during command execution".to_string(),
                ));
            }
        }

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }

    /// Verify the transport still completes a trivial round trip.
    ///
    /// Never errors; any channel failure, stream fault, or output mismatch
    /// reads as "not alive".
    pub async fn is_alive(&self) -> bool {
        {
            let handle = self.handle.lock().await;
            if handle.is_closed() {
                return false;
            }
        }

        match self.exec(PROBE_COMMAND, || {}).await {
            Ok(output) => output.stdout.trim() == PROBE_EXPECTED,
            Err(err) => {
                tracing::debug!(%err, "liveness probe failed");
                false
            }
        }
    }

    /// Gracefully close the connection. Errors are logged and swallowed;
    /// teardown must not fail the caller.
    pub async fn disconnect(&self) {
        let handle = self.handle.lock().await;
        if let Err(err) = handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await
        {
            tracing::debug!(%err, "error during ssh disconnect");
        }
    }
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession").finish_non_exhaustive()
    }
}
