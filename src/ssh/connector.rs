//! Connection establishment with credential resolution and bounded retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::client::{self, AuthResult};
use russh::keys::{load_secret_key, PrivateKey, PrivateKeyWithHashAlg};

use super::client::ClientHandler;
use super::RemoteSession;
use crate::config::{ConnectSettings, HostConfig};
use crate::error::{RelayError, Result};

/// Fallback SSH port when the host entry names none.
const DEFAULT_PORT: u16 = 22;

/// Establishes new remote transports.
///
/// Credential errors are deterministic and terminal: retrying cannot change a
/// missing or malformed key file, so they bypass the retry loop entirely.
/// Network errors are transient and retried with a short fixed delay, since
/// SSH endpoints frequently reject a first attempt during brief
/// unavailability.
pub struct Connector {
    config: HostConfig,
    settings: ConnectSettings,
}

impl Connector {
    /// Create a connector over the given host configuration source.
    pub fn new(config: HostConfig, settings: ConnectSettings) -> Self {
        Self { config, settings }
    }

    /// Connector reading `~/.ssh/config` with production settings.
    pub fn from_default_location() -> Self {
        Self::new(HostConfig::from_default_location(), ConnectSettings::default())
    }

    /// Establish a transport to the given host alias.
    ///
    /// Resolves the connection record, loads the credential (re-read on every
    /// attempt, tolerating the file changing between attempts), and connects
    /// with up to the configured attempt budget. On exhaustion the last
    /// connection error propagates, annotated with the alias; no partial
    /// state is left anywhere.
    pub async fn establish(&self, alias: &str) -> Result<RemoteSession> {
        let entry = self.config.resolve(alias);
        let address = entry.hostname.clone().unwrap_or_else(|| alias.to_string());
        let port = entry.port.unwrap_or(DEFAULT_PORT);
        let user = entry.user.clone().unwrap_or_else(default_user);
        let identity = entry
            .identity_file
            .clone()
            .unwrap_or_else(default_identity);

        let mut last_error = String::new();
        for attempt in 1..=self.settings.attempts {
            let key = load_key(&identity, entry.passphrase.as_deref())?;

            match self.try_connect(&address, port, &user, key).await {
                Ok(session) => {
                    tracing::info!(%alias, %address, %user, attempt, "ssh connection established");
                    return Ok(session);
                }
                Err(message) => {
                    tracing::warn!(%alias, %address, attempt, %message, "ssh connection attempt failed");
                    last_error = message;
                    if attempt < self.settings.attempts {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }

        Err(RelayError::Connect {
            host: alias.to_string(),
            message: last_error,
        })
    }

    async fn try_connect(
        &self,
        address: &str,
        port: u16,
        user: &str,
        key: PrivateKey,
    ) -> std::result::Result<RemoteSession, String> {
        let config = Arc::new(client::Config {
            keepalive_interval: Some(self.settings.keepalive_interval),
            ..Default::default()
        });

        let mut handle = tokio::time::timeout(
            self.settings.connect_timeout,
            client::connect(config, (address, port), ClientHandler),
        )
        .await
        .map_err(|_| {
            format!(
                "connect timed out after {}s",
                self.settings.connect_timeout.as_secs()
            )
        })?
        .map_err(|e| e.to_string())?;

        let rsa_hash = handle
            .best_supported_rsa_hash()
            .await
            .map_err(|e| e.to_string())?
            .flatten();

        let auth = handle
            .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), rsa_hash))
            .await
            .map_err(|e| e.to_string())?;

        match auth {
            AuthResult::Success => Ok(RemoteSession::new(handle)),
            AuthResult::Failure { .. } => Err(format!("authentication failed for user '{user}'")),
        }
    }
}

/// Load key material, classifying every failure as a terminal credential
/// error.
fn load_key(path: &Path, passphrase: Option<&str>) -> Result<PrivateKey> {
    load_secret_key(path, passphrase)
        .map_err(|e| RelayError::Credential(format!("{}: {e}", path.display())))
}

/// Login user applied when the host entry names none.
fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".to_string())
}

/// Identity file applied when the host entry names none: `~/.ssh/id_ed25519`
/// when present, otherwise `~/.ssh/id_rsa`.
fn default_identity() -> PathBuf {
    let ssh_dir = dirs::home_dir()
        .map(|h| h.join(".ssh"))
        .unwrap_or_else(|| PathBuf::from(".ssh"));
    let ed25519 = ssh_dir.join("id_ed25519");
    if ed25519.exists() {
        ed25519
    } else {
        ssh_dir.join("id_rsa")
    }
}
