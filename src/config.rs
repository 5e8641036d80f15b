//! Host configuration and tunable settings.
//!
//! Connection parameters are resolved from an OpenSSH-style, line-oriented
//! configuration file made of `Host <alias>` blocks:
//!
//! ```text
//! Host build-box
//!     HostName 10.0.0.12
//!     User ci
//!     IdentityFile ~/.ssh/id_ci
//!     Port 2222
//! ```
//!
//! Resolution is a pure lookup: a missing entry yields an empty record and an
//! unreadable or malformed source degrades to "no configuration found" rather
//! than failing the caller. The connector applies defaults for anything the
//! record omits.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Environment variable naming the default working directory for local
/// command execution. When unset, commands run in the process's own cwd.
pub const LOCAL_CWD_ENV: &str = "SSH_RELAY_LOCAL_CWD";

/// Connection parameters resolved for one host alias.
///
/// Every field is optional; the connector fills in defaults. Produced once
/// per connection attempt and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEntry {
    /// Address to connect to (`HostName`). Falls back to the alias itself.
    pub hostname: Option<String>,
    /// Login user (`User`).
    pub user: Option<String>,
    /// Private key path (`IdentityFile`), `~` expanded.
    pub identity_file: Option<PathBuf>,
    /// Key passphrase (`Passphrase`).
    pub passphrase: Option<String>,
    /// TCP port (`Port`). Defaults to 22.
    pub port: Option<u16>,
}

impl HostEntry {
    /// Whether the record carries no configuration at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Host configuration source.
///
/// Holds only the file path; the file is re-read on every [`resolve`] call so
/// edits take effect on the next connection attempt.
///
/// [`resolve`]: HostConfig::resolve
#[derive(Debug, Clone)]
pub struct HostConfig {
    path: PathBuf,
}

impl HostConfig {
    /// Create a config source backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional location, `~/.ssh/config`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".ssh").join("config"))
    }

    /// Config source at the conventional location, or a path that will
    /// resolve to empty records when no home directory exists.
    pub fn from_default_location() -> Self {
        Self::new(Self::default_path().unwrap_or_else(|| PathBuf::from("/nonexistent")))
    }

    /// Resolve a host alias to its connection record.
    ///
    /// Never fails: a missing entry, missing file, or malformed file all
    /// yield an empty record (the latter two logged at warn).
    pub fn resolve(&self, alias: &str) -> HostEntry {
        match self.try_resolve(alias) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "host config unreadable, using defaults");
                HostEntry::default()
            }
        }
    }

    fn try_resolve(&self, alias: &str) -> Result<HostEntry> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| RelayError::ConfigParse(e.to_string()))?;
        let blocks = parse_blocks(&content)?;
        Ok(blocks.get(alias).cloned().unwrap_or_default())
    }
}

/// Parse `Host` blocks into a map keyed by alias.
///
/// Directives are case-insensitive and accept either whitespace or `=` as the
/// key/value separator. Lines starting with `#` are comments. Directives
/// outside any `Host` block are ignored.
fn parse_blocks(content: &str) -> Result<HashMap<String, HostEntry>> {
    let mut blocks = HashMap::new();
    let mut current: Option<(String, HostEntry)> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = split_directive(line)
            .ok_or_else(|| RelayError::ConfigParse(format!("malformed line: {line:?}")))?;

        if key.eq_ignore_ascii_case("host") {
            if let Some((alias, entry)) = current.take() {
                blocks.insert(alias, entry);
            }
            current = Some((value.to_string(), HostEntry::default()));
            continue;
        }

        let Some((_, entry)) = current.as_mut() else {
            continue;
        };

        match key.to_ascii_lowercase().as_str() {
            "hostname" => entry.hostname = Some(value.to_string()),
            "user" => entry.user = Some(value.to_string()),
            "identityfile" => entry.identity_file = Some(expand_tilde(value)),
            "passphrase" => entry.passphrase = Some(value.to_string()),
            "port" => {
                entry.port = Some(value.parse().map_err(|_| {
                    RelayError::ConfigParse(format!("invalid port: {value:?}"))
                })?)
            }
            // Unknown directives are tolerated, matching ssh_config readers.
            _ => {}
        }
    }

    if let Some((alias, entry)) = current {
        blocks.insert(alias, entry);
    }

    Ok(blocks)
}

/// Split a config line into directive keyword and value.
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let (key, rest) = line.split_once(['=', ' ', '\t'])?;
    let value = rest.trim_start_matches(['=', ' ', '\t']).trim();
    if value.is_empty() {
        return None;
    }
    Some((key.trim(), value))
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Default working directory for local execution, from [`LOCAL_CWD_ENV`].
pub fn local_working_dir() -> Option<PathBuf> {
    std::env::var_os(LOCAL_CWD_ENV).map(PathBuf::from)
}

/// Connection establishment tunables.
///
/// Defaults match the production constants; tests inject shorter values.
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    /// Maximum connection attempts per `establish` call.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Bound on a single connection attempt.
    pub connect_timeout: Duration,
    /// Keepalive interval once the transport is open.
    pub keepalive_interval: Duration,
}

impl Default for ConnectSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(15),
        }
    }
}

/// Session pool tunables.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Inactivity period after which a session is torn down.
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(20 * 60),
        }
    }
}
