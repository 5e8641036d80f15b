//! Effective-command construction for remote execution.
//!
//! Remote commands carry their environment as a prefix of shell `export`
//! statements, then run inside an interactive login shell so profile-sourced
//! `PATH` and environment setup applies on the target host.

use std::collections::HashMap;

use crate::error::{RelayError, Result};

/// Escape an environment value for embedding in a double-quoted export.
///
/// Neutralizes embedded double quotes (and the backslashes that could
/// un-neutralize them) so a value like `a"b` survives the round trip.
pub fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Build the `export` statement prefix for an environment overlay.
///
/// Keys are emitted in sorted order so the effective command is
/// deterministic for a given overlay.
pub fn export_prefix(env: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = env.keys().collect();
    keys.sort();

    let mut prefix = String::new();
    for key in keys {
        let value = escape_value(&env[key]);
        prefix.push_str(&format!("export {key}=\"{value}\"; "));
    }
    prefix
}

/// Build the full remote command: export prefix, then the caller's command,
/// wrapped to run inside an interactive login shell.
pub fn build_remote_command(command: &str, env: &HashMap<String, String>) -> Result<String> {
    let full = format!("{}{}", export_prefix(env), command);
    let quoted = shlex::try_quote(&full)
        .map_err(|_| RelayError::Exec("command contains a NUL byte".to_string()))?;
    Ok(format!("bash -ilc {quoted}"))
}
