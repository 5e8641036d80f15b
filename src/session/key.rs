//! Session key derivation.

use std::fmt;

/// Sentinel key component for local execution.
const LOCAL_SENTINEL: &str = "local";

/// Opaque identifier grouping all calls that may share one transport.
///
/// Derived deterministically from the target host alias, or a fixed sentinel
/// when no host is given (local execution). Equal inputs always produce equal
/// keys, and at most one live session exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Key for a remote host alias.
    pub fn for_host(host: &str) -> Self {
        Self(format!("ssh:{host}"))
    }

    /// Key for local execution.
    pub fn local() -> Self {
        Self(LOCAL_SENTINEL.to_string())
    }

    /// Derive a key from an optional host alias.
    pub fn derive(host: Option<&str>) -> Self {
        match host {
            Some(h) => Self::for_host(h),
            None => Self::local(),
        }
    }

    /// Whether this is the local-execution sentinel.
    pub fn is_local(&self) -> bool {
        self.0 == LOCAL_SENTINEL
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_deterministic() {
        assert_eq!(SessionKey::for_host("a"), SessionKey::for_host("a"));
        assert_eq!(SessionKey::local(), SessionKey::local());
    }

    #[test]
    fn test_distinct_hosts_distinct_keys() {
        let keys: HashSet<_> = ["a", "b", "c"].iter().map(|h| SessionKey::for_host(h)).collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_derive() {
        assert_eq!(SessionKey::derive(Some("a")), SessionKey::for_host("a"));
        assert_eq!(SessionKey::derive(None), SessionKey::local());
    }

    #[test]
    fn test_is_local() {
        assert!(SessionKey::local().is_local());
        assert!(!SessionKey::for_host("a").is_local());
        // A host literally named "local" must not collide with the sentinel
        assert!(!SessionKey::for_host("local").is_local());
    }
}
