//! Error types for ssh-relay.

use thiserror::Error;

/// Main error type for ssh-relay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Credential file missing, unreadable, or in an unsupported format.
    ///
    /// Deterministic: retrying a connection cannot fix a bad key file, so
    /// this is never subject to the connect retry loop.
    #[error("credential error: {0}")]
    Credential(String),

    /// Network-level connection or authentication failure after the retry
    /// budget is exhausted.
    #[error("connection to '{host}' failed: {message}")]
    Connect {
        /// Host alias the caller asked for.
        host: String,
        /// Last underlying error message.
        message: String,
    },

    /// Host configuration source unreadable or malformed.
    ///
    /// Callers treat this as "no configuration found" and proceed with
    /// defaults; it never fails an `execute` call.
    #[error("host config parse error: {0}")]
    ConfigParse(String),

    /// Failure to open a command channel or a stream-level fault during
    /// execution. A non-zero exit status is *not* an `Exec` error.
    #[error("execution error: {0}")]
    Exec(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<russh::Error> for RelayError {
    fn from(err: russh::Error) -> Self {
        RelayError::Exec(err.to_string())
    }
}

/// Convenience Result type for ssh-relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_display() {
        let err = RelayError::Credential("no such file: /home/u/.ssh/id_rsa".into());
        assert!(err.to_string().contains("credential error"));
        assert!(err.to_string().contains("id_rsa"));
    }

    #[test]
    fn test_connect_display() {
        let err = RelayError::Connect {
            host: "build-box".into(),
            message: "connection refused".into(),
        };
        assert!(err.to_string().contains("build-box"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let relay_err: RelayError = io_err.into();
        assert!(matches!(relay_err, RelayError::Io(_)));
        assert!(relay_err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_config_parse_display() {
        let err = RelayError::ConfigParse("unterminated block".into());
        assert!(err.to_string().contains("parse error"));
    }
}
