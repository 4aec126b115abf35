//! Error types for fortiaddr.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for fortiaddr operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Establishing the management session failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Running a command on the management session failed.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// A structured request could not be turned into appliance commands.
    #[error(transparent)]
    Translation(#[from] TranslationError),

    /// Configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether this error means the management session is gone.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Error::Exec(e) if e.is_connection_loss())
    }
}

/// Connection establishment errors, one operator-facing message per kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The appliance hostname did not resolve.
    #[error("Could not resolve hostname '{host}': {detail}")]
    DnsFailure { host: String, detail: String },

    /// The TCP connection was refused or reset.
    #[error("Connection refused - check the address and port ({host}:{port})")]
    RefusedOrFiltered { host: String, port: u16 },

    /// The appliance did not answer in time.
    #[error("Connection timed out after {0:?} - the appliance is not responding")]
    Timeout(Duration),

    /// The appliance rejected the credentials.
    #[error("Authentication failed - check username and password")]
    AuthFailure,

    /// A disconnect or newer attempt superseded this one before it finished.
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// Anything else, with the raw transport message preserved.
    #[error("{0}")]
    Other(String),
}

impl ConnectError {
    /// Classify an I/O error raised while reaching the appliance.
    pub fn from_io(err: &io::Error, host: &str, port: u16, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => ConnectError::RefusedOrFiltered {
                host: host.to_string(),
                port,
            },
            io::ErrorKind::TimedOut => ConnectError::Timeout(timeout),
            _ => Self::from_message(&err.to_string(), host, port, timeout),
        }
    }

    /// Classify an opaque transport message by the substrings it is known to carry.
    ///
    /// Only used where the transport exposes no structured error.
    pub fn from_message(message: &str, host: &str, port: u16, timeout: Duration) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("enotfound")
            || lower.contains("failed to lookup address")
            || lower.contains("name or service not known")
        {
            ConnectError::DnsFailure {
                host: host.to_string(),
                detail: message.to_string(),
            }
        } else if lower.contains("econnrefused") || lower.contains("connection refused") {
            ConnectError::RefusedOrFiltered {
                host: host.to_string(),
                port,
            }
        } else if lower.contains("etimedout") || lower.contains("timed out") {
            ConnectError::Timeout(timeout)
        } else if lower.contains("authentication") {
            ConnectError::AuthFailure
        } else {
            ConnectError::Other(message.to_string())
        }
    }
}

/// Command execution errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// No management session is established.
    #[error("No active SSH session to the appliance")]
    NotConnected,

    /// The session broke while running a command.
    #[error("Command transport failed: {0}")]
    TransportFailure(String),

    /// The command did not complete in time.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// The appliance answered with a CLI error.
    #[error("Appliance rejected the command: {message}")]
    Rejected { message: String },
}

impl ExecError {
    /// Kinds that leave the shared session unusable.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, ExecError::TransportFailure(_) | ExecError::Timeout(_))
    }
}

/// Errors turning structured requests into command blocks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// The object kind is not one of mac, subnet, fqdn, range.
    #[error("Unsupported object type: {0}")]
    UnsupportedKind(String),

    /// The value does not match the encoding its kind requires.
    #[error("Malformed {kind} value '{value}': {reason}")]
    MalformedValue {
        kind: String,
        value: String,
        reason: String,
    },

    /// Object or member names cannot be quoted safely.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variables are absent.
    #[error("Missing configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    /// A variable is present but unusable.
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Result type alias using fortiaddr's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(5);

    #[test]
    fn test_io_refused_is_classified() {
        let err = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(
            ConnectError::from_io(&err, "fw", 22, T),
            ConnectError::RefusedOrFiltered {
                host: "fw".into(),
                port: 22
            }
        );
    }

    #[test]
    fn test_io_timeout_is_classified() {
        let err = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(ConnectError::from_io(&err, "fw", 22, T), ConnectError::Timeout(T));
    }

    #[test]
    fn test_message_fallback() {
        assert!(matches!(
            ConnectError::from_message("getaddrinfo ENOTFOUND fw.lan", "fw.lan", 22, T),
            ConnectError::DnsFailure { .. }
        ));
        assert!(matches!(
            ConnectError::from_message("All configured authentication methods failed", "fw", 22, T),
            ConnectError::AuthFailure
        ));
        assert_eq!(
            ConnectError::from_message("kex mismatch", "fw", 22, T),
            ConnectError::Other("kex mismatch".into())
        );
    }

    #[test]
    fn test_connection_loss_kinds() {
        assert!(ExecError::TransportFailure("eof".into()).is_connection_loss());
        assert!(ExecError::Timeout(T).is_connection_loss());
        assert!(!ExecError::NotConnected.is_connection_loss());
        assert!(!ExecError::Rejected { message: "x".into() }.is_connection_loss());
        assert!(Error::from(ExecError::Timeout(T)).is_connection_loss());
    }

    #[test]
    fn test_missing_config_message() {
        let err = ConfigError::Missing(vec!["FORTIGATE_HOST", "FORTIGATE_PASSWORD"]);
        assert_eq!(
            err.to_string(),
            "Missing configuration: FORTIGATE_HOST, FORTIGATE_PASSWORD"
        );
    }
}
