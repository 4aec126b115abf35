//! Appliance connection configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use log::warn;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Default connect timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For lab use only.
    Disabled,
}

impl HostKeyVerification {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" | "yes" => Some(Self::Strict),
            "accept-new" | "accept_new" => Some(Self::AcceptNew),
            "disabled" | "no" | "off" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Authentication method for the management session.
#[derive(Clone)]
pub enum AuthMethod {
    /// Password authentication.
    Password(SecretString),

    /// Private key authentication.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password(_) => f.write_str("Password(<redacted>)"),
            AuthMethod::PrivateKey { path, .. } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .finish_non_exhaustive(),
        }
    }
}

/// Connection settings for the single managed appliance.
///
/// Immutable once built. The secret never leaves this struct except
/// towards the SSH authenticator.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Appliance hostname or IP address.
    pub host: String,

    /// SSH port.
    pub port: u16,

    /// Administrator account.
    pub username: String,

    /// Credential used to log in.
    pub auth: AuthMethod,

    /// Connect timeout (covers resolution, TCP, handshake and login).
    pub timeout: Duration,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,
}

/// Connection identity that is safe to show to operators.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConnectionInfo {
    pub hostname: String,
    pub username: String,
    pub port: u16,
}

impl ConnectionConfig {
    /// Start building a configuration for `host`.
    pub fn builder(host: impl Into<String>) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(host)
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Everything but the secret.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            hostname: self.host.clone(),
            username: self.username.clone(),
            port: self.port,
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup.
    ///
    /// Recognized variables: `FORTIGATE_HOST`, `FORTIGATE_USERNAME`,
    /// `FORTIGATE_PASSWORD`, `FORTIGATE_PORT`, `FORTIGATE_TIMEOUT` (milliseconds),
    /// `FORTIGATE_PRIVATE_KEY`, `FORTIGATE_HOST_KEY_POLICY`, `FORTIGATE_KNOWN_HOSTS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = get("FORTIGATE_HOST");
        let username = get("FORTIGATE_USERNAME");
        let password = get("FORTIGATE_PASSWORD");
        let private_key = get("FORTIGATE_PRIVATE_KEY");

        let mut missing = Vec::new();
        if host.is_none() {
            missing.push("FORTIGATE_HOST");
        }
        if username.is_none() {
            missing.push("FORTIGATE_USERNAME");
        }
        if password.is_none() && private_key.is_none() {
            missing.push("FORTIGATE_PASSWORD");
        }
        let (Some(host), Some(username)) = (host, username) else {
            return Err(ConfigError::Missing(missing));
        };
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let mut builder = ConnectionConfig::builder(host).username(username);

        builder = match (private_key, password) {
            (Some(path), Some(passphrase)) => {
                builder.private_key_with_passphrase(path, passphrase)
            }
            (Some(path), None) => builder.private_key(path),
            (None, Some(password)) => builder.password(password),
            (None, None) => return Err(ConfigError::Missing(vec!["FORTIGATE_PASSWORD"])),
        };

        if let Some(port) = get("FORTIGATE_PORT") {
            let port = port.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "FORTIGATE_PORT",
                message: e.to_string(),
            })?;
            builder = builder.port(port);
        }

        if let Some(ms) = get("FORTIGATE_TIMEOUT") {
            let ms = ms.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: "FORTIGATE_TIMEOUT",
                message: e.to_string(),
            })?;
            builder = builder.timeout(Duration::from_millis(ms));
        }

        if let Some(policy) = get("FORTIGATE_HOST_KEY_POLICY") {
            let mode =
                HostKeyVerification::parse(&policy).ok_or_else(|| ConfigError::Invalid {
                    key: "FORTIGATE_HOST_KEY_POLICY",
                    message: format!("expected strict, accept-new or disabled, got '{policy}'"),
                })?;
            builder = builder.host_key_verification(mode);
        }

        if let Some(path) = get("FORTIGATE_KNOWN_HOSTS") {
            builder = builder.known_hosts_path(path);
        }

        builder.build()
    }
}

/// Load the connection configuration, degrading to `None` with a warning.
///
/// A missing configuration is not fatal: the service still starts and
/// reports "not configured" until the environment is fixed.
pub fn load_connection_config() -> Option<ConnectionConfig> {
    match ConnectionConfig::from_env() {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Appliance connection not configured: {}", e);
            None
        }
    }
}

/// Builder for [`ConnectionConfig`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use fortiaddr::ConnectionConfig;
///
/// let config = ConnectionConfig::builder("192.168.1.99")
///     .username("admin")
///     .password("secret")
///     .port(2222)
///     .timeout(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// assert_eq!(config.socket_addr(), "192.168.1.99:2222");
/// ```
pub struct ConnectionConfigBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    auth: Option<AuthMethod>,
    timeout: Duration,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
}

impl ConnectionConfigBuilder {
    /// Create a new builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: None,
            auth: None,
            timeout: DEFAULT_TIMEOUT,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = Some(AuthMethod::Password(SecretString::from(password.into())));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = Some(AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        });
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = Some(AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        });
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the host key verification mode.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use a specific known_hosts file.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ConnectionConfig, ConfigError> {
        let username = self
            .username
            .ok_or(ConfigError::Missing(vec!["FORTIGATE_USERNAME"]))?;
        let auth = self
            .auth
            .ok_or(ConfigError::Missing(vec!["FORTIGATE_PASSWORD"]))?;

        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing(vec!["FORTIGATE_HOST"]));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "FORTIGATE_TIMEOUT",
                message: "timeout must be greater than zero".to_string(),
            });
        }

        Ok(ConnectionConfig {
            host: self.host,
            port: self.port,
            username,
            auth,
            timeout: self.timeout,
            host_key_verification: self.host_key_verification,
            known_hosts_path: self.known_hosts_path,
        })
    }
}
