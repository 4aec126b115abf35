//! SSH transport implementation using russh.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use log::{debug, info, warn};
use russh::client::{self, Handle};
use russh::keys::{HashAlg, PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{ChannelMsg, Disconnect, Preferred, cipher, kex};
use secrecy::ExposeSecret;
use tokio::net::TcpStream;

use super::config::{AuthMethod, ConnectionConfig, HostKeyVerification};
use super::output::sanitize;
use super::{Connector, Shell};
use crate::error::{ConnectError, ExecError};
use crate::platform::ApplianceProfile;

/// Key exchange offers, most preferred first.
///
/// The group1/group14 SHA-1 entries keep older FortiOS firmware negotiable.
const KEX_PREFERENCE: &[kex::Name] = &[
    kex::DH_G14_SHA256,
    kex::DH_G14_SHA1,
    kex::DH_G1_SHA1,
    kex::EXTENSION_SUPPORT_AS_CLIENT,
    kex::EXTENSION_OPENSSH_STRICT_KEX_AS_CLIENT,
];

/// Cipher offers, most preferred first.
const CIPHER_PREFERENCE: &[cipher::Name] = &[
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
];

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Opens russh sessions to the appliance.
#[derive(Debug, Clone)]
pub struct SshConnector {
    profile: ApplianceProfile,
}

impl SshConnector {
    /// Connector for the given appliance profile.
    pub fn new(profile: ApplianceProfile) -> Self {
        Self { profile }
    }

    fn client_config() -> client::Config {
        client::Config {
            // The session is long-lived; liveness comes from keepalives.
            inactivity_timeout: None,
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            keepalive_max: 3,
            preferred: Preferred {
                kex: Cow::Borrowed(KEX_PREFERENCE),
                cipher: Cow::Borrowed(CIPHER_PREFERENCE),
                ..Preferred::default()
            },
            ..Default::default()
        }
    }

    async fn establish(&self, config: &ConnectionConfig) -> Result<SshShell, ConnectError> {
        let addr = tokio::net::lookup_host((config.host.as_str(), config.port))
            .await
            .map_err(|e| ConnectError::DnsFailure {
                host: config.host.clone(),
                detail: e.to_string(),
            })?
            .next()
            .ok_or_else(|| ConnectError::DnsFailure {
                host: config.host.clone(),
                detail: "no addresses returned".to_string(),
            })?;
        debug!("{} resolved to {}", config.host, addr);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ConnectError::from_io(&e, &config.host, config.port, config.timeout))?;

        let host_key_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        let mut session = client::connect_stream(Arc::new(Self::client_config()), stream, handler)
            .await
            .map_err(|e| {
                // Prefer the detailed host key verdict over russh's generic UnknownKey
                match host_key_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                {
                    Some(reason) => ConnectError::Other(reason),
                    None => classify(&e, config),
                }
            })?;

        authenticate(&mut session, config).await?;

        Ok(SshShell {
            session,
            benign_stderr: self.profile.benign_stderr.clone(),
        })
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(crate::platform::fortigate::profile())
    }
}

impl Connector for SshConnector {
    type Shell = SshShell;

    async fn open(&self, config: &ConnectionConfig) -> Result<SshShell, ConnectError> {
        info!(
            "Opening SSH session to {} as {}",
            config.socket_addr(),
            config.username
        );
        tokio::time::timeout(config.timeout, self.establish(config))
            .await
            .map_err(|_| ConnectError::Timeout(config.timeout))?
    }
}

/// Map a russh error onto the connect taxonomy.
fn classify(err: &russh::Error, config: &ConnectionConfig) -> ConnectError {
    match err {
        russh::Error::IO(io) => ConnectError::from_io(io, &config.host, config.port, config.timeout),
        russh::Error::ConnectionTimeout => ConnectError::Timeout(config.timeout),
        russh::Error::NotAuthenticated => ConnectError::AuthFailure,
        other => {
            ConnectError::from_message(&other.to_string(), &config.host, config.port, config.timeout)
        }
    }
}

/// Authenticate with the server.
async fn authenticate(
    session: &mut Handle<SshHandler>,
    config: &ConnectionConfig,
) -> Result<(), ConnectError> {
    let success = match &config.auth {
        AuthMethod::Password(password) => session
            .authenticate_password(&config.username, password.expose_secret())
            .await
            .map_err(|e| classify(&e, config))?
            .success(),
        AuthMethod::PrivateKey { path, passphrase } => {
            let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                .map_err(|e| ConnectError::Other(format!("SSH key error: {}", e)))?;

            // Get the best RSA hash algorithm supported by the server
            let hash_alg = session
                .best_supported_rsa_hash()
                .await
                .map_err(|e| classify(&e, config))?
                .flatten();

            session
                .authenticate_publickey(
                    &config.username,
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
                .map_err(|e| classify(&e, config))?
                .success()
        }
    };

    if !success {
        return Err(ConnectError::AuthFailure);
    }

    Ok(())
}

/// An authenticated russh session.
///
/// Every command runs on its own exec channel, without a PTY, so output
/// paging never blocks the read.
pub struct SshShell {
    session: Handle<SshHandler>,
    benign_stderr: Vec<String>,
}

impl SshShell {
    fn stderr_is_benign(&self, stderr: &str) -> bool {
        self.benign_stderr.iter().any(|p| stderr.contains(p.as_str()))
    }
}

impl Shell for SshShell {
    async fn run_line(&self, command: &str) -> Result<String, ExecError> {
        let transport = |e: russh::Error| ExecError::TransportFailure(e.to_string());

        let mut channel = self.session.channel_open_session().await.map_err(transport)?;
        channel.exec(true, command).await.map_err(transport)?;

        let mut stdout = BytesMut::new();
        let mut stderr = BytesMut::new();
        let mut completed = false;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => {
                    completed = true;
                    if exit_status != 0 {
                        debug!("command exited with status {}", exit_status);
                    }
                }
                ChannelMsg::Eof | ChannelMsg::Close => {
                    completed = true;
                    break;
                }
                _ => {}
            }
        }

        // channel dropped by russh: the session went away mid-command
        if !completed {
            return Err(ExecError::TransportFailure(
                "channel closed before EOF".to_string(),
            ));
        }

        if !stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&stderr);
            if !self.stderr_is_benign(&stderr) {
                warn!("SSH stderr: {}", stderr.trim());
            }
        }

        Ok(sanitize(&stdout))
    }

    fn is_alive(&self) -> bool {
        !self.session.is_closed()
    }

    async fn close(self) {
        if let Err(e) = self
            .session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("Ignoring error while closing SSH session: {}", e);
        }
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Stores a detailed host-key verdict so connect can surface it
    /// instead of the generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<String>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(reason)` if the key changed or the file is unreadable.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> Result<bool, String> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(format!(
                "Host key for {}:{} changed (known_hosts line {}) - refusing to connect",
                self.host, self.port, line
            )),
            Err(e) => Err(format!("known_hosts error: {}", e)),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> Result<(), String> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| e.to_string())
    }

    fn reject(&self, reason: String) -> bool {
        warn!("{}", reason);
        *self
            .host_key_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason);
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        debug!(
            "{}:{} presented host key {}",
            self.host,
            self.port,
            server_public_key.fingerprint(HashAlg::Sha256)
        );

        let verdict = match self.host_key_verification {
            HostKeyVerification::Disabled => true,

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => {
                    info!("Learning host key for {}:{}", self.host, self.port);
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    true
                }
                Err(reason) => self.reject(reason),
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => self.reject(format!(
                    "Host key for {}:{} is not in known_hosts (strict verification)",
                    self.host, self.port
                )),
                Err(reason) => self.reject(reason),
            },
        };

        Ok(verdict)
    }
}
