//! SSH transport layer.
//!
//! This module owns the raw remote-shell connection: connect, authenticate,
//! run one block of text, collect its output, disconnect. It knows nothing
//! about FortiOS semantics.

pub mod config;
pub mod output;
mod ssh;

use std::future::Future;

pub use config::{
    AuthMethod, ConnectionConfig, ConnectionConfigBuilder, ConnectionInfo, HostKeyVerification,
    load_connection_config,
};
pub use ssh::{SshConnector, SshShell};

use crate::error::{ConnectError, ExecError};

/// Opens management sessions.
///
/// Implemented by [`SshConnector`] for real appliances; tests substitute a
/// scripted connector so lifecycle logic runs without a network.
pub trait Connector: Send + Sync + 'static {
    /// The session handle this connector produces.
    type Shell: Shell;

    /// Establish and authenticate a new session.
    fn open(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Shell, ConnectError>> + Send;
}

/// An authenticated remote shell.
pub trait Shell: Send + Sync + 'static {
    /// Send one line (or a newline-separated block) and return captured stdout.
    fn run_line(&self, command: &str) -> impl Future<Output = Result<String, ExecError>> + Send;

    /// Whether the underlying session is still usable.
    fn is_alive(&self) -> bool {
        true
    }

    /// Release the session. Best-effort, never fails.
    fn close(self) -> impl Future<Output = ()> + Send;
}
