//! One command at a time on the shared shell.
//!
//! The shell sits in a single-slot async mutex. A command holds the slot
//! for its whole round trip and, when it changes configuration, for the
//! settle delay after it, so no two command blocks interleave and no two
//! settle windows overlap.

use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;

use crate::error::ExecError;
use crate::transport::Shell;

/// Whether a command changes appliance configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Returns as soon as output is collected.
    Read,
    /// Followed by the settle delay before the caller resumes.
    Mutation,
}

/// Single-slot command queue around one shell.
pub struct CommandSerializer<S> {
    slot: Mutex<Option<S>>,
    settle_delay: Duration,
    command_timeout: Duration,
}

impl<S: Shell> CommandSerializer<S> {
    pub fn new(settle_delay: Duration, command_timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            settle_delay,
            command_timeout,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Put a shell in the slot, returning whatever was there before.
    pub async fn install(&self, shell: S) -> Option<S> {
        self.slot.lock().await.replace(shell)
    }

    /// Put a shell in the slot if `admit` agrees while the slot is held.
    ///
    /// `Ok` carries the displaced occupant, `Err` hands the refused shell
    /// back. Either way the caller owns what it gets and must close it.
    pub async fn install_if(&self, shell: S, admit: impl FnOnce() -> bool) -> Result<Option<S>, S> {
        let mut slot = self.slot.lock().await;
        if admit() {
            Ok(slot.replace(shell))
        } else {
            Err(shell)
        }
    }

    /// Empty the slot. Waits for an in-flight command to finish first.
    pub async fn take(&self) -> Option<S> {
        self.slot.lock().await.take()
    }

    /// Empty the slot if `admit` still agrees once the slot is held.
    pub async fn take_if(&self, admit: impl FnOnce() -> bool) -> Option<S> {
        let mut slot = self.slot.lock().await;
        if admit() { slot.take() } else { None }
    }

    /// Run one command through the slot.
    pub async fn run(&self, command: &str, kind: CommandKind) -> Result<String, ExecError> {
        self.run_checked(command, kind, |_| Ok(())).await
    }

    /// Like [`run`](Self::run), with `check` applied to the output before
    /// any settle delay. A failed check skips the delay.
    pub async fn run_checked(
        &self,
        command: &str,
        kind: CommandKind,
        check: impl FnOnce(&str) -> Result<(), ExecError>,
    ) -> Result<String, ExecError> {
        let slot = self.slot.lock().await;
        let shell = slot.as_ref().ok_or(ExecError::NotConnected)?;
        if !shell.is_alive() {
            return Err(ExecError::TransportFailure(
                "SSH session closed by peer".to_string(),
            ));
        }

        let output = run_with_timeout(shell, command, self.command_timeout).await?;
        check(&output)?;

        if kind == CommandKind::Mutation && !self.settle_delay.is_zero() {
            debug!("Settling for {:?}", self.settle_delay);
            tokio::time::sleep(self.settle_delay).await;
        }

        Ok(output)
    }
}

/// Run a command directly on `shell`, bounded by `timeout`.
pub(crate) async fn run_with_timeout<S: Shell>(
    shell: &S,
    command: &str,
    timeout: Duration,
) -> Result<String, ExecError> {
    debug!("Sending: {}", command.trim_end());
    let output = tokio::time::timeout(timeout, shell.run_line(command))
        .await
        .map_err(|_| ExecError::Timeout(timeout))??;
    debug!("Received {} bytes", output.len());
    Ok(output)
}
