//! Lifecycle of the single management session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

use super::serializer::{CommandKind, CommandSerializer, run_with_timeout};
use super::settings::ServiceSettings;
use super::state::SessionState;
use crate::error::{ConfigError, ConnectError, ExecError, Result};
use crate::platform::ApplianceProfile;
use crate::transport::{ConnectionConfig, ConnectionInfo, Connector, Shell, SshConnector};

/// Variables that must be set before a connection can be attempted.
const REQUIRED_VARIABLES: [&str; 3] = ["FORTIGATE_HOST", "FORTIGATE_USERNAME", "FORTIGATE_PASSWORD"];

/// Result of a connect call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new session is established and validated.
    Connected(ConnectionInfo),
    /// Another caller's attempt is still running; nothing was done.
    AlreadyConnecting,
}

impl ConnectOutcome {
    pub fn message(&self) -> String {
        match self {
            ConnectOutcome::Connected(info) => {
                format!("Connected to FortiGate at {}:{}", info.hostname, info.port)
            }
            ConnectOutcome::AlreadyConnecting => "Connection in progress".to_string(),
        }
    }
}

/// Owns the management session and its state machine.
///
/// Share it behind an `Arc`; every method takes `&self`.
///
/// # Example
///
/// ```rust,no_run
/// use fortiaddr::{ConnectionConfig, SessionManager};
///
/// # async fn demo() -> Result<(), fortiaddr::Error> {
/// let config = ConnectionConfig::builder("192.168.1.99")
///     .username("admin")
///     .password("secret")
///     .build()?;
/// let manager = SessionManager::new(Some(config));
/// manager.connect().await?;
/// let status = manager.execute_command("get system status").await?;
/// println!("{}", status);
/// manager.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct SessionManager<C: Connector = SshConnector> {
    connector: C,
    config: Option<ConnectionConfig>,
    profile: ApplianceProfile,
    state: Mutex<SessionState>,
    /// Bumped under the state lock by every connect attempt and disconnect.
    generation: AtomicU64,
    serializer: CommandSerializer<C::Shell>,
}

impl SessionManager<SshConnector> {
    /// Manager for a FortiGate reached over SSH, with default settings.
    pub fn new(config: Option<ConnectionConfig>) -> Self {
        Self::with_connector(
            SshConnector::default(),
            config,
            crate::platform::fortigate::profile(),
            &ServiceSettings::default(),
        )
    }
}

impl<C: Connector> SessionManager<C> {
    pub fn with_connector(
        connector: C,
        config: Option<ConnectionConfig>,
        profile: ApplianceProfile,
        settings: &ServiceSettings,
    ) -> Self {
        Self {
            connector,
            config,
            profile,
            state: Mutex::new(SessionState::Disconnected),
            generation: AtomicU64::new(0),
            serializer: CommandSerializer::new(settings.settle_delay, settings.command_timeout),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Host, user and port of the configured appliance. Never the secret.
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.config.as_ref().map(ConnectionConfig::info)
    }

    pub fn profile(&self) -> &ApplianceProfile {
        &self.profile
    }

    /// Open, validate and install a new session.
    ///
    /// Single-flight: while an attempt is running, further calls return
    /// [`ConnectOutcome::AlreadyConnecting`] at once. Any failure leaves the
    /// manager `Disconnected`. A [`disconnect`](Self::disconnect) issued
    /// mid-attempt wins: the attempt closes its shell and fails with
    /// [`ConnectError::Cancelled`].
    pub async fn connect(&self) -> Result<ConnectOutcome> {
        let Some(config) = self.config.as_ref() else {
            return Err(ConfigError::Missing(REQUIRED_VARIABLES.to_vec()).into());
        };

        let attempt = {
            let mut state = self.lock_state();
            if *state == SessionState::Connecting {
                debug!("Connect requested while another attempt is running");
                return Ok(ConnectOutcome::AlreadyConnecting);
            }
            transition(&mut state, SessionState::Connecting);
            ConnectAttempt {
                manager: self,
                generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            }
        };

        info!("Connecting to FortiGate at {}", config.socket_addr());
        match self.establish(config, &attempt).await {
            Ok(()) => {
                info!("Connected to FortiGate at {}", config.socket_addr());
                Ok(ConnectOutcome::Connected(config.info()))
            }
            Err(e) => {
                attempt.finish(SessionState::Disconnected);
                error!("Connection to {} failed: {}", config.socket_addr(), e);
                Err(e)
            }
        }
    }

    async fn establish(&self, config: &ConnectionConfig, attempt: &ConnectAttempt<'_, C>) -> Result<()> {
        if let Some(previous) = self.serializer.take_if(|| attempt.is_current()).await {
            debug!("Closing previous session");
            previous.close().await;
        }

        let shell = self.connector.open(config).await?;
        if let Err(e) = self.prepare(&shell).await {
            shell.close().await;
            return Err(e);
        }

        match self.serializer.install_if(shell, || attempt.commit()).await {
            Ok(displaced) => {
                if let Some(displaced) = displaced {
                    debug!("Closing displaced session");
                    displaced.close().await;
                }
                Ok(())
            }
            Err(shell) => {
                warn!("Connect attempt superseded, closing its session");
                shell.close().await;
                Err(ConnectError::Cancelled.into())
            }
        }
    }

    /// Validation probe and terminal setup, run on the shell before it is
    /// installed. The state is still `Connecting` here, so these bypass the
    /// connected guard by going to the shell directly.
    async fn prepare(&self, shell: &C::Shell) -> Result<()> {
        let timeout = self.serializer.command_timeout();

        let status = run_with_timeout(shell, &self.profile.validation_command, timeout).await?;
        if self.profile.validation_is_terse(&status) {
            warn!(
                "Validation command returned unexpectedly short output ({} chars)",
                status.trim().len()
            );
        } else {
            debug!("Validation output: {}", status.lines().next().unwrap_or_default());
        }

        for command in &self.profile.on_open_commands {
            run_with_timeout(shell, command, timeout).await?;
        }
        Ok(())
    }

    /// `connect` when configured, otherwise a descriptive failure.
    pub async fn auto_connect(&self) -> Result<ConnectOutcome> {
        if self.config.is_none() {
            warn!("Auto-connect skipped: appliance connection is not configured");
            return Err(ConfigError::Missing(REQUIRED_VARIABLES.to_vec()).into());
        }
        self.connect().await
    }

    /// Drop the session and cancel any attempt in flight. Idempotent.
    pub async fn disconnect(&self) {
        let generation = {
            let mut state = self.lock_state();
            transition(&mut state, SessionState::Disconnected);
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        // a connect started after this call owns the slot
        if let Some(shell) = self
            .serializer
            .take_if(|| self.current_generation() == generation)
            .await
        {
            shell.close().await;
        }
    }

    /// Run a read-only command.
    pub async fn execute_command(&self, command: &str) -> Result<String> {
        self.run(command, CommandKind::Read, |_| Ok(())).await
    }

    /// Run a configuration block and wait out the settle delay.
    ///
    /// Output matching one of the profile's failure patterns is reported as
    /// [`ExecError::Rejected`] without settling; the session stays up.
    pub async fn execute_mutation(&self, block: &str) -> Result<String> {
        self.run(block, CommandKind::Mutation, |output| self.check_accepted(output))
            .await
    }

    fn check_accepted(&self, output: &str) -> std::result::Result<(), ExecError> {
        let Some(pattern) = self.profile.detect_failure(output) else {
            return Ok(());
        };
        let message = output
            .lines()
            .map(str::trim)
            .find(|line| line.contains(pattern))
            .unwrap_or(pattern)
            .to_string();
        warn!("Appliance rejected configuration change: {}", message);
        Err(ExecError::Rejected { message })
    }

    async fn run(
        &self,
        command: &str,
        kind: CommandKind,
        check: impl FnOnce(&str) -> std::result::Result<(), ExecError>,
    ) -> Result<String> {
        let generation = {
            let state = self.lock_state();
            if *state != SessionState::Connected {
                return Err(ExecError::NotConnected.into());
            }
            self.current_generation()
        };

        match self.serializer.run_checked(command, kind, check).await {
            Ok(output) => Ok(output),
            Err(e) => {
                if e.is_connection_loss() {
                    warn!("Lost appliance session: {}", e);
                    self.drop_lost_session(generation).await;
                }
                Err(e.into())
            }
        }
    }

    /// Drop the session a failed command ran on, unless a disconnect or
    /// reconnect has replaced it since.
    async fn drop_lost_session(&self, generation: u64) {
        {
            let mut state = self.lock_state();
            if *state != SessionState::Connected || self.current_generation() != generation {
                return;
            }
            transition(&mut state, SessionState::Disconnected);
        }
        if let Some(shell) = self
            .serializer
            .take_if(|| self.current_generation() == generation)
            .await
        {
            shell.close().await;
        }
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    if *state != next {
        info!("Session state: {} -> {}", *state, next);
        *state = next;
    }
}

/// One connect attempt, identified by the generation it started.
///
/// Leaves `Connecting` exactly once, even if the connect future is dropped,
/// and only while no disconnect or newer attempt has superseded it.
struct ConnectAttempt<'a, C: Connector> {
    manager: &'a SessionManager<C>,
    generation: u64,
}

impl<C: Connector> ConnectAttempt<'_, C> {
    fn is_current(&self) -> bool {
        self.manager.current_generation() == self.generation
    }

    /// Mark the session connected. Called with the shell slot held.
    fn commit(&self) -> bool {
        let mut state = self.manager.lock_state();
        if !self.is_current() {
            return false;
        }
        transition(&mut state, SessionState::Connected);
        true
    }

    fn finish(&self, next: SessionState) {
        let mut state = self.manager.lock_state();
        if self.is_current() {
            transition(&mut state, next);
        }
    }
}

impl<C: Connector> Drop for ConnectAttempt<'_, C> {
    fn drop(&mut self) {
        let mut state = self.manager.lock_state();
        if self.is_current() && *state == SessionState::Connecting {
            warn!("Connect attempt abandoned");
            *state = SessionState::Disconnected;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::error::Error;
    use crate::session::mock::{MockConnector, Reply};

    fn manager(connector: &MockConnector) -> SessionManager<MockConnector> {
        SessionManager::with_connector(
            connector.clone(),
            Some(MockConnector::config()),
            crate::platform::fortigate::profile(),
            &ServiceSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_connect_validates_and_normalizes_terminal() {
        let connector = MockConnector::new();
        let manager = manager(&connector);

        let outcome = manager.connect().await.unwrap();
        assert!(matches!(outcome, ConnectOutcome::Connected(ref info) if info.hostname == "fw.test"));
        assert_eq!(manager.state(), SessionState::Connected);

        let commands = connector.command_texts();
        assert_eq!(commands[0], "get system status");
        assert!(commands[1].starts_with("config system console\nset output standard"));
    }

    #[tokio::test]
    async fn test_concurrent_connect_is_single_flight() {
        let connector = MockConnector::new();
        let gate = connector.gate_open();
        let manager = Arc::new(manager(&connector));

        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect().await }
        });
        while connector.opens() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(manager.state(), SessionState::Connecting);

        let second = manager.connect().await.unwrap();
        assert_eq!(second, ConnectOutcome::AlreadyConnecting);
        assert_eq!(connector.opens(), 1);

        gate.notify_one();
        assert!(matches!(
            first.await.unwrap().unwrap(),
            ConnectOutcome::Connected(_)
        ));
        assert_eq!(connector.opens(), 1);
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_cancels_connect_in_flight() {
        let connector = MockConnector::new();
        let gate = connector.gate_open();
        let manager = Arc::new(manager(&connector));

        let attempt = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect().await }
        });
        while connector.opens() == 0 {
            tokio::task::yield_now().await;
        }

        manager.disconnect().await;
        gate.notify_one();

        assert!(matches!(
            attempt.await.unwrap(),
            Err(Error::Connect(ConnectError::Cancelled))
        ));
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert_eq!(connector.opens(), 1);
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn test_connect_after_disconnect_supersedes_earlier_attempt() {
        let connector = MockConnector::new();
        let gate = connector.gate_open();
        let manager = Arc::new(manager(&connector));

        let spawn_connect = || {
            let manager = manager.clone();
            tokio::spawn(async move { manager.connect().await })
        };

        let first = spawn_connect();
        while connector.opens() < 1 {
            tokio::task::yield_now().await;
        }
        manager.disconnect().await;

        let second = spawn_connect();
        while connector.opens() < 2 {
            tokio::task::yield_now().await;
        }
        gate.notify_waiters();

        assert!(matches!(
            first.await.unwrap(),
            Err(Error::Connect(ConnectError::Cancelled))
        ));
        assert!(matches!(
            second.await.unwrap(),
            Ok(ConnectOutcome::Connected(_))
        ));
        assert!(manager.is_connected());
        assert_eq!(connector.closes(), 1);
        assert_ok!(manager.execute_command("show firewall address").await);

        manager.disconnect().await;
        assert_eq!(connector.opens(), 2);
        assert_eq!(connector.closes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_channel_during_mutation_drops_session() {
        let connector = MockConnector::new();
        connector.reply(
            "config firewall address",
            Reply::Fail(ExecError::TransportFailure("channel closed before EOF".into())),
        );
        let manager = manager(&connector);
        manager.connect().await.unwrap();

        let err = manager
            .execute_mutation("config firewall address\nedit \"ELS-x\"\nend\n")
            .await
            .unwrap_err();
        assert!(err.is_connection_loss());
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert_eq!(connector.closes(), 1);
        assert!(matches!(
            manager.execute_command("show").await,
            Err(Error::Exec(ExecError::NotConnected))
        ));
    }

    #[tokio::test]
    async fn test_execute_while_disconnected_does_not_touch_transport() {
        let connector = MockConnector::new();
        let manager = manager(&connector);

        let err = manager.execute_command("show firewall address").await.unwrap_err();
        assert!(matches!(err, Error::Exec(ExecError::NotConnected)));
        assert_eq!(connector.opens(), 0);
        assert!(connector.commands().is_empty());
    }

    #[tokio::test]
    async fn test_failed_connect_ends_disconnected() {
        let connector = MockConnector::new();
        connector.fail_open(ConnectError::AuthFailure);
        let manager = manager(&connector);

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, Error::Connect(ConnectError::AuthFailure)));
        assert_eq!(manager.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_validation_ends_disconnected_and_closes_shell() {
        let connector = MockConnector::new();
        connector.reply(
            "get system status",
            Reply::Fail(ExecError::TransportFailure("channel open refused".into())),
        );
        let manager = manager(&connector);

        assert_err!(manager.connect().await);
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn test_terse_validation_still_connects() {
        let connector = MockConnector::new();
        connector.reply("get system status", Reply::Output(String::new()));
        let manager = manager(&connector);

        assert_ok!(manager.connect().await);
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_closes_previous_shell() {
        let connector = MockConnector::new();
        let manager = manager(&connector);

        manager.connect().await.unwrap();
        manager.connect().await.unwrap();
        assert_eq!(connector.opens(), 2);
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn test_missing_config_is_reported_without_connecting() {
        let connector = MockConnector::new();
        let manager = SessionManager::with_connector(
            connector.clone(),
            None,
            crate::platform::fortigate::profile(),
            &ServiceSettings::default(),
        );

        assert!(matches!(
            manager.auto_connect().await,
            Err(Error::Config(ConfigError::Missing(_)))
        ));
        assert_eq!(connector.opens(), 0);
        assert!(manager.connection_info().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let connector = MockConnector::new();
        let manager = manager(&connector);
        manager.connect().await.unwrap();

        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_timeout_disconnects() {
        let connector = MockConnector::new();
        connector.reply("show", Reply::Hang);
        let manager = manager(&connector);
        manager.connect().await.unwrap();

        let err = manager.execute_command("show firewall address").await.unwrap_err();
        assert!(matches!(err, Error::Exec(ExecError::Timeout(_))));
        assert!(err.is_connection_loss());
        assert_eq!(manager.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_dead_shell_disconnects() {
        let connector = MockConnector::new();
        let manager = manager(&connector);
        manager.connect().await.unwrap();
        connector.kill();

        assert!(manager.execute_command("show").await.is_err());
        assert!(!manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_mutation_keeps_session() {
        let connector = MockConnector::new();
        connector.reply(
            "config firewall address",
            Reply::Output("node_check_object fail! for macaddr zz\nCommand fail. Return code -651\n".into()),
        );
        let manager = manager(&connector);
        manager.connect().await.unwrap();

        let start = tokio::time::Instant::now();
        let err = manager
            .execute_mutation("config firewall address\nedit \"ELS-x\"\nend\n")
            .await
            .unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(1), "rejection waited out the settle delay");
        match err {
            Error::Exec(ExecError::Rejected { message }) => {
                assert_eq!(message, "Command fail. Return code -651")
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_mutations_do_not_interleave() {
        let connector = MockConnector::new();
        let manager = Arc::new(manager(&connector));
        manager.connect().await.unwrap();

        let tasks: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .execute_mutation(&format!("config firewall address\nedit \"{}\"\nend\n", name))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let log: Vec<_> = connector
            .commands()
            .into_iter()
            .filter(|r| r.command.starts_with("config firewall address"))
            .collect();
        assert_eq!(log.len(), 3);
        for pair in log.windows(2) {
            assert!(pair[1].started.duration_since(pair[0].finished) >= Duration::from_secs(1));
        }
    }
}
