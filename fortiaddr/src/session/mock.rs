//! Scripted in-memory connector for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{ConnectError, ExecError};
use crate::transport::{ConnectionConfig, Connector, Shell};

/// Scripted answer for commands starting with a prefix.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Output(String),
    Fail(ExecError),
    Hang,
}

/// One command as the shell saw it.
#[derive(Debug, Clone)]
pub(crate) struct CommandRecord {
    pub command: String,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
struct Script {
    opens: AtomicUsize,
    closes: AtomicUsize,
    dead: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    open_error: Mutex<Option<ConnectError>>,
    replies: Mutex<Vec<(String, Reply)>>,
    commands: Mutex<Vec<CommandRecord>>,
}

#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    script: Arc<Script>,
}

impl MockConnector {
    /// Connector whose shell answers the validation probe like a FortiGate.
    pub fn new() -> Self {
        let connector = Self::default();
        connector.reply(
            "get system status",
            Reply::Output("Version: FortiGate-60F v7.2.5,build1517\nHostname: FGT60F\n".into()),
        );
        connector
    }

    pub fn config() -> ConnectionConfig {
        ConnectionConfig::builder("fw.test")
            .username("admin")
            .password("secret")
            .build()
            .unwrap()
    }

    /// Answer commands starting with `prefix`. Later scripts win.
    pub fn reply(&self, prefix: &str, reply: Reply) {
        self.script
            .replies
            .lock()
            .unwrap()
            .insert(0, (prefix.to_string(), reply));
    }

    /// Make `open` wait until the returned handle is notified.
    pub fn gate_open(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.script.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn fail_open(&self, err: ConnectError) {
        *self.script.open_error.lock().unwrap() = Some(err);
    }

    /// Simulate the peer dropping the session.
    pub fn kill(&self) {
        self.script.dead.store(true, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.script.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.script.closes.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<CommandRecord> {
        self.script.commands.lock().unwrap().clone()
    }

    pub fn command_texts(&self) -> Vec<String> {
        self.commands().into_iter().map(|r| r.command).collect()
    }

    /// Commands other than the connect-time probe and console setup.
    pub fn user_commands(&self) -> Vec<String> {
        self.command_texts()
            .into_iter()
            .filter(|c| c != "get system status" && !c.starts_with("config system console"))
            .collect()
    }
}

impl Connector for MockConnector {
    type Shell = MockShell;

    async fn open(&self, _config: &ConnectionConfig) -> Result<MockShell, ConnectError> {
        self.script.opens.fetch_add(1, Ordering::SeqCst);
        let gate = self.script.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = self.script.open_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.script.dead.store(false, Ordering::SeqCst);
        Ok(MockShell {
            script: self.script.clone(),
        })
    }
}

pub(crate) struct MockShell {
    script: Arc<Script>,
}

impl Shell for MockShell {
    async fn run_line(&self, command: &str) -> Result<String, ExecError> {
        let started = Instant::now();
        let reply = self
            .script
            .replies
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or(Reply::Output(String::new()));

        let result = match reply {
            Reply::Output(text) => Ok(text),
            Reply::Fail(err) => Err(err),
            Reply::Hang => std::future::pending().await,
        };

        self.script.commands.lock().unwrap().push(CommandRecord {
            command: command.to_string(),
            started,
            finished: Instant::now(),
        });
        result
    }

    fn is_alive(&self) -> bool {
        !self.script.dead.load(Ordering::SeqCst)
    }

    async fn close(self) {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
    }
}
