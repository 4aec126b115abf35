//! Connectivity probe for when the management session cannot be established.
//!
//! Three independent checks against the configured host, always in this
//! order, each yielding one line whatever the outcome:
//!
//! 1. name resolution
//! 2. ICMP reachability (system `ping`, one echo)
//! 3. TCP connect to the management port

use std::process::Stdio;
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::process::Command;

use crate::transport::ConnectionInfo;

pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PORT_TIMEOUT: Duration = Duration::from_secs(3);

/// Outcome of one probe run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsReport {
    /// False only when there was nothing to probe.
    pub success: bool,

    /// `host:port` that was probed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// DNS, ping and port lines, in that order.
    pub results: Vec<String>,
}

impl DiagnosticsReport {
    fn not_configured() -> Self {
        Self {
            success: false,
            target: None,
            results: vec!["No appliance connection is configured".to_string()],
        }
    }
}

/// Probe timeouts.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    ping_timeout: Duration,
    port_timeout: Duration,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            ping_timeout: DEFAULT_PING_TIMEOUT,
            port_timeout: DEFAULT_PORT_TIMEOUT,
        }
    }
}

impl Diagnostics {
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn with_port_timeout(mut self, timeout: Duration) -> Self {
        self.port_timeout = timeout;
        self
    }

    /// Run all three checks. Never fails; a missing target is reported in the envelope.
    pub async fn diagnose(&self, target: Option<&ConnectionInfo>) -> DiagnosticsReport {
        let Some(target) = target else {
            return DiagnosticsReport::not_configured();
        };
        let host = target.hostname.as_str();
        info!("Running connectivity diagnostics against {}:{}", host, target.port);

        let results = vec![
            check_dns(host, target.port).await,
            check_ping(host, self.ping_timeout).await,
            check_port(host, target.port, self.port_timeout).await,
        ];
        for line in &results {
            debug!("{}", line);
        }

        DiagnosticsReport {
            success: true,
            target: Some(format!("{}:{}", host, target.port)),
            results,
        }
    }
}

pub async fn check_dns(host: &str, port: u16) -> String {
    match tokio::net::lookup_host((host, port)).await {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => format!("DNS: OK - {} resolves to {}", host, addr.ip()),
            None => format!("DNS: FAILED - {} has no addresses", host),
        },
        Err(e) => format!("DNS: FAILED - {}", e),
    }
}

pub async fn check_ping(host: &str, timeout: Duration) -> String {
    if ping_once(host, timeout).await {
        "Ping: OK".to_string()
    } else {
        "Ping: FAILED".to_string()
    }
}

async fn ping_once(host: &str, timeout: Duration) -> bool {
    // keep the host from being read as a ping option
    if host.is_empty() || host.starts_with('-') {
        return false;
    }
    let count_flag = if cfg!(windows) { "-n" } else { "-c" };

    let child = Command::new("ping")
        .args([count_flag, "1", host])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();
    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            debug!("Could not run ping: {}", e);
            return false;
        }
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            debug!("ping failed: {}", e);
            false
        }
        Err(_) => {
            debug!("ping timed out after {:?}", timeout);
            false
        }
    }
}

pub async fn check_port(host: &str, port: u16, timeout: Duration) -> String {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => format!("SSH port ({}): OK - open", port),
        Ok(Err(e)) => {
            debug!("Port check failed: {}", e);
            format!("SSH port ({}): FAILED - closed or filtered", port)
        }
        Err(_) => format!("SSH port ({}): FAILED - closed or filtered", port),
    }
}
