//! Tunables for the command path.

use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TAG_PREFIX: &str = "ELS-";
pub const DEFAULT_GROUP_NAME: &str = "ELS-APP";

/// Settle delay, command timeout and naming conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Pause after every configuration change before the caller resumes.
    pub settle_delay: Duration,

    /// Upper bound for one command round trip.
    pub command_timeout: Duration,

    /// Prefix that marks address objects owned by this system.
    pub tag_prefix: String,

    /// The address group this system manages.
    pub group_name: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            group_name: DEFAULT_GROUP_NAME.to_string(),
        }
    }
}

impl ServiceSettings {
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    pub fn with_group_name(mut self, name: impl Into<String>) -> Self {
        self.group_name = name.into();
        self
    }

    /// Load overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults, overridden by `FORTIGATE_SETTLE_MS`, `FORTIGATE_COMMAND_TIMEOUT_MS`,
    /// `ADDRESS_TAG_PREFIX` and `ADDRESS_GROUP_NAME` when set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(ms) = get("FORTIGATE_SETTLE_MS") {
            settings.settle_delay = parse_millis("FORTIGATE_SETTLE_MS", &ms)?;
        }
        if let Some(ms) = get("FORTIGATE_COMMAND_TIMEOUT_MS") {
            let timeout = parse_millis("FORTIGATE_COMMAND_TIMEOUT_MS", &ms)?;
            if timeout.is_zero() {
                return Err(ConfigError::Invalid {
                    key: "FORTIGATE_COMMAND_TIMEOUT_MS",
                    message: "timeout must be greater than zero".to_string(),
                });
            }
            settings.command_timeout = timeout;
        }
        if let Some(prefix) = get("ADDRESS_TAG_PREFIX") {
            settings.tag_prefix = prefix.trim().to_string();
        }
        if let Some(name) = get("ADDRESS_GROUP_NAME") {
            settings.group_name = name.trim().to_string();
        }

        Ok(settings)
    }
}

fn parse_millis(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::Invalid {
            key,
            message: e.to_string(),
        })
}
