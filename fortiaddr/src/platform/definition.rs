//! Appliance profile definition.

/// Everything the session layer needs to know about one appliance family.
///
/// Built with the `with_*` methods so additional firmware variants can be
/// described without touching the session code.
#[derive(Debug, Clone)]
pub struct ApplianceProfile {
    /// Profile name (e.g., "fortigate").
    pub name: String,

    /// Lightweight command issued right after login to prove the shell works.
    pub validation_command: String,

    /// Validation output shorter than this (non-blank characters) is logged as anomalous.
    pub min_validation_len: usize,

    /// Commands run once per connection to normalize terminal behavior.
    pub on_open_commands: Vec<String>,

    /// Stderr substrings that are expected and not worth a warning.
    pub benign_stderr: Vec<String>,

    /// Output substrings that mean a configuration command was rejected.
    pub failed_when_contains: Vec<String>,
}

impl ApplianceProfile {
    /// Create a new profile with minimal required fields.
    pub fn new(name: impl Into<String>, validation_command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            validation_command: validation_command.into(),
            min_validation_len: 0,
            on_open_commands: vec![],
            benign_stderr: vec![],
            failed_when_contains: vec![],
        }
    }

    /// Set the minimum expected validation output length.
    pub fn with_min_validation_len(mut self, len: usize) -> Self {
        self.min_validation_len = len;
        self
    }

    /// Add an on_open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Add a benign stderr pattern.
    pub fn with_benign_stderr(mut self, pattern: impl Into<String>) -> Self {
        self.benign_stderr.push(pattern.into());
        self
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// Whether validation output looks anomalously short.
    pub fn validation_is_terse(&self, output: &str) -> bool {
        output.trim().chars().count() < self.min_validation_len
    }

    /// First failure pattern found in `output`, if any.
    pub fn detect_failure(&self, output: &str) -> Option<&str> {
        self.failed_when_contains
            .iter()
            .find(|p| output.contains(p.as_str()))
            .map(String::as_str)
    }
}
