//! Connection state of the shared management session.

use std::fmt;

use serde::Serialize;

/// Lifecycle state.
///
/// `Connecting` is only ever left once the whole connect-and-validate
/// sequence has finished, successfully or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        }
    }

    /// Operator-facing description.
    pub fn status_message(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Not connected to FortiGate",
            SessionState::Connecting => "Connection in progress",
            SessionState::Connected => "Connected to FortiGate",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(SessionState::Connecting).unwrap(),
            serde_json::json!("connecting")
        );
    }
}
