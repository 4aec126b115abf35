//! FortiGate (FortiOS) profile.
//!
//! # Session setup
//!
//! ```text
//! get system status            # validation probe
//! config system console        # once per connection:
//! set output standard          #   disable "--More--" paging
//! end
//! ```

use super::ApplianceProfile;

/// Create the FortiGate profile.
pub fn profile() -> ApplianceProfile {
    ApplianceProfile::new("fortigate", "get system status")
        .with_min_validation_len(5)
        .with_on_open_command("config system console\nset output standard\nend\n")
        .with_benign_stderr("Unknown action 0")
        .with_failure_pattern("Command fail")
        .with_failure_pattern("entry not found in datasource")
        .with_failure_pattern("node_check_object fail")
        .with_failure_pattern("value parse error")
}
