//! Appliance profiles.
//!
//! A profile captures the firmware-specific conventions of the managed
//! appliance: how to validate a fresh shell, how to normalize terminal
//! output, and how to recognize rejected configuration commands.

mod definition;
pub mod fortigate;

pub use definition::ApplianceProfile;
