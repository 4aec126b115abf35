//! Structured address-object and group records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TranslationError;

/// Kind of a firewall address object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// Hardware address (`set type mac`).
    Mac,
    /// IPv4 network (the appliance default type).
    Subnet,
    /// Hostname resolved by the appliance.
    Fqdn,
    /// Inclusive IPv4 range (`set type iprange`).
    Range,
    /// A block none of the markers matched.
    Unknown,
}

impl AddressKind {
    /// Kinds this system can create.
    pub const WRITABLE: [AddressKind; 4] = [
        AddressKind::Mac,
        AddressKind::Subnet,
        AddressKind::Fqdn,
        AddressKind::Range,
    ];

    /// Lower-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressKind::Mac => "mac",
            AddressKind::Subnet => "subnet",
            AddressKind::Fqdn => "fqdn",
            AddressKind::Range => "range",
            AddressKind::Unknown => "unknown",
        }
    }

    /// Parse a listing filter. `None`, empty and `all` mean no filter.
    pub fn parse_filter(filter: Option<&str>) -> Result<Option<AddressKind>, TranslationError> {
        match filter.map(str::trim) {
            None | Some("") | Some("all") => Ok(None),
            Some(other) => other.parse().map(Some),
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressKind {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mac" => Ok(AddressKind::Mac),
            "subnet" => Ok(AddressKind::Subnet),
            "fqdn" => Ok(AddressKind::Fqdn),
            "range" => Ok(AddressKind::Range),
            "unknown" => Ok(AddressKind::Unknown),
            other => Err(TranslationError::UnsupportedKind(other.to_string())),
        }
    }
}

/// A named firewall address object as read back from the appliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressObject {
    /// Appliance key.
    pub name: String,

    /// Object kind.
    #[serde(rename = "type")]
    pub kind: AddressKind,

    /// Kind-specific encoding (`AA:BB:..`, `10.0.0.0/24`, `host.example`, `a-b`).
    pub value: String,

    /// Always equal to `value`.
    pub display_value: String,
}

impl AddressObject {
    pub fn new(name: impl Into<String>, kind: AddressKind, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            kind,
            display_value: value.clone(),
            value,
        }
    }
}

/// A named address group and its members.
///
/// Membership order carries no meaning; it is kept as the appliance printed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressGroup {
    pub name: String,
    pub members: Vec<String>,
}
