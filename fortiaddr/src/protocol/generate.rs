//! Generating FortiOS configuration-mode command blocks.
//!
//! Every block has the shape
//!
//! ```text
//! config firewall <table>
//! edit "<name>"            (or: delete "<name>")
//! set <attr> <value>       (zero or more)
//! end
//! ```
//!
//! and is sent to the appliance as one newline-terminated unit. All input is
//! validated before any text is produced, so a rejected request never reaches
//! the shell.

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;

use super::model::AddressKind;
use crate::error::TranslationError;

/// Longest object name FortiOS accepts.
pub const MAX_NAME_LEN: usize = 79;

const ADDRESS_TABLE: &str = "config firewall address";
const GROUP_TABLE: &str = "config firewall addrgrp";

static MAC_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{2}(?:[:-][0-9a-fA-F]{2}){5}$").unwrap());

/// Line-oriented builder for one configuration block.
#[derive(Debug)]
struct CommandBlock {
    lines: Vec<String>,
}

impl CommandBlock {
    fn new(table: &str) -> Self {
        Self {
            lines: vec![table.to_string()],
        }
    }

    fn edit(mut self, name: &str) -> Self {
        self.lines.push(format!("edit \"{}\"", name));
        self
    }

    fn delete(mut self, name: &str) -> Self {
        self.lines.push(format!("delete \"{}\"", name));
        self
    }

    fn set(mut self, attr: &str, value: impl AsRef<str>) -> Self {
        self.lines.push(format!("set {} {}", attr, value.as_ref()));
        self
    }

    fn unset(mut self, attr: &str) -> Self {
        self.lines.push(format!("unset {}", attr));
        self
    }

    fn end(mut self) -> String {
        self.lines.push("end".to_string());
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

/// Build the create-or-update block for one address object.
pub fn upsert_address(
    name: &str,
    kind: AddressKind,
    value: &str,
) -> Result<String, TranslationError> {
    validate_name(name)?;
    let value = value.trim();
    if value.chars().any(char::is_control) {
        return Err(malformed(kind, value, "control characters are not allowed"));
    }
    let block = CommandBlock::new(ADDRESS_TABLE).edit(name);

    let block = match kind {
        AddressKind::Mac => {
            if !MAC_VALUE_RE.is_match(value) {
                return Err(malformed(kind, value, "expected six hex octets separated by ':' or '-'"));
            }
            block.set("type", "mac").set("macaddr", value)
        }
        AddressKind::Subnet => {
            validate_subnet(value)?;
            // subnet is the default type, no explicit type line
            block.set("subnet", value)
        }
        AddressKind::Fqdn => {
            if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"') {
                return Err(malformed(kind, value, "expected a hostname without spaces or quotes"));
            }
            block.set("type", "fqdn").set("fqdn", format!("\"{}\"", value))
        }
        AddressKind::Range => {
            let (start, end) = split_range(value)?;
            block
                .set("type", "iprange")
                .set("start-ip", start.to_string())
                .set("end-ip", end.to_string())
        }
        AddressKind::Unknown => {
            return Err(TranslationError::UnsupportedKind(kind.to_string()));
        }
    };

    Ok(block.end())
}

/// Build the delete block for one address object.
pub fn delete_address(name: &str) -> Result<String, TranslationError> {
    validate_name(name)?;
    Ok(CommandBlock::new(ADDRESS_TABLE).delete(name).end())
}

/// Build the block replacing a group's whole membership.
///
/// An empty member list unsets the attribute instead of emitting an empty
/// `set member` line.
pub fn replace_group_members(group: &str, members: &[String]) -> Result<String, TranslationError> {
    validate_name(group)?;
    for member in members {
        validate_name(member)?;
    }

    let block = CommandBlock::new(GROUP_TABLE).edit(group);
    let block = if members.is_empty() {
        block.unset("member")
    } else {
        let quoted: Vec<String> = members.iter().map(|m| format!("\"{}\"", m)).collect();
        block.set("member", quoted.join(" "))
    };

    Ok(block.end())
}

/// Reject names that cannot be placed inside a quoted CLI argument.
pub fn validate_name(name: &str) -> Result<(), TranslationError> {
    let invalid = |reason: &str| TranslationError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(invalid("name is longer than 79 characters"));
    }
    if name.contains('"') || name.contains('\\') {
        return Err(invalid("quotes and backslashes are not allowed"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("control characters are not allowed"));
    }
    Ok(())
}

fn validate_subnet(value: &str) -> Result<(), TranslationError> {
    let kind = AddressKind::Subnet;
    let (addr, mask) = if let Some((addr, prefix)) = value.split_once('/') {
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| malformed(kind, value, "prefix length is not a number"))?;
        if prefix > 32 {
            return Err(malformed(kind, value, "prefix length must be at most 32"));
        }
        (addr, None)
    } else if let Some((addr, mask)) = value.split_once(' ') {
        (addr, Some(mask))
    } else {
        return Err(malformed(kind, value, "expected address/prefix or address mask"));
    };

    addr.parse::<Ipv4Addr>()
        .map_err(|_| malformed(kind, value, "invalid IPv4 address"))?;
    if let Some(mask) = mask {
        let mask = mask
            .parse::<Ipv4Addr>()
            .map_err(|_| malformed(kind, value, "invalid netmask"))?;
        if !is_contiguous_mask(mask) {
            return Err(malformed(kind, value, "netmask bits are not contiguous"));
        }
    }
    Ok(())
}

/// Leading ones followed only by zeros, e.g. `255.255.240.0`.
fn is_contiguous_mask(mask: Ipv4Addr) -> bool {
    let host_bits = !u32::from(mask);
    host_bits.checked_add(1).is_none_or(u32::is_power_of_two)
}

fn split_range(value: &str) -> Result<(Ipv4Addr, Ipv4Addr), TranslationError> {
    let kind = AddressKind::Range;
    let mut parts = value.split('-').map(str::trim);
    let (Some(start), Some(end), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed(kind, value, "expected start-end"));
    };

    let start: Ipv4Addr = start
        .parse()
        .map_err(|_| malformed(kind, value, "invalid start address"))?;
    let end: Ipv4Addr = end
        .parse()
        .map_err(|_| malformed(kind, value, "invalid end address"))?;
    Ok((start, end))
}

fn malformed(kind: AddressKind, value: &str, reason: &str) -> TranslationError {
    TranslationError::MalformedValue {
        kind: kind.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse::{parse_address_objects, parse_groups};

    /// Rewrite a generated block into the shape `show` prints it back in.
    fn as_show_output(block: &str) -> String {
        let mut lines: Vec<&str> = block.lines().filter(|l| *l != "end").collect();
        lines.push("next");
        lines.push("end");
        lines.join("\n")
    }

    #[test]
    fn test_mac_block() {
        let block = upsert_address("ELS-printer", AddressKind::Mac, "AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(
            block,
            "config firewall address\nedit \"ELS-printer\"\nset type mac\nset macaddr AA:BB:CC:DD:EE:FF\nend\n"
        );
    }

    #[test]
    fn test_subnet_block_has_no_type_line() {
        let block = upsert_address("ELS-lab", AddressKind::Subnet, "10.20.0.0/16").unwrap();
        assert_eq!(
            block,
            "config firewall address\nedit \"ELS-lab\"\nset subnet 10.20.0.0/16\nend\n"
        );
    }

    #[test]
    fn test_fqdn_block_quotes_value() {
        let block = upsert_address("ELS-up", AddressKind::Fqdn, "updates.example.com").unwrap();
        assert!(block.contains("set type fqdn\nset fqdn \"updates.example.com\"\n"));
    }

    #[test]
    fn test_range_block_trims_sides() {
        let block = upsert_address("ELS-pool", AddressKind::Range, "10.0.0.1 - 10.0.0.9").unwrap();
        assert!(block.contains("set type iprange\nset start-ip 10.0.0.1\nset end-ip 10.0.0.9\n"));
    }

    #[test]
    fn test_round_trip_per_kind() {
        let cases = [
            (AddressKind::Mac, "AA:BB:CC:DD:EE:FF"),
            (AddressKind::Subnet, "192.168.10.0/24"),
            (AddressKind::Fqdn, "portal.example.org"),
            (AddressKind::Range, "10.0.0.1-10.0.0.9"),
        ];

        for (kind, value) in cases {
            let block = upsert_address("ELS-obj", kind, value).unwrap();
            let parsed = parse_address_objects(&as_show_output(&block), "ELS-", None);
            let obj = &parsed["ELS-obj"];
            assert_eq!(obj.kind, kind, "kind for {}", value);
            assert_eq!(obj.value, value, "value for {:?}", kind);
        }
    }

    #[test]
    fn test_dotted_masks() {
        for value in ["0.0.0.0 0.0.0.0", "10.0.0.0 255.0.0.0", "10.1.16.0 255.255.240.0", "10.1.1.1 255.255.255.255"] {
            let block = upsert_address("ELS-net", AddressKind::Subnet, value).unwrap();
            assert!(block.contains(&format!("set subnet {}\n", value)));
            assert_eq!(block.lines().count(), 4);
        }
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        assert_eq!(
            upsert_address("ELS-x", AddressKind::Unknown, "whatever"),
            Err(TranslationError::UnsupportedKind("unknown".into()))
        );
    }

    #[test]
    fn test_malformed_values() {
        for (kind, value) in [
            (AddressKind::Mac, "AA:BB:CC:DD:EE"),
            (AddressKind::Subnet, "10.0.0.0/33"),
            (AddressKind::Subnet, "10.0.0.0"),
            (AddressKind::Subnet, "10.0.0.0\n255.0.0.0"),
            (AddressKind::Subnet, "10.0.0.0\t255.0.0.0"),
            (AddressKind::Subnet, "10.0.0.0 1.2.3.4"),
            (AddressKind::Subnet, "10.0.0.0 255.0.255.0"),
            (AddressKind::Fqdn, "a.example\u{7f}"),
            (AddressKind::Fqdn, "bad host"),
            (AddressKind::Range, "10.0.0.1"),
            (AddressKind::Range, "10.0.0.1-10.0.0.9-10.0.0.10"),
        ] {
            assert!(
                matches!(
                    upsert_address("ELS-x", kind, value),
                    Err(TranslationError::MalformedValue { .. })
                ),
                "{:?} {:?} should be malformed",
                kind,
                value
            );
        }
    }

    #[test]
    fn test_names_cannot_escape_quotes() {
        assert!(matches!(
            delete_address("ELS-x\"\nend\nexecute reboot"),
            Err(TranslationError::InvalidName { .. })
        ));
        assert!(matches!(
            upsert_address("", AddressKind::Fqdn, "a.example"),
            Err(TranslationError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_delete_block() {
        assert_eq!(
            delete_address("ELS-old").unwrap(),
            "config firewall address\ndelete \"ELS-old\"\nend\n"
        );
    }

    #[test]
    fn test_group_members_block() {
        let members = vec!["ELS-a".to_string(), "ELS-b".to_string()];
        assert_eq!(
            replace_group_members("ELS-APP", &members).unwrap(),
            "config firewall addrgrp\nedit \"ELS-APP\"\nset member \"ELS-a\" \"ELS-b\"\nend\n"
        );
    }

    #[test]
    fn test_empty_group_unsets_member() {
        let block = replace_group_members("ELS-APP", &[]).unwrap();
        assert!(block.contains("unset member\n"));
        assert!(!block.contains("set member"));
    }

    #[test]
    fn test_group_round_trip() {
        let members = vec!["ELS-a".to_string(), "ELS-b".to_string(), "ELS-c".to_string()];
        let block = replace_group_members("ELS-APP", &members).unwrap();
        assert_eq!(parse_groups(&as_show_output(&block))["ELS-APP"], members);
    }
}
