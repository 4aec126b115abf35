//! Parsing FortiOS `show` output into structured records.
//!
//! FortiOS prints configuration tables as nested `edit "<name>" ... next`
//! blocks with one `set <attr> <value>` line per non-default attribute:
//!
//! ```text
//! config firewall address
//!     edit "ELS-printer"
//!         set uuid 6f1c...
//!         set type mac
//!         set macaddr "00:11:22:33:44:55"
//!     next
//!     edit "ELS-lab"
//!         set subnet 10.20.0.0 255.255.255.0
//!     next
//! end
//! ```
//!
//! Everything here is a pure function over text so each rule can be tested
//! on its own.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use super::model::{AddressKind, AddressObject};

/// Line that closes an `edit` block.
pub const BLOCK_TERMINATOR: &str = "next";

const MAC_MARKER: &str = "set type mac";
const SUBNET_MARKER: &str = "set subnet";
const FQDN_MARKER: &str = "set fqdn";
const RANGE_START_MARKER: &str = "set start-ip";
const RANGE_END_MARKER: &str = "set end-ip";

static EDIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"edit "([^"]+)""#).unwrap());

static MAC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9a-fA-F]{2}[:-]){5}[0-9a-fA-F]{2}").unwrap());

static SUBNET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"set subnet (\d{1,3}(?:\.\d{1,3}){3}(?:/\d{1,2}|[ \t]+\d{1,3}(?:\.\d{1,3}){3})?)")
        .unwrap()
});

static FQDN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"set fqdn "([^"]+)""#).unwrap());

static START_IP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"set start-ip (\d{1,3}(?:\.\d{1,3}){3})").unwrap());

static END_IP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"set end-ip (\d{1,3}(?:\.\d{1,3}){3})").unwrap());

static GROUP_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?ms)edit "([^"]+)"(.*?)^\s*next\s*$"#).unwrap());

static MEMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"set member ([^\r\n]+)").unwrap());

/// Split output into blocks at each terminator line.
///
/// The terminator line itself is dropped. Text after the last terminator
/// (usually just `end`) forms the final block.
pub fn segment_blocks(output: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in output.split_inclusive('\n') {
        let end = offset + line.len();
        if line.trim() == BLOCK_TERMINATOR {
            blocks.push(&output[start..offset]);
            start = end;
        }
        offset = end;
    }
    if start < output.len() {
        blocks.push(&output[start..]);
    }

    blocks
}

/// Name from the block's `edit "<name>"` header.
pub fn block_name(block: &str) -> Option<&str> {
    EDIT_RE
        .captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Determine kind and value of one block.
///
/// Markers are tested in priority order MAC, subnet, FQDN, range; the first
/// hit decides the kind even if later markers are present too.
pub fn classify_block(block: &str) -> (AddressKind, String) {
    if block.contains(MAC_MARKER) {
        // Anywhere in the block, not just the macaddr line; output formatting drifts
        // between firmware releases.
        let value = MAC_RE
            .find(block)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        (AddressKind::Mac, value)
    } else if block.contains(SUBNET_MARKER) {
        (AddressKind::Subnet, capture(&SUBNET_RE, block))
    } else if block.contains(FQDN_MARKER) {
        (AddressKind::Fqdn, capture(&FQDN_RE, block))
    } else if block.contains(RANGE_START_MARKER) || block.contains(RANGE_END_MARKER) {
        let value = match (START_IP_RE.captures(block), END_IP_RE.captures(block)) {
            (Some(start), Some(end)) => format!("{}-{}", &start[1], &end[1]),
            _ => String::new(),
        };
        (AddressKind::Range, value)
    } else {
        (AddressKind::Unknown, String::new())
    }
}

fn capture(re: &Regex, block: &str) -> String {
    re.captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Parse a `show firewall address` listing.
///
/// Only objects whose name starts with `tag_prefix` are returned. The optional
/// `filter` is applied after classification. Appliance order is preserved.
pub fn parse_address_objects(
    output: &str,
    tag_prefix: &str,
    filter: Option<AddressKind>,
) -> IndexMap<String, AddressObject> {
    let mut objects = IndexMap::new();

    for block in segment_blocks(output) {
        let Some(name) = block_name(block) else {
            continue;
        };
        if !name.starts_with(tag_prefix) {
            continue;
        }

        let (kind, value) = classify_block(block);
        if filter.is_some_and(|wanted| wanted != kind) {
            continue;
        }

        objects.insert(name.to_string(), AddressObject::new(name, kind, value));
    }

    objects
}

/// Parse a `show firewall addrgrp` listing into group name -> members.
///
/// A block without a `set member` line is an empty group, not an error.
pub fn parse_groups(output: &str) -> IndexMap<String, Vec<String>> {
    GROUP_BLOCK_RE
        .captures_iter(output)
        .map(|caps| {
            let name = caps[1].to_string();
            let members = MEMBER_RE
                .captures(&caps[2])
                .map(|m| split_members(&m[1]))
                .unwrap_or_default();
            (name, members)
        })
        .collect()
}

/// Split `"a" "b" "c"` into `[a, b, c]`.
fn split_members(raw: &str) -> Vec<String> {
    raw.trim()
        .split("\" \"")
        .map(|m| m.replace('"', ""))
        .filter(|m| !m.is_empty())
        .collect()
}
