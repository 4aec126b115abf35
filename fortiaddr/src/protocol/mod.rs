//! FortiOS configuration text, both directions.
//!
//! [`parse`] turns `show firewall address` / `show firewall addrgrp` output
//! into records; [`generate`] produces the configuration blocks that create,
//! delete and regroup those records.

pub mod generate;
pub mod model;
pub mod parse;

pub use generate::{delete_address, replace_group_members, upsert_address, validate_name};
pub use model::{AddressGroup, AddressKind, AddressObject};
pub use parse::{parse_address_objects, parse_groups};
