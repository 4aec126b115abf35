//! Connect to a FortiGate, list tagged address objects and the managed group.
//!
//! # Prerequisites
//!
//! - A FortiGate reachable over SSH
//! - An admin account allowed to read `firewall address` / `addrgrp`
//!
//! # Usage
//!
//! ```bash
//! FORTIGATE_HOST=192.168.1.99 FORTIGATE_USERNAME=admin FORTIGATE_PASSWORD=secret \
//!     cargo run --example address_book
//! ```
//!
//! Pass a kind (`mac`, `subnet`, `fqdn`, `range`) as the first argument to
//! filter the listing.

use std::env;
use std::sync::Arc;

use fortiaddr::platform::fortigate;
use fortiaddr::transport::SshConnector;
use fortiaddr::{AddressBook, AddressKind, ConnectionConfig, ServiceSettings, SessionManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug to see every command)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let filter = AddressKind::parse_filter(env::args().nth(1).as_deref())?;
    let config = ConnectionConfig::from_env()?;
    let settings = ServiceSettings::from_env()?;

    println!("Connecting to {}...", config.socket_addr());
    let session = Arc::new(SessionManager::with_connector(
        SshConnector::default(),
        Some(config),
        fortigate::profile(),
        &settings,
    ));
    let outcome = session.connect().await?;
    println!("{}", outcome.message());

    let book = AddressBook::new(session.clone(), &settings);

    println!("\nAddress objects tagged '{}':", book.tag_prefix());
    println!("{}", "-".repeat(50));
    let objects = book.list_objects(filter).await?;
    for (name, object) in &objects {
        println!("{:<30} {:<8} {}", name, object.kind, object.display_value);
    }
    println!("{}", "-".repeat(50));
    println!("{} object(s)", objects.len());

    println!("\nGroups:");
    for (group, members) in book.groups().await? {
        println!("{} ({} members)", group, members.len());
        for member in members {
            println!("  - {}", member);
        }
    }

    session.disconnect().await;
    println!("\nDone!");
    Ok(())
}
