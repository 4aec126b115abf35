//! # fortiaddr
//!
//! Async back-end core for administering FortiGate firewall address objects
//! over SSH.
//!
//! fortiaddr keeps one persistent management session to a FortiGate, runs
//! configuration commands through it one at a time, and translates between
//! structured address objects and FortiOS configuration text.
//!
//! ## Features
//!
//! - Async SSH sessions via russh, with FortiOS-friendly algorithm preferences
//! - Single-flight connect with post-login validation and terminal setup
//! - Strictly serialized commands with a settle delay after every change
//! - Parser and generator for `config firewall address` / `addrgrp` blocks
//! - Connectivity diagnostics (DNS, ping, port)
//! - Framework-agnostic operations, access policy and push events for a web layer
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fortiaddr::{AddressBook, AddressKind, ConnectionConfig, ServiceSettings, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fortiaddr::Error> {
//!     let config = ConnectionConfig::builder("192.168.1.99")
//!         .username("admin")
//!         .password("secret")
//!         .build()?;
//!
//!     let session = Arc::new(SessionManager::new(Some(config)));
//!     session.connect().await?;
//!
//!     let book = AddressBook::new(session.clone(), &ServiceSettings::default());
//!     book.upsert_object("ELS-printer", AddressKind::Mac, "00:11:22:33:44:55")
//!         .await?;
//!     for (name, object) in book.list_objects(None).await? {
//!         println!("{} {} {}", name, object.kind, object.value);
//!     }
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod address_book;
pub mod api;
pub mod diagnostics;
pub mod error;
pub mod platform;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use address_book::AddressBook;
pub use api::{AccessPolicy, AdminService, ApiResponse, Event, EventBus, Failure, Principal};
pub use diagnostics::{Diagnostics, DiagnosticsReport};
pub use error::{Error, Result};
pub use platform::ApplianceProfile;
pub use protocol::{AddressGroup, AddressKind, AddressObject};
pub use session::{CommandKind, ConnectOutcome, ServiceSettings, SessionManager, SessionState};
pub use transport::{AuthMethod, ConnectionConfig, ConnectionInfo, HostKeyVerification};
