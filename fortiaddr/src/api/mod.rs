//! Operator-facing surface: access control, envelopes, push events and the
//! [`AdminService`] a web layer routes requests to.
//!
//! No HTTP framework lives here. A route handler authenticates the request,
//! calls one `AdminService` method and turns the result into a response,
//! using [`Failure::http_status`] for the status code.

pub mod auth;
pub mod events;
pub mod response;
pub mod service;

pub use auth::{AccessDenied, AccessPolicy, Identity, Principal};
pub use events::{Event, EventBus};
pub use response::{ApiResponse, Failure};
pub use service::{AdminService, SaveObjectRequest, StatusReport};
