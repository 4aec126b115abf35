//! Session lifecycle and command serialization.
//!
//! [`SessionManager`] owns the one management session to the appliance and
//! its `Disconnected -> Connecting -> Connected` state machine. Commands go
//! through a [`CommandSerializer`], which keeps them strictly one at a time
//! and holds the session for the settle delay after configuration changes.

mod manager;
mod serializer;
mod settings;
mod state;

#[cfg(test)]
pub(crate) mod mock;

pub use manager::{ConnectOutcome, SessionManager};
pub use serializer::{CommandKind, CommandSerializer};
pub use settings::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_GROUP_NAME, DEFAULT_SETTLE_DELAY, DEFAULT_TAG_PREFIX,
    ServiceSettings,
};
pub use state::SessionState;
