//! Push notifications to connected clients.
//!
//! Fire-and-forget: publishing never blocks and never fails, even with no
//! subscribers. Slow subscribers lose the oldest events.

use futures_core::Stream;
use log::{debug, warn};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::protocol::AddressKind;

pub const DEFAULT_CAPACITY: usize = 64;

/// One notification, serialized as `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    ConnectionStatus {
        connected: bool,
        message: String,
    },
    ObjectUpdated {
        name: String,
        #[serde(rename = "type")]
        kind: AddressKind,
        value: String,
        user: String,
    },
    ObjectDeleted {
        name: String,
        user: String,
    },
    GroupUpdated {
        name: String,
        members: Vec<String>,
        user: String,
    },
}

impl Event {
    /// Channel name a socket layer emits this event on.
    pub fn name(&self) -> &'static str {
        match self {
            Event::ConnectionStatus { .. } => "connection_status",
            Event::ObjectUpdated { .. } => "object_updated",
            Event::ObjectDeleted { .. } => "object_deleted",
            Event::GroupUpdated { .. } => "group_updated",
        }
    }
}

/// Broadcast channel for [`Event`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(n) => debug!("Published {} to {} subscriber(s)", name, n),
            Err(_) => debug!("Published {} with no subscribers", name),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Events published from now on, as a stream. Lagged events are skipped.
    pub fn stream(&self) -> impl Stream<Item = Event> + Send + 'static {
        futures_util::stream::unfold(self.sender.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event subscriber lagged, {} event(s) dropped", skipped)
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }
}
