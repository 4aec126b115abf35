//! The operations a web layer exposes, one method per route.

use std::sync::Arc;

use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::auth::{AccessPolicy, Identity, Principal};
use super::events::{Event, EventBus};
use super::response::{ApiResponse, Failure};
use crate::address_book::AddressBook;
use crate::diagnostics::{Diagnostics, DiagnosticsReport};
use crate::error::ConfigError;
use crate::protocol::{AddressKind, AddressObject};
use crate::session::{ConnectOutcome, ServiceSettings, SessionManager, SessionState};
use crate::transport::{ConnectionInfo, Connector, SshConnector, load_connection_config};

/// Body of a create/update request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SaveObjectRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// Connection status as shown to an operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub connected: bool,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ConnectionInfo>,
    pub user: Principal,
}

/// Address-object administration for authorized operators.
///
/// Object and group operations refuse with [`Failure::NotConnected`] unless
/// the session is up; they never trigger a connect on their own.
pub struct AdminService<C: Connector = SshConnector> {
    book: AddressBook<C>,
    policy: AccessPolicy,
    events: EventBus,
    diagnostics: Diagnostics,
}

impl AdminService<SshConnector> {
    /// Everything from the process environment.
    ///
    /// A missing appliance connection is only a warning; invalid tunables
    /// are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = ServiceSettings::from_env()?;
        let session = SessionManager::with_connector(
            SshConnector::default(),
            load_connection_config(),
            crate::platform::fortigate::profile(),
            &settings,
        );
        let policy = AccessPolicy::from_env();
        info!("{} operator(s) authorized", policy.authorized_count());
        Ok(Self::new(Arc::new(session), &settings, policy))
    }
}

impl<C: Connector> AdminService<C> {
    pub fn new(session: Arc<SessionManager<C>>, settings: &ServiceSettings, policy: AccessPolicy) -> Self {
        Self {
            book: AddressBook::new(session, settings),
            policy,
            events: EventBus::default(),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager<C>> {
        self.book.session()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Admit a request. No identity is 401, a refused one 403.
    pub fn authenticate(&self, identity: Option<&Identity>) -> Result<Principal, Failure> {
        let identity = identity.ok_or(Failure::Unauthorized)?;
        Ok(self.policy.authorize(identity)?)
    }

    /// Auto-connect at startup and broadcast the outcome.
    pub async fn start(&self) -> ApiResponse<()> {
        let result = self.session().auto_connect().await;
        self.publish_connect_result(result)
    }

    /// The current status event plus a receiver for everything after it.
    pub fn subscribe(&self) -> (Event, broadcast::Receiver<Event>) {
        let receiver = self.events.subscribe();
        let state = self.session().state();
        let current = Event::ConnectionStatus {
            connected: state == SessionState::Connected,
            message: state.status_message().to_string(),
        };
        (current, receiver)
    }

    pub fn status(&self, principal: &Principal) -> ApiResponse<StatusReport> {
        let state = self.session().state();
        ApiResponse::ok(StatusReport {
            connected: state == SessionState::Connected,
            state,
            config: self.session().connection_info(),
            user: principal.clone(),
        })
        .with_message(state.status_message())
    }

    pub async fn reconnect(&self, principal: &Principal) -> ApiResponse<()> {
        info!("{} requested a reconnect", principal.email);
        let result = self.session().connect().await;
        self.publish_connect_result(result)
    }

    fn publish_connect_result(&self, result: crate::Result<ConnectOutcome>) -> ApiResponse<()> {
        let (connected, message) = match result {
            Ok(outcome) => (
                matches!(outcome, ConnectOutcome::Connected(_)),
                outcome.message(),
            ),
            Err(e) => (false, e.to_string()),
        };

        self.events.publish(Event::ConnectionStatus {
            connected,
            message: message.clone(),
        });

        if connected {
            ApiResponse::confirmed(message)
        } else {
            ApiResponse::unsuccessful(message)
        }
    }

    pub async fn diagnose(&self, principal: &Principal) -> ApiResponse<DiagnosticsReport> {
        info!("{} ran connectivity diagnostics", principal.email);
        let report = self
            .diagnostics
            .diagnose(self.session().connection_info().as_ref())
            .await;
        ApiResponse {
            success: report.success,
            message: None,
            data: Some(report),
            count: None,
            error: None,
        }
    }

    fn require_connection(&self) -> Result<(), Failure> {
        if self.session().is_connected() {
            Ok(())
        } else {
            Err(Failure::NotConnected)
        }
    }

    /// Tagged objects, optionally filtered by kind (`all` or none for every kind).
    pub async fn list_objects(
        &self,
        principal: &Principal,
        filter: Option<&str>,
    ) -> Result<ApiResponse<IndexMap<String, AddressObject>>, Failure> {
        self.require_connection()?;
        let filter =
            AddressKind::parse_filter(filter).map_err(|e| Failure::invalid(e.to_string()))?;

        let objects = self
            .book
            .list_objects(filter)
            .await
            .map_err(|e| Failure::from_error("Failed to list address objects", e))?;

        info!(
            "{} listed address objects (filter: {})",
            principal.email,
            filter.map_or("none", |k| k.as_str())
        );
        let count = objects.len();
        Ok(ApiResponse::ok(objects).with_count(count))
    }

    /// Create or update one object; the tag prefix is added when missing.
    pub async fn save_object(
        &self,
        principal: &Principal,
        request: SaveObjectRequest,
    ) -> Result<ApiResponse<AddressObject>, Failure> {
        self.require_connection()?;
        let kind = validate_save_request(&request)?;
        let name = self.book.tagged_name(&request.name);
        let value = request.value.trim();

        self.book
            .upsert_object(&name, kind, value)
            .await
            .map_err(|e| Failure::from_error("Failed to save object", e))?;

        info!("{} saved object {}", principal.email, name);
        self.events.publish(Event::ObjectUpdated {
            name: name.clone(),
            kind,
            value: value.to_string(),
            user: principal.email.clone(),
        });

        let message = format!("Object '{}' saved", name);
        Ok(ApiResponse::ok(AddressObject::new(name, kind, value)).with_message(message))
    }

    pub async fn delete_object(&self, principal: &Principal, name: &str) -> Result<ApiResponse<()>, Failure> {
        self.require_connection()?;

        self.book
            .delete_object(name)
            .await
            .map_err(|e| Failure::from_error("Failed to delete object", e))?;

        info!("{} deleted object {}", principal.email, name);
        self.events.publish(Event::ObjectDeleted {
            name: name.to_string(),
            user: principal.email.clone(),
        });
        Ok(ApiResponse::confirmed(format!("Object '{}' deleted", name)))
    }

    pub async fn list_groups(
        &self,
        principal: &Principal,
    ) -> Result<ApiResponse<IndexMap<String, Vec<String>>>, Failure> {
        self.require_connection()?;

        let groups = self
            .book
            .groups()
            .await
            .map_err(|e| Failure::from_error("Failed to list address groups", e))?;

        info!("{} listed address groups", principal.email);
        Ok(ApiResponse::ok(groups))
    }

    /// Replace the managed group's membership.
    pub async fn replace_group_members(
        &self,
        principal: &Principal,
        members: Vec<String>,
    ) -> Result<ApiResponse<()>, Failure> {
        self.require_connection()?;

        self.book
            .replace_group_members(&members)
            .await
            .map_err(|e| Failure::from_error("Failed to update group", e))?;

        let group = self.book.group_name().to_string();
        info!(
            "{} set {} members on group {}",
            principal.email,
            members.len(),
            group
        );
        let message = format!("Group {} updated", group);
        self.events.publish(Event::GroupUpdated {
            name: group,
            members,
            user: principal.email.clone(),
        });
        Ok(ApiResponse::confirmed(message))
    }
}

fn validate_save_request(request: &SaveObjectRequest) -> Result<AddressKind, Failure> {
    let mut details = Vec::new();

    if request.name.trim().is_empty() {
        details.push("name is required".to_string());
    }
    if request.value.trim().is_empty() {
        details.push("value is required".to_string());
    }
    let kind = request
        .kind
        .parse::<AddressKind>()
        .ok()
        .filter(|k| AddressKind::WRITABLE.contains(k));
    if kind.is_none() {
        details.push(format!(
            "type must be one of mac, subnet, fqdn, range (got '{}')",
            request.kind
        ));
    }

    match kind {
        Some(kind) if details.is_empty() => Ok(kind),
        _ => Err(Failure::InvalidInput { details }),
    }
}
