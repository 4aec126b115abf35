//! Address objects and the managed group, read from and written to the appliance.
//!
//! Nothing is cached: every listing re-reads the appliance, every change is a
//! single configuration block followed by the settle delay.

use std::sync::Arc;

use indexmap::IndexMap;
use log::info;

use crate::error::Result;
use crate::protocol::{self, AddressKind, AddressObject};
use crate::session::{ServiceSettings, SessionManager};
use crate::transport::{Connector, SshConnector};

const LIST_ADDRESSES: &str = "show firewall address";

/// Object and group operations over a shared [`SessionManager`].
pub struct AddressBook<C: Connector = SshConnector> {
    session: Arc<SessionManager<C>>,
    tag_prefix: String,
    group_name: String,
}

impl<C: Connector> AddressBook<C> {
    pub fn new(session: Arc<SessionManager<C>>, settings: &ServiceSettings) -> Self {
        Self {
            session,
            tag_prefix: settings.tag_prefix.clone(),
            group_name: settings.group_name.clone(),
        }
    }

    pub fn session(&self) -> &Arc<SessionManager<C>> {
        &self.session
    }

    pub fn tag_prefix(&self) -> &str {
        &self.tag_prefix
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// `name` with the tag prefix added when it is missing.
    pub fn tagged_name(&self, name: &str) -> String {
        let name = name.trim();
        if name.starts_with(&self.tag_prefix) {
            name.to_string()
        } else {
            format!("{}{}", self.tag_prefix, name)
        }
    }

    /// Tagged address objects in appliance order, optionally of one kind.
    pub async fn list_objects(
        &self,
        filter: Option<AddressKind>,
    ) -> Result<IndexMap<String, AddressObject>> {
        let output = self.session.execute_command(LIST_ADDRESSES).await?;
        Ok(protocol::parse_address_objects(&output, &self.tag_prefix, filter))
    }

    /// Create or update one address object.
    pub async fn upsert_object(&self, name: &str, kind: AddressKind, value: &str) -> Result<()> {
        let block = protocol::upsert_address(name, kind, value)?;
        self.session.execute_mutation(&block).await?;
        info!("Saved {} object {} = {}", kind, name, value.trim());
        Ok(())
    }

    pub async fn delete_object(&self, name: &str) -> Result<()> {
        let block = protocol::delete_address(name)?;
        self.session.execute_mutation(&block).await?;
        info!("Deleted object {}", name);
        Ok(())
    }

    /// Membership of the managed group, keyed by group name.
    pub async fn groups(&self) -> Result<IndexMap<String, Vec<String>>> {
        let command = format!("show firewall addrgrp {}", self.group_name);
        let output = self.session.execute_command(&command).await?;
        Ok(protocol::parse_groups(&output))
    }

    /// Replace the managed group's members wholesale.
    pub async fn replace_group_members(&self, members: &[String]) -> Result<()> {
        let block = protocol::replace_group_members(&self.group_name, members)?;
        self.session.execute_mutation(&block).await?;
        info!("Group {} now has {} members", self.group_name, members.len());
        Ok(())
    }
}
