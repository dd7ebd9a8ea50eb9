//! Capability Router - one merged catalog, routing by public name
//!
//! Names on the wire are `owner__local`. They are resolved against the set of
//! registered owners (longest owner prefix wins), never by a naive split, so
//! a local name that itself contains `__` still reaches the right backend.

mod catalog;

use std::sync::Arc;

use mcplex_core::{CapabilityKind, MuxError, MuxResult, PublicName};
use rmcp::model::JsonObject;
use tracing::debug;

use crate::pool::{BackendRequest, CallResult, ConnectionManager};

pub use catalog::{Catalog, CatalogAggregate};

#[derive(Clone)]
pub struct CapabilityRouter {
    manager: Arc<ConnectionManager>,
}

impl CapabilityRouter {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Current merged catalog of all Ready backends
    pub fn catalog(&self) -> Arc<Catalog> {
        self.manager.catalog()
    }

    /// Split a wire name using the registered owners
    pub fn resolve(&self, public: &str) -> MuxResult<PublicName> {
        let owners = self.manager.owner_names();
        PublicName::resolve(public, owners.iter().map(String::as_str))
            .ok_or_else(|| MuxError::UnknownCapability(public.to_string()))
    }

    /// Route a tool call, prompt get or resource read by public name
    ///
    /// The backend's response is returned as-is; it never carries connection
    /// ids, only what the backend itself produced.
    pub async fn route(
        &self,
        kind: CapabilityKind,
        public: &str,
        arguments: Option<JsonObject>,
    ) -> CallResult {
        let name = self.resolve(public)?;
        let connection = self
            .manager
            .get(&name.owner)
            .ok_or_else(|| MuxError::UnknownCapability(public.to_string()))?;

        if !connection.is_ready() {
            return Err(MuxError::BackendUnavailable(name.owner).into());
        }

        let descriptor = connection
            .capabilities()
            .find(kind, &name.local)
            .cloned()
            .ok_or_else(|| MuxError::UnknownCapability(public.to_string()))?;

        let request = match kind {
            CapabilityKind::Tool => BackendRequest::CallTool {
                name: name.local.clone(),
                arguments,
            },
            CapabilityKind::Prompt => BackendRequest::GetPrompt {
                name: name.local.clone(),
                arguments,
            },
            CapabilityKind::Resource => BackendRequest::ReadResource {
                uri: descriptor.uri.unwrap_or_else(|| name.local.clone()),
            },
        };

        debug!(
            public_name = %name,
            owner = %name.owner,
            kind = %kind,
            "[CapabilityRouter] Routing"
        );

        self.manager.forward(connection.connection_id, request).await
    }

    /// Read a resource by URI, falling back to a public resource name
    pub async fn read_resource(&self, uri: &str) -> CallResult {
        let owner = self
            .catalog()
            .resource_by_uri(uri)
            .map(|entry| entry.owner().to_string());

        let Some(owner) = owner else {
            return self.route(CapabilityKind::Resource, uri, None).await;
        };

        let connection = self
            .manager
            .get(&owner)
            .ok_or_else(|| MuxError::BackendUnavailable(owner.clone()))?;

        debug!(uri = uri, owner = %owner, "[CapabilityRouter] Reading resource");
        self.manager
            .forward(
                connection.connection_id,
                BackendRequest::ReadResource {
                    uri: uri.to_string(),
                },
            )
            .await
    }
}
