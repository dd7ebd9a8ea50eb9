//! Registry Application Service
//!
//! Validates and persists server definitions with automatic event emission.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{DomainEvent, ServerDefinition};
use crate::error::{MuxError, MuxResult};
use crate::event_bus::EventSender;
use crate::repository::ServerDefinitionRepository;

/// Application service for the server registry
pub struct RegistryAppService {
    repo: Arc<dyn ServerDefinitionRepository>,
    event_sender: EventSender,
}

impl RegistryAppService {
    pub fn new(repo: Arc<dyn ServerDefinitionRepository>, event_sender: EventSender) -> Self {
        Self { repo, event_sender }
    }

    /// Validate and persist a new definition, stamped with the install time
    ///
    /// Emits: `ServerAdded`
    pub async fn add(&self, mut definition: ServerDefinition) -> MuxResult<ServerDefinition> {
        definition.validate()?;
        definition.installed_at = Utc::now();

        let inserted = self
            .repo
            .insert(&definition)
            .await
            .map_err(|e| MuxError::internal("registry insert", e))?;
        if !inserted {
            debug!(
                unique_name = %definition.unique_name,
                "[RegistryAppService] Rejected duplicate definition"
            );
            return Err(MuxError::DuplicateName(definition.unique_name));
        }

        info!(
            unique_name = %definition.unique_name,
            command = %definition.launch_line(),
            "[RegistryAppService] Added server"
        );

        self.event_sender.emit(DomainEvent::ServerAdded {
            unique_name: definition.unique_name.clone(),
        });

        Ok(definition)
    }

    /// Remove a definition
    ///
    /// Emits: `ServerDeleted`
    pub async fn delete(&self, unique_name: &str) -> MuxResult<ServerDefinition> {
        let existing = self.get(unique_name).await?;

        let removed = self
            .repo
            .delete(unique_name)
            .await
            .map_err(|e| MuxError::internal("registry delete", e))?;
        if !removed {
            // Lost a race with another delete
            return Err(MuxError::NotFound(unique_name.to_string()));
        }

        info!(unique_name = unique_name, "[RegistryAppService] Deleted server");

        self.event_sender.emit(DomainEvent::ServerDeleted {
            unique_name: unique_name.to_string(),
        });

        Ok(existing)
    }

    pub async fn list(&self) -> MuxResult<Vec<ServerDefinition>> {
        self.repo
            .list()
            .await
            .map_err(|e| MuxError::internal("registry list", e))
    }

    pub async fn get(&self, unique_name: &str) -> MuxResult<ServerDefinition> {
        self.repo
            .get(unique_name)
            .await
            .map_err(|e| MuxError::internal("registry get", e))?
            .ok_or_else(|| MuxError::NotFound(unique_name.to_string()))
    }
}
