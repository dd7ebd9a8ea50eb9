//! Control-Plane Handler
//!
//! `add`, `delete`, `list` and `status` map one-to-one onto registry and
//! connection manager operations. Every outcome, including failures, is a
//! [`ControlResponse`] envelope; nothing here ever errors out of band.

use std::sync::Arc;

use mcplex_core::{
    CapabilityCacheRepository, ControlRequest, ControlResponse, ControlVerb, MuxError, MuxResult,
    RegistryAppService, ServerDefinition, StatusReport,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::pool::ConnectionManager;
use crate::session::ClientGateway;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletePayload {
    unique_name: String,
}

pub struct ControlPlane {
    registry: Arc<RegistryAppService>,
    manager: Arc<ConnectionManager>,
    gateway: Arc<ClientGateway>,
    cache_repo: Option<Arc<dyn CapabilityCacheRepository>>,
    /// Held for the whole registry + connection sequence of add and delete
    mutation: Mutex<()>,
}

impl ControlPlane {
    pub fn new(
        registry: Arc<RegistryAppService>,
        manager: Arc<ConnectionManager>,
        gateway: Arc<ClientGateway>,
    ) -> Self {
        Self {
            registry,
            manager,
            gateway,
            cache_repo: None,
            mutation: Mutex::new(()),
        }
    }

    pub fn with_cache_repository(mut self, repo: Arc<dyn CapabilityCacheRepository>) -> Self {
        self.cache_repo = Some(repo);
        self
    }

    pub async fn handle(&self, request: ControlRequest) -> ControlResponse {
        let verb = request.verb;
        let outcome = match verb {
            ControlVerb::Add => self.add(request.data).await,
            ControlVerb::Delete => self.delete(request.data).await,
            ControlVerb::List => self.list().await,
            ControlVerb::Status => Ok(self.status()),
        };

        outcome.unwrap_or_else(|e| {
            if e.is_client_error() {
                info!(verb = verb.as_str(), error = %e, "[ControlPlane] Rejected");
            } else {
                warn!(verb = verb.as_str(), error = %e, "[ControlPlane] Failed");
            }
            ControlResponse::failure(&e)
        })
    }

    async fn add(&self, data: Option<Value>) -> MuxResult<ControlResponse> {
        let data = data.ok_or_else(|| MuxError::InvalidDefinition("missing data".into()))?;
        let definition: ServerDefinition = serde_json::from_value(data)
            .map_err(|e| MuxError::InvalidDefinition(e.to_string()))?;

        let _mutation = self.mutation.lock().await;
        let definition = self.registry.add(definition).await?;
        let connection_id = self.manager.connect(definition.clone());

        Ok(ControlResponse::ok_with_data(
            format!("Server '{}' added", definition.unique_name),
            json!({ "definition": definition, "connectionId": connection_id }),
        ))
    }

    async fn delete(&self, data: Option<Value>) -> MuxResult<ControlResponse> {
        let unique_name = match data {
            Some(Value::String(name)) => name,
            Some(value) => {
                serde_json::from_value::<DeletePayload>(value)
                    .map_err(|e| MuxError::InvalidDefinition(e.to_string()))?
                    .unique_name
            }
            None => return Err(MuxError::InvalidDefinition("missing uniqueName".into())),
        };

        let _mutation = self.mutation.lock().await;
        let definition = self.registry.delete(&unique_name).await?;

        if let Err(e) = self.manager.disconnect_by_name(&unique_name) {
            warn!(unique_name = %unique_name, error = %e, "[ControlPlane] No live connection to tear down");
        }
        if let Some(repo) = &self.cache_repo {
            if let Err(e) = repo.delete(&unique_name).await {
                warn!(unique_name = %unique_name, error = %e, "[ControlPlane] Failed to clear capability cache");
            }
        }

        Ok(ControlResponse::ok_with_data(
            format!("Server '{}' deleted", unique_name),
            json!({ "definition": definition }),
        ))
    }

    async fn list(&self) -> MuxResult<ControlResponse> {
        let definitions = self.registry.list().await?;
        let message = format!("{} server(s)", definitions.len());
        Ok(ControlResponse::ok_with_data(message, json!(definitions)))
    }

    pub fn status(&self) -> ControlResponse {
        let report =
            StatusReport::from_snapshots(self.manager.snapshot(), self.gateway.current_session());
        let message = format!(
            "{} ready, {} degraded, {} closed",
            report.ready, report.degraded, report.closed
        );
        match serde_json::to_value(&report) {
            Ok(data) => ControlResponse::ok_with_data(message, data),
            Err(e) => ControlResponse::failure(&MuxError::internal("serialize status", e)),
        }
    }
}
