//! Dependency Injection Container
//!
//! Everything the gateway needs from the outside world: repositories, the
//! backend connector and connection tuning. Tests swap the connector for an
//! in-process one and use an in-memory database.

use std::sync::Arc;

use mcplex_core::{CapabilityCacheRepository, ServerDefinitionRepository};
use mcplex_storage::{
    Database, SqliteCapabilityCacheRepository, SqliteServerDefinitionRepository,
};
use tokio::sync::Mutex;

use crate::config::{BackendMode, ConnectionConfig};
use crate::pool::{BackendConnector, BridgeConnector, BridgeRegistry, ChildProcessConnector};

/// Dependency container for Gateway
#[derive(Clone)]
pub struct GatewayDependencies {
    pub definition_repo: Arc<dyn ServerDefinitionRepository>,
    pub cache_repo: Option<Arc<dyn CapabilityCacheRepository>>,
    pub connector: Arc<dyn BackendConnector>,
    /// Set when backends attach through the bridge endpoint
    pub bridge_registry: Option<Arc<BridgeRegistry>>,
    pub connection_config: ConnectionConfig,
}

/// Builder for GatewayDependencies
#[derive(Default)]
pub struct DependenciesBuilder {
    definition_repo: Option<Arc<dyn ServerDefinitionRepository>>,
    cache_repo: Option<Arc<dyn CapabilityCacheRepository>>,
    connector: Option<Arc<dyn BackendConnector>>,
    connection_config: Option<ConnectionConfig>,
}

impl DependenciesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use SQLite for both the registry and the capability cache
    pub fn with_database(mut self, db: Arc<Mutex<Database>>) -> Self {
        self.definition_repo = Some(Arc::new(SqliteServerDefinitionRepository::new(db.clone())));
        self.cache_repo = Some(Arc::new(SqliteCapabilityCacheRepository::new(db)));
        self
    }

    pub fn with_definition_repo(mut self, repo: Arc<dyn ServerDefinitionRepository>) -> Self {
        self.definition_repo = Some(repo);
        self
    }

    pub fn with_cache_repo(mut self, repo: Arc<dyn CapabilityCacheRepository>) -> Self {
        self.cache_repo = Some(repo);
        self
    }

    /// Override how backends are reached; `backend_mode` is ignored then
    pub fn with_connector(mut self, connector: Arc<dyn BackendConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection_config = Some(config);
        self
    }

    pub fn build(self) -> Result<GatewayDependencies, String> {
        let definition_repo = self
            .definition_repo
            .ok_or("definition repository is required")?;
        let connection_config = self.connection_config.unwrap_or_default();

        let mut bridge_registry = None;
        let connector: Arc<dyn BackendConnector> = match self.connector {
            Some(connector) => connector,
            None => match connection_config.backend_mode {
                BackendMode::Launch => Arc::new(ChildProcessConnector::new()),
                BackendMode::Bridge => {
                    let registry = Arc::new(BridgeRegistry::new());
                    bridge_registry = Some(registry.clone());
                    Arc::new(BridgeConnector::new(registry))
                }
            },
        };

        Ok(GatewayDependencies {
            definition_repo,
            cache_repo: self.cache_repo,
            connector,
            bridge_registry,
            connection_config,
        })
    }
}
