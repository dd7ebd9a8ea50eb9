//! Service Container - holds all initialized services
//!
//! Services are created once and shared by every handler instance, listener
//! and consumer.

use std::sync::Arc;

use mcplex_core::{EventBus, RegistryAppService};

use super::dependencies::GatewayDependencies;
use super::startup::StartupOrchestrator;
use crate::control::ControlPlane;
use crate::pool::{BridgeRegistry, ConnectionManager};
use crate::router::CapabilityRouter;
use crate::session::ClientGateway;

/// Container for all Gateway services
#[derive(Clone)]
pub struct ServiceContainer {
    pub registry: Arc<RegistryAppService>,
    pub manager: Arc<ConnectionManager>,
    pub router: CapabilityRouter,
    pub gateway: Arc<ClientGateway>,
    pub control: Arc<ControlPlane>,
    pub startup: Arc<StartupOrchestrator>,
    /// Present in bridge mode only
    pub bridge_registry: Option<Arc<BridgeRegistry>>,
    pub event_bus: EventBus,
}

impl ServiceContainer {
    /// Wire services together from dependencies
    pub fn initialize(deps: &GatewayDependencies, event_bus: EventBus) -> Self {
        let event_tx = event_bus.sender();

        let registry = Arc::new(RegistryAppService::new(
            deps.definition_repo.clone(),
            event_tx.clone(),
        ));

        let mut manager = ConnectionManager::new(
            deps.connector.clone(),
            deps.connection_config.clone(),
            event_tx.clone(),
        );
        if let Some(repo) = &deps.cache_repo {
            manager = manager.with_cache_repository(repo.clone());
        }
        let manager = Arc::new(manager);

        let router = CapabilityRouter::new(manager.clone());
        let gateway = Arc::new(ClientGateway::new(event_tx));

        let mut control = ControlPlane::new(registry.clone(), manager.clone(), gateway.clone());
        if let Some(repo) = &deps.cache_repo {
            control = control.with_cache_repository(repo.clone());
        }

        let startup = Arc::new(StartupOrchestrator::new(registry.clone(), manager.clone()));

        Self {
            registry,
            manager,
            router,
            gateway,
            control: Arc::new(control),
            startup,
            bridge_registry: deps.bridge_registry.clone(),
            event_bus,
        }
    }
}
