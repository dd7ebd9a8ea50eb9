//! Startup Orchestrator - restores persisted state on gateway start
//!
//! Cached capability snapshots are loaded first so `status` can report them
//! immediately, then every registered definition is dispatched for
//! connection. Connecting happens in the background; nothing here waits for a
//! backend to become Ready.

use std::sync::Arc;

use mcplex_core::{MuxResult, RegistryAppService};
use tracing::info;

use crate::pool::ConnectionManager;

/// Outcome of restoring the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreResult {
    pub cached: usize,
    pub dispatched: Vec<String>,
}

pub struct StartupOrchestrator {
    registry: Arc<RegistryAppService>,
    manager: Arc<ConnectionManager>,
}

impl StartupOrchestrator {
    pub fn new(registry: Arc<RegistryAppService>, manager: Arc<ConnectionManager>) -> Self {
        Self { registry, manager }
    }

    /// Load the capability cache and start a connection per definition
    pub async fn restore(&self) -> MuxResult<RestoreResult> {
        info!("[Startup] Restoring registry...");

        let cached = self.manager.load_cache().await;
        let definitions = self.registry.list().await?;

        let mut dispatched = Vec::with_capacity(definitions.len());
        for definition in definitions {
            dispatched.push(definition.unique_name.clone());
            self.manager.connect(definition);
        }

        info!(
            cached = cached,
            servers = dispatched.len(),
            "[Startup] Registry restored"
        );

        Ok(RestoreResult { cached, dispatched })
    }
}
