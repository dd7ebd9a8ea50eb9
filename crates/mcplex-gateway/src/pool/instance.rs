//! Backend connection representation
//!
//! One [`BackendConnection`] exists per registered definition. The record is
//! shared between the connection manager (which owns the lifecycle task) and
//! readers such as the router and status reporting; only the owning task
//! mutates it.

use chrono::{DateTime, Utc};
use mcplex_core::{
    CapabilitySnapshot, ConnectionSnapshot, ConnectionState, DomainEvent, EventSender, MuxError,
    ServerDefinition,
};
use parking_lot::RwLock;
use rmcp::model::{ClientCapabilities, ClientInfo, Implementation};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::RoleClient;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::request::{BackendRequest, CallError, CallResult};

/// Type alias for the MCP client service talking to one backend
pub type BackendClient = RunningService<RoleClient, BackendClientHandler>;

/// Work item for a connection task
pub enum ConnectionCommand {
    /// Forward a request; the reply is sent exactly once
    Call {
        request: BackendRequest,
        reply: oneshot::Sender<CallResult>,
    },
    /// Backend announced a list change
    Rediscover,
}

/// Client handler for backend MCP connections
#[derive(Clone)]
pub struct BackendClientHandler {
    info: ClientInfo,
    unique_name: String,
    commands: mpsc::Sender<ConnectionCommand>,
    event_tx: EventSender,
}

impl std::fmt::Debug for BackendClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClientHandler")
            .field("unique_name", &self.unique_name)
            .finish()
    }
}

impl BackendClientHandler {
    pub fn new(
        unique_name: &str,
        commands: mpsc::Sender<ConnectionCommand>,
        event_tx: EventSender,
    ) -> Self {
        Self {
            info: ClientInfo {
                meta: None,
                protocol_version: Default::default(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: format!("mcplex-{}", unique_name),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some("Mcplex Gateway".to_string()),
                    ..Default::default()
                },
            },
            unique_name: unique_name.to_string(),
            commands,
            event_tx,
        }
    }

    fn list_changed(&self, list: &'static str) {
        info!(
            unique_name = %self.unique_name,
            list = list,
            "[BackendClientHandler] Backend sent list_changed"
        );

        self.event_tx.emit(DomainEvent::BackendCapabilitiesChanged {
            unique_name: self.unique_name.clone(),
        });

        // A full queue already holds a pending rediscovery or calls that will
        // be followed by one; dropping this signal is harmless.
        if let Err(e) = self.commands.try_send(ConnectionCommand::Rediscover) {
            debug!(
                unique_name = %self.unique_name,
                error = %e,
                "[BackendClientHandler] Rediscovery not queued"
            );
        }
    }
}

impl rmcp::ClientHandler for BackendClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        self.list_changed("tools");
        std::future::ready(())
    }

    fn on_prompt_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        self.list_changed("prompts");
        std::future::ready(())
    }

    fn on_resource_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        self.list_changed("resources");
        std::future::ready(())
    }

    fn on_logging_message(
        &self,
        params: rmcp::model::LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let message = match &params.data {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        debug!(
            unique_name = %self.unique_name,
            level = ?params.level,
            logger = ?params.logger,
            "[BackendClientHandler] Server log: {}",
            message
        );
        std::future::ready(())
    }
}

/// Mutable runtime facts about a connection
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    pub calls_served: u64,
}

/// Live connection to one backend
pub struct BackendConnection {
    pub connection_id: Uuid,
    pub definition: ServerDefinition,
    stats: RwLock<ConnectionStats>,
    capabilities: RwLock<CapabilitySnapshot>,
    commands: mpsc::Sender<ConnectionCommand>,
    cancel: CancellationToken,
}

impl BackendConnection {
    /// New `Idle` record plus the receiving end of its command queue
    pub fn new(
        definition: ServerDefinition,
        queue_depth: usize,
    ) -> (Self, mpsc::Receiver<ConnectionCommand>) {
        let (commands, rx) = mpsc::channel(queue_depth.max(1));
        let connection = Self {
            connection_id: Uuid::new_v4(),
            definition,
            stats: RwLock::new(ConnectionStats::default()),
            capabilities: RwLock::new(CapabilitySnapshot::default()),
            commands,
            cancel: CancellationToken::new(),
        };
        (connection, rx)
    }

    pub fn unique_name(&self) -> &str {
        &self.definition.unique_name
    }

    pub fn state(&self) -> ConnectionState {
        self.stats.read().state
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats.read().clone()
    }

    pub fn capabilities(&self) -> CapabilitySnapshot {
        self.capabilities.read().clone()
    }

    pub fn commands(&self) -> &mpsc::Sender<ConnectionCommand> {
        &self.commands
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move to `state`, returning the previous state
    pub fn transition(&self, state: ConnectionState, error: Option<String>) -> ConnectionState {
        let mut stats = self.stats.write();
        let previous = stats.state;
        stats.state = state;
        match state {
            ConnectionState::Ready => {
                stats.connected_at = Some(Utc::now());
                stats.last_error = None;
            }
            ConnectionState::Degraded | ConnectionState::Closed => {
                if error.is_some() {
                    stats.last_error = error;
                }
                stats.connected_at = None;
            }
            _ => {}
        }
        previous
    }

    pub fn set_capabilities(&self, snapshot: CapabilitySnapshot) {
        *self.capabilities.write() = snapshot;
    }

    pub fn record_call(&self) {
        self.stats.write().calls_served += 1;
    }

    /// Point-in-time view, with cached capabilities when not yet Ready
    pub fn snapshot(&self, cached: Option<CapabilitySnapshot>) -> ConnectionSnapshot {
        let stats = self.stats();
        let ready = stats.state.is_ready();
        ConnectionSnapshot {
            unique_name: self.definition.unique_name.clone(),
            connection_id: self.connection_id,
            state: stats.state,
            last_error: stats.last_error,
            connected_at: stats.connected_at,
            capabilities: self.capabilities(),
            cached_capabilities: if ready { None } else { cached },
        }
    }
}

impl std::fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnection")
            .field("unique_name", &self.definition.unique_name)
            .field("connection_id", &self.connection_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Reject every queued call; used whenever a connection stops serving
pub fn drain_pending(unique_name: &str, rx: &mut mpsc::Receiver<ConnectionCommand>) -> usize {
    let mut rejected = 0;
    while let Ok(command) = rx.try_recv() {
        if let ConnectionCommand::Call { reply, .. } = command {
            let _ = reply.send(Err(CallError::Mux(MuxError::BackendUnavailable(
                unique_name.to_string(),
            ))));
            rejected += 1;
        }
    }
    if rejected > 0 {
        warn!(
            unique_name = unique_name,
            rejected = rejected,
            "[BackendConnection] Rejected queued calls"
        );
    }
    rejected
}
