//! Domain Events - Unified event system for Mcplex
//!
//! All observable state changes are represented as events in this module.
//! Events are emitted by the registry service, the connection manager and the
//! client gateway, and consumed by:
//! - CatalogNotifier (list_changed delivery to the active client)
//! - Logging / diagnostics
//!
//! # Design Principles
//!
//! - **Single Source of Truth**: One enum for all domain events
//! - **Smart Consumers**: Consumers decide which events they care about
//! - **Immutable**: Events are facts that happened, never mutated

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ConnectionState, TransportKind};

// ============================================================================
// DOMAIN EVENT ENUM
// ============================================================================

/// Unified domain events for the whole multiplexer
///
/// Events serialize with a `type` field containing the snake_case variant name:
/// ```json
/// { "type": "server_added", "unique_name": "echo" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    // ════════════════════════════════════════════════════════════════════════
    // REGISTRY
    // ════════════════════════════════════════════════════════════════════════
    /// A definition was persisted
    ServerAdded { unique_name: String },

    /// A definition was removed
    ServerDeleted { unique_name: String },

    // ════════════════════════════════════════════════════════════════════════
    // BACKEND CONNECTIONS (Runtime)
    // ════════════════════════════════════════════════════════════════════════
    /// A backend connection moved to a new state
    ConnectionStateChanged {
        unique_name: String,
        connection_id: Uuid,
        state: ConnectionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Backend announced a list_changed for one of its catalogs
    BackendCapabilitiesChanged { unique_name: String },

    /// Aggregate catalog was rebuilt
    CatalogRebuilt { entries: usize },

    // ════════════════════════════════════════════════════════════════════════
    // CLIENT SESSION
    // ════════════════════════════════════════════════════════════════════════
    ClientConnected {
        session_id: String,
        transport: TransportKind,
    },

    /// A newer client preempted the active one
    ClientReplaced {
        previous_session_id: String,
        session_id: String,
        transport: TransportKind,
    },

    ClientDisconnected { session_id: String },

    // ════════════════════════════════════════════════════════════════════════
    // GATEWAY
    // ════════════════════════════════════════════════════════════════════════
    GatewayStarted { url: String, port: u16 },

    GatewayStopped,
}

impl DomainEvent {
    /// Get the event type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ServerAdded { .. } => "server_added",
            Self::ServerDeleted { .. } => "server_deleted",
            Self::ConnectionStateChanged { .. } => "connection_state_changed",
            Self::BackendCapabilitiesChanged { .. } => "backend_capabilities_changed",
            Self::CatalogRebuilt { .. } => "catalog_rebuilt",
            Self::ClientConnected { .. } => "client_connected",
            Self::ClientReplaced { .. } => "client_replaced",
            Self::ClientDisconnected { .. } => "client_disconnected",
            Self::GatewayStarted { .. } => "gateway_started",
            Self::GatewayStopped => "gateway_stopped",
        }
    }

    /// Whether the active client should receive list_changed notifications
    pub fn affects_catalog(&self) -> bool {
        matches!(self, Self::CatalogRebuilt { .. })
    }

    /// Backend name if this event is about one backend
    pub fn unique_name(&self) -> Option<&str> {
        match self {
            Self::ServerAdded { unique_name }
            | Self::ServerDeleted { unique_name }
            | Self::ConnectionStateChanged { unique_name, .. }
            | Self::BackendCapabilitiesChanged { unique_name } => Some(unique_name),
            _ => None,
        }
    }

    /// Event timestamp (current time, events are ephemeral)
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// TESTS
// ============================================================================
