//! Backend connection state - runtime only, never persisted

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CapabilitySnapshot;

/// Lifecycle of one backend connection
///
/// `Idle → Connecting → Handshaking → Ready`. Any state may drop to
/// `Degraded` on a non-fatal failure; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Handshaking,
    Ready,
    Degraded,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Attempt in progress (not yet Ready, not failed)
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Idle | Self::Connecting | Self::Handshaking)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a backend connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub unique_name: String,
    pub connection_id: Uuid,
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    /// Negotiated capabilities (empty until the first handshake)
    pub capabilities: CapabilitySnapshot,
    /// Capabilities restored from the cache, reported until the backend is Ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_capabilities: Option<CapabilitySnapshot>,
}
