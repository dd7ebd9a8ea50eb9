//! ClientSession - the single active front-facing client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the client reached the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Streamable HTTP (`/mcp`)
    Stream,
    /// Raw socket speaking newline-delimited JSON-RPC
    Socket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Socket => "socket",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// At most one exists system-wide
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    pub session_id: String,
    pub transport_kind: TransportKind,
    pub connected_at: DateTime<Utc>,
}

impl ClientSession {
    pub fn new(session_id: impl Into<String>, transport_kind: TransportKind) -> Self {
        Self {
            session_id: session_id.into(),
            transport_kind,
            connected_at: Utc::now(),
        }
    }
}
