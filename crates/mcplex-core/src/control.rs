//! Control-plane message types
//!
//! Request: `{verb, data?}`. Response: `{success, message|error, code?, data?}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ClientSession, ConnectionSnapshot, ConnectionState};
use crate::error::{ErrorCode, MuxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlVerb {
    Add,
    Delete,
    List,
    Status,
}

impl ControlVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Status => "status",
        }
    }

    /// Verb from an MCP custom method such as `mcplex/status`
    pub fn from_method(method: &str) -> Option<Self> {
        match method.strip_prefix("mcplex/")? {
            "add" => Some(Self::Add),
            "delete" => Some(Self::Delete),
            "list" => Some(Self::List),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub verb: ControlVerb,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ControlRequest {
    pub fn new(verb: ControlVerb) -> Self {
        Self { verb, data: None }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Structured success/failure envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ControlResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            code: None,
            data: None,
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok(message)
        }
    }

    pub fn failure(err: &MuxError) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(err.to_string()),
            code: Some(err.code()),
            data: None,
        }
    }
}

impl From<MuxError> for ControlResponse {
    fn from(err: MuxError) -> Self {
        Self::failure(&err)
    }
}

/// Payload of the `status` verb
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub ready: usize,
    pub degraded: usize,
    pub closed: usize,
    /// Idle, Connecting or Handshaking
    pub connecting: usize,
    pub total: usize,
    pub connections: Vec<ConnectionSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<ClientSession>,
}

impl StatusReport {
    pub fn from_snapshots(
        connections: Vec<ConnectionSnapshot>,
        session: Option<ClientSession>,
    ) -> Self {
        let count = |pred: fn(&ConnectionState) -> bool| {
            connections.iter().filter(|c| pred(&c.state)).count()
        };
        Self {
            ready: count(|s| matches!(s, ConnectionState::Ready)),
            degraded: count(|s| matches!(s, ConnectionState::Degraded)),
            closed: count(|s| matches!(s, ConnectionState::Closed)),
            connecting: count(ConnectionState::is_pending),
            total: connections.len(),
            connections,
            session,
        }
    }
}
