//! Requests forwarded to a backend and their outcomes

use mcplex_core::{CapabilityKind, MuxError};
use rmcp::model::{
    CallToolRequestParams, GetPromptRequestParams, JsonObject, ReadResourceRequestParams,
};
use rmcp::service::{Peer, ServiceError};
use rmcp::{ErrorData, RoleClient};
use serde_json::Value;

/// A capability invocation addressed with the backend's local name
#[derive(Debug, Clone, PartialEq)]
pub enum BackendRequest {
    CallTool {
        name: String,
        arguments: Option<JsonObject>,
    },
    GetPrompt {
        name: String,
        arguments: Option<JsonObject>,
    },
    ReadResource {
        uri: String,
    },
}

impl BackendRequest {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::CallTool { .. } => CapabilityKind::Tool,
            Self::GetPrompt { .. } => CapabilityKind::Prompt,
            Self::ReadResource { .. } => CapabilityKind::Resource,
        }
    }

    /// Local name or URI, for logs
    pub fn target(&self) -> &str {
        match self {
            Self::CallTool { name, .. } | Self::GetPrompt { name, .. } => name,
            Self::ReadResource { uri } => uri,
        }
    }

    /// Send over `peer`; the backend's result is returned as raw JSON
    pub async fn execute(self, unique_name: &str, peer: &Peer<RoleClient>) -> CallResult {
        let result = match self {
            Self::CallTool { name, arguments } => peer
                .call_tool(CallToolRequestParams {
                    meta: None,
                    name: name.into(),
                    arguments,
                    task: None,
                })
                .await
                .map(serde_json::to_value),
            Self::GetPrompt { name, arguments } => peer
                .get_prompt(GetPromptRequestParams {
                    meta: None,
                    name,
                    arguments,
                })
                .await
                .map(serde_json::to_value),
            Self::ReadResource { uri } => peer
                .read_resource(ReadResourceRequestParams { meta: None, uri })
                .await
                .map(serde_json::to_value),
        };

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(MuxError::internal("serialize backend result", e).into()),
            Err(e) => Err(CallError::from_service(unique_name, e)),
        }
    }
}

/// Why a forwarded call produced no result
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    Mux(MuxError),
    /// The backend answered with a JSON-RPC error, passed through verbatim
    Backend(ErrorData),
}

impl CallError {
    fn from_service(unique_name: &str, err: ServiceError) -> Self {
        match err {
            ServiceError::McpError(e) => Self::Backend(e),
            ServiceError::Timeout { .. } => Self::Mux(MuxError::CallTimeout(unique_name.into())),
            ServiceError::TransportClosed
            | ServiceError::TransportSend(_)
            | ServiceError::Cancelled { .. } => {
                Self::Mux(MuxError::BackendUnavailable(unique_name.into()))
            }
            other => Self::Mux(MuxError::internal("backend call", other)),
        }
    }

    /// Mux-level error, if this is one
    pub fn as_mux(&self) -> Option<&MuxError> {
        match self {
            Self::Mux(e) => Some(e),
            Self::Backend(_) => None,
        }
    }
}

impl From<MuxError> for CallError {
    fn from(err: MuxError) -> Self {
        Self::Mux(err)
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mux(e) => write!(f, "{}", e),
            Self::Backend(e) => write!(f, "backend error {}: {}", e.code.0, e.message),
        }
    }
}

pub type CallResult = Result<Value, CallError>;
