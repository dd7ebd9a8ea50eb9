//! Catalog entries and results at the MCP boundary
//!
//! Backends' raw capability JSON is reused verbatim; only the name is
//! rewritten to the public name. Errors become well-formed `ErrorData`.

use std::sync::Arc;

use mcplex_core::{CapabilityEntry, MuxError};
use rmcp::model::{
    AnnotateAble, ErrorCode, JsonObject, Prompt, PromptArgument, RawResource, Resource, Tool,
};
use rmcp::ErrorData as McpError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::pool::CallError;

/// Raw backend JSON with `name` replaced by the public name
fn renamed(entry: &CapabilityEntry) -> Value {
    let mut raw = entry.raw.clone();
    if let Some(obj) = raw.as_object_mut() {
        obj.insert("name".into(), Value::String(entry.public_name.to_string()));
    }
    raw
}

pub fn to_tool(entry: &CapabilityEntry) -> Tool {
    serde_json::from_value(renamed(entry)).unwrap_or_else(|_| {
        let schema: JsonObject = entry.schema.as_object().cloned().unwrap_or_default();
        let mut tool = Tool::new(
            entry.public_name.to_string(),
            entry.description.clone().unwrap_or_default(),
            Arc::new(schema),
        );
        if entry.description.is_none() {
            tool.description = None;
        }
        tool
    })
}

pub fn to_prompt(entry: &CapabilityEntry) -> Prompt {
    serde_json::from_value(renamed(entry)).unwrap_or_else(|_| {
        let arguments: Option<Vec<PromptArgument>> =
            serde_json::from_value(entry.schema.clone()).ok();
        Prompt::new(
            entry.public_name.to_string(),
            entry.description.clone(),
            arguments,
        )
    })
}

pub fn to_resource(entry: &CapabilityEntry) -> Resource {
    serde_json::from_value(renamed(entry)).unwrap_or_else(|_| {
        let uri = entry
            .uri
            .clone()
            .unwrap_or_else(|| entry.public_name.to_string());
        let mut raw = RawResource::new(uri, entry.public_name.to_string());
        raw.description = entry.description.clone();
        raw.no_annotation()
    })
}

/// Map a gateway error onto a protocol error with a stable code in `data`
pub fn to_error_data(err: &MuxError) -> McpError {
    let data = Some(json!({ "code": err.code().as_str() }));
    match err {
        MuxError::UnknownCapability(_) | MuxError::InvalidDefinition(_) => {
            McpError::invalid_params(err.to_string(), data)
        }
        _ => McpError::internal_error(err.to_string(), data),
    }
}

/// Backend JSON-RPC errors pass through unchanged
pub fn call_error_data(err: CallError) -> McpError {
    match err {
        CallError::Backend(data) => data,
        CallError::Mux(e) => to_error_data(&e),
    }
}

/// Decode a backend result into its protocol type
pub fn decode_result<T: DeserializeOwned>(value: Value) -> Result<T, McpError> {
    serde_json::from_value(value).map_err(|e| {
        to_error_data(&MuxError::internal("decode backend result", e))
    })
}

/// Error for requests arriving on a session that has been replaced
pub fn superseded() -> McpError {
    McpError::new(
        ErrorCode::INVALID_REQUEST,
        "session was replaced by a newer client",
        Some(json!({ "code": "session_replaced" })),
    )
}
