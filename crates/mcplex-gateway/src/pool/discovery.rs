//! Capability discovery against a connected backend

use mcplex_core::{CapabilityDescriptor, CapabilitySnapshot};
use rmcp::model::{Prompt, Resource, Tool};
use rmcp::service::Peer;
use rmcp::RoleClient;
use serde_json::Value;
use tracing::{debug, info, warn};

pub fn tool_descriptor(tool: &Tool) -> CapabilityDescriptor {
    let mut descriptor = CapabilityDescriptor::new(tool.name.to_string())
        .with_schema(Value::Object((*tool.input_schema).clone()))
        .with_raw(serde_json::to_value(tool).unwrap_or(Value::Null));
    if let Some(description) = &tool.description {
        descriptor = descriptor.with_description(description.to_string());
    }
    descriptor
}

pub fn prompt_descriptor(prompt: &Prompt) -> CapabilityDescriptor {
    let arguments = prompt
        .arguments
        .as_ref()
        .and_then(|args| serde_json::to_value(args).ok())
        .unwrap_or(Value::Null);
    let mut descriptor = CapabilityDescriptor::new(prompt.name.clone())
        .with_schema(arguments)
        .with_raw(serde_json::to_value(prompt).unwrap_or(Value::Null));
    if let Some(description) = &prompt.description {
        descriptor = descriptor.with_description(description.clone());
    }
    descriptor
}

pub fn resource_descriptor(resource: &Resource) -> CapabilityDescriptor {
    let raw = serde_json::to_value(resource).unwrap_or(Value::Null);
    let mut descriptor = CapabilityDescriptor::new(resource.raw.name.clone())
        .with_uri(resource.raw.uri.clone())
        .with_schema(
            resource
                .raw
                .mime_type
                .as_ref()
                .map(|mime| serde_json::json!({ "mimeType": mime }))
                .unwrap_or(Value::Null),
        )
        .with_raw(raw);
    if let Some(description) = &resource.raw.description {
        descriptor = descriptor.with_description(description.clone());
    }
    descriptor
}

/// Fetch tool, prompt and resource catalogs
///
/// A catalog the backend does not implement is treated as empty; the other
/// two are still collected.
pub async fn discover(unique_name: &str, peer: &Peer<RoleClient>) -> CapabilitySnapshot {
    let mut snapshot = CapabilitySnapshot::default();

    match peer.list_all_tools().await {
        Ok(tools) => snapshot.tools = tools.iter().map(tool_descriptor).collect(),
        Err(e) => warn!(unique_name = unique_name, "[Discovery] Failed to list tools: {}", e),
    }

    match peer.list_all_prompts().await {
        Ok(prompts) => snapshot.prompts = prompts.iter().map(prompt_descriptor).collect(),
        Err(e) => debug!(unique_name = unique_name, "[Discovery] No prompts: {}", e),
    }

    match peer.list_all_resources().await {
        Ok(resources) => {
            snapshot.resources = resources.iter().map(resource_descriptor).collect()
        }
        Err(e) => debug!(unique_name = unique_name, "[Discovery] No resources: {}", e),
    }

    info!(
        unique_name = unique_name,
        tools = snapshot.tools.len(),
        prompts = snapshot.prompts.len(),
        resources = snapshot.resources.len(),
        "[Discovery] Capabilities discovered"
    );

    snapshot
}
