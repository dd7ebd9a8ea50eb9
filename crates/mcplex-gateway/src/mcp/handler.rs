//! Mcplex Gateway MCP Handler
//!
//! Implements the MCP ServerHandler trait to expose the merged catalog of all
//! Ready backends as one server. A fresh handler is created per client
//! session; it admits its session into the [`crate::session::ClientGateway`] on
//! `notifications/initialized` and from then on only answers while that
//! session is the active one.

use std::sync::{Arc, OnceLock};

use mcplex_core::{CapabilityKind, ControlRequest, ControlVerb};
use rmcp::{
    model::*,
    service::{NotificationContext, RequestContext},
    transport::streamable_http_server::session::local::LocalSessionManager,
    ErrorData as McpError, RoleServer, ServerHandler,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::context::extract_session_id;
use super::convert::{
    call_error_data, decode_result, superseded, to_prompt, to_resource, to_tool,
};
use crate::server::ServiceContainer;
use crate::session::{
    ClientGateway, ClientTransport, SocketClientTransport, StreamClientTransport,
};

/// Which client transport a handler instance serves
#[derive(Clone)]
pub enum ClientOrigin {
    /// Streamable HTTP; the session id comes from the request headers
    Stream { sessions: Arc<LocalSessionManager> },
    /// Raw socket; the id is assigned by the listener
    Socket {
        session_id: String,
        cancel: CancellationToken,
    },
}

/// Session a handler was admitted as
///
/// Shared by every clone of the handler. When the last clone goes away the
/// client session has ended, so the session is released from the gateway.
struct SessionBinding {
    session_id: OnceLock<String>,
    gateway: Arc<ClientGateway>,
}

impl Drop for SessionBinding {
    fn drop(&mut self) {
        if let Some(id) = self.session_id.get() {
            if self.gateway.release(id) {
                debug!(session_id = %id, "[MCP] Session ended");
            }
        }
    }
}

#[derive(Clone)]
pub struct McplexGatewayHandler {
    services: ServiceContainer,
    origin: ClientOrigin,
    bound: Arc<SessionBinding>,
}

impl McplexGatewayHandler {
    pub fn new(services: ServiceContainer, origin: ClientOrigin) -> Self {
        let bound = Arc::new(SessionBinding {
            session_id: OnceLock::new(),
            gateway: services.gateway.clone(),
        });
        Self {
            services,
            origin,
            bound,
        }
    }

    /// Session id this handler was admitted as, if any
    pub fn session_id(&self) -> Option<&str> {
        self.bound.session_id.get().map(String::as_str)
    }

    /// Reject work for a session that has been preempted
    ///
    /// A handler that was never admitted is allowed through: requests can
    /// race the `initialized` notification.
    fn ensure_current(&self) -> Result<(), McpError> {
        match self.bound.session_id.get() {
            Some(id) if !self.services.gateway.is_current(id) => {
                debug!(session_id = %id, "[MCP] Dropping traffic for superseded session");
                Err(superseded())
            }
            _ => Ok(()),
        }
    }

    fn transport_for(
        &self,
        session_id: &str,
        context: &NotificationContext<RoleServer>,
    ) -> Arc<dyn ClientTransport> {
        match &self.origin {
            ClientOrigin::Stream { sessions } => Arc::new(StreamClientTransport::new(
                session_id,
                context.peer.clone(),
                sessions.clone(),
            )),
            ClientOrigin::Socket { cancel, .. } => Arc::new(SocketClientTransport::new(
                context.peer.clone(),
                cancel.clone(),
            )),
        }
    }
}

impl ServerHandler for McplexGatewayHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .enable_resources()
                .enable_tool_list_changed()
                .enable_prompts_list_changed()
                .enable_resources_list_changed()
                .build(),
            server_info: Implementation {
                name: "mcplex-gateway".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Mcplex aggregates multiple MCP servers. Capabilities are named \
                 <server>__<name>."
                    .to_string(),
            ),
        }
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        let session_id = match &self.origin {
            ClientOrigin::Stream { .. } => match extract_session_id(&context.extensions) {
                Some(id) => id,
                None => {
                    warn!("[MCP] initialized without a session id; client not admitted");
                    return;
                }
            },
            ClientOrigin::Socket { session_id, .. } => session_id.clone(),
        };

        let transport = self.transport_for(&session_id, &context);
        let session = self.services.gateway.admit(session_id, transport).await;

        // Bound only once admitted, so requests racing admission still pass
        if self.bound.session_id.set(session.session_id.clone()).is_err() {
            debug!(session_id = %session.session_id, "[MCP] Session already admitted");
        }
        info!(
            session_id = %session.session_id,
            transport = %session.transport_kind,
            "[MCP] Client initialized"
        );
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        self.ensure_current()?;
        let catalog = self.services.router.catalog();
        let tools: Vec<Tool> = catalog.of_kind(CapabilityKind::Tool).map(to_tool).collect();

        debug!(count = tools.len(), "list_tools");
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.ensure_current()?;
        info!(tool = %params.name, "call_tool");

        let value = self
            .services
            .router
            .route(CapabilityKind::Tool, &params.name, params.arguments)
            .await
            .map_err(call_error_data)?;

        // The client may have been replaced while the backend was working
        self.ensure_current()?;
        decode_result(value)
    }

    async fn list_prompts(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        self.ensure_current()?;
        let catalog = self.services.router.catalog();
        let prompts: Vec<Prompt> = catalog
            .of_kind(CapabilityKind::Prompt)
            .map(to_prompt)
            .collect();

        debug!(count = prompts.len(), "list_prompts");
        Ok(ListPromptsResult::with_all_items(prompts))
    }

    async fn get_prompt(
        &self,
        params: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        self.ensure_current()?;
        debug!(prompt = %params.name, "get_prompt");

        let value = self
            .services
            .router
            .route(CapabilityKind::Prompt, &params.name, params.arguments)
            .await
            .map_err(call_error_data)?;

        self.ensure_current()?;
        decode_result(value)
    }

    async fn list_resources(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        self.ensure_current()?;
        let catalog = self.services.router.catalog();
        let resources: Vec<Resource> = catalog
            .of_kind(CapabilityKind::Resource)
            .map(to_resource)
            .collect();

        debug!(count = resources.len(), "list_resources");
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn read_resource(
        &self,
        params: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        self.ensure_current()?;
        debug!(uri = %params.uri, "read_resource");

        let value = self
            .services
            .router
            .read_resource(&params.uri)
            .await
            .map_err(call_error_data)?;

        self.ensure_current()?;
        decode_result(value)
    }

    /// Management verbs (`mcplex/add`, `mcplex/delete`, `mcplex/list`,
    /// `mcplex/status`) arrive as custom requests and get the control envelope
    async fn on_custom_request(
        &self,
        request: CustomRequest,
        _context: RequestContext<RoleServer>,
    ) -> Result<CustomResult, McpError> {
        let Some(verb) = ControlVerb::from_method(&request.method) else {
            return Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                request.method,
                None,
            ));
        };
        self.ensure_current()?;

        let control = ControlRequest {
            verb,
            data: request.params,
        };
        let response = self.services.control.handle(control).await;

        serde_json::to_value(response)
            .map(CustomResult::new)
            .map_err(|e| McpError::internal_error(format!("Failed to serialize response: {}", e), None))
    }
}
