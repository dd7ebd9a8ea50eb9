//! Gateway Server
//!
//! Listeners in front of the services:
//! - HTTP: Streamable HTTP MCP at `/mcp`, `POST /control`, `GET /health`
//! - socket: newline-delimited JSON-RPC clients
//! - bridge: backend-side bridges attaching in bridge mode

mod bridge;
mod dependencies;
mod service_container;
mod socket;
mod startup;

pub use dependencies::{DependenciesBuilder, GatewayDependencies};
pub use service_container::ServiceContainer;
pub use startup::{RestoreResult, StartupOrchestrator};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use mcplex_core::{ControlRequest, ControlResponse, DomainEvent, EventBus};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::consumers::CatalogNotifier;
use crate::mcp::{ClientOrigin, McplexGatewayHandler};

pub const DEFAULT_HTTP_PORT: u16 = 7410;
pub const DEFAULT_SOCKET_PORT: u16 = 7411;
pub const DEFAULT_BRIDGE_PORT: u16 = 7412;

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind every listener to
    pub host: String,
    /// HTTP port; `0` picks an ephemeral port
    pub port: u16,
    /// Socket client port; `None` disables the socket transport
    pub socket_port: Option<u16>,
    /// Bridge port, used only in bridge mode; `None` means ephemeral
    pub bridge_port: Option<u16>,
    /// Enable CORS for browser access
    pub enable_cors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_HTTP_PORT,
            socket_port: Some(DEFAULT_SOCKET_PORT),
            bridge_port: Some(DEFAULT_BRIDGE_PORT),
            enable_cors: true,
        }
    }
}

impl GatewayConfig {
    /// Ephemeral ports everywhere; for tests
    pub fn ephemeral() -> Self {
        Self {
            port: 0,
            socket_port: Some(0),
            bridge_port: Some(0),
            ..Self::default()
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    async fn bind(&self, port: u16, what: &str) -> anyhow::Result<TcpListener> {
        TcpListener::bind((self.host.as_str(), port))
            .await
            .with_context(|| format!("Failed to bind {} listener on {}:{}", what, self.host, port))
    }
}

/// Running gateway: bound addresses plus the shutdown switch
pub struct GatewayHandle {
    pub http_addr: SocketAddr,
    pub socket_addr: Option<SocketAddr>,
    pub bridge_addr: Option<SocketAddr>,
    services: ServiceContainer,
    shutdown: CancellationToken,
}

impl GatewayHandle {
    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    pub fn mcp_url(&self) -> String {
        format!("http://{}/mcp", self.http_addr)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.http_addr)
    }

    /// Stop listeners and close every backend connection
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("[Gateway] Shutting down");
        self.shutdown.cancel();
        self.services.manager.shutdown();
        self.services.event_bus.sender().emit(DomainEvent::GatewayStopped);
    }
}

impl Drop for GatewayHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// MCP Gateway Server
pub struct GatewayServer {
    config: GatewayConfig,
    services: ServiceContainer,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, dependencies: GatewayDependencies) -> Self {
        info!(
            connector = dependencies.connector.kind(),
            "[Gateway] Initializing services"
        );
        let services = ServiceContainer::initialize(&dependencies, EventBus::new());
        Self { config, services }
    }

    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    fn build_router(&self, shutdown: CancellationToken) -> Router {
        let sessions = Arc::new(LocalSessionManager::default());

        let services = self.services.clone();
        let handler_sessions = sessions.clone();
        let mcp_service = StreamableHttpService::new(
            move || {
                debug!("[Gateway] Creating handler instance for MCP session");
                Ok(McplexGatewayHandler::new(
                    services.clone(),
                    ClientOrigin::Stream {
                        sessions: handler_sessions.clone(),
                    },
                ))
            },
            sessions,
            StreamableHttpServerConfig {
                stateful_mode: true,
                sse_keep_alive: Some(Duration::from_secs(30)),
                sse_retry: Some(Duration::from_secs(3)),
                cancellation_token: shutdown,
            },
        );

        let mut router = Router::new()
            .route("/health", get(health))
            .route("/control", post(control))
            .nest_service("/mcp", mcp_service)
            .with_state(self.services.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router
    }

    /// Bind every listener, start consumers and restore the registry
    ///
    /// Returns once listeners are bound; backends connect in the background.
    pub async fn start(self) -> anyhow::Result<GatewayHandle> {
        let shutdown = CancellationToken::new();

        let notifier = Arc::new(CatalogNotifier::new(self.services.gateway.clone()));
        notifier.start(self.services.event_bus.subscribe());

        let http = self.config.bind(self.config.port, "HTTP").await?;
        let http_addr = http.local_addr()?;
        let router = self.build_router(shutdown.child_token());
        let http_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = axum::serve(http, router)
                .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "[Gateway] HTTP server stopped with error");
            }
        });

        let socket_addr = match self.config.socket_port {
            Some(port) => {
                let listener = self.config.bind(port, "socket").await?;
                let addr = listener.local_addr()?;
                tokio::spawn(socket::serve_socket_clients(
                    listener,
                    self.services.clone(),
                    shutdown.child_token(),
                ));
                Some(addr)
            }
            None => None,
        };

        let bridge_addr = match &self.services.bridge_registry {
            Some(registry) => {
                let listener = self
                    .config
                    .bind(self.config.bridge_port.unwrap_or(0), "bridge")
                    .await?;
                let addr = listener.local_addr()?;
                tokio::spawn(bridge::serve_bridges(
                    listener,
                    registry.clone(),
                    shutdown.child_token(),
                ));
                Some(addr)
            }
            None => None,
        };

        info!(
            http = %http_addr,
            socket = ?socket_addr,
            bridge = ?bridge_addr,
            cors = self.config.enable_cors,
            "[Gateway] Listening"
        );
        self.services.event_bus.sender().emit(DomainEvent::GatewayStarted {
            url: format!("http://{}", http_addr),
            port: http_addr.port(),
        });

        let startup = self.services.startup.clone();
        tokio::spawn(async move {
            if let Err(e) = startup.restore().await {
                warn!(error = %e, "[Gateway] Registry restore failed");
            }
        });

        Ok(GatewayHandle {
            http_addr,
            socket_addr,
            bridge_addr,
            services: self.services,
            shutdown,
        })
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> anyhow::Result<()> {
        let handle = self.start().await?;
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        handle.shutdown();
        Ok(())
    }
}

// ========================================
// HTTP handlers
// ========================================

async fn health(State(services): State<ServiceContainer>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "ready": services.manager.ready_count(),
        "session": services.gateway.current_session().is_some(),
    }))
}

async fn control(
    State(services): State<ServiceContainer>,
    Json(request): Json<ControlRequest>,
) -> Json<ControlResponse> {
    Json(services.control.handle(request).await)
}
