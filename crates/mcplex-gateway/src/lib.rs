//! Mcplex Gateway
//!
//! MCP multiplexer that presents many backend servers as one:
//! - Backend connection lifecycle with a single bounded reconnect
//! - Namespaced routing (`<server>__<capability>`) over the merged catalog
//! - Exactly one active client, newest connection wins
//! - Control plane (`add`, `delete`, `list`, `status`) over HTTP and MCP
//! - Event-driven list_changed delivery via DomainEvent consumers

pub mod config;
pub mod consumers;
pub mod control;
pub mod mcp;
pub mod pool;
pub mod router;
pub mod server;
pub mod session;

pub use config::{BackendMode, ConnectionConfig};
pub use control::ControlPlane;
pub use router::{Catalog, CapabilityRouter};
pub use server::{
    DependenciesBuilder, GatewayConfig, GatewayDependencies, GatewayHandle, GatewayServer,
    RestoreResult, ServiceContainer, StartupOrchestrator,
};
pub use session::ClientGateway;

pub use pool::{
    BackendChannel, BackendConnector, BackendRequest, BridgeConnector, BridgeRegistry, CallError,
    CallResult, ChildProcessConnector, ConnectionManager,
};

pub use mcp::{ClientOrigin, McplexGatewayHandler};

pub use consumers::CatalogNotifier;
