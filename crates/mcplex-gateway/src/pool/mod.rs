//! Backend pool - one managed connection per registered server
//!
//! - **transport**: reaches a backend process (child process or bridge)
//! - **instance**: connection record and the rmcp client handler
//! - **discovery**: capability catalog fetch after initialize
//! - **request**: calls forwarded to a backend and their failures
//! - **manager**: lifecycle tasks, forwarding and the capability cache

mod discovery;
mod instance;
mod manager;
mod request;
pub mod transport;

pub use discovery::{discover, prompt_descriptor, resource_descriptor, tool_descriptor};
pub use instance::{
    BackendClient, BackendClientHandler, BackendConnection, ConnectionCommand, ConnectionStats,
};
pub use manager::ConnectionManager;
pub use request::{BackendRequest, CallError, CallResult};
pub use transport::{
    BackendChannel, BackendConnector, BridgeConnector, BridgeRegistry, ChildProcessConnector,
};
