//! MCP server surface
//!
//! - `handler`: ServerHandler over the merged catalog
//! - `context`: request metadata helpers
//! - `convert`: catalog entries and errors to MCP model types

pub mod context;
pub mod convert;
pub mod handler;

pub use handler::{ClientOrigin, McplexGatewayHandler};
