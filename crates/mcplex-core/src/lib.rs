//! # Mcplex Core Library
//!
//! Domain logic, entities, and business rules for Mcplex.
//!
//! ## Modules
//!
//! - `domain` - Core entities (ServerDefinition, capabilities, connection state, sessions)
//! - `error` - Error taxonomy shared by every layer
//! - `control` - Control-plane request/response envelopes
//! - `repository` - Data access traits
//! - `application` - Application services with event emission
//! - `event_bus` - Central event distribution system

pub mod application;
pub mod control;
pub mod domain;
pub mod error;
pub mod event_bus;
pub mod repository;

// Re-export commonly used types
pub use domain::*;
pub use error::{ErrorCode, MuxError, MuxResult};
pub use repository::*;

pub use application::RegistryAppService;
pub use control::{ControlRequest, ControlResponse, ControlVerb, StatusReport};
pub use event_bus::{EventBus, EventReceiver, EventSender};
