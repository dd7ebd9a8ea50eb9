//! Domain entities, value objects, and events
//!
//! This module contains all domain-level types for Mcplex:
//! - Entities (ServerDefinition, ClientSession)
//! - Value Objects (ConnectionState, CapabilityKind, PublicName, etc.)
//! - Domain Events (DomainEvent enum for event-driven architecture)

mod capability;
mod connection;
mod event;
mod server_definition;
mod session;

pub use capability::*;
pub use connection::*;
pub use event::DomainEvent;
pub use server_definition::{is_valid_unique_name, ServerDefinition};
pub use session::*;
