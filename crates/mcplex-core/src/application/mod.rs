//! Application Services - Orchestration layer with event emission
//!
//! Application services sit between the presentation layer (control plane,
//! MCP handlers) and the domain layer (repositories). They:
//!
//! 1. **Validate** inputs and enforce business rules
//! 2. **Orchestrate** repository calls
//! 3. **Emit events** after successful operations via the event bus
//!
//! # Usage
//!
//! ```ignore
//! let event_bus = EventBus::new();
//! let registry = RegistryAppService::new(repo, event_bus.sender());
//!
//! let def = registry.add(ServerDefinition::new("echo", "echo-server")).await?;
//! // -> Emits ServerAdded event
//! ```

mod registry;

pub use registry::RegistryAppService;
