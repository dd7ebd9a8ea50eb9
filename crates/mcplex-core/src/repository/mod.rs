//! Repository traits for data access
//!
//! These traits define the interface for data storage without specifying
//! the implementation (SQLite, in-memory, etc.)

use async_trait::async_trait;

use crate::domain::{CapabilitySnapshot, ServerDefinition};

/// Result type for repository operations
pub type RepoResult<T> = anyhow::Result<T>;

/// Durable registry of server definitions keyed by unique name
///
/// CRUD only. Each call is atomic for one definition.
#[async_trait]
pub trait ServerDefinitionRepository: Send + Sync {
    /// All definitions ordered by unique name
    async fn list(&self) -> RepoResult<Vec<ServerDefinition>>;

    async fn get(&self, unique_name: &str) -> RepoResult<Option<ServerDefinition>>;

    /// Insert unless the name exists. Returns `false` if it already did.
    async fn insert(&self, definition: &ServerDefinition) -> RepoResult<bool>;

    /// Remove by name. Returns `false` if nothing was removed.
    async fn delete(&self, unique_name: &str) -> RepoResult<bool>;
}

/// Last negotiated capabilities per backend, kept across restarts
#[async_trait]
pub trait CapabilityCacheRepository: Send + Sync {
    /// Replace the cached snapshot for a backend
    async fn save(&self, unique_name: &str, snapshot: &CapabilitySnapshot) -> RepoResult<()>;

    async fn load(&self, unique_name: &str) -> RepoResult<Option<CapabilitySnapshot>>;

    /// Every cached snapshot, keyed by backend name
    async fn load_all(&self) -> RepoResult<Vec<(String, CapabilitySnapshot)>>;

    async fn delete(&self, unique_name: &str) -> RepoResult<()>;
}
