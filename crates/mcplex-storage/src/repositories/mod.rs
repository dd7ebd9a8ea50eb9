//! Repository implementations using SQLite.

mod capability_cache_repository;
mod server_definition_repository;

pub use capability_cache_repository::SqliteCapabilityCacheRepository;
pub use server_definition_repository::SqliteServerDefinitionRepository;
