//! Mcplex Storage Layer
//!
//! SQLite persistence for the server registry and the per-backend
//! capability cache.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Registry / ConnectionManager                │
//! ├──────────────────────────────────────────────────────┤
//! │               Repository Traits                      │
//! │ (ServerDefinitionRepository, CapabilityCacheRepo)    │
//! ├──────────────────────────────────────────────────────┤
//! │            SQLite Implementations                    │
//! ├──────────────────────────────────────────────────────┤
//! │                   Database                           │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use mcplex_storage::{Database, SqliteServerDefinitionRepository};
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//!
//! let db = Arc::new(Mutex::new(Database::open(&path)?));
//! let definitions = SqliteServerDefinitionRepository::new(db.clone());
//! ```

mod database;
mod repositories;

pub use database::Database;
pub use repositories::*;

/// Default database file name.
pub const DATABASE_FILE: &str = "mcplex.db";

/// Get the default database path for the current platform.
pub fn default_database_path() -> Option<std::path::PathBuf> {
    dirs::data_local_dir().map(|p| p.join("mcplex").join(DATABASE_FILE))
}
