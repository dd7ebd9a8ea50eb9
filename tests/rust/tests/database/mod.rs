//! Database integration tests
//!
//! SQLite repositories for the server registry and the capability cache,
//! exercised against real database files.

mod capability_cache;
