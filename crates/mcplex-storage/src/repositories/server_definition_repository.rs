//! SQLite implementation of ServerDefinitionRepository.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mcplex_core::{ServerDefinition, ServerDefinitionRepository};
use rusqlite::{params, OptionalExtension};
use tokio::sync::Mutex;

use crate::Database;

/// SQLite-backed implementation of ServerDefinitionRepository.
pub struct SqliteServerDefinitionRepository {
    db: Arc<Mutex<Database>>,
}

impl SqliteServerDefinitionRepository {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Parse a datetime string to DateTime<Utc>.
    fn parse_datetime(s: &str) -> DateTime<Utc> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return dt.with_timezone(&Utc);
        }
        // SQLite datetime('now') format
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return dt.and_utc();
        }
        Utc::now()
    }

    const SELECT_COLUMNS: &'static str = "unique_name, command, args, env, installed_at";

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<ServerDefinition> {
        let unique_name: String = row.get(0)?;
        let command: String = row.get(1)?;
        let args: String = row.get(2)?;
        let env: String = row.get(3)?;
        let installed_at: String = row.get(4)?;

        Ok(ServerDefinition {
            unique_name,
            command,
            args: serde_json::from_str::<Vec<String>>(&args).unwrap_or_default(),
            env: serde_json::from_str::<HashMap<String, String>>(&env).unwrap_or_default(),
            installed_at: Self::parse_datetime(&installed_at),
        })
    }
}

#[async_trait]
impl ServerDefinitionRepository for SqliteServerDefinitionRepository {
    async fn list(&self) -> Result<Vec<ServerDefinition>> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM server_definitions ORDER BY unique_name",
            Self::SELECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn get(&self, unique_name: &str) -> Result<Option<ServerDefinition>> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let definition = conn
            .query_row(
                &format!(
                    "SELECT {} FROM server_definitions WHERE unique_name = ?1",
                    Self::SELECT_COLUMNS
                ),
                params![unique_name],
                Self::map_row,
            )
            .optional()?;
        Ok(definition)
    }

    async fn insert(&self, definition: &ServerDefinition) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let changed = conn.execute(
            "INSERT OR IGNORE INTO server_definitions (unique_name, command, args, env, installed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                definition.unique_name,
                definition.command,
                serde_json::to_string(&definition.args)?,
                serde_json::to_string(&definition.env)?,
                definition.installed_at.to_rfc3339(),
            ],
        )?;
        Ok(changed == 1)
    }

    async fn delete(&self, unique_name: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let changed = conn.execute(
            "DELETE FROM server_definitions WHERE unique_name = ?1",
            params![unique_name],
        )?;
        Ok(changed > 0)
    }
}
