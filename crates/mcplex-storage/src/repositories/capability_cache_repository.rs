//! SQLite implementation of CapabilityCacheRepository.
//!
//! One row per cached descriptor; the descriptor itself is stored as JSON so
//! that backend fields we do not model survive a restart.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use mcplex_core::{
    CapabilityCacheRepository, CapabilityDescriptor, CapabilityKind, CapabilitySnapshot,
};
use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use tracing::warn;

use crate::Database;

pub struct SqliteCapabilityCacheRepository {
    db: Arc<Mutex<Database>>,
}

impl SqliteCapabilityCacheRepository {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Rows as (owner, kind, descriptor json), ordered for stable rebuilds
    fn query_rows(
        conn: &Connection,
        owner: Option<&str>,
    ) -> Result<Vec<(String, String, String)>> {
        let sql = "SELECT unique_name, kind, descriptor FROM capability_cache
                   WHERE (?1 IS NULL OR unique_name = ?1)
                   ORDER BY unique_name, kind, position";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![owner], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn fold_rows(rows: Vec<(String, String, String)>) -> Vec<(String, CapabilitySnapshot)> {
        let mut out: Vec<(String, CapabilitySnapshot)> = Vec::new();
        for (owner, kind, json) in rows {
            let Some(kind) = CapabilityKind::parse(&kind) else {
                continue;
            };
            let descriptor: CapabilityDescriptor = match serde_json::from_str(&json) {
                Ok(d) => d,
                Err(e) => {
                    warn!(owner = %owner, error = %e, "[CapabilityCache] Skipping unreadable row");
                    continue;
                }
            };
            if out.last().map(|(o, _)| o != &owner).unwrap_or(true) {
                out.push((owner, CapabilitySnapshot::default()));
            }
            if let Some((_, snapshot)) = out.last_mut() {
                snapshot.of_kind_mut(kind).push(descriptor);
            }
        }
        out
    }
}

#[async_trait]
impl CapabilityCacheRepository for SqliteCapabilityCacheRepository {
    async fn save(&self, unique_name: &str, snapshot: &CapabilitySnapshot) -> Result<()> {
        let db = self.db.lock().await;
        let cached_at = Utc::now().to_rfc3339();

        db.transaction(|conn| {
            conn.execute(
                "DELETE FROM capability_cache WHERE unique_name = ?1",
                params![unique_name],
            )?;
            let mut stmt = conn.prepare(
                "INSERT INTO capability_cache (unique_name, kind, position, local_name, descriptor, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for kind in CapabilityKind::ALL {
                for (position, descriptor) in snapshot.of_kind(kind).iter().enumerate() {
                    stmt.execute(params![
                        unique_name,
                        kind.as_str(),
                        position as i64,
                        descriptor.name,
                        serde_json::to_string(descriptor)?,
                        cached_at,
                    ])?;
                }
            }
            Ok(())
        })
    }

    async fn load(&self, unique_name: &str) -> Result<Option<CapabilitySnapshot>> {
        let db = self.db.lock().await;
        let rows = Self::query_rows(db.connection(), Some(unique_name))?;
        Ok(Self::fold_rows(rows).into_iter().next().map(|(_, s)| s))
    }

    async fn load_all(&self) -> Result<Vec<(String, CapabilitySnapshot)>> {
        let db = self.db.lock().await;
        let rows = Self::query_rows(db.connection(), None)?;
        Ok(Self::fold_rows(rows))
    }

    async fn delete(&self, unique_name: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute(
            "DELETE FROM capability_cache WHERE unique_name = ?1",
            params![unique_name],
        )?;
        Ok(())
    }
}
