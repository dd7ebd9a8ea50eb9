//! Bridge connector
//!
//! In bridge mode the gateway never launches anything itself. A backend-side
//! bridge process dials the bridge endpoint, announces which definition it
//! serves, receives the launch line and from then on carries JSON-RPC. The
//! connector parks a pending slot per unique name and waits for the bridge
//! listener to hand the attached stream over.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use dashmap::DashMap;
use mcplex_core::ServerDefinition;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{BackendChannel, BackendConnector, BoxedReader, BoxedWriter};

/// First line sent by a bridge after connecting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeHello {
    #[serde(rename = "uniqueName")]
    pub unique_name: String,
}

/// Single line the gateway answers a hello with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeReply {
    Launch {
        #[serde(rename = "uniqueName")]
        unique_name: String,
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Error {
        error: String,
    },
}

impl BridgeReply {
    pub fn launch(definition: &ServerDefinition) -> Self {
        Self::Launch {
            unique_name: definition.unique_name.clone(),
            command: definition.command.clone(),
            args: definition.args.clone(),
            env: definition.env.clone(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Serialized form including the trailing newline
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","error":"unserializable reply"}"#.to_string()
        });
        line.push('\n');
        line
    }
}

struct PendingAttach {
    definition: ServerDefinition,
    tx: oneshot::Sender<(BoxedReader, BoxedWriter)>,
}

/// Definitions currently waiting for their bridge
#[derive(Default)]
pub struct BridgeRegistry {
    pending: DashMap<String, PendingAttach>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a slot for `definition`, replacing any stale one
    fn register(
        &self,
        definition: &ServerDefinition,
    ) -> oneshot::Receiver<(BoxedReader, BoxedWriter)> {
        let (tx, rx) = oneshot::channel();
        let previous = self.pending.insert(
            definition.unique_name.clone(),
            PendingAttach {
                definition: definition.clone(),
                tx,
            },
        );
        if previous.is_some() {
            debug!(
                unique_name = %definition.unique_name,
                "[BridgeRegistry] Replaced stale pending attach"
            );
        }
        rx
    }

    /// Whether a connection is waiting for `unique_name`
    pub fn is_waiting(&self, unique_name: &str) -> bool {
        self.pending
            .get(unique_name)
            .map(|p| !p.tx.is_closed())
            .unwrap_or(false)
    }

    /// Answer a bridge's hello and hand its stream to the waiting connection
    ///
    /// Writes the launch line (or an error line when nobody is waiting for
    /// that name) before the stream changes hands, so JSON-RPC never
    /// interleaves with it. Returns whether the stream was handed over.
    pub async fn complete(
        &self,
        unique_name: &str,
        reader: BoxedReader,
        mut writer: BoxedWriter,
    ) -> std::io::Result<bool> {
        let Some((_, pending)) = self
            .pending
            .remove_if(unique_name, |_, pending| !pending.tx.is_closed())
        else {
            // A slot whose connection gave up counts as nobody waiting
            self.discard_abandoned(unique_name);
            warn!(unique_name = unique_name, "[BridgeRegistry] No connection waiting");
            let reply =
                BridgeReply::error(format!("no connection is waiting for '{}'", unique_name));
            writer.write_all(reply.to_line().as_bytes()).await?;
            writer.flush().await?;
            return Ok(false);
        };

        let reply = BridgeReply::launch(&pending.definition);
        writer.write_all(reply.to_line().as_bytes()).await?;
        writer.flush().await?;

        if pending.tx.send((reader, writer)).is_err() {
            warn!(
                unique_name = unique_name,
                "[BridgeRegistry] Connection gave up before the bridge attached"
            );
            return Ok(false);
        }

        info!(unique_name = unique_name, "[BridgeRegistry] Bridge attached");
        Ok(true)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop the slot for `unique_name` if its connection stopped waiting
    fn discard_abandoned(&self, unique_name: &str) {
        if self
            .pending
            .remove_if(unique_name, |_, pending| pending.tx.is_closed())
            .is_some()
        {
            debug!(unique_name = unique_name, "[BridgeRegistry] Discarded abandoned attach");
        }
    }
}

/// A parked slot; dropping it before the bridge arrives clears the slot
struct ParkedAttach<'a> {
    registry: &'a BridgeRegistry,
    unique_name: &'a str,
    rx: oneshot::Receiver<(BoxedReader, BoxedWriter)>,
}

impl Drop for ParkedAttach<'_> {
    fn drop(&mut self) {
        // Closing first makes the slot's sender report closed, so a newer
        // slot parked under the same name is left alone.
        self.rx.close();
        self.registry.discard_abandoned(self.unique_name);
    }
}

/// Waits for backends to attach through the bridge endpoint
#[derive(Clone)]
pub struct BridgeConnector {
    registry: Arc<BridgeRegistry>,
}

impl BridgeConnector {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> Arc<BridgeRegistry> {
        self.registry.clone()
    }
}

#[async_trait]
impl BackendConnector for BridgeConnector {
    async fn attach(&self, definition: &ServerDefinition) -> anyhow::Result<BackendChannel> {
        info!(
            unique_name = %definition.unique_name,
            "[BridgeConnector] Waiting for bridge to attach"
        );

        // Bounded by the caller's handshake timeout
        let mut parked = ParkedAttach {
            registry: &self.registry,
            unique_name: &definition.unique_name,
            rx: self.registry.register(definition),
        };
        let (reader, writer) = (&mut parked.rx)
            .await
            .map_err(|_| anyhow!("bridge slot for '{}' was replaced", definition.unique_name))?;

        Ok(BackendChannel::Stream { reader, writer })
    }

    fn kind(&self) -> &'static str {
        "bridge"
    }
}
