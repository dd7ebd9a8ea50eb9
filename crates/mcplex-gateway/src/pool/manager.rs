//! ConnectionManager - owns one lifecycle task per backend definition
//!
//! State machine per connection:
//! `Idle → Connecting → Handshaking → Ready`, any state → `Degraded` on I/O
//! failure, one reconnect after a bounded backoff, then `Closed`.
//!
//! Each connection runs as its own task and is only reachable through its
//! command queue. Callers never touch the rmcp client directly; they go
//! through [`ConnectionManager::forward`], which preserves per-connection
//! FIFO order because the task serves one call at a time.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mcplex_core::{
    CapabilityCacheRepository, CapabilitySnapshot, ConnectionSnapshot, ConnectionState,
    DomainEvent, EventSender, MuxError, MuxResult, ServerDefinition,
};
use parking_lot::Mutex;
use rmcp::ServiceExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::discovery::discover;
use super::instance::{
    drain_pending, BackendClient, BackendClientHandler, BackendConnection, ConnectionCommand,
};
use super::request::{BackendRequest, CallError, CallResult};
use super::transport::{BackendChannel, BackendConnector};
use crate::config::ConnectionConfig;
use crate::router::{Catalog, CatalogAggregate};

/// Why a connection stopped serving
enum Interrupted {
    /// Deleted or shut down; no further state changes
    Cancelled,
    /// I/O or handshake failure; eligible for the reconnect path
    Failed(String),
}

/// Backend Connection Manager
pub struct ConnectionManager {
    connections: DashMap<String, Arc<BackendConnection>>,
    connector: Arc<dyn BackendConnector>,
    aggregate: Arc<CatalogAggregate>,
    cache_repo: Option<Arc<dyn CapabilityCacheRepository>>,
    /// Snapshots restored from the cache, reported until a backend is Ready
    cached: DashMap<String, CapabilitySnapshot>,
    /// Held across collecting sources and publishing the merged catalog
    rebuild_lock: Mutex<()>,
    config: ConnectionConfig,
    event_tx: EventSender,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn BackendConnector>,
        config: ConnectionConfig,
        event_tx: EventSender,
    ) -> Self {
        Self {
            connections: DashMap::new(),
            connector,
            aggregate: Arc::new(CatalogAggregate::new(event_tx.clone())),
            cache_repo: None,
            cached: DashMap::new(),
            rebuild_lock: Mutex::new(()),
            config,
            event_tx,
        }
    }

    pub fn with_cache_repository(mut self, repo: Arc<dyn CapabilityCacheRepository>) -> Self {
        self.cache_repo = Some(repo);
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn connector_kind(&self) -> &'static str {
        self.connector.kind()
    }

    // ========================================
    // Lifecycle
    // ========================================

    /// Start connecting a definition; returns its connection id
    ///
    /// Idempotent while a live record launches the same definition. A
    /// `Closed` record, or one built from a different definition, is
    /// replaced by a fresh connection.
    pub fn connect(self: &Arc<Self>, definition: ServerDefinition) -> Uuid {
        let unique_name = definition.unique_name.clone();
        let (connection, rx) = BackendConnection::new(definition, self.config.queue_depth);
        let connection = Arc::new(connection);

        let replaced = match self.connections.entry(unique_name.clone()) {
            Entry::Occupied(existing)
                if !existing.get().state().is_terminal()
                    && existing.get().definition.same_launch(&connection.definition) =>
            {
                debug!(
                    unique_name = %unique_name,
                    connection_id = %existing.get().connection_id,
                    "[ConnectionManager] Already connecting or connected"
                );
                return existing.get().connection_id;
            }
            Entry::Occupied(mut stale) => {
                stale.get().cancel_token().cancel();
                Some(stale.insert(connection.clone()))
            }
            Entry::Vacant(slot) => {
                slot.insert(connection.clone());
                None
            }
        };

        // Outside the entry lock: set_state rebuilds the catalog
        if let Some(stale) = replaced {
            if !stale.state().is_terminal() {
                self.set_state(&stale, ConnectionState::Closed, Some("replaced".into()));
            }
        }

        info!(
            unique_name = %unique_name,
            connection_id = %connection.connection_id,
            connector = self.connector.kind(),
            "[ConnectionManager] Dispatching connection"
        );

        let manager = Arc::clone(self);
        let id = connection.connection_id;
        tokio::spawn(async move { manager.run(connection, rx).await });
        id
    }

    /// Tear down a connection; in-flight calls resolve with `BackendUnavailable`
    pub fn disconnect(&self, connection_id: Uuid) -> MuxResult<()> {
        let unique_name = self
            .connections
            .iter()
            .find(|c| c.connection_id == connection_id)
            .map(|c| c.key().clone())
            .ok_or_else(|| MuxError::NotFound(format!("connection {}", connection_id)))?;

        let (_, connection) = self
            .connections
            .remove_if(&unique_name, |_, c| c.connection_id == connection_id)
            .ok_or_else(|| MuxError::NotFound(format!("connection {}", connection_id)))?;

        connection.cancel_token().cancel();
        self.cached.remove(&unique_name);
        self.set_state(&connection, ConnectionState::Closed, Some("disconnected".into()));

        info!(
            unique_name = %unique_name,
            connection_id = %connection_id,
            "[ConnectionManager] Disconnected"
        );
        Ok(())
    }

    /// Tear down whatever connection exists for a definition name
    pub fn disconnect_by_name(&self, unique_name: &str) -> MuxResult<()> {
        let connection_id = self
            .connections
            .get(unique_name)
            .map(|c| c.connection_id)
            .ok_or_else(|| MuxError::NotFound(unique_name.to_string()))?;
        self.disconnect(connection_id)
    }

    /// Cancel every connection task
    pub fn shutdown(&self) {
        let ids: Vec<Uuid> = self.connections.iter().map(|c| c.connection_id).collect();
        info!(count = ids.len(), "[ConnectionManager] Shutting down connections");
        for id in ids {
            let _ = self.disconnect(id);
        }
    }

    // ========================================
    // Calls
    // ========================================

    /// Forward a request to a Ready connection and wait for its reply
    pub async fn forward(&self, connection_id: Uuid, request: BackendRequest) -> CallResult {
        let connection = self
            .by_id(connection_id)
            .ok_or_else(|| MuxError::BackendUnavailable(format!("connection {}", connection_id)))?;
        let unique_name = connection.unique_name().to_string();

        if !connection.is_ready() {
            return Err(MuxError::BackendUnavailable(unique_name).into());
        }

        debug!(
            unique_name = %unique_name,
            kind = %request.kind(),
            target = request.target(),
            "[ConnectionManager] Forwarding"
        );

        let (reply, rx) = oneshot::channel();
        let exchange = async {
            connection
                .commands()
                .send(ConnectionCommand::Call { request, reply })
                .await
                .map_err(|_| CallError::from(MuxError::BackendUnavailable(unique_name.clone())))?;
            rx.await
                .map_err(|_| CallError::from(MuxError::BackendUnavailable(unique_name.clone())))?
        };

        match timeout(self.config.call_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(unique_name = connection.unique_name(), "[ConnectionManager] Call timed out");
                Err(MuxError::CallTimeout(connection.unique_name().to_string()).into())
            }
        }
    }

    // ========================================
    // Reads
    // ========================================

    pub fn get(&self, unique_name: &str) -> Option<Arc<BackendConnection>> {
        self.connections.get(unique_name).map(|c| c.clone())
    }

    pub fn by_id(&self, connection_id: Uuid) -> Option<Arc<BackendConnection>> {
        self.connections
            .iter()
            .find(|c| c.connection_id == connection_id)
            .map(|c| c.clone())
    }

    /// Every registered owner name, whatever its state
    pub fn owner_names(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.key().clone()).collect()
    }

    /// Connection views ordered by name
    pub fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        let mut snapshots: Vec<ConnectionSnapshot> = self
            .connections
            .iter()
            .map(|c| c.snapshot(self.cached.get(c.key()).map(|s| s.clone())))
            .collect();
        snapshots.sort_by(|a, b| a.unique_name.cmp(&b.unique_name));
        snapshots
    }

    pub fn ready_count(&self) -> usize {
        self.connections.iter().filter(|c| c.is_ready()).count()
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.aggregate.current()
    }

    pub fn aggregate(&self) -> Arc<CatalogAggregate> {
        self.aggregate.clone()
    }

    // ========================================
    // Capability cache
    // ========================================

    /// Restore cached snapshots for `status` reporting
    pub async fn load_cache(&self) -> usize {
        let Some(repo) = &self.cache_repo else {
            return 0;
        };
        match repo.load_all().await {
            Ok(all) => {
                let count = all.len();
                for (unique_name, snapshot) in all {
                    self.cached.insert(unique_name, snapshot);
                }
                info!(count = count, "[ConnectionManager] Restored capability cache");
                count
            }
            Err(e) => {
                warn!(error = %e, "[ConnectionManager] Failed to load capability cache");
                0
            }
        }
    }

    async fn persist(&self, unique_name: &str, snapshot: &CapabilitySnapshot) {
        self.cached.insert(unique_name.to_string(), snapshot.clone());
        if let Some(repo) = &self.cache_repo {
            if let Err(e) = repo.save(unique_name, snapshot).await {
                warn!(
                    unique_name = unique_name,
                    error = %e,
                    "[ConnectionManager] Failed to persist capabilities"
                );
            }
        }
    }

    /// Merge all Ready connections into the aggregate
    pub fn rebuild_catalog(&self) -> bool {
        // An older collection must never publish over a newer one
        let _guard = self.rebuild_lock.lock();
        let mut sources: Vec<(String, CapabilitySnapshot)> = self
            .connections
            .iter()
            .filter(|c| c.is_ready())
            .map(|c| (c.key().clone(), c.capabilities()))
            .collect();
        sources.sort_by(|a, b| a.0.cmp(&b.0));
        self.aggregate.rebuild(&sources)
    }

    fn set_state(&self, connection: &BackendConnection, state: ConnectionState, error: Option<String>) {
        // A cancelled connection only ever reports Closed
        if connection.is_cancelled() && state != ConnectionState::Closed {
            return;
        }

        let previous = connection.transition(state, error.clone());
        if previous == state && error.is_none() {
            return;
        }

        info!(
            unique_name = %connection.unique_name(),
            connection_id = %connection.connection_id,
            from = %previous,
            to = %state,
            "[ConnectionManager] State changed"
        );

        self.event_tx.emit(DomainEvent::ConnectionStateChanged {
            unique_name: connection.unique_name().to_string(),
            connection_id: connection.connection_id,
            state,
            message: error,
        });

        self.rebuild_catalog();
    }

    // ========================================
    // Connection task
    // ========================================

    async fn run(
        self: Arc<Self>,
        connection: Arc<BackendConnection>,
        mut rx: mpsc::Receiver<ConnectionCommand>,
    ) {
        let unique_name = connection.unique_name().to_string();
        let mut reconnect_available = true;

        loop {
            let interrupted = match self.establish(&connection).await {
                Ok(client) => {
                    reconnect_available = true;
                    self.serve(&connection, client, &mut rx).await
                }
                Err(interrupted) => interrupted,
            };

            let reason = match interrupted {
                Interrupted::Cancelled => break,
                Interrupted::Failed(reason) => reason,
            };

            warn!(
                unique_name = %unique_name,
                error = %reason,
                "[ConnectionManager] Connection degraded"
            );
            self.set_state(&connection, ConnectionState::Degraded, Some(reason.clone()));
            drain_pending(&unique_name, &mut rx);

            if !reconnect_available {
                self.set_state(&connection, ConnectionState::Closed, Some(reason));
                break;
            }
            reconnect_available = false;

            let backoff = self.config.effective_backoff();
            debug!(
                unique_name = %unique_name,
                backoff_ms = backoff.as_millis() as u64,
                "[ConnectionManager] Reconnecting after backoff"
            );
            tokio::select! {
                _ = connection.cancel_token().cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        drain_pending(&unique_name, &mut rx);
        debug!(unique_name = %unique_name, "[ConnectionManager] Connection task finished");
    }

    /// Attach, initialize and discover; on success the connection is Ready
    async fn establish(&self, connection: &BackendConnection) -> Result<BackendClient, Interrupted> {
        let unique_name = connection.unique_name().to_string();
        self.set_state(connection, ConnectionState::Connecting, None);

        let handshake = async {
            let channel = self
                .connector
                .attach(&connection.definition)
                .await
                .map_err(|e| format!("attach failed: {}", e))?;

            self.set_state(connection, ConnectionState::Handshaking, None);
            debug!(
                unique_name = %unique_name,
                channel = channel.kind(),
                "[ConnectionManager] Initializing"
            );

            let handler = BackendClientHandler::new(
                &unique_name,
                connection.commands().clone(),
                self.event_tx.clone(),
            );
            let client = match channel {
                BackendChannel::Child(child) => handler.serve(child).await,
                BackendChannel::Stream { reader, writer } => handler.serve((reader, writer)).await,
            }
            .map_err(|e| format!("initialize failed: {}", e))?;

            let capabilities = discover(&unique_name, client.peer()).await;
            Ok::<_, String>((client, capabilities))
        };

        let outcome = tokio::select! {
            _ = connection.cancel_token().cancelled() => return Err(Interrupted::Cancelled),
            outcome = timeout(self.config.handshake_timeout, handshake) => outcome,
        };

        let (client, capabilities) = match outcome {
            Ok(Ok(established)) => established,
            Ok(Err(reason)) => return Err(Interrupted::Failed(reason)),
            Err(_) => {
                return Err(Interrupted::Failed(
                    MuxError::HandshakeTimeout(unique_name).to_string(),
                ))
            }
        };

        connection.set_capabilities(capabilities.clone());
        self.persist(&unique_name, &capabilities).await;
        self.set_state(connection, ConnectionState::Ready, None);

        if connection.is_cancelled() {
            let _ = client.cancel().await;
            return Err(Interrupted::Cancelled);
        }
        Ok(client)
    }

    /// Serve queued commands until cancellation or transport loss
    async fn serve(
        &self,
        connection: &BackendConnection,
        client: BackendClient,
        rx: &mut mpsc::Receiver<ConnectionCommand>,
    ) -> Interrupted {
        let unique_name = connection.unique_name().to_string();
        let mut health = tokio::time::interval(self.config.health_interval);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let interrupted = loop {
            tokio::select! {
                _ = connection.cancel_token().cancelled() => break Interrupted::Cancelled,
                _ = health.tick() => {
                    if client.peer().is_transport_closed() {
                        break Interrupted::Failed(format!("transport to '{}' closed", unique_name));
                    }
                }
                command = rx.recv() => match command {
                    None => break Interrupted::Cancelled,
                    Some(ConnectionCommand::Call { request, reply }) => {
                        if let Some(interrupted) = self.call(connection, &client, request, reply).await {
                            break interrupted;
                        }
                    }
                    Some(ConnectionCommand::Rediscover) => {
                        let rediscovered = tokio::select! {
                            _ = connection.cancel_token().cancelled() => break Interrupted::Cancelled,
                            listed = timeout(self.config.handshake_timeout, discover(&unique_name, client.peer())) => listed,
                        };
                        let Ok(capabilities) = rediscovered else {
                            break Interrupted::Failed(format!("rediscovery of '{}' timed out", unique_name));
                        };
                        connection.set_capabilities(capabilities.clone());
                        self.persist(&unique_name, &capabilities).await;
                        self.rebuild_catalog();
                    }
                },
            }
        };

        if let Err(e) = client.cancel().await {
            debug!(unique_name = %unique_name, error = %e, "[ConnectionManager] Client task join failed");
        }
        interrupted
    }

    /// Run one call; returns `Some` when the connection must stop serving
    async fn call(
        &self,
        connection: &BackendConnection,
        client: &BackendClient,
        request: BackendRequest,
        reply: oneshot::Sender<CallResult>,
    ) -> Option<Interrupted> {
        let unique_name = connection.unique_name();

        let result = tokio::select! {
            _ = connection.cancel_token().cancelled() => {
                let _ = reply.send(Err(MuxError::BackendUnavailable(unique_name.to_string()).into()));
                return Some(Interrupted::Cancelled);
            }
            result = timeout(self.config.call_timeout, request.execute(unique_name, client.peer())) => {
                result.unwrap_or_else(|_| Err(MuxError::CallTimeout(unique_name.to_string()).into()))
            }
        };

        let transport_lost = matches!(result, Err(CallError::Mux(MuxError::BackendUnavailable(_))))
            && client.peer().is_transport_closed();

        if result.is_ok() {
            connection.record_call();
        }
        if reply.send(result).is_err() {
            debug!(unique_name = unique_name, "[ConnectionManager] Caller went away before reply");
        }

        transport_lost.then(|| Interrupted::Failed(format!("transport to '{}' closed", unique_name)))
    }
}
