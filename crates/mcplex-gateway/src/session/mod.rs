//! Client Gateway - exactly one active client at a time
//!
//! Admission is preemptive: the newest client always wins. The previous one
//! gets a disconnect notice and its transport is closed before the newcomer
//! becomes active. Admissions are serialized through a single async lock, so
//! two sessions are never live at once.

mod transport;

use std::sync::Arc;

use mcplex_core::{ClientSession, DomainEvent, EventSender, TransportKind};
use parking_lot::RwLock;
use rmcp::model::ServerNotification;
use rmcp::service::ServiceError;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use transport::{
    ClientTransport, SocketClientTransport, StreamClientTransport, SESSION_REPLACED_METHOD,
};

struct ActiveClient {
    session: ClientSession,
    transport: Arc<dyn ClientTransport>,
}

pub struct ClientGateway {
    active: RwLock<Option<ActiveClient>>,
    admission: Mutex<()>,
    event_tx: EventSender,
}

impl ClientGateway {
    pub fn new(event_tx: EventSender) -> Self {
        Self {
            active: RwLock::new(None),
            admission: Mutex::new(()),
            event_tx,
        }
    }

    /// Make `session_id` the active client, preempting any previous one
    pub async fn admit(
        &self,
        session_id: impl Into<String>,
        transport: Arc<dyn ClientTransport>,
    ) -> ClientSession {
        let _admission = self.admission.lock().await;
        let session = ClientSession::new(session_id, transport.kind());

        let previous = {
            let mut active = self.active.write();
            // Same session re-announcing itself keeps its slot
            if let Some(current) = active
                .as_mut()
                .filter(|c| c.session.session_id == session.session_id)
            {
                current.transport = transport;
                debug!(session_id = %session.session_id, "[ClientGateway] Session re-admitted");
                return current.session.clone();
            }
            active.take()
        };

        if let Some(previous) = previous {
            info!(
                previous_session_id = %previous.session.session_id,
                previous_transport = %previous.session.transport_kind,
                session_id = %session.session_id,
                transport = %session.transport_kind,
                "[ClientGateway] client replaced"
            );
            self.event_tx.emit(DomainEvent::ClientReplaced {
                previous_session_id: previous.session.session_id.clone(),
                session_id: session.session_id.clone(),
                transport: session.transport_kind,
            });

            previous
                .transport
                .notify_disconnect("replaced by a newer client", &session.session_id)
                .await;
            previous.transport.close().await;
        }

        *self.active.write() = Some(ActiveClient {
            session: session.clone(),
            transport,
        });

        info!(
            session_id = %session.session_id,
            transport = %session.transport_kind,
            "[ClientGateway] Client connected"
        );
        self.event_tx.emit(DomainEvent::ClientConnected {
            session_id: session.session_id.clone(),
            transport: session.transport_kind,
        });

        session
    }

    /// Forget `session_id` if it is still the active client
    pub fn release(&self, session_id: &str) -> bool {
        let released = {
            let mut active = self.active.write();
            if active
                .as_ref()
                .is_some_and(|c| c.session.session_id == session_id)
            {
                active.take()
            } else {
                None
            }
        };

        match released {
            Some(client) => {
                info!(
                    session_id = session_id,
                    transport = %client.session.transport_kind,
                    "[ClientGateway] Client disconnected"
                );
                self.event_tx.emit(DomainEvent::ClientDisconnected {
                    session_id: session_id.to_string(),
                });
                true
            }
            None => false,
        }
    }

    pub fn is_current(&self, session_id: &str) -> bool {
        self.active
            .read()
            .as_ref()
            .is_some_and(|c| c.session.session_id == session_id)
    }

    pub fn current_session(&self) -> Option<ClientSession> {
        self.release_if_closed();
        self.active.read().as_ref().map(|c| c.session.clone())
    }

    pub fn current_transport_kind(&self) -> Option<TransportKind> {
        self.release_if_closed();
        self.active.read().as_ref().map(|c| c.session.transport_kind)
    }

    /// Release the active client if its transport has already gone away
    fn release_if_closed(&self) {
        let closed = self
            .active
            .read()
            .as_ref()
            .filter(|c| c.transport.is_closed())
            .map(|c| c.session.session_id.clone());
        if let Some(session_id) = closed {
            self.release(&session_id);
        }
    }

    /// Deliver a notification to the active client only
    ///
    /// Returns `Ok(false)` when no client is connected.
    pub async fn notify(&self, notification: ServerNotification) -> Result<bool, ServiceError> {
        let transport = self.active.read().as_ref().map(|c| c.transport.clone());
        match transport {
            Some(transport) => transport.send(notification).await.map(|_| true),
            None => Ok(false),
        }
    }
}
