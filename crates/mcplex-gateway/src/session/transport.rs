//! Client transports behind one relay contract
//!
//! The gateway needs a client transport to deliver server-initiated messages
//! and to close. Streamable HTTP sessions and raw socket connections both
//! provide that, so the gateway never branches on the transport kind.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcplex_core::TransportKind;
use rmcp::model::{CustomNotification, ServerNotification};
use rmcp::service::{Peer, ServiceError};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::SessionManager;
use rmcp::RoleServer;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Method of the notice sent to a client that is being preempted
pub const SESSION_REPLACED_METHOD: &str = "notifications/mcplex/session_replaced";

/// Upper bound on delivering the disconnect notice
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
pub trait ClientTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Deliver a server-initiated notification
    async fn send(&self, notification: ServerNotification) -> Result<(), ServiceError>;

    /// Tell the client it is being disconnected; best effort
    async fn notify_disconnect(&self, reason: &str, replaced_by: &str) {
        let notification = CustomNotification::new(
            SESSION_REPLACED_METHOD,
            Some(json!({ "reason": reason, "replacedBy": replaced_by })),
        );
        let send = self.send(ServerNotification::CustomNotification(notification));

        match tokio::time::timeout(NOTIFY_TIMEOUT, send).await {
            Ok(Ok(())) => debug!(kind = %self.kind(), "[ClientTransport] Disconnect notice sent"),
            Ok(Err(e)) => warn!(kind = %self.kind(), error = %e, "[ClientTransport] Disconnect notice failed"),
            Err(_) => warn!(kind = %self.kind(), "[ClientTransport] Disconnect notice timed out"),
        }
    }

    /// Close the underlying transport
    async fn close(&self);

    /// Whether the client side is already gone
    fn is_closed(&self) -> bool;
}

/// Streamable HTTP session managed by rmcp's session manager
pub struct StreamClientTransport {
    session_id: String,
    peer: Peer<RoleServer>,
    sessions: Arc<LocalSessionManager>,
}

impl StreamClientTransport {
    pub fn new(
        session_id: impl Into<String>,
        peer: Peer<RoleServer>,
        sessions: Arc<LocalSessionManager>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            peer,
            sessions,
        }
    }
}

#[async_trait]
impl ClientTransport for StreamClientTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    async fn send(&self, notification: ServerNotification) -> Result<(), ServiceError> {
        self.peer.send_notification(notification).await
    }

    async fn close(&self) {
        let id: Arc<str> = Arc::from(self.session_id.as_str());
        if let Err(e) = self.sessions.close_session(&id).await {
            warn!(session_id = %self.session_id, error = %e, "[StreamClientTransport] Close failed");
        }
    }

    fn is_closed(&self) -> bool {
        self.peer.is_transport_closed()
    }
}

/// Newline-delimited JSON-RPC over a TCP connection
pub struct SocketClientTransport {
    peer: Peer<RoleServer>,
    cancel: CancellationToken,
}

impl SocketClientTransport {
    pub fn new(peer: Peer<RoleServer>, cancel: CancellationToken) -> Self {
        Self { peer, cancel }
    }
}

#[async_trait]
impl ClientTransport for SocketClientTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    async fn send(&self, notification: ServerNotification) -> Result<(), ServiceError> {
        self.peer.send_notification(notification).await
    }

    async fn close(&self) {
        self.cancel.cancel();
    }

    fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.peer.is_transport_closed()
    }
}
