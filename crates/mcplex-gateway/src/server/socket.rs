//! Socket client listener
//!
//! Each accepted TCP connection gets its own handler instance speaking
//! newline-delimited JSON-RPC. The connection is admitted into the
//! [`crate::session::ClientGateway`] once it sends `initialized`; preemption
//! cancels the served task, which drops the socket.

use std::net::SocketAddr;

use rmcp::ServiceExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ServiceContainer;
use crate::mcp::{ClientOrigin, McplexGatewayHandler};

/// Accept socket clients until `shutdown` fires
pub async fn serve_socket_clients(
    listener: TcpListener,
    services: ServiceContainer,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("[SocketListener] Shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let services = services.clone();
                    let cancel = shutdown.child_token();
                    tokio::spawn(serve_connection(stream, addr, services, cancel));
                }
                Err(e) => warn!(error = %e, "[SocketListener] Accept failed"),
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    services: ServiceContainer,
    cancel: CancellationToken,
) {
    let session_id = Uuid::new_v4().to_string();
    info!(session_id = %session_id, peer = %addr, "[SocketListener] Client connected");

    let handler = McplexGatewayHandler::new(
        services.clone(),
        ClientOrigin::Socket {
            session_id: session_id.clone(),
            cancel: cancel.clone(),
        },
    );

    let (reader, writer) = stream.into_split();
    match handler.serve_with_ct((reader, writer), cancel).await {
        Ok(running) => match running.waiting().await {
            Ok(reason) => debug!(session_id = %session_id, reason = ?reason, "[SocketListener] Session ended"),
            Err(e) => warn!(session_id = %session_id, error = %e, "[SocketListener] Session task failed"),
        },
        Err(e) => warn!(session_id = %session_id, error = %e, "[SocketListener] Initialize failed"),
    }

    services.gateway.release(&session_id);
}
