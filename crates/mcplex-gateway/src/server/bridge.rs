//! Backend bridge listener
//!
//! A backend-side bridge dials in, sends `{"uniqueName": ...}` on one line
//! and gets a launch or error line back. After a launch line the same stream
//! carries the backend's JSON-RPC.

use std::sync::Arc;
use std::time::Duration;

use mcplex_core::is_valid_unique_name;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::pool::transport::{BridgeHello, BridgeReply};
use crate::pool::BridgeRegistry;

const HELLO_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_HELLO_BYTES: u64 = 4096;

/// Accept bridge connections until `shutdown` fires
pub async fn serve_bridges(
    listener: TcpListener,
    registry: Arc<BridgeRegistry>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("[BridgeListener] Shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "[BridgeListener] Bridge connected");
                    let registry = registry.clone();
                    tokio::spawn(async move {
                        if let Err(e) = attach(stream, &registry).await {
                            warn!(peer = %addr, error = %e, "[BridgeListener] Attach failed");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "[BridgeListener] Accept failed"),
            }
        }
    }
}

async fn attach(stream: TcpStream, registry: &BridgeRegistry) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    timeout(
        HELLO_TIMEOUT,
        (&mut reader).take(MAX_HELLO_BYTES).read_line(&mut line),
    )
    .await
    .map_err(|_| anyhow::anyhow!("no hello within {:?}", HELLO_TIMEOUT))??;

    // A hello cut off by the cap, or by EOF, has no newline
    let hello = match serde_json::from_str::<BridgeHello>(line.trim()) {
        Ok(hello) if line.ends_with('\n') && is_valid_unique_name(&hello.unique_name) => hello,
        _ => {
            let reply = BridgeReply::error("expected {\"uniqueName\": \"<name>\"}");
            write_half.write_all(reply.to_line().as_bytes()).await?;
            anyhow::bail!("malformed hello");
        }
    };

    registry
        .complete(&hello.unique_name, Box::new(reader), Box::new(write_half))
        .await?;
    Ok(())
}
