//! Backend connector abstraction
//!
//! A connector turns a [`ServerDefinition`] into a raw byte channel to a
//! running backend. The connection manager then serves an MCP client over
//! whatever channel comes back, so new ways of reaching a backend can be
//! added without touching the handshake or routing code.

mod bridge;
mod stdio;

use async_trait::async_trait;
use mcplex_core::ServerDefinition;
use rmcp::transport::TokioChildProcess;
use tokio::io::{AsyncRead, AsyncWrite};

pub use bridge::{BridgeConnector, BridgeHello, BridgeRegistry, BridgeReply};
pub use stdio::ChildProcessConnector;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A byte channel to a backend, ready for the MCP handshake
pub enum BackendChannel {
    /// Local child process; stdio is owned by rmcp
    Child(TokioChildProcess),
    /// Any stream pair carrying newline-delimited JSON-RPC
    Stream {
        reader: BoxedReader,
        writer: BoxedWriter,
    },
}

impl BackendChannel {
    pub fn stream<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::Stream {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Child(_) => "child",
            Self::Stream { .. } => "stream",
        }
    }
}

impl std::fmt::Debug for BackendChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendChannel")
            .field("kind", &self.kind())
            .finish()
    }
}

/// Reaches a backend process for one definition
///
/// `attach` covers the `Connecting` phase only; it must not speak MCP.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn attach(&self, definition: &ServerDefinition) -> anyhow::Result<BackendChannel>;

    /// Short name for logs
    fn kind(&self) -> &'static str;
}
