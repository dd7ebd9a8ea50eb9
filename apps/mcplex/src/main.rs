//! mcplex - one MCP endpoint in front of many MCP servers
//!
//! Logging:
//! - Console: compact, colored
//! - File: daily rotation in `<data-dir>/logs/`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mcplex_gateway::{
    BackendMode, ConnectionConfig, DependenciesBuilder, GatewayConfig, GatewayServer,
};
use mcplex_storage::{Database, DATABASE_FILE};
use tokio::sync::Mutex;
use tracing::info;

const LOG_PREFIX: &str = "mcplex";

#[derive(Parser, Debug)]
#[command(name = "mcplex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host every listener binds to
    #[arg(long, env = "MCPLEX_HOST", default_value = "127.0.0.1")]
    host: String,

    /// HTTP port for `/mcp`, `/control` and `/health`
    #[arg(short, long, env = "MCPLEX_PORT", default_value_t = mcplex_gateway::server::DEFAULT_HTTP_PORT)]
    port: u16,

    /// Port for socket clients (newline-delimited JSON-RPC)
    #[arg(long, env = "MCPLEX_SOCKET_PORT", default_value_t = mcplex_gateway::server::DEFAULT_SOCKET_PORT)]
    socket_port: u16,

    /// Disable the socket client transport
    #[arg(long, env = "MCPLEX_NO_SOCKET")]
    no_socket: bool,

    /// Port backends attach to in bridge mode
    #[arg(long, env = "MCPLEX_BRIDGE_PORT", default_value_t = mcplex_gateway::server::DEFAULT_BRIDGE_PORT)]
    bridge_port: u16,

    /// How backends are reached: launch | bridge
    #[arg(long, env = "MCPLEX_BACKEND_MODE", default_value = "launch")]
    backend_mode: BackendMode,

    /// Directory for the database and logs
    #[arg(long, env = "MCPLEX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Seconds a backend has to attach, initialize and list its capabilities
    #[arg(long, env = "MCPLEX_HANDSHAKE_TIMEOUT", default_value_t = 30)]
    handshake_timeout: u64,

    /// Seconds a forwarded call may take
    #[arg(long, env = "MCPLEX_CALL_TIMEOUT", default_value_t = 60)]
    call_timeout: u64,

    /// Disable CORS headers on the HTTP listener
    #[arg(long, env = "MCPLEX_NO_CORS")]
    no_cors: bool,
}

impl Cli {
    fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_local_dir()
                .map(|dir| dir.join("mcplex"))
                .context("No local data directory on this platform; pass --data-dir"),
        }
    }

    fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            host: self.host.clone(),
            port: self.port,
            socket_port: (!self.no_socket).then_some(self.socket_port),
            bridge_port: Some(self.bridge_port),
            enable_cors: !self.no_cors,
        }
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::default()
            .with_handshake_timeout(Duration::from_secs(self.handshake_timeout))
            .with_call_timeout(Duration::from_secs(self.call_timeout))
            .with_backend_mode(self.backend_mode)
    }
}

/// Initialize console and daily-rolling file logging
///
/// The returned guard must stay alive for file logs to be flushed.
fn init_tracing(logs_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create logs directory {}", logs_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(logs_dir)
        .context("Failed to create log file appender")?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG takes precedence
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,mcplex=debug,mcplex_core=debug,mcplex_gateway=debug,mcplex_storage=debug")
    });

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let data_dir = cli.data_dir()?;
    let _guard = init_tracing(&data_dir.join("logs"))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %data_dir.display(),
        backend_mode = cli.backend_mode.as_str(),
        "[mcplex] Starting"
    );

    let db_path = data_dir.join(DATABASE_FILE);
    let database = Database::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let dependencies = DependenciesBuilder::new()
        .with_database(Arc::new(Mutex::new(database)))
        .with_connection_config(cli.connection_config())
        .build()
        .map_err(anyhow::Error::msg)?;

    GatewayServer::new(cli.gateway_config(), dependencies)
        .run()
        .await
}
