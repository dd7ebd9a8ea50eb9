//! Backend connection tuning

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How backend processes are reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// Spawn the command as a local child process speaking stdio
    #[default]
    Launch,
    /// Wait for the backend to attach on the bridge endpoint
    Bridge,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::Bridge => "bridge",
        }
    }
}

impl std::str::FromStr for BackendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "launch" => Ok(Self::Launch),
            "bridge" => Ok(Self::Bridge),
            other => Err(format!("unknown backend mode '{}' (launch|bridge)", other)),
        }
    }
}

/// Timeouts and limits for backend connections
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Attach + initialize + catalog fetch must finish within this
    pub handshake_timeout: Duration,
    /// Per forwarded call
    pub call_timeout: Duration,
    /// Delay before the single reconnect after `Degraded`
    pub reconnect_backoff: Duration,
    /// Upper bound applied to `reconnect_backoff`
    pub max_reconnect_backoff: Duration,
    /// Pending calls per connection before `forward` waits for room
    pub queue_depth: usize,
    /// Interval at which a Ready connection checks its transport
    pub health_interval: Duration,
    pub backend_mode: BackendMode,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(60),
            reconnect_backoff: Duration::from_millis(500),
            max_reconnect_backoff: Duration::from_secs(5),
            queue_depth: 64,
            health_interval: Duration::from_secs(1),
            backend_mode: BackendMode::Launch,
        }
    }
}

impl ConnectionConfig {
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub fn with_backend_mode(mut self, mode: BackendMode) -> Self {
        self.backend_mode = mode;
        self
    }

    /// Backoff actually applied before reconnecting
    pub fn effective_backoff(&self) -> Duration {
        self.reconnect_backoff.min(self.max_reconnect_backoff)
    }
}
