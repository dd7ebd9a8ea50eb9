//! Error taxonomy shared by the registry, connection manager and router
//!
//! Every failure that can reach a client is one of these variants. Each has a
//! stable snake_case code used in control-plane envelopes and MCP error data.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for operations that surface [`MuxError`]
pub type MuxResult<T> = Result<T, MuxError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MuxError {
    /// Definition failed validation (bad name, empty command, bad payload)
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("server '{0}' already exists")]
    DuplicateName(String),

    #[error("server '{0}' not found")]
    NotFound(String),

    /// Backend did not finish initialize + catalog fetch in time
    #[error("handshake with '{0}' timed out")]
    HandshakeTimeout(String),

    #[error("backend '{0}' is unavailable")]
    BackendUnavailable(String),

    #[error("call to '{0}' timed out")]
    CallTimeout(String),

    #[error("unknown capability '{0}'")]
    UnknownCapability(String),

    /// Catch-all; always logged where it is produced
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable machine-readable error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidDefinition,
    DuplicateName,
    NotFound,
    HandshakeTimeout,
    BackendUnavailable,
    CallTimeout,
    UnknownCapability,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidDefinition => "invalid_definition",
            Self::DuplicateName => "duplicate_name",
            Self::NotFound => "not_found",
            Self::HandshakeTimeout => "handshake_timeout",
            Self::BackendUnavailable => "backend_unavailable",
            Self::CallTimeout => "call_timeout",
            Self::UnknownCapability => "unknown_capability",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MuxError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidDefinition(_) => ErrorCode::InvalidDefinition,
            Self::DuplicateName(_) => ErrorCode::DuplicateName,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::HandshakeTimeout(_) => ErrorCode::HandshakeTimeout,
            Self::BackendUnavailable(_) => ErrorCode::BackendUnavailable,
            Self::CallTimeout(_) => ErrorCode::CallTimeout,
            Self::UnknownCapability(_) => ErrorCode::UnknownCapability,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Wrap an unexpected failure, logging it with context
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!(context = context, error = %err, "[MuxError] Internal error");
        Self::Internal(format!("{}: {}", context, err))
    }

    /// Errors caused by the caller's input rather than system state
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDefinition(_)
                | Self::DuplicateName(_)
                | Self::NotFound(_)
                | Self::UnknownCapability(_)
        )
    }
}
