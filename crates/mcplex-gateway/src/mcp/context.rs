//! Request context helpers

use rmcp::model::Extensions;

/// Header carrying the Streamable HTTP session id
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Session id of a Streamable HTTP request or notification
///
/// rmcp injects the HTTP request parts into the extensions; socket clients
/// have none and yield `None`.
pub fn extract_session_id(extensions: &Extensions) -> Option<String> {
    extensions
        .get::<http::request::Parts>()
        .and_then(|parts| parts.headers.get(SESSION_HEADER))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
