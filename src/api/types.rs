//! API request and response types.

use serde::{Deserialize, Serialize};

/// Chat request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// The user message
    pub message: String,

    /// Session identifier; empty or absent means "start a new session"
    #[serde(default)]
    pub session_id: String,
}

/// Chat response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// The agent's reply
    pub reply: String,

    /// Session identifier to send with the next message
    pub session_id: String,
}

/// Request to clear a session's history.
#[derive(Debug, Clone, Deserialize)]
pub struct ResetRequest {
    pub session_id: String,
}

/// Reset acknowledgement.
#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub status: &'static str,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,

    /// Service version
    pub version: &'static str,

    /// Live sessions in the store
    pub active_sessions: usize,
}

/// Non-secret configuration exposed to the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct FrontendConfig {
    pub map_api_key: String,
}
