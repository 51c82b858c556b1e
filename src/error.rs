//! Error types for the conversational BI agents

use thiserror::Error;

use crate::sql::Rejection;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, BiError>;

#[derive(Error, Debug)]
pub enum BiError {

    // =============================
    // Query Pipeline Errors
    // =============================

    /// Generated statement failed the allow-list. Never executed.
    #[error("Validation rejected: {0}")]
    ValidationRejected(Rejection),

    /// Statement passed validation but failed at the database.
    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Malformed LLM response: {0}")]
    MalformedLlmResponse(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    // =============================
    // Orchestration Errors
    // =============================

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Discovery error: {0}")]
    DiscoveryError(String),

    /// Peer agent unreachable, timed out, or answered with a protocol error.
    #[error("Upstream error: {0}")]
    UpstreamError(String),

    /// Peer answered with a JSON-RPC error object.
    #[error("Agent {agent} returned error {code}: {message}")]
    RemoteAgentError {
        agent: String,
        code: i32,
        message: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BiError {
    /// Short stable code used in logs and per-agent outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            BiError::ValidationRejected(_) => "validation_rejected",
            BiError::ExecutionError(_) | BiError::SqlError(_) => "execution_error",
            BiError::MalformedLlmResponse(_) => "llm_malformed",
            BiError::LlmError(_) => "llm_error",
            BiError::UnknownAgent(_) => "unknown_agent",
            BiError::DiscoveryError(_) => "discovery_error",
            BiError::UpstreamError(_) | BiError::HttpError(_) => "upstream_error",
            BiError::RemoteAgentError { code, .. } => crate::rpc::kind_for_code(*code),
            BiError::ConfigError(_) => "config_error",
            BiError::DatabaseError(_) => "database_error",
            BiError::SerializationError(_) => "serialization_error",
            BiError::IoError(_) => "io_error",
        }
    }

    /// Failures that earn one re-prompt of the LLM.
    pub fn is_reprompt_worthy(&self) -> bool {
        matches!(
            self,
            BiError::ValidationRejected(_) | BiError::MalformedLlmResponse(_)
        )
    }
}

impl From<Rejection> for BiError {
    fn from(rejection: Rejection) -> Self {
        BiError::ValidationRejected(rejection)
    }
}
