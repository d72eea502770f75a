//! Error types for the agentkit domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`] is the
//! single error a turn reports to its caller.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all agentkit operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Prompt files ---
    #[error("Failed to read prompt {path}: {reason}")]
    Prompt { path: PathBuf, reason: String },

    // --- Routing ---
    #[error("Routing error: {0}")]
    Routing(String),

    // --- Durability ---
    #[error("persist failed: {0}")]
    Persistence(MemoryError),

    #[error("Turn deadline of {0}s exceeded")]
    Timeout(u64),

    #[error("Turn cancelled by caller")]
    Cancelled,

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transport failures and server-side (5xx) statuses are worth retrying.
    /// Client errors (4xx) and malformed payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_) | Self::NotConfigured(_) | Self::InvalidResponse(_) => {
                false
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Embedding has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unknown message id: {0}")]
    UnknownMessage(i64),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool {tool_name} is misconfigured: {reason}")]
    Misconfigured { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 503,
            message: "upstream overloaded".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("upstream overloaded"));
    }

    #[test]
    fn only_transport_and_server_errors_retry() {
        assert!(ProviderError::Network("reset".into()).is_retryable());
        assert!(ProviderError::Timeout("60s".into()).is_retryable());
        assert!(
            ProviderError::ApiError { status_code: 502, message: String::new() }.is_retryable()
        );
        assert!(
            !ProviderError::ApiError { status_code: 400, message: String::new() }.is_retryable()
        );
        assert!(
            !ProviderError::ApiError { status_code: 429, message: String::new() }.is_retryable()
        );
        assert!(!ProviderError::AuthenticationFailed("bad key".into()).is_retryable());
    }

    #[test]
    fn persistence_error_is_wrapped() {
        let err = Error::Persistence(MemoryError::Storage("connection refused".into()));
        assert_eq!(
            err.to_string(),
            "persist failed: Storage error: connection refused"
        );
    }
}
