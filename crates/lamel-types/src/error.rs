//! Shared error types.
//!
//! Repository errors are used by the storage traits in `lamel-core`; the
//! client errors (`ExtractError`, `StoreError`, `InvokeError`) are shared
//! between the core collaborator traits and their infra implementations.

use thiserror::Error;

/// Errors from repository operations (used by trait definitions in lamel-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the data feed client.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("feed request failed: {0}")]
    Http(String),

    /// Non-success HTTP status from the feed.
    #[error("feed returned status {status}")]
    Status { status: u16 },

    /// The response body was not a decodable CSV batch.
    #[error("feed response decode failed: {0}")]
    Decode(String),
}

/// Errors from the object store client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store request failed: {0}")]
    Http(String),

    #[error("object store returned status {status} for key '{key}'")]
    Status { status: u16, key: String },

    /// The table payload could not be rendered for upload.
    #[error("object encode failed: {0}")]
    Encode(String),
}

/// Errors from the loader function invoker.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("function invocation failed: {0}")]
    Http(String),

    #[error("function endpoint returned status {status}")]
    Status { status: u16 },

    /// The function ran but reported an execution error.
    #[error("function error: {0}")]
    Function(String),

    #[error("function response decode failed: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("no such table".to_string());
        assert_eq!(err.to_string(), "query error: no such table");
    }

    #[test]
    fn test_extract_error_display() {
        let err = ExtractError::Status { status: 503 };
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Status {
            status: 403,
            key: "transformed_data/sales.csv".to_string(),
        };
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("sales.csv"));
    }

    #[test]
    fn test_invoke_error_display() {
        let err = InvokeError::Function("table lock timeout".to_string());
        assert_eq!(err.to_string(), "function error: table lock timeout");
    }
}
