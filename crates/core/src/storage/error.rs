use thiserror::Error;

/// Errors that can occur during data-layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataLayerError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    /// A composite identifier (e.g. a feedback handle) does not parse.
    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),
    /// A pagination cursor is unparseable or stale.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    /// The underlying key-value or blob call failed. Surfaced, not retried.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    /// One phase of a multi-store operation succeeded and a later phase failed.
    /// Left for the caller to reconcile; no cross-store transaction exists.
    #[error("Partial failure: {0}")]
    PartialFailure(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for data-layer operations.
pub type Result<T> = std::result::Result<T, DataLayerError>;
