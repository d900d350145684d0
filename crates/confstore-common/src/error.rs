//! Error types for confstore

use thiserror::Error;

use crate::app_errors::AppErrors;
use crate::key::Key;

/// Result type alias for confstore operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for all document-store operations
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// `create` on an occupied key
    #[error("Document already exists: {0}")]
    AlreadyExists(Key),

    /// Delete or move of a missing key
    #[error("Document not found: {0}")]
    NotFound(Key),

    #[error("Validation error: {0}")]
    Validation(AppErrors),

    /// I/O failure talking to the underlying store
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Returns true for failures the caller caused (as opposed to operational faults)
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            StoreError::AlreadyExists(_) | StoreError::NotFound(_) | StoreError::Validation(_)
        )
    }

    /// Returns true if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::BackendUnavailable(_) | StoreError::EventBus(_)
        )
    }

    /// Structured form of a domain failure, `None` for operational faults
    pub fn app_errors(&self) -> Option<AppErrors> {
        match self {
            StoreError::AlreadyExists(id) => Some(AppErrors::error_with_args(
                "error.data.exists",
                vec![id.to_string()],
            )),
            StoreError::NotFound(id) => Some(AppErrors::error_with_args(
                "error.data.missing",
                vec![id.to_string()],
            )),
            StoreError::Validation(errors) => Some(errors.clone()),
            _ => None,
        }
    }
}

impl From<AppErrors> for StoreError {
    fn from(errors: AppErrors) -> Self {
        StoreError::Validation(errors)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Io => StoreError::Serialization(err.to_string()),
            _ => StoreError::Deserialization(err.to_string()),
        }
    }
}
