//! Error types for search operations

use crate::error::AppError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Result type for raw engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failure reported by the search engine client.
///
/// `status` carries the engine's HTTP-style status code when the engine
/// answered; transport failures leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("engine error (status {}): {message}", display_status(.status))]
pub struct EngineError {
    pub status: Option<u16>,
    pub message: String,
}

fn display_status(status: &Option<u16>) -> String {
    status.map(|s| s.to_string()).unwrap_or_else(|| "n/a".to_string())
}

impl EngineError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Failure with no engine response (connection refused, timeout, ...)
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    /// Create-index conflict on an existing index
    pub fn is_already_exists(&self) -> bool {
        self.status == Some(400) && self.message.contains("resource_already_exists_exception")
    }
}

impl From<tantivy::TantivyError> for EngineError {
    fn from(err: tantivy::TantivyError) -> Self {
        EngineError::new(500, err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => EngineError::new(status.as_u16(), err.to_string()),
            None => EngineError::transport(err.to_string()),
        }
    }
}

/// Errors that can occur during search operations
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Index creation or deletion failed
    #[error("Index provisioning failed: {0}")]
    Provisioning(String),

    /// Query descriptor rejected before reaching the engine
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Engine rejected a query or an update
    #[error("Search failed: {0}")]
    Engine(#[from] EngineError),

    /// A hit could not be mapped to a result record
    #[error("Result projection failed: {0}")]
    Projection(String),

    /// No document carries the requested business key
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Document body is not a JSON object
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidQuery(msg) | SearchError::InvalidDocument(msg) => {
                AppError::Validation(msg)
            }
            SearchError::NotFound(msg) => AppError::NotFound(msg),
            SearchError::Engine(err) if err.status.is_none() => AppError::Network(err.to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}
