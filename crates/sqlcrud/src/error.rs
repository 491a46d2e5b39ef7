//! Error types for sqlcrud

use thiserror::Error;

/// Result type alias for sqlcrud operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for fragment building, repository operations and driver calls
#[derive(Debug, Error)]
pub enum OrmError {
    /// Zero rows where exactly one was required
    #[error("Not found: {0}")]
    NotFound(String),

    /// More rows than the operation allows
    #[error("Too many results: expected {expected}, got {got}")]
    TooManyResults { expected: usize, got: usize },

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Malformed template, identifier or operation input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[cfg(feature = "postgres")]
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Error raised by a third-party executor, passed through untouched
    #[error("Driver error: {0}")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a too many results error
    pub fn too_many_results(expected: usize, got: usize) -> Self {
        Self::TooManyResults { expected, got }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wrap an arbitrary driver error
    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Driver(Box::new(err))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a too many results error
    pub fn is_too_many_results(&self) -> bool {
        matches!(self, Self::TooManyResults { .. })
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_results_message() {
        let err = OrmError::too_many_results(1, 3);
        assert!(err.is_too_many_results());
        assert_eq!(err.to_string(), "Too many results: expected 1, got 3");
    }

    #[test]
    fn not_found_predicate() {
        assert!(OrmError::not_found("users 7").is_not_found());
        assert!(!OrmError::validation("x").is_not_found());
    }
}
