//! Error types for the storefront

use std::time::Duration;
use thiserror::Error;

/// Main error type for the storefront
#[derive(Error, Debug)]
pub enum StorefrontError {
    /// The relational store cannot be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed or failed SQL
    #[error("Query error: {0}")]
    Query(String),

    /// Missing product or image object
    #[error("Not found: {0}")]
    NotFound(String),

    /// Text generation call failed
    #[error("Generation error: {0}")]
    Generation(String),

    /// Invalid user input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network or object storage failure
    #[error("Transient error: {0}")]
    Transient(String),

    /// External call exceeded its deadline
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StorefrontError {
    /// Connection failures end the interaction; everything else is shown and absorbed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<sqlx::Error> for StorefrontError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Connection(err.to_string()),
            sqlx::Error::Configuration(e) => Self::Configuration(e.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for StorefrontError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transient(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StorefrontError>;
