//! Custom error types for the common library
//!
//! This module defines the database error type shared by every store
//! implementation.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

impl DatabaseError {
    /// Whether the underlying driver reported a unique constraint violation
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DatabaseError::Query(SqlxError::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
