//! Error types for the access-code core
//!
//! [`AccessError`] is what every service and facade operation reports to its
//! caller. [`StoreError`] is what the storage backends report to the
//! services.

use common::error::DatabaseError;
use thiserror::Error;

use crate::models::{CodeStatus, PaymentStatus};

/// Errors reported by the storage backends
#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint (code string or payment reference) was violated
    #[error("unique constraint violated on {0}")]
    Conflict(&'static str),

    /// The record changed since it was read; the compare-and-swap was lost
    #[error("record was modified concurrently")]
    VersionMismatch,

    /// A stored value could not be decoded into the domain model
    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    /// Underlying database failure
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(DatabaseError::Query(e))
    }
}

/// Type alias for store results
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by the access-code and payment operations
#[derive(Error, Debug)]
pub enum AccessError {
    /// The referenced code or payment request does not exist
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    /// The code is used, expired or revoked
    #[error("access code is {status} and can no longer be changed or redeemed")]
    Terminal { status: CodeStatus },

    /// The requested state change is not reachable from the current state
    #[error("cannot move access code from {from} to {to}")]
    InvalidTransition { from: CodeStatus, to: CodeStatus },

    /// Redemption attempted on a code that has not been paid for
    #[error("access code has not been activated")]
    NotActivated,

    /// The payment request already left the pending state
    #[error("payment request is {status}, only pending requests can be processed")]
    NotPending { status: PaymentStatus },

    /// Malformed input
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// No free identifier was found within the retry bound
    #[error("could not generate a unique identifier after {attempts} attempts")]
    GenerationExhausted { attempts: u32 },

    /// The actor lacks the role or ownership the operation requires
    #[error("not allowed: {0}")]
    Unauthorized(String),

    /// Storage failure
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl AccessError {
    pub(crate) fn code_not_found(code: &str) -> Self {
        AccessError::NotFound {
            entity: "access code",
            key: code.to_string(),
        }
    }

    pub(crate) fn payment_not_found(id: i64) -> Self {
        AccessError::NotFound {
            entity: "payment request",
            key: id.to_string(),
        }
    }

    /// Stable tag for the error kind, used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            AccessError::NotFound { .. } => "not_found",
            AccessError::Terminal { .. } => "terminal",
            AccessError::InvalidTransition { .. } => "invalid_transition",
            AccessError::NotActivated => "not_activated",
            AccessError::NotPending { .. } => "not_pending",
            AccessError::InvalidValue(_) => "invalid_value",
            AccessError::GenerationExhausted { .. } => "generation_exhausted",
            AccessError::Unauthorized(_) => "unauthorized",
            AccessError::Store(_) => "storage",
        }
    }
}

/// Type alias for access-code core results
pub type AccessResult<T> = Result<T, AccessError>;
