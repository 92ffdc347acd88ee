//! Storage contracts for access codes and payment requests
//!
//! Stores are dumb: they persist what the services hand them and enforce two
//! things only, uniqueness of the identifier strings and compare-and-swap on
//! the record `version`. All transition rules live in the services.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::models::{
    AccessCode, CodeQuery, NewAccessCode, NewPaymentRequest, Page, PaymentQuery, PaymentRequest,
    PaymentStats, StatsRange,
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCodeStore, MemoryPaymentRequestStore};
pub use postgres::{PgCodeStore, PgPaymentRequestStore};

/// Durable record of every access code
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Insert a new code; `StoreError::Conflict` if the code string is taken
    async fn insert(&self, new: NewAccessCode) -> StoreResult<AccessCode>;

    async fn find_by_code(&self, code: &str) -> StoreResult<Option<AccessCode>>;

    /// Persist the mutable fields of `code` if the stored version still
    /// equals `code.version`; `StoreError::VersionMismatch` otherwise
    /// (including when the record was deleted). Returns the stored record
    /// with its new version.
    async fn update(&self, code: &AccessCode) -> StoreResult<AccessCode>;

    /// Returns whether a record was removed
    async fn delete(&self, code: &str) -> StoreResult<bool>;

    /// Newest first, filtered on the status effective at `now`
    async fn list(&self, query: &CodeQuery, now: DateTime<Utc>) -> StoreResult<Page<AccessCode>>;

    /// Persist `expired` on every non-terminal code whose expiry has passed.
    /// Returns the number of records changed.
    async fn expire_elapsed(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Durable record of every payment request
#[async_trait]
pub trait PaymentRequestStore: Send + Sync {
    /// Insert a new request; `StoreError::Conflict` if the reference is taken
    async fn insert(&self, new: NewPaymentRequest) -> StoreResult<PaymentRequest>;

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<PaymentRequest>>;

    async fn find_by_code_pay(&self, code_pay: &str) -> StoreResult<Option<PaymentRequest>>;

    /// Compare-and-swap on `request.version`, as [`CodeStore::update`].
    /// The payment reference is never rewritten.
    async fn update(&self, request: &PaymentRequest) -> StoreResult<PaymentRequest>;

    /// Returns whether a record was removed
    async fn delete(&self, id: i64) -> StoreResult<bool>;

    /// Newest first
    async fn list(&self, query: &PaymentQuery) -> StoreResult<Page<PaymentRequest>>;

    /// Counters over requests created inside `range`; the `*_today` counters
    /// count requests processed at or after `day_start`.
    async fn stats(&self, range: StatsRange, day_start: DateTime<Utc>)
    -> StoreResult<PaymentStats>;
}
