//! Access-code lifecycle and payment fulfillment
//!
//! Operators issue single- or multi-use access codes that unlock a
//! match-control session; end users buy them through a manual bank-transfer
//! workflow that an administrator approves or rejects. This crate owns every
//! state transition of both records:
//!
//! - [`services::AccessCodeService`] is the only writer of access codes.
//! - [`services::PaymentFulfillmentService`] is the only writer of payment
//!   requests and the only component that provisions a code from a payment.
//! - [`facade::AdminOperations`] and [`facade::ClientOperations`] gate which
//!   of those operations an [`models::Actor`] may reach.
//!
//! Storage is behind the [`store::CodeStore`] and
//! [`store::PaymentRequestStore`] traits, with in-memory and PostgreSQL
//! implementations.

pub mod error;
pub mod facade;
pub mod generator;
pub mod locks;
pub mod models;
pub mod services;
pub mod store;

pub use error::{AccessError, AccessResult};
