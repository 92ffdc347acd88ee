//! Role-gated entry points over the services
//!
//! Facades hold no state of their own. They decide which service operation
//! an [`crate::models::Actor`] may reach and bind the actor's identity as
//! owner where the operation needs one.

pub mod admin;
pub mod client;

pub use admin::AdminOperations;
pub use client::ClientOperations;
