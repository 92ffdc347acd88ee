//! HTTP surface of the access-code and payment core

pub mod config;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod state;

pub use state::AppState;
