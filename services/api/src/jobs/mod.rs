//! Background jobs

pub mod expiry_sweep;

pub use expiry_sweep::start_expiry_sweep;
