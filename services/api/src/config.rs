//! Service configuration
//!
//! Defaults overridden by `SCOREBOARD_*` environment variables, e.g.
//! `SCOREBOARD_BIND_ADDR=127.0.0.1:8080` or `SCOREBOARD_STORAGE=memory`.

use access::generator::{GenerationPolicy, RandomTokens};
use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Backing store for codes and payment requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Postgres,
    Memory,
}

/// API service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub storage: StorageKind,
    /// Length of generated access code strings
    pub code_length: usize,
    /// Length of the random part of payment references
    pub payment_reference_length: usize,
    pub generation_max_attempts: u32,
    /// Cron expression (with seconds) for persisting lazy expiry; empty
    /// disables the sweep
    pub expiry_sweep_schedule: String,
}

impl ApiConfig {
    /// Load defaults, then the environment
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("bind_addr", "0.0.0.0:3001")?
            .set_default("storage", "postgres")?
            .set_default("code_length", 8)?
            .set_default("payment_reference_length", 8)?
            .set_default("generation_max_attempts", 5)?
            .set_default("expiry_sweep_schedule", "0 */5 * * * *")?
            .add_source(Environment::with_prefix("SCOREBOARD"))
            .build()?
            .try_deserialize()
    }

    pub fn generation_policy(&self) -> GenerationPolicy {
        GenerationPolicy {
            max_attempts: self.generation_max_attempts,
        }
    }

    pub fn code_tokens(&self) -> RandomTokens {
        RandomTokens::access_codes(self.code_length)
    }

    pub fn payment_reference_tokens(&self) -> RandomTokens {
        RandomTokens::payment_references(self.payment_reference_length)
    }

    pub fn expiry_sweep_schedule(&self) -> Option<&str> {
        Some(self.expiry_sweep_schedule.trim()).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 3] = [
        "SCOREBOARD_STORAGE",
        "SCOREBOARD_CODE_LENGTH",
        "SCOREBOARD_EXPIRY_SWEEP_SCHEDULE",
    ];

    fn clear() {
        for var in VARS {
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = ApiConfig::load().unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3001");
        assert_eq!(config.storage, StorageKind::Postgres);
        assert_eq!(config.code_length, 8);
        assert_eq!(config.generation_policy().max_attempts, 5);
        assert_eq!(config.expiry_sweep_schedule(), Some("0 */5 * * * *"));
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        clear();
        unsafe {
            env::set_var("SCOREBOARD_STORAGE", "memory");
            env::set_var("SCOREBOARD_CODE_LENGTH", "12");
            env::set_var("SCOREBOARD_EXPIRY_SWEEP_SCHEDULE", "");
        }

        let config = ApiConfig::load().unwrap();
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.code_length, 12);
        assert_eq!(config.expiry_sweep_schedule(), None);

        clear();
    }
}
