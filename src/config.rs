//! Configuration management module
//!
//! Loads and validates environment-based configuration.

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::repository::DEFAULT_MAX_PRODUCTION_SAMPLES;

/// Configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid value for environment variable {key}")]
    ParseError { key: &'static str },
}

/// Server configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Mock production feed settings
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorSettings {
    pub enabled: bool,
    /// Interval in milliseconds between feed ticks
    pub interval_ms: u64,
    /// Shop-floor minutes represented by one tick
    pub minutes_per_tick: f64,
}

/// Machine store settings
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Production samples retained per machine
    pub max_production_samples: usize,
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub simulator: SimulatorSettings,
    pub store: StoreSettings,
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self, SettingsError> {
        Ok(Self {
            server: ServerSettings {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
                port: parse_var("SERVER_PORT", 5000)?,
            },
            simulator: SimulatorSettings {
                enabled: parse_var("SIMULATOR_ENABLED", true)?,
                interval_ms: parse_var("SIMULATOR_INTERVAL_MS", 5000)?,
                minutes_per_tick: parse_var("SIMULATOR_MINUTES_PER_TICK", 1.0)?,
            },
            store: StoreSettings {
                max_production_samples: parse_var(
                    "MAX_PRODUCTION_SAMPLES",
                    DEFAULT_MAX_PRODUCTION_SAMPLES,
                )?,
            },
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, SettingsError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| SettingsError::ParseError { key }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases share process environment, so they run as one test
    #[test]
    fn test_settings_from_env() {
        env::remove_var("SERVER_HOST");
        env::remove_var("SERVER_PORT");
        env::remove_var("SIMULATOR_ENABLED");
        env::remove_var("SIMULATOR_INTERVAL_MS");
        env::remove_var("MAX_PRODUCTION_SAMPLES");

        let settings = Settings::from_env().unwrap();

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 5000);
        assert!(settings.simulator.enabled);
        assert_eq!(settings.simulator.interval_ms, 5000);
        assert_eq!(settings.store.max_production_samples, 1000);

        env::set_var("SERVER_PORT", "3000");
        env::set_var("SIMULATOR_ENABLED", "false");
        env::set_var("MAX_PRODUCTION_SAMPLES", "50");

        let settings = Settings::from_env().unwrap();

        assert_eq!(settings.server.port, 3000);
        assert!(!settings.simulator.enabled);
        assert_eq!(settings.store.max_production_samples, 50);

        env::set_var("SERVER_PORT", "not-a-port");
        assert!(matches!(
            Settings::from_env(),
            Err(SettingsError::ParseError { key: "SERVER_PORT" })
        ));

        env::remove_var("SERVER_PORT");
        env::remove_var("SIMULATOR_ENABLED");
        env::remove_var("MAX_PRODUCTION_SAMPLES");
    }
}
