//! Adapter configuration loaded from the environment.
//!
//! Built once at process start and passed explicitly to the components that
//! need it; nothing here is ambient or mutable after construction.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_DEVICE_DB_PATH: &str = "./data/hearth_devices";
const DEFAULT_PROFILE_ENDPOINT: &str = "https://auth.example.com/oauth2/userInfo";

/// Deployment-time temperature scale applied to every reported or set value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TemperatureScale {
    Fahrenheit,
    Celsius,
}

impl TemperatureScale {
    pub fn as_str(self) -> &'static str {
        match self {
            TemperatureScale::Fahrenheit => "FAHRENHEIT",
            TemperatureScale::Celsius => "CELSIUS",
        }
    }
}

/// Immutable adapter configuration.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | HEARTH_DEVICE_DB_PATH | ./data/hearth_devices | Sled database holding last-known device state. |
/// | HEARTH_PROFILE_ENDPOINT | (sample userInfo URL) | OAuth userInfo endpoint used to resolve tokens to emails. |
/// | HEARTH_TEMPERATURE_SCALE | FAHRENHEIT | FAHRENHEIT or CELSIUS. |
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub device_db_path: PathBuf,
    pub profile_endpoint: String,
    pub temperature_scale: TemperatureScale,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            device_db_path: PathBuf::from(DEFAULT_DEVICE_DB_PATH),
            profile_endpoint: DEFAULT_PROFILE_ENDPOINT.to_string(),
            temperature_scale: TemperatureScale::Fahrenheit,
        }
    }
}

impl AdapterConfig {
    /// Load configuration from environment. Unset or invalid => defaults.
    pub fn from_env() -> Self {
        AdapterConfig {
            device_db_path: env_string("HEARTH_DEVICE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICE_DB_PATH)),
            profile_endpoint: env_string("HEARTH_PROFILE_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_PROFILE_ENDPOINT.to_string()),
            temperature_scale: env_temperature_scale(),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_temperature_scale() -> TemperatureScale {
    match std::env::var("HEARTH_TEMPERATURE_SCALE") {
        Ok(v) if v.trim().eq_ignore_ascii_case("celsius") => TemperatureScale::Celsius,
        _ => TemperatureScale::Fahrenheit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_fahrenheit() {
        let config = AdapterConfig::default();
        assert_eq!(config.temperature_scale, TemperatureScale::Fahrenheit);
        assert_eq!(config.temperature_scale.as_str(), "FAHRENHEIT");
    }

    #[test]
    fn scale_serializes_uppercase() {
        assert_eq!(
            serde_json::to_value(TemperatureScale::Celsius).unwrap(),
            serde_json::json!("CELSIUS")
        );
    }
}
