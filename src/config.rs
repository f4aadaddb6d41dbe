use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::tallinna_vesi::API_BASE_URL;
use crate::water_coordinator::DEFAULT_UPDATE_INTERVAL;

pub const DEFAULT_ENTITY_PREFIX: &str = "sensor.tallinnavesi";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Required to set the Tallinna Vesi API key (TALLINNAVESI_API_KEY env var)")]
    MissingApiKey,
    #[error("Invalid TALLINNAVESI_UPDATE_INTERVAL_SECS value `{0}`")]
    InvalidUpdateInterval(String),
}

/// Runtime settings, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_key: String,
    /// Meter to poll; discovered from the API when unset.
    pub meter_number: Option<String>,
    pub base_url: String,
    pub update_interval: Duration,
    pub home_assistant_url: Option<String>,
    pub home_assistant_token: String,
    pub entity_prefix: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = non_empty("TALLINNAVESI_API_KEY").ok_or(ConfigError::MissingApiKey)?;
        let update_interval = match non_empty("TALLINNAVESI_UPDATE_INTERVAL_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidUpdateInterval(raw)),
            },
            None => DEFAULT_UPDATE_INTERVAL,
        };

        Ok(Self {
            api_key,
            meter_number: non_empty("TALLINNAVESI_METER_NUMBER"),
            base_url: non_empty("TALLINNAVESI_BASE_URL").unwrap_or_else(|| API_BASE_URL.to_string()),
            update_interval,
            home_assistant_url: non_empty("HA_URL"),
            home_assistant_token: non_empty("HA_TOKEN").unwrap_or_default(),
            entity_prefix: non_empty("HA_ENTITY_PREFIX")
                .unwrap_or_else(|| DEFAULT_ENTITY_PREFIX.to_string()),
        })
    }

    /// Entity id of one published sensor, e.g. `sensor.tallinnavesi_total`.
    pub fn entity_id(&self, sensor_key: &str) -> String {
        format!("{}_{}", self.entity_prefix, sensor_key)
    }
}
