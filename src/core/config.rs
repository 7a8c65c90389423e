//! Supervisor configuration.
//!
//! Durations are expressed in milliseconds both in serialized form and in the
//! environment variables read by [`SupervisorConfig::from_env`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HEARTBEAT_INTERVAL_ENV: &str = "JAMESPORAL_HEARTBEAT_INTERVAL_MS";
pub const CANCELLATION_TIMEOUT_ENV: &str = "JAMESPORAL_CANCELLATION_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// How often the running activity is heartbeated.
    #[serde(with = "serde_millis", default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,

    /// How long a cancelled activity function may keep running before the
    /// cancellation is reported anyway. `None` waits indefinitely.
    #[serde(with = "serde_opt_millis", default)]
    pub cancellation_timeout: Option<Duration>,
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            cancellation_timeout: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl SupervisorConfig {
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_cancellation_timeout(mut self, timeout: Duration) -> Self {
        self.cancellation_timeout = Some(timeout);
        self
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(HEARTBEAT_INTERVAL_ENV) {
            config.heartbeat_interval = parse_millis(HEARTBEAT_INTERVAL_ENV, &raw)?;
        }
        if let Some(raw) = lookup(CANCELLATION_TIMEOUT_ENV) {
            config.cancellation_timeout = Some(parse_millis(CANCELLATION_TIMEOUT_ENV, &raw)?);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "heartbeat interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::Invalid(format!("{key}={raw:?}: {e}")))
}

mod serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod serde_opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_wait_indefinitely_on_cancellation() {
        let config = SupervisorConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.cancellation_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = SupervisorConfig::from_lookup(lookup_from(&[
            (HEARTBEAT_INTERVAL_ENV, "250"),
            (CANCELLATION_TIMEOUT_ENV, " 1500 "),
        ]))
        .unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(250));
        assert_eq!(config.cancellation_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn unparsable_environment_value_is_rejected() {
        let err = SupervisorConfig::from_lookup(lookup_from(&[(HEARTBEAT_INTERVAL_ENV, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains(HEARTBEAT_INTERVAL_ENV)));
    }

    #[test]
    fn zero_heartbeat_interval_is_invalid() {
        let config = SupervisorConfig::default().with_heartbeat_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: SupervisorConfig =
            serde_json::from_str(r#"{ "cancellation_timeout": 10 }"#).unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.cancellation_timeout, Some(Duration::from_millis(10)));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["heartbeat_interval"], 30_000);
    }
}
