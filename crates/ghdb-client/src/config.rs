use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Settings for a [`DocumentClient`](crate::DocumentClient).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub retry: RetryPolicy,
    /// How long a cached read may be served without asking the store.
    /// Zero disables read caching.
    #[serde(with = "duration_ms")]
    pub cache_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(5),
        }
    }
}

/// Serde adapter for durations written as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ClientConfig::default();
        assert_eq!(c.cache_ttl, Duration::from_secs(5));
        assert_eq!(c.retry, RetryPolicy::default());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c: ClientConfig = toml::from_str(
            r#"
            cache_ttl = 0

            [retry]
            max_attempts = 8
            base_delay = 10
            "#,
        )
        .unwrap();
        assert_eq!(c.cache_ttl, Duration::ZERO);
        assert_eq!(c.retry.max_attempts, 8);
        assert_eq!(c.retry.base_delay, Duration::from_millis(10));
        assert_eq!(c.retry.max_delay, Duration::from_secs(2));
    }

    #[test]
    fn durations_serialize_as_millis() {
        let json = serde_json::to_value(ClientConfig::default()).unwrap();
        assert_eq!(json["cache_ttl"], 5000);
        assert_eq!(json["retry"]["base_delay"], 50);
    }
}
