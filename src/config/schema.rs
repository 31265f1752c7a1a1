//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the monitor.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::health::EndpointConfig;

/// Root configuration for the backlog monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Per-host connection policy.
    pub endpoint: EndpointSettings,

    /// Polling schedule.
    pub polling: PollingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Connection policy applied to every replication member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Cache version vectors.
    pub caching: bool,

    /// Lifetime of cached version vectors in seconds.
    pub cache_duration_secs: u64,

    /// Limit simultaneous version vector lookups per host.
    pub limiting: bool,

    /// Maximum simultaneous version vector lookups per host.
    pub limit: usize,

    /// Seconds between connection rebuilds while a host is online.
    pub online_reconnection_interval_secs: u64,

    /// Seconds between connection attempts while a host is offline.
    pub offline_reconnection_interval_secs: u64,

    /// Seconds a call may run before its host is considered unresponsive.
    pub acceptable_call_duration_secs: u64,

    /// Retries of a failed call on a fresh connection.
    pub retries: u32,

    /// Minimum seconds between reconnects made while retrying.
    pub min_recovery_interval_secs: u64,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        let defaults = EndpointConfig::default();
        Self {
            caching: defaults.caching,
            cache_duration_secs: defaults.cache_duration.as_secs(),
            limiting: defaults.limiting,
            limit: defaults.limit,
            online_reconnection_interval_secs: defaults.online_reconnection_interval.as_secs(),
            offline_reconnection_interval_secs: defaults.offline_reconnection_interval.as_secs(),
            acceptable_call_duration_secs: defaults.acceptable_call_duration.as_secs(),
            retries: defaults.retries,
            min_recovery_interval_secs: defaults.min_recovery_interval.as_secs(),
        }
    }
}

impl EndpointSettings {
    /// Runtime form of the settings.
    pub fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig {
            caching: self.caching,
            cache_duration: Duration::from_secs(self.cache_duration_secs),
            limiting: self.limiting,
            limit: self.limit,
            online_reconnection_interval: Duration::from_secs(self.online_reconnection_interval_secs),
            offline_reconnection_interval: Duration::from_secs(self.offline_reconnection_interval_secs),
            acceptable_call_duration: Duration::from_secs(self.acceptable_call_duration_secs),
            retries: self.retries,
            min_recovery_interval: Duration::from_secs(self.min_recovery_interval_secs),
        }
    }
}

/// Polling schedule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between polling rounds.
    pub interval_secs: u64,

    /// Seconds a polling round may run before its queries are cancelled.
    pub timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            timeout_secs: 300,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_endpoint_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.endpoint.endpoint_config(), EndpointConfig::default());
        assert_eq!(config.polling.interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_toml() {
        let config: MonitorConfig = toml::from_str(
            r#"
            [endpoint]
            limit = 4
            caching = false

            [polling]
            interval_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint.limit, 4);
        assert!(!config.endpoint.caching);
        assert_eq!(config.endpoint.cache_duration_secs, 30);
        assert_eq!(config.polling.interval_secs, 60);
        assert_eq!(config.polling.timeout_secs, 300);
        assert_eq!(config.observability.log_level, "info");
    }
}
