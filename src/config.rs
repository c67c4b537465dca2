use std::time::Duration;

use crate::breaker::BreakerConfig;

/// Runtime configuration, read once from `ROOMCORE_*` environment
/// variables. Every field has a default so a bare process comes up
/// pointing at the in-cluster service names.
#[derive(Debug, Clone)]
pub struct Config {
    pub users_service_url: String,
    pub rooms_service_url: String,
    pub probe_timeout: Duration,
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub watcher_interval: Duration,
    pub metrics_port: Option<u16>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            users_service_url: std::env::var("ROOMCORE_USERS_URL")
                .unwrap_or_else(|_| "http://users-service:5001/api/users".into()),
            rooms_service_url: std::env::var("ROOMCORE_ROOMS_URL")
                .unwrap_or_else(|_| "http://rooms-service:5000/api/rooms".into()),
            probe_timeout: Duration::from_millis(env_parse("ROOMCORE_PROBE_TIMEOUT_MS", 3000)),
            failure_threshold: env_parse("ROOMCORE_BREAKER_FAILURES", 5),
            recovery_timeout: Duration::from_secs(env_parse("ROOMCORE_BREAKER_RECOVERY_SECS", 60)),
            watcher_interval: Duration::from_secs(env_parse("ROOMCORE_WATCHER_INTERVAL_SECS", 60)),
            metrics_port: std::env::var("ROOMCORE_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: self.recovery_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            users_service_url: "http://users-service:5001/api/users".into(),
            rooms_service_url: "http://rooms-service:5000/api/rooms".into(),
            probe_timeout: Duration::from_millis(3000),
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            watcher_interval: Duration::from_secs(60),
            metrics_port: None,
        }
    }
}
