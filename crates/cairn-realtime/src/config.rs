use std::time::Duration;

use crate::error::RealtimeError;
use crate::reconnect::ReconnectPolicy;

pub const ENV_KEY: &str = "CAIRN_REALTIME_KEY";
pub const ENV_ENDPOINT: &str = "CAIRN_REALTIME_ENDPOINT";

const DEFAULT_ENDPOINT: &str = "wss://realtime.cairn.app/stream";

/// How a feed catches up on durable history after a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchUp {
    /// Re-fetch the full conversation history. The safe default.
    FullRefetch,
    /// Fetch only messages newer than the last merged timestamp.
    SinceLastSeen,
}

/// Realtime subsystem configuration, read once at process start.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Provider API key.
    pub key: String,
    /// Provider WebSocket endpoint.
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub attach_timeout: Duration,
    pub publish_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Interval of the periodic check that catches a transport that drifted
    /// out of `connected` without emitting a state event.
    pub liveness_interval: Duration,
    pub catch_up: CatchUp,
}

impl RealtimeConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(15),
            attach_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            liveness_interval: Duration::from_secs(30),
            catch_up: CatchUp::FullRefetch,
        }
    }

    /// Load `.env` if present, then read the provider credentials from the
    /// environment. A missing or empty key is fatal.
    pub fn from_env() -> Result<Self, RealtimeError> {
        let _ = dotenvy::dotenv();

        let key = std::env::var(ENV_KEY)
            .map_err(|_| RealtimeError::Configuration(format!("{ENV_KEY} is not set")))?;
        if key.trim().is_empty() {
            return Err(RealtimeError::Configuration(format!("{ENV_KEY} is empty")));
        }

        let mut config = Self::new(key);
        if let Ok(endpoint) = std::env::var(ENV_ENDPOINT) {
            config.endpoint = endpoint;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_provider_budget() {
        let config = RealtimeConfig::new("test-key");
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.attach_timeout, Duration::from_secs(10));
        assert_eq!(config.publish_timeout, Duration::from_secs(10));
        assert_eq!(config.liveness_interval, Duration::from_secs(30));
        assert_eq!(config.catch_up, CatchUp::FullRefetch);
        assert_eq!(config.reconnect.max_attempts, 3);
    }
}
