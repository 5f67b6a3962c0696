use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

use crate::connection::{DEFAULT_STREAM_URL, StreamConfig};
use crate::poller::PollerConfig;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Stream endpoint for push delivery.
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// Base URL of the pull API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Pull cadence in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Base reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Reconnect attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Where to persist the active alert set. Absent means in-memory only.
    pub storage_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream_url: default_stream_url(),
            api_url: default_api_url(),
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            storage_path: None,
        }
    }
}

impl Config {
    pub fn stream(&self) -> StreamConfig {
        StreamConfig {
            url: self.stream_url.clone(),
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            api_url: self.api_url.clone(),
            interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

fn default_stream_url() -> String {
    DEFAULT_STREAM_URL.to_string()
}

fn default_api_url() -> String {
    String::from("http://localhost:8080")
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_fields() {
        let config: Config = serde_json::from_str(r#"{"api_url": "http://backend:9000"}"#).unwrap();

        assert_eq!(config.api_url, "http://backend:9000");
        assert_eq!(config.stream_url, DEFAULT_STREAM_URL);
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.max_reconnect_attempts, 10);
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn converts_into_component_configs() {
        let config = Config::default();

        let stream = config.stream();
        assert_eq!(stream.base_delay, Duration::from_millis(1000));
        assert_eq!(stream.max_attempts, 10);

        let poller = config.poller();
        assert_eq!(poller.interval, Duration::from_millis(2000));
    }
}
