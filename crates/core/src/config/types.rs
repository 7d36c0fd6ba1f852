use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::encoder::EncoderConfig;
use crate::events::NotifierConfig;
use crate::failure::RetryConfig;
use crate::queue::{DatabaseConfig, QueueConfig};
use crate::worker::WorkerConfig;

/// Root configuration. Every section has defaults, so an empty file is valid.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Log output configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

/// Sanitized config for API responses (webhook query string hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
    pub encoder: EncoderConfig,
    pub notifier: SanitizedNotifierConfig,
    pub logging: LoggingConfig,
}

/// Sanitized notifier config. Webhook URLs often carry tokens in the query.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedNotifierConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

fn redact_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?<redacted>", base),
        None => url.to_string(),
    }
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            queue: config.queue.clone(),
            worker: config.worker.clone(),
            retry: config.retry.clone(),
            encoder: config.encoder.clone(),
            notifier: SanitizedNotifierConfig {
                webhook_url: config.notifier.webhook_url.as_deref().map(redact_query),
                timeout_secs: config.notifier.timeout_secs,
            },
            logging: config.logging.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "reelpress.db");
        assert_eq!(config.worker.concurrency, 1);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.queue.visibility_timeout_secs, 300);
        assert!(config.notifier.webhook_url.is_none());
        assert!(!config.logging.json);
    }

    #[test]
    fn test_deserialize_sections() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[worker]
concurrency = 4
max_encode_secs = 600

[retry]
max_attempts = 5
initial_delay_secs = 10

[encoder]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
max_video_bitrate_kbps = 4000

[logging]
json = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.worker.max_encode_secs, 600);
        assert_eq!(config.worker.shutdown_timeout_secs, 30);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.output_write_max_attempts, 2);
        assert_eq!(config.encoder.ffmpeg_path.to_str().unwrap(), "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.encoder.max_video_bitrate_kbps, 4000);
        assert!(config.logging.json);
    }

    #[test]
    fn test_sanitized_config_hides_webhook_query() {
        let mut config = Config::default();
        config.notifier.webhook_url =
            Some("https://hooks.example.com/reelpress?token=secret".to_string());

        let sanitized = SanitizedConfig::from(&config);
        let url = sanitized.notifier.webhook_url.unwrap();
        assert_eq!(url, "https://hooks.example.com/reelpress?<redacted>");
        assert!(!url.contains("secret"));
    }

    #[test]
    fn test_sanitized_config_without_webhook() {
        let sanitized = SanitizedConfig::from(&Config::default());
        let json = serde_json::to_value(&sanitized).unwrap();
        assert!(json["notifier"].get("webhook_url").is_none());
        assert_eq!(json["server"]["port"], 8080);
    }
}
