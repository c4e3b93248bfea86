//! Configuration management for the fraud ingestion pipeline

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// SQLite database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the database file; parent directories are created on connect
    #[serde(default = "default_database_path")]
    pub path: String,
    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a writer waits on a locked database before erroring
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// S3-compatible object store configuration (archive and model artifacts)
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreConfig {
    /// Endpoint base URL, e.g. a local MinIO instance
    #[serde(default = "default_store_endpoint")]
    pub endpoint: String,
    /// Bucket holding raw archives and model artifacts
    #[serde(default = "default_store_bucket")]
    pub bucket: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

/// Event queue configuration (NATS JetStream)
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Broker URL
    #[serde(default = "default_queue_url")]
    pub url: String,
    /// Durable stream backing the transaction events
    #[serde(default = "default_queue_stream")]
    pub stream: String,
    /// Subject transaction events are published under
    #[serde(default = "default_queue_subject")]
    pub subject: String,
    /// Durable consumer name for the verification service
    #[serde(default = "default_durable_name")]
    pub durable_name: String,
    /// Upper bound on unacknowledged deliveries held by the consumer
    #[serde(default = "default_max_ack_pending")]
    pub max_ack_pending: i64,
    /// Publish timeout in milliseconds, broker ack included
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    /// Redelivery delay requested when a message is requeued
    #[serde(default = "default_nak_delay_ms")]
    pub nak_delay_ms: u64,
}

/// Scoring model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Local directory tried when the object store has no artifacts
    #[serde(default = "default_model_dir")]
    pub local_dir: String,
    /// Decision threshold; probabilities strictly above it classify as fraud
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_database_path() -> String {
    "data/fraud.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_store_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_store_bucket() -> String {
    "fraud-transactions".to_string()
}

fn default_store_timeout_secs() -> u64 {
    10
}

fn default_queue_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_queue_stream() -> String {
    "TRANSACTIONS".to_string()
}

fn default_queue_subject() -> String {
    "transactions.ingested".to_string()
}

fn default_durable_name() -> String {
    "transaction-verifier".to_string()
}

fn default_max_ack_pending() -> i64 {
    64
}

fn default_publish_timeout_ms() -> u64 {
    5000
}

fn default_nak_delay_ms() -> u64 {
    5000
}

fn default_model_dir() -> String {
    "models".to_string()
}

fn default_threshold() -> f64 {
    0.5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            object_store: ObjectStoreConfig::default(),
            queue: QueueConfig::default(),
            model: ModelConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_store_endpoint(),
            bucket: default_store_bucket(),
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: default_queue_url(),
            stream: default_queue_stream(),
            subject: default_queue_subject(),
            durable_name: default_durable_name(),
            max_ack_pending: default_max_ack_pending(),
            publish_timeout_ms: default_publish_timeout_ms(),
            nak_delay_ms: default_nak_delay_ms(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            local_dir: default_model_dir(),
            threshold: default_threshold(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.queue.url, "nats://localhost:4222");
        assert_eq!(config.queue.subject, "transactions.ingested");
        assert_eq!(config.model.threshold, 0.5);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.object_store.bucket, "fraud-transactions");
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "[model]\nthreshold = 0.7\n\n[queue]\nstream = \"TXN_EVENTS\"\n"
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.model.threshold, 0.7);
        assert_eq!(config.queue.stream, "TXN_EVENTS");
        // Untouched sections keep their defaults.
        assert_eq!(config.queue.durable_name, "transaction-verifier");
        assert_eq!(config.database.path, "data/fraud.db");
    }
}
