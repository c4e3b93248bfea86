//! Best-effort raw transaction archive.
//!
//! Accepted transactions are mirrored as JSON objects into an
//! S3-compatible store, partitioned by ingest date so downstream batch
//! jobs can prune by prefix. Requests use plain path-style HTTP against
//! the configured endpoint. Archive failures are reported to the caller
//! as values and never affect the authoritative database write.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

use crate::config::ObjectStoreConfig;
use crate::error::{IngestError, SideEffectError};
use crate::types::TransactionEnvelope;

/// Client for the raw-archive bucket.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
}

impl ArchiveStore {
    pub fn new(config: &ObjectStoreConfig) -> Result<Self, IngestError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IngestError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
        })
    }

    /// Deterministic object key: `raw/transactions/date=YYYY-MM-DD/<id>.json`,
    /// dated by the ingest timestamp.
    pub fn key_for(timestamp: &DateTime<Utc>, transaction_id: i64) -> String {
        format!(
            "raw/transactions/date={}/{}.json",
            timestamp.format("%Y-%m-%d"),
            transaction_id
        )
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    /// Write one envelope to the archive and return the object key.
    pub async fn archive(
        &self,
        envelope: &TransactionEnvelope,
    ) -> Result<String, SideEffectError> {
        let key = Self::key_for(&envelope.timestamp, envelope.transaction_id);
        let body = serde_json::to_vec(envelope)
            .map_err(|e| SideEffectError::Archive(format!("serialize {key}: {e}")))?;

        let response = self
            .http
            .put(self.url_for(&key))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| SideEffectError::Archive(format!("PUT {key}: {e}")))?;

        if !response.status().is_success() {
            return Err(SideEffectError::Archive(format!(
                "PUT {key}: status {}",
                response.status()
            )));
        }

        debug!(key = %key, transaction_id = envelope.transaction_id, "Raw transaction archived");
        Ok(key)
    }

    /// Read one archived envelope back by key.
    pub async fn fetch(&self, key: &str) -> Result<TransactionEnvelope, SideEffectError> {
        let response = self
            .http
            .get(self.url_for(key))
            .send()
            .await
            .map_err(|e| SideEffectError::Archive(format!("GET {key}: {e}")))?;

        if !response.status().is_success() {
            return Err(SideEffectError::Archive(format!(
                "GET {key}: status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SideEffectError::Archive(format!("GET {key}: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SideEffectError::Archive(format!("decode {key}: {e}")))
    }
}
