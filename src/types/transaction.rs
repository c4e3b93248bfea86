//! Transaction data structures for credit card fraud detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::IngestError;

/// Canonical feature order. Scoring, persistence and the `features_used`
/// audit column all follow this order.
pub const FEATURE_NAMES: [&str; 30] = [
    "time", "v1", "v2", "v3", "v4", "v5", "v6", "v7", "v8", "v9", "v10", "v11", "v12", "v13",
    "v14", "v15", "v16", "v17", "v18", "v19", "v20", "v21", "v22", "v23", "v24", "v25", "v26",
    "v27", "v28", "amount",
];

/// A transaction feature vector submitted for fraud analysis.
///
/// The shape follows the PCA-transformed card transaction datasets: elapsed
/// time, 28 anonymized components and the raw amount. Aliases accept the
/// upper-case column headers those datasets ship with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeatureVector {
    /// Seconds elapsed since the first transaction in the feed
    #[serde(alias = "Time")]
    pub time: f64,

    /// PCA component 1
    #[serde(alias = "V1")]
    pub v1: f64,

    /// PCA component 2
    #[serde(alias = "V2")]
    pub v2: f64,

    /// PCA component 3
    #[serde(alias = "V3")]
    pub v3: f64,

    /// PCA component 4
    #[serde(alias = "V4")]
    pub v4: f64,

    /// PCA component 5
    #[serde(alias = "V5")]
    pub v5: f64,

    /// PCA component 6
    #[serde(alias = "V6")]
    pub v6: f64,

    /// PCA component 7
    #[serde(alias = "V7")]
    pub v7: f64,

    /// PCA component 8
    #[serde(alias = "V8")]
    pub v8: f64,

    /// PCA component 9
    #[serde(alias = "V9")]
    pub v9: f64,

    /// PCA component 10
    #[serde(alias = "V10")]
    pub v10: f64,

    /// PCA component 11
    #[serde(alias = "V11")]
    pub v11: f64,

    /// PCA component 12
    #[serde(alias = "V12")]
    pub v12: f64,

    /// PCA component 13
    #[serde(alias = "V13")]
    pub v13: f64,

    /// PCA component 14
    #[serde(alias = "V14")]
    pub v14: f64,

    /// PCA component 15
    #[serde(alias = "V15")]
    pub v15: f64,

    /// PCA component 16
    #[serde(alias = "V16")]
    pub v16: f64,

    /// PCA component 17
    #[serde(alias = "V17")]
    pub v17: f64,

    /// PCA component 18
    #[serde(alias = "V18")]
    pub v18: f64,

    /// PCA component 19
    #[serde(alias = "V19")]
    pub v19: f64,

    /// PCA component 20
    #[serde(alias = "V20")]
    pub v20: f64,

    /// PCA component 21
    #[serde(alias = "V21")]
    pub v21: f64,

    /// PCA component 22
    #[serde(alias = "V22")]
    pub v22: f64,

    /// PCA component 23
    #[serde(alias = "V23")]
    pub v23: f64,

    /// PCA component 24
    #[serde(alias = "V24")]
    pub v24: f64,

    /// PCA component 25
    #[serde(alias = "V25")]
    pub v25: f64,

    /// PCA component 26
    #[serde(alias = "V26")]
    pub v26: f64,

    /// PCA component 27
    #[serde(alias = "V27")]
    pub v27: f64,

    /// PCA component 28
    #[serde(alias = "V28")]
    pub v28: f64,

    /// Transaction amount
    #[serde(alias = "Amount")]
    pub amount: f64,
}

impl FeatureVector {
    /// Build a vector from named features. Missing names default to 0.0,
    /// so partial ingestion sources still produce a scoreable vector.
    /// Names use the canonical lower-case form from [`FEATURE_NAMES`].
    pub fn from_named(features: &HashMap<String, f64>) -> Self {
        let get = |name: &str| features.get(name).copied().unwrap_or(0.0);
        Self {
            time: get("time"),
            v1: get("v1"),
            v2: get("v2"),
            v3: get("v3"),
            v4: get("v4"),
            v5: get("v5"),
            v6: get("v6"),
            v7: get("v7"),
            v8: get("v8"),
            v9: get("v9"),
            v10: get("v10"),
            v11: get("v11"),
            v12: get("v12"),
            v13: get("v13"),
            v14: get("v14"),
            v15: get("v15"),
            v16: get("v16"),
            v17: get("v17"),
            v18: get("v18"),
            v19: get("v19"),
            v20: get("v20"),
            v21: get("v21"),
            v22: get("v22"),
            v23: get("v23"),
            v24: get("v24"),
            v25: get("v25"),
            v26: get("v26"),
            v27: get("v27"),
            v28: get("v28"),
            amount: get("amount"),
        }
    }

    /// Features in canonical order, ready for scaling and tree traversal.
    pub fn as_array(&self) -> [f64; 30] {
        [
            self.time, self.v1, self.v2, self.v3, self.v4, self.v5, self.v6, self.v7, self.v8,
            self.v9, self.v10, self.v11, self.v12, self.v13, self.v14, self.v15, self.v16,
            self.v17, self.v18, self.v19, self.v20, self.v21, self.v22, self.v23, self.v24,
            self.v25, self.v26, self.v27, self.v28, self.amount,
        ]
    }

    /// Reject vectors that must never reach the database: non-finite
    /// values anywhere, or a negative amount.
    pub fn validate(&self) -> Result<(), IngestError> {
        for (name, value) in FEATURE_NAMES.iter().zip(self.as_array()) {
            if !value.is_finite() {
                return Err(IngestError::Validation(format!(
                    "feature '{name}' is not a finite number"
                )));
            }
        }
        if self.amount < 0.0 {
            return Err(IngestError::Validation(format!(
                "amount must be non-negative, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// The message shape shared by the archive object and the queue event:
/// the accepted features plus the database-assigned id and ingest time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    /// Database-assigned transaction id
    pub transaction_id: i64,

    /// The accepted feature vector
    #[serde(flatten)]
    pub features: FeatureVector,

    /// When the pipeline accepted the transaction
    pub timestamp: DateTime<Utc>,
}

impl TransactionEnvelope {
    pub fn new(transaction_id: i64, features: FeatureVector) -> Self {
        Self {
            transaction_id,
            features,
            timestamp: Utc::now(),
        }
    }
}

/// A transaction row as persisted, id and audit columns included.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionRecord {
    /// Monotonic id assigned by the database on insert
    pub transaction_id: i64,

    #[sqlx(flatten)]
    #[serde(flatten)]
    pub features: FeatureVector,

    /// Ground-truth fraud label; unset until verification backfills it
    pub is_fraud: Option<bool>,

    /// Ingestion source tag
    pub source: String,

    /// Ingest timestamp
    pub processed_at: DateTime<Utc>,
}
