//! Prediction and model-registry data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// Outcome of scoring one feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Positive-class (fraud) probability in `[0, 1]`
    pub probability: f64,

    /// True when the probability strictly exceeds the decision threshold
    pub predicted_class: bool,

    /// Distance from the decision midpoint, rescaled to `[0, 1]`
    pub confidence: f64,
}

impl Score {
    /// Derive the classification from a raw probability. The class flips
    /// only when the probability strictly exceeds the threshold, and
    /// confidence is `2 * |p - 0.5|` regardless of the threshold in use.
    pub fn new(probability: f64, threshold: f64) -> Self {
        Self {
            probability,
            predicted_class: probability > threshold,
            confidence: 2.0 * (probability - 0.5).abs(),
        }
    }
}

/// What the caller of an ingestion gets back for the scoring stage.
///
/// Carries the computed score even when no active model existed to
/// persist it under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Id of the transaction this score belongs to
    pub transaction_id: i64,

    /// Positive-class probability
    pub fraud_probability: f64,

    /// Thresholded classification
    pub is_fraud: bool,

    /// Confidence in the classification
    pub confidence: f64,

    /// When the score was computed
    pub prediction_time: DateTime<Utc>,
}

/// Payload for persisting a prediction under a registered model.
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub transaction_id: i64,
    pub model_id: i64,
    pub fraud_probability: f64,
    pub prediction_threshold: f64,
    pub predicted_class: bool,
    /// Feature names in the order they were fed to the model
    pub features_used: Vec<String>,
    /// Model explanation payload, e.g. `{"importance": {...}}`
    pub explanation: serde_json::Value,
}

/// A prediction row as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PredictionRecord {
    pub prediction_id: i64,
    pub transaction_id: i64,
    pub model_id: i64,
    pub fraud_probability: f64,
    pub prediction_threshold: f64,
    pub predicted_class: bool,
    pub features_used: Json<Vec<String>>,
    pub explanation: Json<serde_json::Value>,
    pub prediction_time: DateTime<Utc>,
}

/// A model-registry row. At most one row is active at a time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MlModelRecord {
    pub model_id: i64,
    pub model_name: String,
    pub description: Option<String>,
    pub performance_metrics: Json<serde_json::Value>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregates over the transactions table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStats {
    pub total_transactions: i64,
    /// Transactions labelled fraudulent; unlabelled rows do not count
    pub fraud_count: i64,
    /// `fraud_count / total_transactions`, 0 when the table is empty
    pub fraud_rate: f64,
    pub average_transaction_amount: f64,
    pub total_amount: f64,
    pub fraud_amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_threshold_is_strict() {
        let at_threshold = Score::new(0.5, 0.5);
        assert!(!at_threshold.predicted_class);
        assert_eq!(at_threshold.confidence, 0.0);

        let above = Score::new(0.51, 0.5);
        assert!(above.predicted_class);

        let below = Score::new(0.49, 0.5);
        assert!(!below.predicted_class);
    }

    #[test]
    fn test_score_confidence_grows_from_midpoint() {
        assert!((Score::new(0.9, 0.5).confidence - 0.8).abs() < 1e-12);
        assert!((Score::new(0.1, 0.5).confidence - 0.8).abs() < 1e-12);
        assert!((Score::new(1.0, 0.5).confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_score_custom_threshold_keeps_confidence_midpoint() {
        // Threshold moves the class boundary, not the confidence formula.
        let score = Score::new(0.6, 0.7);
        assert!(!score.predicted_class);
        assert!((score.confidence - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_prediction_response_serialization() {
        let response = PredictionResponse {
            transaction_id: 7,
            fraud_probability: 0.91,
            is_fraud: true,
            confidence: 0.82,
            prediction_time: Utc::now(),
        };

        let json = serde_json::to_string(&response).unwrap();
        let back: PredictionResponse = serde_json::from_str(&json).unwrap();

        assert_eq!(back.transaction_id, 7);
        assert_eq!(back.fraud_probability, 0.91);
        assert!(back.is_fraud);
    }
}
