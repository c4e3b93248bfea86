//! Type definitions for the fraud ingestion pipeline

pub mod prediction;
pub mod transaction;

pub use prediction::{
    MlModelRecord, NewPrediction, PredictionRecord, PredictionResponse, Score, TransactionStats,
};
pub use transaction::{FeatureVector, TransactionEnvelope, TransactionRecord, FEATURE_NAMES};
