//! Error types for the ingestion pipeline.
//!
//! The taxonomy separates failures that abort an ingestion from failures
//! that the pipeline absorbs. [`IngestError`] is what callers of
//! [`Pipeline::ingest`](crate::pipeline::Pipeline::ingest) see;
//! [`SideEffectError`] never crosses that boundary. It is the return type
//! of the archive and publish stages, which the pipeline logs and drops.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Failures that abort or qualify an ingestion request.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The submitted feature vector was rejected before anything was stored.
    #[error("invalid feature vector: {0}")]
    Validation(String),

    /// The authoritative database write failed. Nothing was stored.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// A lookup targeted a row that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad or unusable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem access failed (database directory, local artifacts).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The transaction was persisted but could not be scored. The id is
    /// carried so callers can tell "nothing saved" from "saved, unscored".
    #[error("transaction {transaction_id} persisted but scoring failed: {source}")]
    ScoringFailed {
        transaction_id: i64,
        #[source]
        source: ScoreError,
    },
}

/// Failures raised by the model layer.
#[derive(Error, Debug)]
pub enum ScoreError {
    /// No usable model is loaded; scoring fails fast until one is installed.
    #[error("no usable model loaded: {0}")]
    Unavailable(String),

    /// A model or scaler artifact could not be decoded or failed validation.
    #[error("bad model artifact: {0}")]
    Artifact(String),
}

/// Failures from the best-effort stages. Each stage reports its own
/// outcome; the caller decides what to do with it (the pipeline logs it).
#[derive(Error, Debug)]
pub enum SideEffectError {
    /// The archive write or read against the object store failed.
    #[error("archive store: {0}")]
    Archive(String),

    /// Publishing to or connecting to the event broker failed.
    #[error("event broker: {0}")]
    Broker(String),
}
