//! Fraud Ingestion Pipeline Library
//!
//! Real-time ingestion and scoring of card transactions: one durable
//! database write per transaction, best-effort archive and event
//! fan-out, forest-based fraud scoring with hot-swappable artifacts,
//! and a verification consumer that reconciles the event queue against
//! the database.

pub mod archive;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod producer;
pub mod store;
pub mod types;
pub mod verifier;

pub use archive::ArchiveStore;
pub use config::AppConfig;
pub use error::{IngestError, Result, ScoreError, SideEffectError};
pub use model::{ArtifactLoader, Scorer, ScoringPair};
pub use pipeline::{IngestOutcome, Pipeline};
pub use producer::EventProducer;
pub use store::TransactionStore;
pub use types::{FeatureVector, PredictionResponse, TransactionEnvelope, TransactionRecord};
pub use verifier::VerificationConsumer;
