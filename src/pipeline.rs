//! Ingestion orchestrator.
//!
//! [`Pipeline::ingest`] runs the staged flow for one submitted feature
//! vector: validate, persist (authoritative), archive (best effort),
//! publish (best effort), score against the persisted id, then persist
//! the prediction when a model version is active. The database write is
//! the only stage allowed to abort the request once validation passes;
//! archive and publish failures are absorbed here, and a scoring failure
//! surfaces with the already-stored transaction id so callers know the
//! row exists.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::archive::ArchiveStore;
use crate::config::AppConfig;
use crate::error::{IngestError, Result, ScoreError};
use crate::metrics::PipelineMetrics;
use crate::model::{ArtifactLoader, Scorer};
use crate::producer::EventProducer;
use crate::store::TransactionStore;
use crate::types::{
    FeatureVector, NewPrediction, PredictionResponse, TransactionEnvelope, TransactionRecord,
    FEATURE_NAMES,
};

/// Everything one accepted ingestion produced.
#[derive(Debug)]
pub struct IngestOutcome {
    /// The stored transaction row
    pub transaction: TransactionRecord,
    /// The computed score, persisted or not
    pub prediction: PredictionResponse,
    /// Set when the score was persisted under the active model
    pub prediction_id: Option<i64>,
    /// Archive object key when the archive write went through
    pub archive_key: Option<String>,
    /// Whether the event reached the durable queue
    pub event_published: bool,
}

/// The ingestion pipeline. All collaborators are injected once at
/// construction and shared through `Arc`s.
pub struct Pipeline {
    store: Arc<TransactionStore>,
    archive: Arc<ArchiveStore>,
    producer: Arc<EventProducer>,
    scorer: Arc<Scorer>,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    pub fn new(
        store: Arc<TransactionStore>,
        archive: Arc<ArchiveStore>,
        producer: Arc<EventProducer>,
        scorer: Arc<Scorer>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            store,
            archive,
            producer,
            scorer,
            metrics,
        }
    }

    /// Wire a pipeline from configuration: open the database, build the
    /// side-effect clients and try to load scoring artifacts. A failed
    /// artifact load leaves the scorer unavailable rather than failing
    /// construction; ingestion then persists but refuses to score.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let store = Arc::new(TransactionStore::connect(&config.database).await?);
        let archive = Arc::new(ArchiveStore::new(&config.object_store)?);
        let producer = Arc::new(EventProducer::new(&config.queue));

        let loader = ArtifactLoader::new(&config.object_store, &config.model)?;
        let scorer = match loader.load().await {
            Ok(pair) => Arc::new(Scorer::new(pair, config.model.threshold)),
            Err(e) => {
                warn!(
                    error = %e,
                    "Starting without scoring artifacts; requests will fail fast at the scoring stage"
                );
                Arc::new(Scorer::unavailable(config.model.threshold))
            }
        };

        Ok(Self::new(
            store,
            archive,
            producer,
            scorer,
            Arc::new(PipelineMetrics::new()),
        ))
    }

    /// Fetch fresh artifacts and swap them in atomically. In-flight
    /// requests keep scoring against the pair they already hold.
    pub async fn reload_model(&self, loader: &ArtifactLoader) -> std::result::Result<(), ScoreError> {
        let pair = loader.load().await?;
        let name = pair.model.model_name.clone();
        self.scorer.install(pair)?;
        info!(model = %name, "Scoring artifacts reloaded");
        Ok(())
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    pub fn archive_store(&self) -> &ArchiveStore {
        &self.archive
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Ingest one feature vector end to end.
    pub async fn ingest(&self, features: &FeatureVector) -> Result<IngestOutcome> {
        let started = Instant::now();
        features.validate()?;

        // Authoritative write. Nothing else runs if this fails.
        let transaction = self.store.persist_transaction(features, "api").await?;
        let transaction_id = transaction.transaction_id;
        let envelope = TransactionEnvelope::new(transaction_id, features.clone());

        let archive_key = match self.archive.archive(&envelope).await {
            Ok(key) => Some(key),
            Err(e) => {
                self.metrics.record_archive_failure();
                warn!(
                    transaction_id,
                    error = %e,
                    "Archive write failed; transaction continues"
                );
                None
            }
        };

        let event_published = match self.producer.publish(&envelope).await {
            Ok(()) => true,
            Err(e) => {
                self.metrics.record_publish_failure();
                warn!(
                    transaction_id,
                    error = %e,
                    "Event publish failed; transaction continues"
                );
                false
            }
        };

        // Score exactly the row we just wrote. The transaction stays put
        // on failure; the error carries its id.
        let score = match self.scorer.score(features) {
            Ok(score) => score,
            Err(source) => {
                self.metrics.record_scoring_failure();
                return Err(IngestError::ScoringFailed {
                    transaction_id,
                    source,
                });
            }
        };
        let prediction_time = Utc::now();

        // The score is only persisted when a model version is active;
        // the response carries it either way.
        let prediction_id = match self.store.active_model().await {
            Ok(Some(model)) => {
                let new_prediction = NewPrediction {
                    transaction_id,
                    model_id: model.model_id,
                    fraud_probability: score.probability,
                    prediction_threshold: self.scorer.threshold(),
                    predicted_class: score.predicted_class,
                    features_used: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
                    explanation: self.scorer.explanation(),
                };
                match self.store.persist_prediction(&new_prediction).await {
                    Ok(id) => {
                        self.metrics.record_prediction_persisted();
                        Some(id)
                    }
                    Err(e) => {
                        warn!(
                            transaction_id,
                            error = %e,
                            "Prediction persist failed; response keeps the computed score"
                        );
                        None
                    }
                }
            }
            Ok(None) => {
                debug!(transaction_id, "No active model registered; score not persisted");
                None
            }
            Err(e) => {
                warn!(
                    transaction_id,
                    error = %e,
                    "Active model lookup failed; score not persisted"
                );
                None
            }
        };

        self.metrics.record_ingest(started.elapsed(), &score);
        info!(
            transaction_id,
            fraud_probability = score.probability,
            is_fraud = score.predicted_class,
            confidence = score.confidence,
            "Transaction ingested"
        );

        Ok(IngestOutcome {
            prediction: PredictionResponse {
                transaction_id,
                fraud_probability: score.probability,
                is_fraud: score.predicted_class,
                confidence: score.confidence,
                prediction_time,
            },
            transaction,
            prediction_id,
            archive_key,
            event_published,
        })
    }
}

// End-to-end behavior is covered in tests/pipeline_tests.rs against a
// real temporary database.
