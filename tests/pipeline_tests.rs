//! End-to-end pipeline tests against a temporary database.
//!
//! The object store and broker endpoints point at a port nothing listens
//! on, which exercises the best-effort contract: ingestion must succeed
//! with both side effects failing. Scoring uses the artifacts under
//! testdata/, which classify the two known reference rows.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use fraud_ingest::archive::ArchiveStore;
use fraud_ingest::config::{
    AppConfig, DatabaseConfig, ModelConfig, ObjectStoreConfig, QueueConfig,
};
use fraud_ingest::metrics::PipelineMetrics;
use fraud_ingest::model::{ArtifactLoader, Scorer};
use fraud_ingest::producer::EventProducer;
use fraud_ingest::store::TransactionStore;
use fraud_ingest::types::{FeatureVector, TransactionEnvelope, FEATURE_NAMES};
use fraud_ingest::verifier::{assess, Verdict};
use fraud_ingest::{IngestError, Pipeline};

/// Config with unreachable side-effect endpoints and local artifacts.
fn test_config(dir: &Path) -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            path: dir.join("pipeline.db").to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        },
        object_store: ObjectStoreConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            bucket: "fraud-transactions".to_string(),
            timeout_secs: 1,
        },
        queue: QueueConfig {
            url: "nats://127.0.0.1:1".to_string(),
            publish_timeout_ms: 300,
            ..QueueConfig::default()
        },
        model: ModelConfig {
            local_dir: "testdata".to_string(),
            threshold: 0.5,
        },
        ..AppConfig::default()
    }
}

fn vector_from(pairs: &[(&str, f64)]) -> FeatureVector {
    let named: HashMap<String, f64> = pairs
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect();
    FeatureVector::from_named(&named)
}

/// First row of the reference dataset; a legitimate purchase.
fn known_legitimate() -> FeatureVector {
    vector_from(&[
        ("time", 0.0),
        ("v1", -1.359807),
        ("v2", -0.072781),
        ("v3", 2.536347),
        ("v4", 1.378155),
        ("v5", -0.338321),
        ("v6", 0.462388),
        ("v7", 0.239599),
        ("v8", 0.098698),
        ("v9", 0.363787),
        ("v10", 0.090794),
        ("v11", -0.551600),
        ("v12", -0.617801),
        ("v13", -0.991390),
        ("v14", -0.311169),
        ("v15", 1.468177),
        ("v16", -0.470401),
        ("v17", 0.207971),
        ("v18", 0.025791),
        ("v19", 0.403993),
        ("v20", 0.251412),
        ("v21", -0.018307),
        ("v22", 0.277838),
        ("v23", -0.110474),
        ("v24", 0.066928),
        ("v25", 0.128539),
        ("v26", -0.189115),
        ("v27", 0.133558),
        ("v28", -0.021053),
        ("amount", 149.62),
    ])
}

/// A confirmed fraud row from the reference dataset.
fn known_fraud() -> FeatureVector {
    vector_from(&[
        ("time", 406.0),
        ("v1", -2.312227),
        ("v2", 1.951992),
        ("v3", -1.609851),
        ("v4", 3.997906),
        ("v5", -0.522188),
        ("v6", -1.426545),
        ("v7", -2.537387),
        ("v8", 1.391657),
        ("v9", -2.770089),
        ("v10", -2.772272),
        ("v11", 3.202033),
        ("v12", -2.899907),
        ("v13", -0.595222),
        ("v14", -4.289254),
        ("v15", 0.389724),
        ("v16", -1.140747),
        ("v17", -2.830056),
        ("v18", -0.016822),
        ("v19", 0.416956),
        ("v20", 0.126911),
        ("v21", 0.517232),
        ("v22", -0.035049),
        ("v23", -0.465211),
        ("v24", 0.320198),
        ("v25", 0.044519),
        ("v26", 0.177840),
        ("v27", 0.261145),
        ("v28", -0.143276),
        ("amount", 0.0),
    ])
}

#[tokio::test]
async fn ingest_scores_known_samples() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::connect(&test_config(dir.path())).await.unwrap();
    assert!(pipeline.scorer().is_available());

    let legit = pipeline.ingest(&known_legitimate()).await.unwrap();
    assert!(!legit.prediction.is_fraud);
    assert!(legit.prediction.fraud_probability < 0.5);
    assert!((legit.prediction.fraud_probability - 0.0575).abs() < 1e-9);
    assert!((legit.prediction.confidence - 0.885).abs() < 1e-9);

    let fraud = pipeline.ingest(&known_fraud()).await.unwrap();
    assert!(fraud.prediction.is_fraud);
    assert!(fraud.prediction.fraud_probability > 0.5);
    assert!((fraud.prediction.fraud_probability - 0.91).abs() < 1e-9);
    assert!((fraud.prediction.confidence - 0.82).abs() < 1e-9);

    // Both rows are durably stored with their own ids.
    assert_ne!(
        legit.prediction.transaction_id,
        fraud.prediction.transaction_id
    );
    let stored = pipeline
        .store()
        .transaction(legit.prediction.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert!((stored.features.amount - 149.62).abs() < 1e-9);

    let metrics = pipeline.metrics();
    assert_eq!(metrics.transactions_ingested.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.fraud_flagged.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn side_effect_failures_do_not_block_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::connect(&test_config(dir.path())).await.unwrap();

    // Nothing listens on the archive or broker endpoints, so both
    // best-effort stages fail. The ingestion still succeeds.
    let outcome = pipeline.ingest(&known_legitimate()).await.unwrap();
    assert!(outcome.archive_key.is_none());
    assert!(!outcome.event_published);

    assert!(pipeline
        .store()
        .transaction_exists(outcome.prediction.transaction_id)
        .await
        .unwrap());

    let metrics = pipeline.metrics();
    assert_eq!(metrics.archive_failures.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.publish_failures.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn invalid_vectors_are_rejected_before_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::connect(&test_config(dir.path())).await.unwrap();

    let mut bad = known_legitimate();
    bad.v7 = f64::NAN;
    let err = pipeline.ingest(&bad).await.unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));

    let mut negative = known_legitimate();
    negative.amount = -5.0;
    assert!(matches!(
        pipeline.ingest(&negative).await.unwrap_err(),
        IngestError::Validation(_)
    ));

    // Nothing reached the database.
    let stats = pipeline.store().transaction_stats().await.unwrap();
    assert_eq!(stats.total_transactions, 0);
}

#[tokio::test]
async fn scoring_failure_keeps_transaction_and_reports_id() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let store = Arc::new(TransactionStore::connect(&config.database).await.unwrap());
    let archive = Arc::new(ArchiveStore::new(&config.object_store).unwrap());
    let producer = Arc::new(EventProducer::new(&config.queue));
    let metrics = Arc::new(PipelineMetrics::new());
    let pipeline = Pipeline::new(
        store.clone(),
        archive,
        producer,
        Arc::new(Scorer::unavailable(config.model.threshold)),
        metrics.clone(),
    );

    let err = pipeline.ingest(&known_legitimate()).await.unwrap_err();
    let transaction_id = match err {
        IngestError::ScoringFailed { transaction_id, .. } => transaction_id,
        other => panic!("expected a scoring failure, got {other}"),
    };

    // The transaction survived the scoring failure.
    assert!(store.transaction_exists(transaction_id).await.unwrap());
    assert_eq!(metrics.scoring_failures.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn predictions_persist_only_under_active_model() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::connect(&test_config(dir.path())).await.unwrap();
    let store = pipeline.store();

    // No model registered: the response carries a score, nothing is
    // persisted for it.
    let unpersisted = pipeline.ingest(&known_fraud()).await.unwrap();
    assert!(unpersisted.prediction_id.is_none());
    assert!(unpersisted.prediction.is_fraud);
    assert!(store
        .predictions_for(unpersisted.prediction.transaction_id)
        .await
        .unwrap()
        .is_empty());

    let model_id = store
        .register_model("random_forest", None, serde_json::json!({"auc": 0.97}))
        .await
        .unwrap();
    store.activate_model(model_id).await.unwrap();

    let persisted = pipeline.ingest(&known_fraud()).await.unwrap();
    let prediction_id = persisted.prediction_id.unwrap();

    let rows = store
        .predictions_for(persisted.prediction.transaction_id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.prediction_id, prediction_id);
    assert_eq!(row.model_id, model_id);
    assert_eq!(row.transaction_id, persisted.prediction.transaction_id);
    assert!(row.predicted_class);
    assert!((row.fraud_probability - 0.91).abs() < 1e-9);
    assert_eq!(row.prediction_threshold, 0.5);
    assert_eq!(row.features_used.0.len(), FEATURE_NAMES.len());
    assert_eq!(row.features_used.0[0], "time");
    assert_eq!(row.features_used.0[29], "amount");
    assert!(row.explanation.0["importance"]["v14"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn active_model_switch_retargets_new_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::connect(&test_config(dir.path())).await.unwrap();
    let store = pipeline.store();

    let first = store
        .register_model("forest_v1", None, serde_json::json!({}))
        .await
        .unwrap();
    let second = store
        .register_model("forest_v2", None, serde_json::json!({}))
        .await
        .unwrap();

    store.activate_model(first).await.unwrap();
    let under_first = pipeline.ingest(&known_legitimate()).await.unwrap();

    store.activate_model(second).await.unwrap();
    let under_second = pipeline.ingest(&known_legitimate()).await.unwrap();

    let first_rows = store
        .predictions_for(under_first.prediction.transaction_id)
        .await
        .unwrap();
    let second_rows = store
        .predictions_for(under_second.prediction.transaction_id)
        .await
        .unwrap();
    assert_eq!(first_rows[0].model_id, first);
    assert_eq!(second_rows[0].model_id, second);
}

#[tokio::test]
async fn concurrent_ingestion_yields_unique_linked_ids() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Arc::new(Pipeline::connect(&test_config(dir.path())).await.unwrap());
    let store = pipeline.store();

    let model_id = store
        .register_model("random_forest", None, serde_json::json!({}))
        .await
        .unwrap();
    store.activate_model(model_id).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            let vector = if i % 2 == 0 {
                known_legitimate()
            } else {
                known_fraud()
            };
            pipeline.ingest(&vector).await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        // The response and the stored rows reference the same id.
        assert_eq!(
            outcome.prediction.transaction_id,
            outcome.transaction.transaction_id
        );
        ids.push(outcome.prediction.transaction_id);
    }

    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 16, "transaction ids must be unique");

    // Every prediction landed on its own transaction.
    for id in &ids {
        let rows = pipeline.store().predictions_for(*id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].transaction_id, *id);
    }

    let stats = pipeline.store().transaction_stats().await.unwrap();
    assert_eq!(stats.total_transactions, 16);
}

#[tokio::test]
async fn pagination_walks_insertion_order() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::connect(&test_config(dir.path())).await.unwrap();

    let mut expected = Vec::new();
    for _ in 0..5 {
        let outcome = pipeline.ingest(&known_legitimate()).await.unwrap();
        expected.push(outcome.prediction.transaction_id);
    }

    let store = pipeline.store();
    let first = store.transactions(2, 0).await.unwrap();
    let second = store.transactions(2, 2).await.unwrap();
    let tail = store.transactions(2, 4).await.unwrap();

    let walked: Vec<i64> = first
        .iter()
        .chain(&second)
        .chain(&tail)
        .map(|record| record.transaction_id)
        .collect();
    assert_eq!(walked, expected);
}

#[tokio::test]
async fn published_event_payload_verifies_against_store() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::connect(&test_config(dir.path())).await.unwrap();
    let store = pipeline.store();

    let outcome = pipeline.ingest(&known_fraud()).await.unwrap();

    // The producer publishes exactly this envelope shape.
    let envelope = TransactionEnvelope::new(
        outcome.prediction.transaction_id,
        outcome.transaction.features.clone(),
    );
    let payload = serde_json::to_vec(&envelope).unwrap();

    assert_eq!(
        assess(store, &payload).await,
        Verdict::Confirmed(outcome.prediction.transaction_id)
    );

    // An event for a transaction that never committed is flagged, not
    // retried forever.
    let ghost = TransactionEnvelope::new(999_999, outcome.transaction.features.clone());
    let ghost_payload = serde_json::to_vec(&ghost).unwrap();
    assert_eq!(assess(store, &ghost_payload).await, Verdict::Missing(999_999));
}

#[tokio::test]
async fn model_reload_swaps_artifacts_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let pipeline = Pipeline::connect(&config).await.unwrap();

    let loader = ArtifactLoader::new(&config.object_store, &config.model).unwrap();
    pipeline.reload_model(&loader).await.unwrap();

    assert!(pipeline.scorer().is_available());
    assert_eq!(
        pipeline.scorer().model_name().as_deref(),
        Some("random_forest")
    );

    // Scoring still behaves after the swap.
    let outcome = pipeline.ingest(&known_fraud()).await.unwrap();
    assert!(outcome.prediction.is_fraud);
}
