//! Ingestion Demo Tool
//!
//! Feeds generated transactions through the full pipeline: persistence,
//! archive and event fan-out, scoring, prediction storage. Works against
//! whatever infrastructure is reachable; archive and publish failures
//! are absorbed by the pipeline and show up in the final summary.

use fraud_ingest::{
    config::AppConfig,
    model::local_artifacts_present,
    types::FeatureVector,
    IngestError, Pipeline,
};
use rand::Rng;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Generates feature vectors shaped like the PCA card transaction data.
struct VectorGenerator {
    rng: rand::rngs::ThreadRng,
    clock: f64,
}

impl VectorGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            clock: 0.0,
        }
    }

    fn tick(&mut self) -> f64 {
        self.clock += self.rng.gen_range(1.0..30.0);
        self.clock
    }

    /// Typical legitimate transaction: components near zero, everyday amount.
    fn generate_legitimate(&mut self) -> FeatureVector {
        let mut named = std::collections::HashMap::new();
        named.insert("time".to_string(), self.tick());
        for i in 1..=28 {
            named.insert(format!("v{i}"), self.rng.gen_range(-1.0..1.0));
        }
        named.insert("amount".to_string(), self.rng.gen_range(10.0..500.0));
        FeatureVector::from_named(&named)
    }

    /// Fraud-shaped transaction: strongly negative v10/v12/v14, elevated
    /// v4, tiny amount. This is the signature the forest was trained on.
    fn generate_suspicious(&mut self) -> FeatureVector {
        let mut named = std::collections::HashMap::new();
        named.insert("time".to_string(), self.tick());
        for i in 1..=28 {
            named.insert(format!("v{i}"), self.rng.gen_range(-1.5..1.5));
        }
        named.insert("v4".to_string(), self.rng.gen_range(2.5..4.5));
        named.insert("v10".to_string(), self.rng.gen_range(-6.0..-3.0));
        named.insert("v12".to_string(), self.rng.gen_range(-6.0..-3.0));
        named.insert("v14".to_string(), self.rng.gen_range(-7.0..-3.5));
        named.insert("amount".to_string(), self.rng.gen_range(0.0..10.0));
        FeatureVector::from_named(&named)
    }
}

/// First row of the reference dataset, a known legitimate purchase.
fn known_legitimate() -> FeatureVector {
    let mut named = std::collections::HashMap::new();
    for (name, value) in [
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
    ] {
        named.insert(name.to_string(), value);
    }
    FeatureVector::from_named(&named)
}

/// A confirmed fraud row from the reference dataset.
fn known_fraud() -> FeatureVector {
    let mut named = std::collections::HashMap::new();
    for (name, value) in [
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
    ] {
        named.insert(name.to_string(), value);
    }
    FeatureVector::from_named(&named)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ingest_demo=info".parse()?)
                .add_directive("fraud_ingest=info".parse()?),
        )
        .init();

    info!("Starting Ingestion Demo");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map(|s| s.as_str()).unwrap_or("config/config.toml");
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(20);
    let fraud_rate: f64 = args
        .get(3)
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.2)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(200);

    let config = if Path::new(config_path).exists() {
        AppConfig::load_from_path(config_path)?
    } else {
        warn!(path = %config_path, "No configuration file, using defaults");
        AppConfig::default()
    };

    info!(
        count = count,
        fraud_rate = fraud_rate,
        delay_ms = delay_ms,
        database = %config.database.path,
        "Configuration loaded"
    );

    if !local_artifacts_present(&config.model.local_dir) {
        warn!(
            dir = %config.model.local_dir,
            "No local scoring artifacts; scoring depends on the object store being reachable"
        );
    }

    let pipeline = Pipeline::connect(&config).await?;
    let store = pipeline.store();

    // Register and activate a model version if the registry is empty, so
    // predictions get persisted, not just computed.
    if store.active_model().await?.is_none() {
        let model_name = pipeline
            .scorer()
            .model_name()
            .unwrap_or_else(|| "random_forest".to_string());
        let model_id = store
            .register_model(
                &model_name,
                Some("Forest exported by the training job"),
                serde_json::json!({"registered_by": "ingest-demo"}),
            )
            .await?;
        store.activate_model(model_id).await?;
        info!(model_id = model_id, model = %model_name, "Registered and activated model version");
    }

    // Two known samples from the reference dataset first.
    for (label, vector, truth) in [
        ("known legitimate", known_legitimate(), false),
        ("known fraud", known_fraud(), true),
    ] {
        match pipeline.ingest(&vector).await {
            Ok(outcome) => {
                info!(
                    sample = label,
                    transaction_id = outcome.prediction.transaction_id,
                    fraud_probability = outcome.prediction.fraud_probability,
                    is_fraud = outcome.prediction.is_fraud,
                    confidence = outcome.prediction.confidence,
                    prediction_id = ?outcome.prediction_id,
                    archived = outcome.archive_key.is_some(),
                    published = outcome.event_published,
                    "Known sample ingested"
                );
                // Backfill the ground-truth label the way the
                // verification workflow would.
                store.set_label(outcome.prediction.transaction_id, truth).await?;

                if let Some(key) = outcome.archive_key.as_deref() {
                    match pipeline.archive_store().fetch(key).await {
                        Ok(envelope) => info!(
                            key = %key,
                            transaction_id = envelope.transaction_id,
                            "Archive readback OK"
                        ),
                        Err(e) => warn!(key = %key, error = %e, "Archive readback failed"),
                    }
                }
            }
            Err(IngestError::ScoringFailed {
                transaction_id,
                source,
            }) => {
                warn!(
                    sample = label,
                    transaction_id,
                    error = %source,
                    "Sample persisted but not scored"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Then a randomized stream.
    let mut generator = VectorGenerator::new();
    let mut rng = rand::thread_rng();
    let mut flagged = 0u64;

    for i in 0..count {
        let vector = if rng.gen_bool(fraud_rate) {
            generator.generate_suspicious()
        } else {
            generator.generate_legitimate()
        };

        match pipeline.ingest(&vector).await {
            Ok(outcome) => {
                if outcome.prediction.is_fraud {
                    flagged += 1;
                }
            }
            Err(IngestError::ScoringFailed {
                transaction_id,
                source,
            }) => {
                warn!(transaction_id, error = %source, "Persisted but not scored");
            }
            Err(e) => return Err(e.into()),
        }

        if (i + 1) % 10 == 0 {
            info!("Ingested {}/{} transactions ({} flagged)", i + 1, count, flagged);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    let stats = store.transaction_stats().await?;
    info!(
        total = stats.total_transactions,
        labelled_fraud = stats.fraud_count,
        fraud_rate = stats.fraud_rate,
        average_amount = stats.average_transaction_amount,
        total_amount = stats.total_amount,
        "Final store statistics"
    );

    pipeline.metrics().print_summary();

    Ok(())
}
