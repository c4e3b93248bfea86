//! SQLite persistence gateway.
//!
//! Single authoritative store for transactions, the model registry and
//! persisted predictions. Schema setup runs on connect and is idempotent,
//! so every binary and test gets a ready database from
//! [`TransactionStore::connect`] alone. Ids are `INTEGER PRIMARY KEY
//! AUTOINCREMENT`, which makes them unique and monotonic even under
//! concurrent ingestion.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use std::path::Path;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::{IngestError, Result};
use crate::types::{
    FeatureVector, MlModelRecord, NewPrediction, PredictionRecord, TransactionRecord,
    TransactionStats,
};

/// Handle to the transaction database. Cheap to clone, pool-backed.
#[derive(Debug, Clone)]
pub struct TransactionStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    total_transactions: i64,
    fraud_count: i64,
    average_transaction_amount: f64,
    total_amount: f64,
    fraud_amount: f64,
}

impl TransactionStore {
    /// Open (creating if needed) the database at the configured path and
    /// bring the schema up to date.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                transaction_id INTEGER PRIMARY KEY AUTOINCREMENT,
                time REAL NOT NULL,
                v1 REAL NOT NULL, v2 REAL NOT NULL, v3 REAL NOT NULL, v4 REAL NOT NULL,
                v5 REAL NOT NULL, v6 REAL NOT NULL, v7 REAL NOT NULL, v8 REAL NOT NULL,
                v9 REAL NOT NULL, v10 REAL NOT NULL, v11 REAL NOT NULL, v12 REAL NOT NULL,
                v13 REAL NOT NULL, v14 REAL NOT NULL, v15 REAL NOT NULL, v16 REAL NOT NULL,
                v17 REAL NOT NULL, v18 REAL NOT NULL, v19 REAL NOT NULL, v20 REAL NOT NULL,
                v21 REAL NOT NULL, v22 REAL NOT NULL, v23 REAL NOT NULL, v24 REAL NOT NULL,
                v25 REAL NOT NULL, v26 REAL NOT NULL, v27 REAL NOT NULL, v28 REAL NOT NULL,
                amount REAL NOT NULL,
                is_fraud INTEGER,
                source TEXT NOT NULL DEFAULT 'api',
                processed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ml_models (
                model_id INTEGER PRIMARY KEY AUTOINCREMENT,
                model_name TEXT NOT NULL,
                description TEXT,
                performance_metrics TEXT NOT NULL DEFAULT '{}',
                active INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fraud_predictions (
                prediction_id INTEGER PRIMARY KEY AUTOINCREMENT,
                transaction_id INTEGER NOT NULL REFERENCES transactions(transaction_id),
                model_id INTEGER NOT NULL REFERENCES ml_models(model_id),
                fraud_probability REAL NOT NULL
                    CHECK (fraud_probability >= 0.0 AND fraud_probability <= 1.0),
                prediction_threshold REAL NOT NULL,
                predicted_class INTEGER NOT NULL,
                features_used TEXT NOT NULL,
                explanation TEXT NOT NULL,
                prediction_time TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_predictions_transaction
             ON fraud_predictions(transaction_id)",
        )
        .execute(&self.pool)
        .await?;

        // At most one active model, enforced by the database itself.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_models_single_active
             ON ml_models(active) WHERE active = 1",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a transaction and return the stored row, database-assigned
    /// id included. The fraud label starts unset; verification backfills
    /// it later via [`set_label`](Self::set_label).
    pub async fn persist_transaction(
        &self,
        features: &FeatureVector,
        source: &str,
    ) -> Result<TransactionRecord> {
        let processed_at = chrono::Utc::now();

        let mut query = sqlx::query(
            r#"
            INSERT INTO transactions (
                time, v1, v2, v3, v4, v5, v6, v7, v8, v9, v10, v11, v12, v13, v14,
                v15, v16, v17, v18, v19, v20, v21, v22, v23, v24, v25, v26, v27, v28,
                amount, is_fraud, source, processed_at
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?
            )
            "#,
        );
        for value in features.as_array() {
            query = query.bind(value);
        }
        let result = query
            .bind(Option::<bool>::None)
            .bind(source)
            .bind(processed_at)
            .execute(&self.pool)
            .await?;

        Ok(TransactionRecord {
            transaction_id: result.last_insert_rowid(),
            features: features.clone(),
            is_fraud: None,
            source: source.to_string(),
            processed_at,
        })
    }

    /// Fetch one transaction by id.
    pub async fn transaction(&self, transaction_id: i64) -> Result<Option<TransactionRecord>> {
        let record = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transactions WHERE transaction_id = ?",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Page through transactions in insertion order.
    pub async fn transactions(&self, limit: i64, offset: i64) -> Result<Vec<TransactionRecord>> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM transactions ORDER BY transaction_id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Existence check used by the verification consumer.
    pub async fn transaction_exists(&self, transaction_id: i64) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE transaction_id = ?)",
        )
        .bind(transaction_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Backfill the ground-truth fraud label on a stored transaction.
    pub async fn set_label(&self, transaction_id: i64, is_fraud: bool) -> Result<()> {
        let result = sqlx::query("UPDATE transactions SET is_fraud = ? WHERE transaction_id = ?")
            .bind(is_fraud)
            .bind(transaction_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(IngestError::NotFound(format!(
                "transaction {transaction_id} is not stored"
            )));
        }
        Ok(())
    }

    /// Register a model version. New models start inactive; call
    /// [`activate_model`](Self::activate_model) to route scores to one.
    pub async fn register_model(
        &self,
        model_name: &str,
        description: Option<&str>,
        performance_metrics: serde_json::Value,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO ml_models (model_name, description, performance_metrics, active, created_at)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(model_name)
        .bind(description)
        .bind(Json(performance_metrics))
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Make `model_id` the single active model. Deactivation of the
    /// previous model and activation of the new one commit together, so
    /// readers never observe two active rows.
    pub async fn activate_model(&self, model_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE ml_models SET active = 0 WHERE active = 1")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE ml_models SET active = 1 WHERE model_id = ?")
            .bind(model_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(IngestError::NotFound(format!(
                "model {model_id} is not registered"
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    /// The currently active model, if any.
    pub async fn active_model(&self) -> Result<Option<MlModelRecord>> {
        let record = sqlx::query_as::<_, MlModelRecord>(
            "SELECT * FROM ml_models WHERE active = 1 LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Fetch one registered model by id.
    pub async fn model(&self, model_id: i64) -> Result<Option<MlModelRecord>> {
        let record =
            sqlx::query_as::<_, MlModelRecord>("SELECT * FROM ml_models WHERE model_id = ?")
                .bind(model_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }

    /// Persist a scored prediction and return its id. Fails if either
    /// referenced row is missing; the foreign keys are enforced.
    pub async fn persist_prediction(&self, prediction: &NewPrediction) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO fraud_predictions (
                transaction_id, model_id, fraud_probability, prediction_threshold,
                predicted_class, features_used, explanation, prediction_time
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(prediction.transaction_id)
        .bind(prediction.model_id)
        .bind(prediction.fraud_probability)
        .bind(prediction.prediction_threshold)
        .bind(prediction.predicted_class)
        .bind(Json(&prediction.features_used))
        .bind(Json(&prediction.explanation))
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// All predictions recorded for one transaction, oldest first.
    pub async fn predictions_for(&self, transaction_id: i64) -> Result<Vec<PredictionRecord>> {
        let records = sqlx::query_as::<_, PredictionRecord>(
            "SELECT * FROM fraud_predictions WHERE transaction_id = ? ORDER BY prediction_id",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Aggregate counts and amounts over the whole transactions table.
    pub async fn transaction_stats(&self) -> Result<TransactionStats> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                COUNT(*) AS total_transactions,
                COALESCE(SUM(CASE WHEN is_fraud = 1 THEN 1 ELSE 0 END), 0) AS fraud_count,
                COALESCE(AVG(amount), 0.0) AS average_transaction_amount,
                COALESCE(SUM(amount), 0.0) AS total_amount,
                COALESCE(SUM(CASE WHEN is_fraud = 1 THEN amount ELSE 0.0 END), 0.0) AS fraud_amount
            FROM transactions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let fraud_rate = if row.total_transactions > 0 {
            row.fraud_count as f64 / row.total_transactions as f64
        } else {
            0.0
        };

        Ok(TransactionStats {
            total_transactions: row.total_transactions,
            fraud_count: row.fraud_count,
            fraud_rate,
            average_transaction_amount: row.average_transaction_amount,
            total_amount: row.total_amount,
            fraud_amount: row.fraud_amount,
        })
    }
}
