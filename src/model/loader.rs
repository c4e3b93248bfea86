//! Artifact loader with object-store-first, local-fallback resolution.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{ModelConfig, ObjectStoreConfig};
use crate::error::{IngestError, ScoreError};
use crate::model::scorer::ScoringPair;

/// Object key of the serialized forest.
pub const MODEL_KEY: &str = "models/fraud_model.json";
/// Object key of the serialized scaler.
pub const SCALER_KEY: &str = "models/scaler.json";

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Resolves scoring artifacts: the object store is authoritative, a local
/// directory covers development and store outages. When both fail the
/// caller is left with an unavailable scorer.
pub struct ArtifactLoader {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    local_dir: PathBuf,
}

impl ArtifactLoader {
    pub fn new(store: &ObjectStoreConfig, model: &ModelConfig) -> Result<Self, IngestError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(store.timeout_secs))
            .build()
            .map_err(|e| IngestError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            endpoint: store.endpoint.trim_end_matches('/').to_string(),
            bucket: store.bucket.clone(),
            local_dir: PathBuf::from(&model.local_dir),
        })
    }

    /// Load and validate a scaler+model pair, trying the object store
    /// first. Any remote failure, corrupt artifacts included, falls
    /// through to the local directory.
    pub async fn load(&self) -> Result<ScoringPair, ScoreError> {
        match self.load_remote().await {
            Ok(pair) => {
                info!(
                    model = %pair.model.model_name,
                    source = "object_store",
                    "Scoring artifacts loaded"
                );
                return Ok(pair);
            }
            Err(e) => {
                warn!(error = %e, "Object store artifacts unavailable, trying local directory");
            }
        }

        match self.load_local().await {
            Ok(pair) => {
                info!(
                    model = %pair.model.model_name,
                    source = "local",
                    dir = %self.local_dir.display(),
                    "Scoring artifacts loaded"
                );
                Ok(pair)
            }
            Err(e) => Err(ScoreError::Unavailable(format!(
                "no usable artifacts in object store or {}: {e}",
                self.local_dir.display()
            ))),
        }
    }

    async fn load_remote(&self) -> Result<ScoringPair, ScoreError> {
        let model_bytes = self.download(MODEL_KEY).await?;
        let scaler_bytes = self.download(SCALER_KEY).await?;
        ScoringPair::from_bytes(&model_bytes, &scaler_bytes)
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, ScoreError> {
        let url = format!("{}/{}/{}", self.endpoint, self.bucket, key);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ScoreError::Unavailable(format!("GET {key}: {e}")))?;
        if !response.status().is_success() {
            return Err(ScoreError::Unavailable(format!(
                "GET {key}: status {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ScoreError::Unavailable(format!("GET {key}: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn load_local(&self) -> Result<ScoringPair, ScoreError> {
        let model_bytes = self.read_local(file_name(MODEL_KEY)).await?;
        let scaler_bytes = self.read_local(file_name(SCALER_KEY)).await?;
        ScoringPair::from_bytes(&model_bytes, &scaler_bytes)
    }

    async fn read_local(&self, name: &str) -> Result<Vec<u8>, ScoreError> {
        let path = self.local_dir.join(name);
        tokio::fs::read(&path)
            .await
            .map_err(|e| ScoreError::Unavailable(format!("read {}: {e}", path.display())))
    }

    #[cfg(test)]
    fn local_path(&self, key: &str) -> PathBuf {
        self.local_dir.join(file_name(key))
    }
}

/// True when both artifact files exist under `dir`, named as the object
/// keys are, e.g. `fraud_model.json` and `scaler.json`.
pub fn local_artifacts_present<P: AsRef<Path>>(dir: P) -> bool {
    let dir = dir.as_ref();
    dir.join(file_name(MODEL_KEY)).exists() && dir.join(file_name(SCALER_KEY)).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::artifact::{ModelArtifact, ScalerArtifact, Tree, TreeNode};
    use std::collections::HashMap;

    fn write_fixtures(dir: &Path) {
        let scaler = ScalerArtifact {
            feature_names: vec![],
            mean: vec![0.0; 30],
            scale: vec![1.0; 30],
        };
        let model = ModelArtifact {
            model_name: "fixture_forest".to_string(),
            n_features: 30,
            feature_importance: HashMap::new(),
            trees: vec![Tree {
                nodes: vec![TreeNode::Leaf { leaf: 0.25 }],
            }],
        };
        std::fs::write(
            dir.join("fraud_model.json"),
            serde_json::to_vec(&model).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.join("scaler.json"),
            serde_json::to_vec(&scaler).unwrap(),
        )
        .unwrap();
    }

    fn loader_for(dir: &Path) -> ArtifactLoader {
        // Port 1 is never listening, so the remote attempt fails fast.
        let store = ObjectStoreConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            bucket: "fraud-transactions".to_string(),
            timeout_secs: 1,
        };
        let model = ModelConfig {
            local_dir: dir.to_string_lossy().into_owned(),
            threshold: 0.5,
        };
        ArtifactLoader::new(&store, &model).unwrap()
    }

    #[test]
    fn test_key_file_names() {
        assert_eq!(file_name(MODEL_KEY), "fraud_model.json");
        assert_eq!(file_name(SCALER_KEY), "scaler.json");
    }

    #[tokio::test]
    async fn test_falls_back_to_local_when_store_is_down() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());

        let loader = loader_for(dir.path());
        assert!(loader.local_path(MODEL_KEY).exists());

        let pair = loader.load().await.unwrap();
        assert_eq!(pair.model.model_name, "fixture_forest");
    }

    #[tokio::test]
    async fn test_unavailable_when_both_sources_fail() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader_for(dir.path());

        let err = loader.load().await.unwrap_err();
        assert!(matches!(err, ScoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_corrupt_local_artifacts_do_not_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fraud_model.json"), b"{broken").unwrap();
        std::fs::write(dir.path().join("scaler.json"), b"{}").unwrap();

        let loader = loader_for(dir.path());
        assert!(loader.load().await.is_err());
    }

    #[test]
    fn test_local_artifacts_present() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!local_artifacts_present(dir.path()));
        write_fixtures(dir.path());
        assert!(local_artifacts_present(dir.path()));
    }
}
