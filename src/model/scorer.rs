//! Scoring engine with hot-swappable artifacts.
//!
//! The scorer either holds a validated scaler+model pair or is in the
//! unavailable state, in which every scoring request fails fast without
//! touching storage. Installation replaces the pair atomically behind an
//! `RwLock`, so a reload never interleaves with an in-flight score.

use std::sync::{Arc, RwLock};

use crate::error::ScoreError;
use crate::model::artifact::{ModelArtifact, ScalerArtifact};
use crate::types::{FeatureVector, Score, FEATURE_NAMES};

/// A validated scaler and model that were trained together.
#[derive(Debug, Clone)]
pub struct ScoringPair {
    pub model: ModelArtifact,
    pub scaler: ScalerArtifact,
}

impl ScoringPair {
    /// Decode and validate both artifacts against the pipeline's feature
    /// width. Rejecting here keeps bad artifacts out of the scorer.
    pub fn from_bytes(model_bytes: &[u8], scaler_bytes: &[u8]) -> Result<Self, ScoreError> {
        let model = ModelArtifact::from_slice(model_bytes)?;
        model.validate(FEATURE_NAMES.len())?;
        let scaler = ScalerArtifact::from_slice(scaler_bytes)?;
        scaler.validate(FEATURE_NAMES.len())?;
        Ok(Self { model, scaler })
    }
}

/// Scores feature vectors against the currently installed model pair.
pub struct Scorer {
    pair: RwLock<Option<Arc<ScoringPair>>>,
    threshold: f64,
}

impl Scorer {
    /// A scorer with a loaded pair.
    pub fn new(pair: ScoringPair, threshold: f64) -> Self {
        Self {
            pair: RwLock::new(Some(Arc::new(pair))),
            threshold,
        }
    }

    /// A scorer in the unavailable state. Requests fail fast until
    /// [`install`](Self::install) provides artifacts.
    pub fn unavailable(threshold: f64) -> Self {
        Self {
            pair: RwLock::new(None),
            threshold,
        }
    }

    /// Swap in a new pair. In-flight scores finish against the pair they
    /// already cloned out; later calls see the new one.
    pub fn install(&self, pair: ScoringPair) -> Result<(), ScoreError> {
        let mut guard = self
            .pair
            .write()
            .map_err(|_| ScoreError::Unavailable("scorer lock poisoned".to_string()))?;
        *guard = Some(Arc::new(pair));
        Ok(())
    }

    fn current(&self) -> Result<Arc<ScoringPair>, ScoreError> {
        self.pair
            .read()
            .map_err(|_| ScoreError::Unavailable("scorer lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| ScoreError::Unavailable("no artifacts installed".to_string()))
    }

    pub fn is_available(&self) -> bool {
        self.pair.read().map(|guard| guard.is_some()).unwrap_or(false)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Name of the installed model, if one is loaded.
    pub fn model_name(&self) -> Option<String> {
        self.current().ok().map(|pair| pair.model.model_name.clone())
    }

    /// Standardize and classify one feature vector.
    pub fn score(&self, features: &FeatureVector) -> Result<Score, ScoreError> {
        let pair = self.current()?;
        let scaled = pair.scaler.transform(&features.as_array());
        let probability = pair.model.predict_proba(&scaled);
        Ok(Score::new(probability, self.threshold))
    }

    /// Explanation payload persisted alongside predictions:
    /// the training-side feature importances.
    pub fn explanation(&self) -> serde_json::Value {
        match self.current() {
            Ok(pair) => serde_json::json!({ "importance": pair.model.feature_importance }),
            Err(_) => serde_json::json!({ "importance": {} }),
        }
    }
}
