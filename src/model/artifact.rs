//! Serialized model artifacts.
//!
//! The training side exports two JSON artifacts: a standardization scaler
//! and a forest of decision trees with class-1 leaf probabilities. Both
//! are validated once at load time so the scoring hot path can walk the
//! trees without re-checking anything.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ScoreError;
use crate::types::FEATURE_NAMES;

/// Standardization parameters fitted during training.
///
/// Transforms a raw feature vector with `(x - mean) / scale` per feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerArtifact {
    /// Feature order the parameters were fitted in; empty means
    /// "trust the canonical order"
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl ScalerArtifact {
    /// Decode from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ScoreError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ScoreError::Artifact(format!("scaler decode failed: {e}")))
    }

    /// Check shape and parameter sanity against the expected width.
    pub fn validate(&self, expected_features: usize) -> Result<(), ScoreError> {
        if self.mean.len() != expected_features || self.scale.len() != expected_features {
            return Err(ScoreError::Artifact(format!(
                "scaler expects {} features, artifact has mean={} scale={}",
                expected_features,
                self.mean.len(),
                self.scale.len()
            )));
        }
        if !self.feature_names.is_empty()
            && self.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES)
        {
            return Err(ScoreError::Artifact(
                "scaler feature order does not match the canonical order".to_string(),
            ));
        }
        for (i, (&mean, &scale)) in self.mean.iter().zip(&self.scale).enumerate() {
            if !mean.is_finite() || !scale.is_finite() || scale <= 0.0 {
                return Err(ScoreError::Artifact(format!(
                    "scaler parameters for feature {i} are unusable (mean={mean}, scale={scale})"
                )));
            }
        }
        Ok(())
    }

    /// Standardize a raw vector. Call [`validate`](Self::validate) first;
    /// the input must be at least as wide as the fitted parameters.
    pub fn transform(&self, input: &[f64]) -> Vec<f64> {
        input
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&x, (&mean, &scale))| (x - mean) / scale)
            .collect()
    }
}

/// One node in a decision tree: an internal split or a leaf carrying the
/// positive-class probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        /// Index into the scaled feature vector
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        /// Positive-class probability at this leaf
        leaf: f64,
    },
}

/// A single decision tree, nodes in preorder starting at the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Walk the tree for one scaled vector. `<= threshold` descends left,
    /// matching the training-side export convention.
    fn decide(&self, scaled: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if scaled[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { leaf } => return *leaf,
            }
        }
    }
}

/// A trained forest classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_name: String,
    /// Feature width the forest was trained on
    pub n_features: usize,
    /// Per-feature contribution weights reported by training; may be sparse
    #[serde(default)]
    pub feature_importance: HashMap<String, f64>,
    pub trees: Vec<Tree>,
}

impl ModelArtifact {
    /// Decode from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ScoreError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ScoreError::Artifact(format!("model decode failed: {e}")))
    }

    /// Check structural sanity against the expected feature width.
    ///
    /// Child links must point strictly forward, which both matches the
    /// preorder layout exporters produce and guarantees every traversal
    /// terminates. After this passes, [`predict_proba`](Self::predict_proba)
    /// cannot go out of bounds or loop.
    pub fn validate(&self, expected_features: usize) -> Result<(), ScoreError> {
        if self.n_features != expected_features {
            return Err(ScoreError::Artifact(format!(
                "model expects {} features, pipeline feeds {}",
                self.n_features, expected_features
            )));
        }
        if self.trees.is_empty() {
            return Err(ScoreError::Artifact("model has no trees".to_string()));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ScoreError::Artifact(format!("tree {t} has no nodes")));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                match node {
                    TreeNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        if *feature >= self.n_features {
                            return Err(ScoreError::Artifact(format!(
                                "tree {t} node {i} splits on feature {feature}, model width is {}",
                                self.n_features
                            )));
                        }
                        if !threshold.is_finite() {
                            return Err(ScoreError::Artifact(format!(
                                "tree {t} node {i} has a non-finite threshold"
                            )));
                        }
                        if *left <= i || *right <= i || *left >= tree.nodes.len()
                            || *right >= tree.nodes.len()
                        {
                            return Err(ScoreError::Artifact(format!(
                                "tree {t} node {i} has out-of-order child links"
                            )));
                        }
                    }
                    TreeNode::Leaf { leaf } => {
                        if !leaf.is_finite() || *leaf < 0.0 || *leaf > 1.0 {
                            return Err(ScoreError::Artifact(format!(
                                "tree {t} node {i} leaf probability {leaf} is outside [0, 1]"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Positive-class probability: the mean of the per-tree leaf
    /// probabilities, the usual forest vote.
    pub fn predict_proba(&self, scaled: &[f64]) -> f64 {
        let total: f64 = self.trees.iter().map(|tree| tree.decide(scaled)).sum();
        total / self.trees.len() as f64
    }
}
