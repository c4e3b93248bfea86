//! Model serving: artifact formats, loading and scoring

pub mod artifact;
pub mod loader;
pub mod scorer;

pub use artifact::{ModelArtifact, ScalerArtifact};
pub use loader::{local_artifacts_present, ArtifactLoader, MODEL_KEY, SCALER_KEY};
pub use scorer::{Scorer, ScoringPair};
