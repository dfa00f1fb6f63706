//! Two-stage detection engine
//!
//! Stage one flags statistically novel rows with an isolation forest; stage
//! two classifies flagged rows with a gradient-boosted multiclass model,
//! gated by per-class confidence thresholds. Both models, the scaler and the
//! label map are pretrained artifacts loaded once at startup.

pub mod artifacts;
pub mod boost;
pub mod engine;
pub mod forest;
pub mod labels;
pub mod scaler;

use thiserror::Error;

pub use artifacts::{ArtifactBundle, ArtifactError};
pub use boost::BoostClassifier;
pub use engine::{Decision, DetectionEngine, Status};
pub use forest::IsolationForest;
pub use labels::LabelMap;
pub use scaler::ScalerParams;

/// Failures while scoring a batch
///
/// Any of these aborts the whole batch: the caller drops it and keeps
/// accepting packets. There are no partial decision sets.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("feature matrix shape mismatch: expected {expected} columns, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("classifier produced class index {0} with no label mapping")]
    UnknownClassIndex(usize),

    #[error("classifier returned an empty probability row")]
    EmptyProbabilities,
}
