//! Pretrained model artifacts
//!
//! Everything the detection engine needs is loaded once from a bundle
//! directory at startup and is immutable for the process lifetime. The
//! anomaly forest, classifier, scaler and label map are required; the
//! per-class threshold map and selected-feature list are optional and
//! degrade to defaults when absent.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::flow::NUM_FEATURES;
use super::boost::BoostClassifier;
use super::forest::IsolationForest;
use super::labels::LabelMap;
use super::scaler::ScalerParams;

/// Required artifact file names within the bundle directory
pub const ANOMALY_MODEL_FILE: &str = "anomaly_model.json";
pub const CLASSIFIER_FILE: &str = "classifier.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const LABELS_FILE: &str = "labels.json";

/// Optional artifact file names
pub const THRESHOLDS_FILE: &str = "thresholds.json";
pub const SELECTED_FEATURES_FILE: &str = "selected_features.json";

/// Startup artifact failures
///
/// `Missing` and `Invalid` are fatal to scoring: the engine cannot be
/// constructed and the embedder must report the pipeline as unavailable.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("required artifact {name} missing in {dir}")]
    Missing { name: String, dir: PathBuf },

    #[error("artifact {name} is invalid: {reason}")]
    Invalid { name: String, reason: String },

    #[error("failed to read artifact {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Immutable bundle of pretrained artifacts
///
/// Loaded once, shared read-only across sessions (`Arc`), never reloaded.
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    pub version: u32,
    pub forest: IsolationForest,
    pub classifier: BoostClassifier,
    pub scaler: ScalerParams,
    pub labels: LabelMap,
    /// Per-class confidence thresholds keyed by label; absent entries use 0.5
    pub thresholds: Option<HashMap<String, f32>>,
    /// Indices into the canonical schema; `None` means use all columns
    pub selected_features: Option<Vec<usize>>,
}

/// Serialized shape of the label-map artifact
#[derive(Debug, Serialize, Deserialize)]
struct LabelsFile {
    #[serde(default = "default_version")]
    version: u32,
    labels: HashMap<String, usize>,
}

fn default_version() -> u32 {
    1
}

impl ArtifactBundle {
    /// Load and validate a bundle from a directory
    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        info!("Loading model artifacts from {}", dir.display());

        let forest: IsolationForest = load_required(dir, ANOMALY_MODEL_FILE)?;
        let classifier: BoostClassifier = load_required(dir, CLASSIFIER_FILE)?;
        let scaler: ScalerParams = load_required(dir, SCALER_FILE)?;
        let labels_file: LabelsFile = load_required(dir, LABELS_FILE)?;
        let labels = LabelMap::from_map(labels_file.labels)?;

        let thresholds: Option<HashMap<String, f32>> = load_optional(dir, THRESHOLDS_FILE)?;
        let selected_features: Option<Vec<usize>> = load_optional(dir, SELECTED_FEATURES_FILE)?;

        let bundle = Self {
            version: labels_file.version,
            forest,
            classifier,
            scaler,
            labels,
            thresholds,
            selected_features,
        };
        bundle.validate()?;

        info!(
            "Artifacts v{} loaded: {} classes, {} feature columns{}",
            bundle.version,
            bundle.labels.len(),
            bundle.effective_features(),
            if bundle.thresholds.is_some() { ", per-class thresholds" } else { "" }
        );
        Ok(bundle)
    }

    /// Number of columns after optional feature selection
    pub fn effective_features(&self) -> usize {
        self.selected_features
            .as_ref()
            .map(Vec::len)
            .unwrap_or(NUM_FEATURES)
    }

    /// Cross-artifact consistency checks
    pub fn validate(&self) -> Result<(), ArtifactError> {
        self.forest.validate()?;
        self.classifier.validate()?;

        if let Some(ref selected) = self.selected_features {
            if selected.is_empty() {
                return Err(ArtifactError::Invalid {
                    name: SELECTED_FEATURES_FILE.into(),
                    reason: "selection list is empty".into(),
                });
            }
            if let Some(&bad) = selected.iter().find(|&&idx| idx >= NUM_FEATURES) {
                return Err(ArtifactError::Invalid {
                    name: SELECTED_FEATURES_FILE.into(),
                    reason: format!("index {} outside the {}-column schema", bad, NUM_FEATURES),
                });
            }
        }

        let n = self.effective_features();
        if self.scaler.num_features() != n {
            return Err(ArtifactError::Invalid {
                name: SCALER_FILE.into(),
                reason: format!("scaler fitted on {} columns, pipeline uses {}", self.scaler.num_features(), n),
            });
        }
        if self.forest.num_features() != n {
            return Err(ArtifactError::Invalid {
                name: ANOMALY_MODEL_FILE.into(),
                reason: format!("forest fitted on {} columns, pipeline uses {}", self.forest.num_features(), n),
            });
        }
        if self.classifier.num_features() != n {
            return Err(ArtifactError::Invalid {
                name: CLASSIFIER_FILE.into(),
                reason: format!("classifier fitted on {} columns, pipeline uses {}", self.classifier.num_features(), n),
            });
        }
        if self.classifier.n_classes != self.labels.len() {
            return Err(ArtifactError::Invalid {
                name: CLASSIFIER_FILE.into(),
                reason: format!(
                    "classifier has {} classes, label map has {}",
                    self.classifier.n_classes,
                    self.labels.len()
                ),
            });
        }
        Ok(())
    }
}

fn load_required<T: serde::de::DeserializeOwned>(dir: &Path, name: &str) -> Result<T, ArtifactError> {
    let path = dir.join(name);
    if !path.exists() {
        return Err(ArtifactError::Missing { name: name.into(), dir: dir.to_path_buf() });
    }
    read_json(&path, name)
}

fn load_optional<T: serde::de::DeserializeOwned>(
    dir: &Path,
    name: &str,
) -> Result<Option<T>, ArtifactError> {
    let path = dir.join(name);
    if !path.exists() {
        debug!("Optional artifact {} absent, using defaults", name);
        return Ok(None);
    }
    read_json(&path, name).map(Some)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, name: &str) -> Result<T, ArtifactError> {
    let file = File::open(path).map_err(|source| ArtifactError::Io { name: name.into(), source })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| ArtifactError::Invalid {
        name: name.into(),
        reason: e.to_string(),
    })
}
