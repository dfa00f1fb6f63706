//! Batch scoring
//!
//! Wires the artifact bundle into the two-stage decision procedure: project
//! the batch onto the feature matrix, standardize, run the anomaly forest
//! over every row, then classify the whole batch and confidence-gate the
//! rows the forest flagged.

use std::sync::Arc;

use ndarray::Array2;
use tracing::debug;

use crate::batch::PendingItem;
use super::artifacts::ArtifactBundle;
use super::forest::Verdict;
use super::DetectError;

/// Threshold for classes the configured map has no entry for
///
/// Only consulted when a threshold map is present; without one the raw
/// argmax decides.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Final per-row status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Normal,
    Anomaly,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Normal => write!(f, "Normal"),
            Status::Anomaly => write!(f, "Anomaly"),
        }
    }
}

/// Verdict for one batch item
///
/// `is_anomaly` records the stage-one forest verdict and survives demotion;
/// `status` is the final outcome after confidence gating.
#[derive(Debug, Clone)]
pub struct Decision {
    pub is_anomaly: bool,
    pub attack_label: String,
    pub status: Status,
    pub reason: String,
}

impl Decision {
    fn normal(benign_label: &str) -> Self {
        Self {
            is_anomaly: false,
            attack_label: benign_label.to_string(),
            status: Status::Normal,
            reason: "Normal Traffic".to_string(),
        }
    }
}

/// Two-stage scorer over immutable artifacts
///
/// Stateless across batches; every call is a pure function of the batch and
/// the bundle.
pub struct DetectionEngine {
    artifacts: Arc<ArtifactBundle>,
}

impl DetectionEngine {
    pub fn new(artifacts: Arc<ArtifactBundle>) -> Self {
        Self { artifacts }
    }

    pub fn artifacts(&self) -> &ArtifactBundle {
        &self.artifacts
    }

    /// Score a batch, one decision per item in input order
    ///
    /// An error means no decisions were produced for the batch at all.
    pub fn score(&self, items: &[PendingItem]) -> Result<Vec<Decision>, DetectError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut matrix = self.feature_matrix(items)?;
        self.artifacts.scaler.transform(&mut matrix)?;

        let verdicts: Vec<Verdict> = matrix
            .rows()
            .into_iter()
            .map(|row| self.artifacts.forest.predict(row))
            .collect();

        let probs = self.artifacts.classifier.predict_proba(&matrix);

        let labels = &self.artifacts.labels;
        let benign_label = labels.label_for(labels.benign_index())?;

        let mut decisions = Vec::with_capacity(items.len());
        for (i, verdict) in verdicts.iter().enumerate() {
            let decision = match verdict {
                Verdict::Inlier => Decision::normal(benign_label),
                Verdict::Outlier => self.classify_outlier(probs.row(i))?,
            };
            decisions.push(decision);
        }

        let anomalies = decisions.iter().filter(|d| d.status == Status::Anomaly).count();
        if anomalies > 0 {
            debug!("Batch of {}: {} anomalies confirmed", items.len(), anomalies);
        }
        Ok(decisions)
    }

    /// Stage two for a single forest-flagged row
    ///
    /// Without a threshold map the raw argmax decides; with one, the winning
    /// class must clear its per-class threshold or the row is demoted.
    fn classify_outlier(
        &self,
        probs: ndarray::ArrayView1<'_, f32>,
    ) -> Result<Decision, DetectError> {
        let (best_idx, best_prob) = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, &p)| (i, p))
            .ok_or(DetectError::EmptyProbabilities)?;

        let labels = &self.artifacts.labels;
        let label = labels.label_for(best_idx)?;

        let confident = match &self.artifacts.thresholds {
            None => true,
            Some(map) => {
                let threshold = map.get(label).copied().unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
                best_prob >= threshold
            }
        };

        if best_idx != labels.benign_index() && confident {
            Ok(Decision {
                is_anomaly: true,
                attack_label: label.to_string(),
                status: Status::Anomaly,
                reason: format!("Classified as {}", label),
            })
        } else {
            // Flagged by the forest but not confidently attributed
            Ok(Decision {
                is_anomaly: true,
                attack_label: labels.label_for(labels.benign_index())?.to_string(),
                status: Status::Normal,
                reason: "Background Noise (Filtered)".to_string(),
            })
        }
    }

    /// Project items onto the (possibly feature-selected) matrix
    fn feature_matrix(&self, items: &[PendingItem]) -> Result<Array2<f32>, DetectError> {
        let n = self.artifacts.effective_features();
        let mut matrix = Array2::<f32>::zeros((items.len(), n));

        match self.artifacts.selected_features.as_deref() {
            None => {
                for (i, item) in items.iter().enumerate() {
                    let row = item.features.to_row();
                    for (j, v) in row.iter().enumerate() {
                        matrix[[i, j]] = *v;
                    }
                }
            }
            Some(selected) => {
                for (i, item) in items.iter().enumerate() {
                    let row = item.features.to_row();
                    for (j, &src) in selected.iter().enumerate() {
                        // indices validated against the schema at artifact load
                        matrix[[i, j]] = *row.get(src).unwrap_or(&0.0);
                    }
                }
            }
        }
        Ok(matrix)
    }
}
