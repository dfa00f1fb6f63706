//! Isolation-forest anomaly scorer (inference only)
//!
//! Anomalies are easier to isolate and thus have shorter path lengths in the
//! trees. Scoring follows the standard formulation: `2^(-E(h(x)) / c(n))`,
//! where `c(n)` is the average path length of an unsuccessful BST search.
//! The trees themselves are a pretrained artifact; nothing here fits.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use super::artifacts::ArtifactError;

/// Stage-one verdict for a single row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Inlier,
    Outlier,
}

/// Pretrained isolation forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    /// Individual isolation trees
    trees: Vec<IsolationTree>,
    /// Sub-sample size each tree was grown on
    sample_size: usize,
    /// Anomaly-score cutoff; scores at or above it are outliers
    threshold: f32,
    /// Number of feature columns the forest was fitted on
    n_features: usize,
}

impl IsolationForest {
    /// Construct from pretrained trees (artifact deserialization and tests)
    pub fn from_parts(
        trees: Vec<IsolationTree>,
        sample_size: usize,
        threshold: f32,
        n_features: usize,
    ) -> Self {
        Self { trees, sample_size, threshold, n_features }
    }

    pub fn num_features(&self) -> usize {
        self.n_features
    }

    /// Structural validation after deserialization
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.trees.is_empty() {
            return Err(ArtifactError::Invalid {
                name: "anomaly_model".into(),
                reason: "forest has no trees".into(),
            });
        }
        if self.sample_size < 2 {
            return Err(ArtifactError::Invalid {
                name: "anomaly_model".into(),
                reason: format!("sample_size {} too small", self.sample_size),
            });
        }
        for tree in &self.trees {
            tree.check_features(self.n_features).map_err(|idx| ArtifactError::Invalid {
                name: "anomaly_model".into(),
                reason: format!("split on feature {} but forest has {} features", idx, self.n_features),
            })?;
        }
        Ok(())
    }

    /// Anomaly score in (0, 1]; higher is more anomalous
    pub fn score(&self, row: ArrayView1<'_, f32>) -> f32 {
        let c = average_path_length(self.sample_size);
        if self.trees.is_empty() || c == 0.0 {
            return 0.5;
        }

        let total: f32 = self
            .trees
            .iter()
            .map(|tree| tree.path_length(row))
            .sum();
        let avg_path = total / self.trees.len() as f32;

        2.0_f32.powf(-avg_path / c)
    }

    /// INLIER/OUTLIER verdict for one row
    pub fn predict(&self, row: ArrayView1<'_, f32>) -> Verdict {
        if self.score(row) >= self.threshold {
            Verdict::Outlier
        } else {
            Verdict::Inlier
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` samples (c(n))
fn average_path_length(n: usize) -> f32 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f32;
    2.0 * ((n - 1.0).ln() + 0.577_215_66) - 2.0 * (n - 1.0) / n
}

/// A single pretrained isolation tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    pub root: Node,
}

impl IsolationTree {
    fn path_length(&self, row: ArrayView1<'_, f32>) -> f32 {
        Self::descend(&self.root, row, 0)
    }

    fn descend(node: &Node, row: ArrayView1<'_, f32>, depth: usize) -> f32 {
        match node {
            Node::Leaf { size } => {
                // Leaves holding several samples get the expected extra depth
                depth as f32 + average_path_length(*size)
            }
            Node::Split { feature_idx, threshold, left, right } => {
                let val = row.get(*feature_idx).copied().unwrap_or(0.0);
                let next = if val <= *threshold { left } else { right };
                Self::descend(next, row, depth + 1)
            }
        }
    }

    fn check_features(&self, n_features: usize) -> Result<(), usize> {
        Self::check_node(&self.root, n_features)
    }

    fn check_node(node: &Node, n_features: usize) -> Result<(), usize> {
        match node {
            Node::Leaf { .. } => Ok(()),
            Node::Split { feature_idx, left, right, .. } => {
                if *feature_idx >= n_features {
                    return Err(*feature_idx);
                }
                Self::check_node(left, n_features)?;
                Self::check_node(right, n_features)
            }
        }
    }
}

/// Node in an isolation tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature_idx: usize,
        threshold: f32,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}
