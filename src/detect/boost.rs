//! Gradient-boosted multiclass classifier (inference only)
//!
//! Standard multiclass boosting layout: each round carries one regression
//! tree per class, raw class scores accumulate over rounds, and a per-row
//! softmax turns them into a probability distribution. Trees come pretrained
//! from the artifact bundle.

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use super::artifacts::ArtifactError;

/// Pretrained boosted ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostClassifier {
    pub n_classes: usize,
    pub n_features: usize,
    /// Initial raw score per class (prior log-odds)
    pub base_scores: Vec<f32>,
    /// Shrinkage applied to every tree output
    pub learning_rate: f32,
    /// rounds[r][c] is the round-r tree for class c
    pub rounds: Vec<Vec<BoostTree>>,
}

/// A single regression tree; leaves carry raw-score contributions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostTree {
    pub root: BoostNode,
}

/// Node in a boosting tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoostNode {
    Split {
        feature_idx: usize,
        threshold: f32,
        left: Box<BoostNode>,
        right: Box<BoostNode>,
    },
    Leaf {
        value: f32,
    },
}

impl BoostTree {
    fn evaluate(&self, row: ArrayView1<'_, f32>) -> f32 {
        let mut node = &self.root;
        loop {
            match node {
                BoostNode::Leaf { value } => return *value,
                BoostNode::Split { feature_idx, threshold, left, right } => {
                    let val = row.get(*feature_idx).copied().unwrap_or(0.0);
                    node = if val <= *threshold { left } else { right };
                }
            }
        }
    }

    fn check_features(&self, n_features: usize) -> Result<(), usize> {
        fn walk(node: &BoostNode, n: usize) -> Result<(), usize> {
            match node {
                BoostNode::Leaf { .. } => Ok(()),
                BoostNode::Split { feature_idx, left, right, .. } => {
                    if *feature_idx >= n {
                        return Err(*feature_idx);
                    }
                    walk(left, n)?;
                    walk(right, n)
                }
            }
        }
        walk(&self.root, n_features)
    }
}

impl BoostClassifier {
    pub fn num_features(&self) -> usize {
        self.n_features
    }

    /// Structural validation after deserialization
    pub fn validate(&self) -> Result<(), ArtifactError> {
        let invalid = |reason: String| ArtifactError::Invalid {
            name: "classifier".into(),
            reason,
        };

        if self.n_classes < 2 {
            return Err(invalid(format!("need at least 2 classes, got {}", self.n_classes)));
        }
        if self.base_scores.len() != self.n_classes {
            return Err(invalid(format!(
                "base_scores has {} entries for {} classes",
                self.base_scores.len(),
                self.n_classes
            )));
        }
        for (r, round) in self.rounds.iter().enumerate() {
            if round.len() != self.n_classes {
                return Err(invalid(format!(
                    "round {} has {} trees for {} classes",
                    r,
                    round.len(),
                    self.n_classes
                )));
            }
            for tree in round {
                tree.check_features(self.n_features).map_err(|idx| {
                    invalid(format!(
                        "split on feature {} but classifier has {} features",
                        idx, self.n_features
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Class-probability distribution per row
    ///
    /// Vectorized over the whole batch: returns a `rows x n_classes` matrix
    /// whose rows each sum to 1.
    pub fn predict_proba(&self, matrix: &Array2<f32>) -> Array2<f32> {
        let rows = matrix.nrows();
        let mut probs = Array2::<f32>::zeros((rows, self.n_classes));

        for (i, row) in matrix.rows().into_iter().enumerate() {
            let mut raw = self.base_scores.clone();
            for round in &self.rounds {
                for (c, tree) in round.iter().enumerate() {
                    raw[c] += self.learning_rate * tree.evaluate(row);
                }
            }
            softmax_into(&raw, probs.row_mut(i));
        }

        probs
    }
}

/// Numerically stable softmax
fn softmax_into(raw: &[f32], mut out: ndarray::ArrayViewMut1<'_, f32>) {
    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for (o, &r) in out.iter_mut().zip(raw.iter()) {
        let e = (r - max).exp();
        *o = e;
        sum += e;
    }
    if sum > 0.0 {
        out.mapv_inplace(|v| v / sum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn leaf(value: f32) -> BoostTree {
        BoostTree { root: BoostNode::Leaf { value } }
    }

    fn split_tree(feature_idx: usize, threshold: f32, low: f32, high: f32) -> BoostTree {
        BoostTree {
            root: BoostNode::Split {
                feature_idx,
                threshold,
                left: Box::new(BoostNode::Leaf { value: low }),
                right: Box::new(BoostNode::Leaf { value: high }),
            },
        }
    }

    fn make_classifier() -> BoostClassifier {
        // 3 classes over 2 features; class 1 fires when feature 0 > 10,
        // class 2 when feature 1 > 10.
        BoostClassifier {
            n_classes: 3,
            n_features: 2,
            base_scores: vec![0.0; 3],
            learning_rate: 1.0,
            rounds: vec![vec![
                leaf(0.0),
                split_tree(0, 10.0, 0.0, 5.0),
                split_tree(1, 10.0, 0.0, 5.0),
            ]],
        }
    }

    #[test]
    fn test_rows_sum_to_one() {
        let clf = make_classifier();
        let probs = clf.predict_proba(&array![[0.0, 0.0], [20.0, 0.0], [0.0, 20.0]]);

        for row in probs.rows() {
            let sum: f32 = row.sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_argmax_follows_splits() {
        let clf = make_classifier();
        let probs = clf.predict_proba(&array![[20.0, 0.0], [0.0, 20.0]]);

        let argmax = |i: usize| {
            probs
                .row(i)
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .map(|(c, _)| c)
                .unwrap()
        };
        assert_eq!(argmax(0), 1);
        assert_eq!(argmax(1), 2);
    }

    #[test]
    fn test_uniform_when_untriggered() {
        let clf = make_classifier();
        let probs = clf.predict_proba(&array![[0.0, 0.0]]);
        for &p in probs.row(0) {
            assert!((p - 1.0 / 3.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_validate_rejects_wrong_tree_count() {
        let mut clf = make_classifier();
        clf.rounds[0].pop();
        assert!(clf.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_feature() {
        let mut clf = make_classifier();
        clf.rounds[0][1] = split_tree(7, 0.0, 0.0, 1.0);
        assert!(clf.validate().is_err());
    }
}
