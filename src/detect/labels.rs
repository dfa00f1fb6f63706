//! Class label resolution
//!
//! The label map is a closed bijection between class indices and label
//! strings, validated once at load time. An index the classifier emits that
//! has no label is a reportable error, never a silent default.

use std::collections::HashMap;

use tracing::warn;

use super::artifacts::ArtifactError;
use super::DetectError;

/// The benign class label used for confidence-gated demotion
pub const BENIGN_LABEL: &str = "BENIGN";

/// Validated bidirectional label map
#[derive(Debug, Clone)]
pub struct LabelMap {
    by_index: Vec<String>,
    by_name: HashMap<String, usize>,
    benign_index: usize,
}

impl LabelMap {
    /// Build from a `label -> index` map, validating bijectivity
    ///
    /// Indices must cover `0..n` exactly once. If no "BENIGN" entry exists,
    /// demotion falls back to class index 0; that fallback is logged once
    /// here rather than silently applied per row.
    pub fn from_map(map: HashMap<String, usize>) -> Result<Self, ArtifactError> {
        if map.is_empty() {
            return Err(ArtifactError::Invalid {
                name: "labels".into(),
                reason: "label map is empty".into(),
            });
        }

        let n = map.len();
        let mut by_index = vec![String::new(); n];
        for (label, &idx) in &map {
            if idx >= n {
                return Err(ArtifactError::Invalid {
                    name: "labels".into(),
                    reason: format!("index {} out of range for {} labels", idx, n),
                });
            }
            if !by_index[idx].is_empty() {
                return Err(ArtifactError::Invalid {
                    name: "labels".into(),
                    reason: format!("duplicate index {} ({:?} and {:?})", idx, by_index[idx], label),
                });
            }
            by_index[idx] = label.clone();
        }

        let benign_index = match map.get(BENIGN_LABEL) {
            Some(&idx) => idx,
            None => {
                warn!("label map has no {:?} entry; demoted rows map to class 0 ({:?})",
                    BENIGN_LABEL, by_index[0]);
                0
            }
        };

        Ok(Self { by_index, by_name: map, benign_index })
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Label for a class index the classifier emitted
    pub fn label_for(&self, idx: usize) -> Result<&str, DetectError> {
        self.by_index
            .get(idx)
            .map(String::as_str)
            .ok_or(DetectError::UnknownClassIndex(idx))
    }

    /// Index for a label, if known
    pub fn index_for(&self, label: &str) -> Option<usize> {
        self.by_name.get(label).copied()
    }

    /// Class index used for benign demotion
    pub fn benign_index(&self) -> usize {
        self.benign_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(pairs: &[(&str, usize)]) -> HashMap<String, usize> {
        pairs.iter().map(|(l, i)| (l.to_string(), *i)).collect()
    }

    #[test]
    fn test_valid_bijection() {
        let labels =
            LabelMap::from_map(map_of(&[("BENIGN", 0), ("DDoS", 1), ("PortScan", 2)])).unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.label_for(1).unwrap(), "DDoS");
        assert_eq!(labels.index_for("PortScan"), Some(2));
        assert_eq!(labels.benign_index(), 0);
    }

    #[test]
    fn test_rejects_gap() {
        // Index 3 with only 2 entries leaves a hole
        let err = LabelMap::from_map(map_of(&[("BENIGN", 0), ("DDoS", 3)]));
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(LabelMap::from_map(HashMap::new()).is_err());
    }

    #[test]
    fn test_unknown_index_is_error() {
        let labels = LabelMap::from_map(map_of(&[("BENIGN", 0), ("Bot", 1)])).unwrap();
        assert!(matches!(labels.label_for(5), Err(DetectError::UnknownClassIndex(5))));
    }

    #[test]
    fn test_benign_fallback_to_zero() {
        let labels = LabelMap::from_map(map_of(&[("DDoS", 0), ("PortScan", 1)])).unwrap();
        assert_eq!(labels.benign_index(), 0);
    }
}
