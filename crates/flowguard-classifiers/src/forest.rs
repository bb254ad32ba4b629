//! Tree-ensemble (random forest) models loaded from JSON artifacts
//!
//! Class probabilities are the mean, over trees, of the normalized class
//! distribution of the leaf each tree routes the record to. The predicted
//! label is the first class with the highest probability.

use crate::artifacts::ArtifactReader;
use crate::classifier::{Classifier, Prediction};
use async_trait::async_trait;
use flowguard_core::{Error, Result, TransformedRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// One node of a decision tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// Route left when `value <= threshold`, right otherwise
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },

    /// Class counts or weights at a leaf
    Leaf { distribution: Vec<f64> },
}

/// Serialized decision tree; node 0 is the root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSpec {
    pub nodes: Vec<TreeNode>,
}

/// Serialized tree ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsembleSpec {
    #[serde(default)]
    pub version: Option<String>,

    /// Feature order the model was trained on
    pub feature_names: Vec<String>,

    /// Class labels in output order
    pub classes: Vec<String>,

    pub trees: Vec<TreeSpec>,
}

/// Validated, immutable tree ensemble
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    name: String,
    version: Option<String>,
    feature_names: Vec<String>,
    classes: Vec<String>,
    trees: Vec<Vec<TreeNode>>,
}

impl TreeEnsemble {
    /// Validate a serialized ensemble
    ///
    /// Children must index forward (`child > parent`), which guarantees every
    /// descent terminates at a leaf. Leaf distributions are normalized here.
    pub fn from_spec(name: impl Into<String>, spec: TreeEnsembleSpec) -> Result<Self> {
        let name = name.into();
        let n_features = spec.feature_names.len();
        let n_classes = spec.classes.len();

        if n_features == 0 {
            return Err(Error::artifact(format!("model '{}' has no features", name)));
        }
        if n_classes < 2 {
            return Err(Error::artifact(format!(
                "model '{}' needs at least two classes",
                name
            )));
        }
        if spec.trees.is_empty() {
            return Err(Error::artifact(format!("model '{}' has no trees", name)));
        }

        let mut trees = Vec::with_capacity(spec.trees.len());
        for (t, tree) in spec.trees.into_iter().enumerate() {
            let n_nodes = tree.nodes.len();
            if n_nodes == 0 {
                return Err(Error::artifact(format!("model '{}' tree {} is empty", name, t)));
            }

            let mut nodes = Vec::with_capacity(n_nodes);
            for (i, node) in tree.nodes.into_iter().enumerate() {
                let node = match node {
                    TreeNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        if feature >= n_features {
                            return Err(Error::artifact(format!(
                                "model '{}' tree {} node {} splits on feature {} of {}",
                                name, t, i, feature, n_features
                            )));
                        }
                        if threshold.is_nan() {
                            return Err(Error::artifact(format!(
                                "model '{}' tree {} node {} has a NaN threshold",
                                name, t, i
                            )));
                        }
                        for child in [left, right] {
                            if child <= i || child >= n_nodes {
                                return Err(Error::artifact(format!(
                                    "model '{}' tree {} node {} has invalid child {}",
                                    name, t, i, child
                                )));
                            }
                        }
                        TreeNode::Split {
                            feature,
                            threshold,
                            left,
                            right,
                        }
                    }
                    TreeNode::Leaf { distribution } => {
                        if distribution.len() != n_classes {
                            return Err(Error::artifact(format!(
                                "model '{}' tree {} leaf {} has {} weights for {} classes",
                                name,
                                t,
                                i,
                                distribution.len(),
                                n_classes
                            )));
                        }
                        let total: f64 = distribution.iter().sum();
                        if distribution.iter().any(|w| !w.is_finite() || *w < 0.0) || total <= 0.0
                        {
                            return Err(Error::artifact(format!(
                                "model '{}' tree {} leaf {} has invalid weights",
                                name, t, i
                            )));
                        }
                        TreeNode::Leaf {
                            distribution: distribution.iter().map(|w| w / total).collect(),
                        }
                    }
                };
                nodes.push(node);
            }
            trees.push(nodes);
        }

        Ok(Self {
            name,
            version: spec.version,
            feature_names: spec.feature_names,
            classes: spec.classes,
            trees,
        })
    }

    /// Load and validate a model artifact
    pub fn load(name: impl Into<String>, path: &Path, reader: &mut ArtifactReader) -> Result<Self> {
        let name = name.into();
        let spec: TreeEnsembleSpec = reader.read(path)?;
        let model = Self::from_spec(name, spec)?;
        info!(
            "Loaded model '{}' ({} trees, {} features, {} classes)",
            model.name,
            model.trees.len(),
            model.feature_names.len(),
            model.classes.len()
        );
        Ok(model)
    }

    /// Load an optional model artifact; `Ok(None)` when the file is absent
    pub fn load_optional(
        name: impl Into<String>,
        path: &Path,
        reader: &mut ArtifactReader,
    ) -> Result<Option<Self>> {
        match reader.read_optional::<TreeEnsembleSpec>(path)? {
            Some(spec) => Self::from_spec(name, spec).map(Some),
            None => Ok(None),
        }
    }

    /// Class probabilities for one feature vector
    pub fn predict_proba(&self, values: &[f64]) -> Vec<f64> {
        let mut proba = vec![0.0; self.classes.len()];

        for tree in &self.trees {
            let mut i = 0;
            loop {
                match &tree[i] {
                    TreeNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        i = if values[*feature] <= *threshold {
                            *left
                        } else {
                            *right
                        };
                    }
                    TreeNode::Leaf { distribution } => {
                        for (p, w) in proba.iter_mut().zip(distribution) {
                            *p += w;
                        }
                        break;
                    }
                }
            }
        }

        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        proba
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

#[async_trait]
impl Classifier for TreeEnsemble {
    async fn classify(&self, record: &TransformedRecord) -> Result<Prediction> {
        let start = Instant::now();

        if !record.matches_features(&self.feature_names) {
            return Err(Error::schema(format!(
                "record columns do not match the feature order of model '{}'",
                self.name
            )));
        }

        let proba = self.predict_proba(record.values());

        let mut best = 0;
        for (i, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = i;
            }
        }

        let class_scores = self.classes.iter().cloned().zip(proba.iter().copied()).collect();

        let mut prediction =
            Prediction::new(self.classes[best].clone(), proba[best]).with_class_scores(class_scores);
        prediction.latency_us = start.elapsed().as_micros() as u64;
        Ok(prediction)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn stump_spec() -> TreeEnsembleSpec {
        serde_json::from_str(
            r#"{
                "version": "rf-2024-05",
                "feature_names": ["dur", "sbytes"],
                "classes": ["0", "1"],
                "trees": [
                    {"nodes": [
                        {"split": {"feature": 1, "threshold": 0.5, "left": 1, "right": 2}},
                        {"leaf": {"distribution": [9, 1]}},
                        {"leaf": {"distribution": [1, 3]}}
                    ]},
                    {"nodes": [
                        {"split": {"feature": 0, "threshold": 0.0, "left": 1, "right": 2}},
                        {"leaf": {"distribution": [1, 0]}},
                        {"leaf": {"distribution": [0, 1]}}
                    ]}
                ]
            }"#,
        )
        .unwrap()
    }

    fn record(dur: f64, sbytes: f64) -> TransformedRecord {
        TransformedRecord::new(
            vec![dur, sbytes],
            Arc::from(vec!["dur".to_string(), "sbytes".to_string()]),
        )
    }

    #[test]
    fn test_predict_proba_averages_trees() {
        let model = TreeEnsemble::from_spec("binary", stump_spec()).unwrap();

        // tree 1 -> [0.9, 0.1], tree 2 -> [1.0, 0.0]
        let p = model.predict_proba(&[-1.0, 0.0]);
        assert!((p[0] - 0.95).abs() < 1e-12);
        assert!((p[1] - 0.05).abs() < 1e-12);

        // tree 1 -> [0.25, 0.75], tree 2 -> [0.0, 1.0]
        let p = model.predict_proba(&[1.0, 1.0]);
        assert!((p[1] - 0.875).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_classify_picks_argmax() {
        let model = TreeEnsemble::from_spec("binary", stump_spec()).unwrap();

        let prediction = model.classify(&record(1.0, 1.0)).await.unwrap();
        assert_eq!(prediction.label, "1");
        assert!((prediction.score - 0.875).abs() < 1e-12);
        assert_eq!(prediction.class_scores.len(), 2);
        assert_eq!(model.version(), Some("rf-2024-05"));
    }

    #[tokio::test]
    async fn test_classify_rejects_foreign_schema() {
        let model = TreeEnsemble::from_spec("binary", stump_spec()).unwrap();
        let swapped = TransformedRecord::new(
            vec![1.0, 1.0],
            Arc::from(vec!["sbytes".to_string(), "dur".to_string()]),
        );

        let err = model.classify(&swapped).await.unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_rejects_backward_child() {
        let mut spec = stump_spec();
        spec.trees[0].nodes[0] = TreeNode::Split {
            feature: 0,
            threshold: 0.0,
            left: 0,
            right: 2,
        };

        let err = TreeEnsemble::from_spec("binary", spec).unwrap_err();
        assert!(matches!(err, Error::ArtifactLoad(_)));
    }

    #[test]
    fn test_rejects_bad_leaf_width() {
        let mut spec = stump_spec();
        spec.trees[1].nodes[2] = TreeNode::Leaf {
            distribution: vec![1.0, 0.0, 0.0],
        };

        assert!(TreeEnsemble::from_spec("binary", spec).is_err());
    }

    #[test]
    fn test_load_optional_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = ArtifactReader::new();

        let model =
            TreeEnsemble::load_optional("attack", &dir.path().join("attack.json"), &mut reader)
                .unwrap();
        assert!(model.is_none());
    }
}
