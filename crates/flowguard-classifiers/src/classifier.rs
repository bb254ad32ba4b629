//! Classifier trait and common types

use async_trait::async_trait;
use flowguard_core::{Result, TransformedRecord};

/// Trait for all flow classifiers
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one transformed record
    async fn classify(&self, record: &TransformedRecord) -> Result<Prediction>;

    /// Get the classifier name
    fn name(&self) -> &str;

    /// Class labels this classifier can emit, in model order
    fn classes(&self) -> &[String];
}

/// Output of a single model invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predicted class label
    pub label: String,

    /// Probability of the predicted label (0.0-1.0)
    pub score: f64,

    /// Probability of every class, in model order
    pub class_scores: Vec<(String, f64)>,

    /// Latency in microseconds
    pub latency_us: u64,
}

impl Prediction {
    /// Create a new prediction
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
            class_scores: Vec::new(),
            latency_us: 0,
        }
    }

    /// Attach the full class distribution
    pub fn with_class_scores(mut self, class_scores: Vec<(String, f64)>) -> Self {
        self.class_scores = class_scores;
        self
    }

    /// Probability assigned to a class, if the distribution is known
    pub fn probability_of(&self, class: &str) -> Option<f64> {
        self.class_scores
            .iter()
            .find(|(c, _)| c == class)
            .map(|(_, p)| *p)
    }

    /// Check if score exceeds threshold
    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.score >= threshold
    }
}
