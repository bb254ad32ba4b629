//! Offline evaluation against a labeled dataset

use crate::dataset::Dataset;
use flowguard_classifiers::{EvaluationReport, LoadedArtifacts};
use flowguard_core::{CategoryStatus, Error, Result};
use tracing::{info, warn};

/// Binary and, when possible, attack-category evaluation
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Normal vs Attack over every row with a ground-truth label
    pub binary: EvaluationReport,

    /// Category accuracy over true attacks the pipeline also flagged;
    /// `None` without a category model or `attack_cat` column
    pub category: Option<EvaluationReport>,

    /// Rows skipped for lack of a ground-truth label
    pub unlabeled: usize,
}

/// Classify every labeled row and compare with the ground truth
pub async fn evaluate(artifacts: &LoadedArtifacts, dataset: &Dataset) -> Result<Evaluation> {
    if !dataset.has_ground_truth() {
        return Err(Error::schema("dataset has no 'label' column to evaluate against"));
    }
    artifacts
        .transformer
        .validate_columns(dataset.headers().iter().map(String::as_str))?;

    let category_available = match artifacts.classifier.require_category_model() {
        Ok(()) => true,
        Err(e) => {
            warn!("{}; skipping attack category evaluation", e);
            false
        }
    };

    let mut binary_pairs = Vec::with_capacity(dataset.len());
    let mut category_pairs = Vec::new();
    let mut unlabeled = 0;

    for (i, record) in dataset.records().iter().enumerate() {
        let Some(actual) = dataset.label(i) else {
            unlabeled += 1;
            continue;
        };

        let result = artifacts.classify_raw(record).await?;
        binary_pairs.push((actual.to_string(), result.label.to_string()));

        if actual.is_attack() && result.category_status == CategoryStatus::Predicted {
            if let Some(category) = dataset.attack_category(i) {
                category_pairs.push((category, result.attack_type));
            }
        }
    }

    let binary = EvaluationReport::from_pairs(binary_pairs);
    let category = (category_available && !category_pairs.is_empty())
        .then(|| EvaluationReport::from_pairs(category_pairs));

    info!(
        "Evaluated {} labeled records: accuracy {:.4}",
        binary.total, binary.accuracy
    );
    if unlabeled > 0 {
        warn!("{} rows had no ground-truth label", unlabeled);
    }

    Ok(Evaluation {
        binary,
        category,
        unlabeled,
    })
}
