//! Two-stage flow classification
//!
//! The binary model always runs. The attack-category model runs only when
//! the binary label is Attack; it is an explicit conditional pipeline stage.
//! Normal traffic always reports the `Normal` category.

use crate::pipeline::{ClassifierPipeline, PipelineExecutionResult, PipelineResult};
use crate::{scoring, Classifier};
use flowguard_core::{
    CategoryStatus, ClassificationResult, Error, Label, Result, TransformedRecord,
    NORMAL_CATEGORY, UNKNOWN_CATEGORY,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const BINARY_STAGE: &str = "binary";
const CATEGORY_STAGE: &str = "attack_category";

/// Classifier invoker: binary stage, then conditional category stage
pub struct FlowClassifier {
    pipeline: ClassifierPipeline,
    attack_class: String,
    has_category_model: bool,
}

impl FlowClassifier {
    /// Build the invoker
    ///
    /// `category` is optional; without it attacks are reported with the
    /// `Unknown` category. When the binary model advertises its classes, the
    /// attack class must be one of them.
    pub fn new(
        binary: Arc<dyn Classifier>,
        category: Option<Arc<dyn Classifier>>,
        attack_class: impl Into<String>,
        stage_timeout: Duration,
    ) -> Result<Self> {
        let attack_class = attack_class.into();

        let classes = binary.classes();
        if !classes.is_empty() && !classes.iter().any(|c| *c == attack_class) {
            return Err(Error::artifact(format!(
                "binary model '{}' has no class '{}' (classes: {})",
                binary.name(),
                attack_class,
                classes.join(", ")
            )));
        }

        let mut pipeline = ClassifierPipeline::new()
            .with_stage_timeout(stage_timeout)
            .add_single(BINARY_STAGE, binary);

        let has_category_model = category.is_some();
        match category {
            Some(model) => {
                let positive = attack_class.clone();
                pipeline = pipeline.add_conditional(
                    CATEGORY_STAGE,
                    move |results: &[PipelineResult]| binary_is_attack(results, &positive),
                    model,
                    false,
                );
            }
            None => {
                warn!("Attack category model unavailable; attacks will be reported as '{}'", UNKNOWN_CATEGORY);
            }
        }

        Ok(Self {
            pipeline,
            attack_class,
            has_category_model,
        })
    }

    /// Fail with `ModelUnavailable` when no category model is loaded
    pub fn require_category_model(&self) -> Result<()> {
        if self.has_category_model {
            Ok(())
        } else {
            Err(Error::unavailable("attack category model is not loaded"))
        }
    }

    pub fn attack_class(&self) -> &str {
        &self.attack_class
    }

    /// Classify one transformed record
    pub async fn classify(&self, record: &TransformedRecord) -> Result<ClassificationResult> {
        let execution = self.pipeline.execute(record).await?;
        self.interpret(&execution)
    }

    /// Map raw stage outputs onto a classification result
    fn interpret(&self, execution: &PipelineExecutionResult) -> Result<ClassificationResult> {
        let binary = execution
            .stage(BINARY_STAGE)
            .ok_or_else(|| Error::internal("binary stage produced no result"))?;

        let is_attack = binary.result.label == self.attack_class;
        let label = if is_attack { Label::Attack } else { Label::Normal };

        let attack_probability = binary
            .result
            .probability_of(&self.attack_class)
            .unwrap_or(if is_attack {
                binary.result.score
            } else {
                1.0 - binary.result.score
            });
        let (risk_score, severity) = scoring::score(attack_probability)?;

        let (attack_type, category_status) = if !is_attack {
            (NORMAL_CATEGORY.to_string(), CategoryStatus::Skipped)
        } else if let Some(category) = execution.stage(CATEGORY_STAGE) {
            (category.result.label.clone(), CategoryStatus::Predicted)
        } else if let Some(failure) = execution.failure(CATEGORY_STAGE) {
            let status = match failure.error {
                Error::ModelTimeout { .. } => CategoryStatus::TimedOut,
                _ => CategoryStatus::Unavailable,
            };
            (UNKNOWN_CATEGORY.to_string(), status)
        } else {
            debug!("No category model; reporting '{}'", UNKNOWN_CATEGORY);
            (UNKNOWN_CATEGORY.to_string(), CategoryStatus::Unavailable)
        };

        Ok(ClassificationResult {
            label,
            attack_probability,
            risk_score,
            severity,
            attack_type,
            category_status,
        })
    }
}

/// Skip predicate for the category stage
fn binary_is_attack(results: &[PipelineResult], attack_class: &str) -> bool {
    results
        .iter()
        .find(|r| r.stage_name == BINARY_STAGE)
        .is_some_and(|r| r.result.label == attack_class)
}
