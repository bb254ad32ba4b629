//! Classifier pipeline with conditional stages
//!
//! This module provides a small staged pipeline that allows:
//! - Sequential execution of classifiers over one transformed record
//! - Conditional execution based on earlier results (skip predicates)
//! - Per-stage time budgets
//! - Optional stages whose failures degrade instead of aborting

use crate::{Classifier, Prediction};
use flowguard_core::{Error, Result, TransformedRecord};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Skip predicate evaluated against the results so far
pub type StageCondition = Arc<dyn Fn(&[PipelineResult]) -> bool + Send + Sync>;

/// A pipeline of classifiers executed stage by stage
#[derive(Clone)]
pub struct ClassifierPipeline {
    stages: Vec<PipelineStage>,
    stage_timeout: Option<Duration>,
}

/// A single stage in the pipeline
#[derive(Clone)]
pub enum PipelineStage {
    /// Execute a single classifier; failure aborts the pipeline
    Single {
        name: String,
        classifier: Arc<dyn Classifier>,
    },

    /// Execute a classifier only when the condition holds
    Conditional {
        name: String,
        condition: StageCondition,
        classifier: Arc<dyn Classifier>,
        /// Degradable failures (timeouts, unavailable models) are recorded
        /// instead of aborting when the stage is optional
        required: bool,
    },
}

impl PipelineStage {
    pub fn name(&self) -> &str {
        match self {
            Self::Single { name, .. } | Self::Conditional { name, .. } => name,
        }
    }
}

/// Result from a pipeline stage
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Stage name
    pub stage_name: String,

    /// Classifier name
    pub classifier_name: String,

    /// Model output
    pub result: Prediction,

    /// Stage execution time
    pub stage_latency_us: u64,
}

/// An optional stage that failed without aborting the pipeline
#[derive(Debug)]
pub struct StageFailure {
    pub stage_name: String,
    pub error: Error,
}

/// Complete pipeline execution result
#[derive(Debug)]
pub struct PipelineExecutionResult {
    /// Results of stages that ran
    pub results: Vec<PipelineResult>,

    /// Stages whose condition did not hold
    pub skipped: Vec<String>,

    /// Optional stages that failed
    pub failures: Vec<StageFailure>,

    /// Total pipeline execution time
    pub total_latency_us: u64,
}

impl PipelineExecutionResult {
    /// Result of a named stage, if it ran
    pub fn stage(&self, name: &str) -> Option<&PipelineResult> {
        self.results.iter().find(|r| r.stage_name == name)
    }

    /// Failure of a named stage, if it failed
    pub fn failure(&self, name: &str) -> Option<&StageFailure> {
        self.failures.iter().find(|f| f.stage_name == name)
    }

    pub fn was_skipped(&self, name: &str) -> bool {
        self.skipped.iter().any(|s| s == name)
    }
}

impl ClassifierPipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            stage_timeout: None,
        }
    }

    /// Bound every stage by the given time budget
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }

    /// Add a single classifier stage
    pub fn add_single(mut self, name: impl Into<String>, classifier: Arc<dyn Classifier>) -> Self {
        self.stages.push(PipelineStage::Single {
            name: name.into(),
            classifier,
        });
        self
    }

    /// Add a conditional stage
    pub fn add_conditional<F>(
        mut self,
        name: impl Into<String>,
        condition: F,
        classifier: Arc<dyn Classifier>,
        required: bool,
    ) -> Self
    where
        F: Fn(&[PipelineResult]) -> bool + Send + Sync + 'static,
    {
        self.stages.push(PipelineStage::Conditional {
            name: name.into(),
            condition: Arc::new(condition),
            classifier,
            required,
        });
        self
    }

    /// Execute the entire pipeline
    pub async fn execute(&self, record: &TransformedRecord) -> Result<PipelineExecutionResult> {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut skipped = Vec::new();
        let mut failures = Vec::new();

        for stage in &self.stages {
            match stage {
                PipelineStage::Single { name, classifier } => {
                    results.push(self.execute_single(name, classifier, record).await?);
                }

                PipelineStage::Conditional {
                    name,
                    condition,
                    classifier,
                    required,
                } => {
                    if !condition(&results) {
                        debug!("Skipping stage '{}'", name);
                        skipped.push(name.clone());
                        continue;
                    }

                    match self.execute_single(name, classifier, record).await {
                        Ok(result) => results.push(result),
                        Err(e) if !*required && e.is_degradable() => {
                            warn!("Optional stage '{}' failed: {}", name, e);
                            failures.push(StageFailure {
                                stage_name: name.clone(),
                                error: e,
                            });
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        Ok(PipelineExecutionResult {
            results,
            skipped,
            failures,
            total_latency_us: start.elapsed().as_micros() as u64,
        })
    }

    /// Execute a single classifier within the stage budget
    async fn execute_single(
        &self,
        stage_name: &str,
        classifier: &Arc<dyn Classifier>,
        record: &TransformedRecord,
    ) -> Result<PipelineResult> {
        let stage_start = Instant::now();

        let result = match self.stage_timeout {
            Some(budget) => {
                let timed_out = || Error::ModelTimeout {
                    model: classifier.name().to_string(),
                    elapsed: stage_start.elapsed(),
                };
                let result = tokio::time::timeout(budget, classifier.classify(record))
                    .await
                    .map_err(|_| timed_out())??;
                // CPU-bound models finish in their first poll, so the timer never fires
                if stage_start.elapsed() > budget {
                    return Err(timed_out());
                }
                result
            }
            None => classifier.classify(record).await?,
        };

        Ok(PipelineResult {
            stage_name: stage_name.to_string(),
            classifier_name: classifier.name().to_string(),
            result,
            stage_latency_us: stage_start.elapsed().as_micros() as u64,
        })
    }

    /// Get number of stages in pipeline
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(PipelineStage::name).collect()
    }
}

impl Default for ClassifierPipeline {
    fn default() -> Self {
        Self::new()
    }
}
