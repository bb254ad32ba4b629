//! FlowGuard Classifiers
//!
//! Everything between a raw flow record and a scored classification:
//! - Frozen preprocessing artifacts (encoders, scaler, fill values)
//! - The schema transformer that applies them
//! - Tree-ensemble models behind the async [`Classifier`] trait
//! - A staged pipeline with a conditional attack-category stage
//! - Risk score and severity derivation
//! - An offline evaluation report for labeled data
//!
//! Artifacts are loaded once per process and shared read-only.

pub mod artifacts;
pub mod classifier;
pub mod config;
pub mod evaluation;
pub mod forest;
pub mod invoker;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod scoring;

pub use artifacts::{ArtifactReader, Encoder, EncoderSet, FillValues, Scaler};
pub use classifier::{Classifier, Prediction};
pub use config::{ArtifactFiles, ClassifierConfig};
pub use evaluation::{ClassMetrics, EvaluationReport};
pub use forest::{TreeEnsemble, TreeEnsembleSpec, TreeNode};
pub use invoker::FlowClassifier;
pub use pipeline::{
    ClassifierPipeline, PipelineExecutionResult, PipelineResult, PipelineStage, StageFailure,
};
pub use registry::{load_artifacts, ArtifactRegistry, LoadedArtifacts};
pub use schema::SchemaTransformer;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{Classifier, Prediction};
    pub use crate::config::ClassifierConfig;
    pub use crate::invoker::FlowClassifier;
    pub use crate::registry::{ArtifactRegistry, LoadedArtifacts};
    pub use crate::schema::SchemaTransformer;
    pub use crate::scoring::{describe_attack, score};
}
