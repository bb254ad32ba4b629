//! Artifact registry: loads the frozen artifact set once per process

use crate::artifacts::{ArtifactReader, EncoderSet, EncoderSetSpec, FillValues, Scaler};
use crate::forest::TreeEnsemble;
use crate::{Classifier, ClassifierConfig, FlowClassifier, SchemaTransformer};
use flowguard_core::{ClassificationResult, Error, RawRecord, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Everything needed to classify raw records, shared read-only
pub struct LoadedArtifacts {
    /// Schema transformer built from encoders, scaler and fill values
    pub transformer: Arc<SchemaTransformer>,

    /// Two-stage classifier invoker
    pub classifier: Arc<FlowClassifier>,

    /// SHA-256 over all artifact bytes that were read
    pub digest: String,

    /// Version strings declared by the artifacts, by artifact name
    pub versions: Vec<(String, String)>,
}

impl LoadedArtifacts {
    /// Assemble from already-built parts
    pub fn new(transformer: SchemaTransformer, classifier: FlowClassifier) -> Self {
        Self {
            transformer: Arc::new(transformer),
            classifier: Arc::new(classifier),
            digest: String::new(),
            versions: Vec::new(),
        }
    }

    /// Transform and classify a single raw record
    pub async fn classify_raw(&self, record: &RawRecord) -> Result<ClassificationResult> {
        let transformed = self.transformer.transform_one(record)?;
        self.classifier.classify(&transformed).await
    }
}

/// Load and cross-check the artifact set described by the configuration
pub fn load_artifacts(config: &ClassifierConfig) -> Result<LoadedArtifacts> {
    info!("Loading artifacts from {:?}", config.artifacts_dir);

    let mut reader = ArtifactReader::new();
    let mut versions = Vec::new();

    let encoders: EncoderSetSpec = reader.read(&config.encoders_path())?;
    let encoders = EncoderSet::from_spec(encoders, &config.fallback_overrides)?;
    if let Some(v) = &encoders.version {
        versions.push(("encoders".to_string(), v.clone()));
    }

    let scaler: Scaler = reader.read(&config.scaler_path())?;
    if let Some(v) = &scaler.version {
        versions.push(("scaler".to_string(), v.clone()));
    }

    let fill: FillValues = reader.read(&config.fill_values_path())?;
    if let Some(v) = &fill.version {
        versions.push(("fill_values".to_string(), v.clone()));
    }

    let transformer =
        SchemaTransformer::new(encoders, scaler, fill)?.with_strict_columns(config.strict_columns);

    let binary = TreeEnsemble::load("binary", &config.binary_model_path(), &mut reader)?;
    check_feature_order(&binary, &transformer)?;
    if let Some(v) = binary.version() {
        versions.push(("binary_model".to_string(), v.to_string()));
    }

    let attack = TreeEnsemble::load_optional("attack", &config.attack_model_path(), &mut reader)?;
    if let Some(model) = &attack {
        check_feature_order(model, &transformer)?;
        if let Some(v) = model.version() {
            versions.push(("attack_model".to_string(), v.to_string()));
        }
    } else {
        warn!(
            "Attack category model not found at {:?}; continuing binary-only",
            config.attack_model_path()
        );
    }

    let classifier = FlowClassifier::new(
        Arc::new(binary),
        attack.map(|m| Arc::new(m) as Arc<dyn Classifier>),
        config.attack_class.clone(),
        config.model_timeout(),
    )?;

    let digest = reader.finish();
    info!(
        "Artifacts loaded: {} features, digest {}",
        transformer.width(),
        &digest[..12]
    );

    Ok(LoadedArtifacts {
        transformer: Arc::new(transformer),
        classifier: Arc::new(classifier),
        digest,
        versions,
    })
}

/// Models must be trained on exactly the scaler's column order
fn check_feature_order(model: &TreeEnsemble, transformer: &SchemaTransformer) -> Result<()> {
    if model.feature_names() != &transformer.columns()[..] {
        return Err(Error::schema(format!(
            "model '{}' feature order does not match the scaler's",
            model.name()
        )));
    }
    Ok(())
}

/// Application-scoped artifact cache, initialised on first use
pub struct ArtifactRegistry {
    config: ClassifierConfig,
    loaded: OnceCell<Arc<LoadedArtifacts>>,
}

impl ArtifactRegistry {
    /// Create a registry; nothing is loaded until first use
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            loaded: OnceCell::new(),
        }
    }

    /// Get the artifact set, loading it on first call
    pub async fn get(&self) -> Result<Arc<LoadedArtifacts>> {
        self.loaded
            .get_or_try_init(|| async { load_artifacts(&self.config).map(Arc::new) })
            .await
            .cloned()
    }

    /// Whether the artifacts have been loaded
    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }
}
