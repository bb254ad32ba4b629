//! Configuration for artifact loading and classifier invocation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the transformer and classifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Directory holding the training artifacts
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    /// Artifact file names, relative to `artifacts_dir`
    #[serde(default)]
    pub files: ArtifactFiles,

    /// Binary model class that means "attack"
    #[serde(default = "default_attack_class")]
    pub attack_class: String,

    /// Time budget per classifier stage (milliseconds)
    #[serde(default = "default_model_timeout_ms")]
    pub model_timeout_ms: u64,

    /// Fallback category per categorical column, overriding the artifact
    #[serde(default)]
    pub fallback_overrides: HashMap<String, String>,

    /// Reject records carrying columns the scaler was not fit with
    #[serde(default)]
    pub strict_columns: bool,
}

/// Artifact file names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactFiles {
    #[serde(default = "default_encoders_file")]
    pub encoders: String,

    #[serde(default = "default_scaler_file")]
    pub scaler: String,

    #[serde(default = "default_fill_values_file")]
    pub fill_values: String,

    #[serde(default = "default_binary_model_file")]
    pub binary_model: String,

    /// Optional multiclass model; detection degrades to binary-only without it
    #[serde(default = "default_attack_model_file")]
    pub attack_model: String,
}

impl Default for ArtifactFiles {
    fn default() -> Self {
        Self {
            encoders: default_encoders_file(),
            scaler: default_scaler_file(),
            fill_values: default_fill_values_file(),
            binary_model: default_binary_model_file(),
            attack_model: default_attack_model_file(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: default_artifacts_dir(),
            files: ArtifactFiles::default(),
            attack_class: default_attack_class(),
            model_timeout_ms: default_model_timeout_ms(),
            fallback_overrides: HashMap::new(),
            strict_columns: false,
        }
    }
}

impl ClassifierConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }

    /// Configuration rooted at the given artifacts directory
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    /// Stage time budget
    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    pub fn encoders_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.files.encoders)
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.files.scaler)
    }

    pub fn fill_values_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.files.fill_values)
    }

    pub fn binary_model_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.files.binary_model)
    }

    pub fn attack_model_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.files.attack_model)
    }
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("./models")
}

fn default_attack_class() -> String {
    "1".to_string()
}

fn default_model_timeout_ms() -> u64 {
    2_000
}

fn default_encoders_file() -> String {
    "encoders.json".to_string()
}

fn default_scaler_file() -> String {
    "scaler.json".to_string()
}

fn default_fill_values_file() -> String {
    "fill_values.json".to_string()
}

fn default_binary_model_file() -> String {
    "binary_model.json".to_string()
}

fn default_attack_model_file() -> String {
    "attack_model.json".to_string()
}
