//! Detector configuration

use flowguard_classifiers::ClassifierConfig;
use flowguard_core::{Error, Result};
use flowguard_telemetry::LedgerPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Detector configuration, read from `flowguard.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Held-out dataset the batch runner walks through
    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,

    /// Records per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// What a batch run does once the cursor reaches the dataset end
    #[serde(default)]
    pub end_of_dataset: EndOfDataset,

    /// Directory holding the state file, logs, journal and lock
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Artifact locations and classifier behaviour
    #[serde(default)]
    pub classifiers: ClassifierConfig,
}

/// Policy at the end of the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndOfDataset {
    /// Fail with `EndOfDataset`; nothing is written
    #[default]
    Fail,
    /// Restart the window at offset 0; event ids keep increasing
    Wrap,
}

/// Values supplied on the command line, applied over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub dataset: Option<PathBuf>,
    pub artifacts_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub end_of_dataset: Option<EndOfDataset>,
}

impl DetectorConfig {
    /// Load configuration from file and CLI overrides
    ///
    /// A missing file yields the defaults.
    pub fn load(config_path: impl AsRef<Path>, overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let config_path = config_path.as_ref();
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            Self::from_yaml(&content)?
        } else {
            Self::default()
        };

        if let Some(dataset) = &overrides.dataset {
            config.dataset = dataset.clone();
        }
        if let Some(dir) = &overrides.artifacts_dir {
            config.classifiers.artifacts_dir = dir.clone();
        }
        if let Some(dir) = &overrides.state_dir {
            config.state_dir = dir.clone();
        }
        if let Some(size) = overrides.batch_size {
            config.batch_size = size;
        }
        if let Some(policy) = overrides.end_of_dataset {
            config.end_of_dataset = policy;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        if self.classifiers.model_timeout_ms == 0 {
            return Err(Error::config("classifiers.model_timeout_ms must be at least 1"));
        }
        if self.classifiers.attack_class.trim().is_empty() {
            return Err(Error::config("classifiers.attack_class must not be empty"));
        }
        Ok(())
    }

    pub fn ledger_paths(&self) -> LedgerPaths {
        LedgerPaths::in_dir(&self.state_dir)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            batch_size: default_batch_size(),
            end_of_dataset: EndOfDataset::default(),
            state_dir: default_state_dir(),
            classifiers: ClassifierConfig::default(),
        }
    }
}

fn default_dataset() -> PathBuf {
    PathBuf::from("./data/test.csv")
}

fn default_batch_size() -> usize {
    10
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}
