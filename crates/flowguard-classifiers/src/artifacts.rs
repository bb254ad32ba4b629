//! Frozen preprocessing artifacts produced by offline training
//!
//! All artifacts are JSON documents. They are validated on load and never
//! mutated afterwards; the transformer and classifiers share them through
//! `Arc`s for the lifetime of the process.

use flowguard_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Serialized form of one categorical encoder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSpec {
    /// Known categories; the code of a category is its position
    pub classes: Vec<String>,

    /// Category substituted for values outside `classes`
    #[serde(default)]
    pub fallback: Option<String>,
}

/// Serialized form of `encoders.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSetSpec {
    #[serde(default)]
    pub version: Option<String>,

    pub columns: BTreeMap<String, EncoderSpec>,
}

/// Deterministic category-to-code mapping with an explicit fallback
#[derive(Debug, Clone)]
pub struct Encoder {
    column: String,
    classes: Vec<String>,
    index: HashMap<String, usize>,
    fallback: String,
    fallback_code: usize,
}

impl Encoder {
    /// Build an encoder; the fallback must be one of the known classes
    pub fn new(
        column: impl Into<String>,
        classes: Vec<String>,
        fallback: impl Into<String>,
    ) -> Result<Self> {
        let column = column.into();
        let fallback = fallback.into();

        if classes.is_empty() {
            return Err(Error::artifact(format!(
                "encoder for '{}' has no known categories",
                column
            )));
        }

        let mut index = HashMap::with_capacity(classes.len());
        for (code, class) in classes.iter().enumerate() {
            if index.insert(class.clone(), code).is_some() {
                return Err(Error::artifact(format!(
                    "encoder for '{}' lists category '{}' twice",
                    column, class
                )));
            }
        }

        let fallback_code = *index.get(&fallback).ok_or_else(|| {
            Error::artifact(format!(
                "fallback '{}' for '{}' is not a known category",
                fallback, column
            ))
        })?;

        Ok(Self {
            column,
            classes,
            index,
            fallback,
            fallback_code,
        })
    }

    /// Integer code for a category, substituting the fallback when unseen
    pub fn encode(&self, value: &str) -> usize {
        self.index.get(value).copied().unwrap_or(self.fallback_code)
    }

    /// Whether the category was seen at training time
    pub fn is_known(&self, value: &str) -> bool {
        self.index.contains_key(value)
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }
}

/// Encoders by column name
#[derive(Debug, Clone, Default)]
pub struct EncoderSet {
    pub version: Option<String>,
    encoders: HashMap<String, Encoder>,
}

impl EncoderSet {
    /// Build from the serialized form, applying per-column fallback overrides
    pub fn from_spec(spec: EncoderSetSpec, overrides: &HashMap<String, String>) -> Result<Self> {
        let mut encoders = HashMap::with_capacity(spec.columns.len());

        for (column, encoder) in spec.columns {
            let fallback = overrides
                .get(&column)
                .cloned()
                .or(encoder.fallback)
                .ok_or_else(|| {
                    Error::artifact(format!(
                        "no fallback category configured for '{}'",
                        column
                    ))
                })?;

            let encoder = Encoder::new(column.clone(), encoder.classes, fallback)?;
            encoders.insert(column, encoder);
        }

        for column in overrides.keys() {
            if !encoders.contains_key(column) {
                return Err(Error::artifact(format!(
                    "fallback override for '{}' but no encoder exists for it",
                    column
                )));
            }
        }

        Ok(Self {
            version: spec.version,
            encoders,
        })
    }

    /// Build directly from encoders
    pub fn from_encoders(encoders: impl IntoIterator<Item = Encoder>) -> Self {
        Self {
            version: None,
            encoders: encoders
                .into_iter()
                .map(|e| (e.column.clone(), e))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Encoder> {
        self.encoders.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.encoders.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

/// Per-feature standardization, fit once over the training distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    #[serde(default)]
    pub version: Option<String>,

    /// Column order used at fit time
    pub feature_names: Vec<String>,

    pub center: Vec<f64>,

    pub scale: Vec<f64>,
}

impl Scaler {
    /// Validate shape and normalize degenerate scales
    ///
    /// A zero scale (constant training column) is replaced by 1.0 so the
    /// column is only centered.
    pub fn validated(mut self) -> Result<Self> {
        let n = self.feature_names.len();
        if n == 0 {
            return Err(Error::artifact("scaler has no features"));
        }
        if self.center.len() != n || self.scale.len() != n {
            return Err(Error::artifact(format!(
                "scaler has {} features but {} centers and {} scales",
                n,
                self.center.len(),
                self.scale.len()
            )));
        }

        let mut seen = HashSet::with_capacity(n);
        for name in &self.feature_names {
            if !seen.insert(name.as_str()) {
                return Err(Error::artifact(format!(
                    "scaler lists feature '{}' twice",
                    name
                )));
            }
        }

        for (i, (c, s)) in self.center.iter().zip(self.scale.iter_mut()).enumerate() {
            if !c.is_finite() || !s.is_finite() {
                return Err(Error::artifact(format!(
                    "scaler parameters for '{}' are not finite",
                    self.feature_names[i]
                )));
            }
            if *s == 0.0 {
                debug!("Scaler column '{}' has zero scale", self.feature_names[i]);
                *s = 1.0;
            }
        }

        Ok(self)
    }

    /// Standardize one value of column `i`
    pub fn apply(&self, i: usize, value: f64) -> f64 {
        (value - self.center[i]) / self.scale[i]
    }

    pub fn len(&self) -> usize {
        self.feature_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feature_names.is_empty()
    }
}

/// Training-time statistics used to fill missing values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FillValues {
    #[serde(default)]
    pub version: Option<String>,

    /// Median per numeric column
    #[serde(default)]
    pub numeric: HashMap<String, f64>,

    /// Mode per categorical column
    #[serde(default)]
    pub categorical: HashMap<String, String>,
}

/// Reads artifact files while accumulating a digest over their bytes
pub struct ArtifactReader {
    hasher: Sha256,
    files: usize,
}

impl ArtifactReader {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            files: 0,
        }
    }

    /// Read and parse a required JSON artifact
    pub fn read<T: DeserializeOwned>(&mut self, path: &Path) -> Result<T> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::artifact(format!("cannot read {}: {}", path.display(), e))
        })?;
        self.parse(path, &bytes)
    }

    /// Read an optional JSON artifact; `Ok(None)` when the file does not exist
    pub fn read_optional<T: DeserializeOwned>(&mut self, path: &Path) -> Result<Option<T>> {
        match std::fs::read(path) {
            Ok(bytes) => self.parse(path, &bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::artifact(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn parse<T: DeserializeOwned>(&mut self, path: &Path, bytes: &[u8]) -> Result<T> {
        let value = serde_json::from_slice(bytes).map_err(|e| {
            Error::artifact(format!("cannot parse {}: {}", path.display(), e))
        })?;

        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self.files += 1;

        debug!("Read artifact {} ({} bytes)", path.display(), bytes.len());
        Ok(value)
    }

    /// Number of artifacts read so far
    pub fn files_read(&self) -> usize {
        self.files
    }

    /// Hex SHA-256 identifying the artifact set
    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl Default for ArtifactReader {
    fn default() -> Self {
        Self::new()
    }
}
