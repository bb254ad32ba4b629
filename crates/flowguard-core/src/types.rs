//! Core types for FlowGuard

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Columns carrying ground truth; never fed to the classifiers
pub const LABEL_COLUMNS: [&str; 2] = ["label", "attack_cat"];

/// Attack category reported for normal traffic
pub const NORMAL_CATEGORY: &str = "Normal";

/// Attack category reported when the category stage could not run
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// A single feature value as captured from a traffic source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Numeric feature
    Number(f64),

    /// Categorical feature
    Text(String),

    /// Missing entry, filled by the transformer
    Missing,
}

impl FeatureValue {
    /// Parse a raw tabular cell; empty and NA-like cells are missing
    pub fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() {
            return Self::Missing;
        }

        match cell.to_ascii_lowercase().as_str() {
            "nan" | "na" | "n/a" | "null" | "none" => return Self::Missing,
            _ => {}
        }

        match cell.parse::<f64>() {
            Ok(v) => Self::Number(v),
            Err(_) => Self::Text(cell.to_string()),
        }
    }

    /// Whether this value needs to be filled
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
            || matches!(self, Self::Number(v) if v.is_nan())
    }

    /// Textual form used for categorical lookups
    ///
    /// Integral numbers render without a fractional part so that a category
    /// captured as `0` matches a known category `"0"`.
    pub fn category_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Number(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => {
                Some(format!("{}", *v as i64))
            }
            Self::Number(v) if v.is_nan() => None,
            Self::Number(v) => Some(v.to_string()),
            Self::Missing => None,
        }
    }

    /// Numeric form, parsing text when it looks like a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Missing => None,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// A raw flow record: feature name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    fields: HashMap<String, FeatureValue>,
}

impl RawRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from name/value pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<FeatureValue>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Set a feature value
    pub fn insert(&mut self, name: impl Into<String>, value: FeatureValue) {
        self.fields.insert(name.into(), value);
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(name, value.into());
        self
    }

    /// Look up a feature value
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.fields.get(name)
    }

    /// Remove a feature, returning its value
    pub fn remove(&mut self, name: &str) -> Option<FeatureValue> {
        self.fields.remove(name)
    }

    /// Whether the feature is present (missing values count as present)
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Column names present in this record
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no features
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether the column name is a ground-truth column
    pub fn is_label_column(name: &str) -> bool {
        LABEL_COLUMNS.contains(&name)
    }
}

/// Numeric feature vector in the exact column order the scaler was fit with
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRecord {
    values: Vec<f64>,
    columns: Arc<[String]>,
}

impl TransformedRecord {
    /// Create a transformed record; `values` must align with `columns`
    pub fn new(values: Vec<f64>, columns: Arc<[String]>) -> Self {
        debug_assert_eq!(values.len(), columns.len());
        Self { values, columns }
    }

    /// Feature values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Ordered column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the vector is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether two records can be compared or stacked column-wise
    pub fn same_schema(&self, other: &TransformedRecord) -> bool {
        Arc::ptr_eq(&self.columns, &other.columns) || self.columns == other.columns
    }

    /// Whether this record matches an expected feature list
    pub fn matches_features(&self, features: &[String]) -> bool {
        self.columns.as_ref() == features
    }
}

/// Binary detection label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Normal,
    Attack,
}

impl Label {
    /// Numeric flag used in tabular exports (0 = Normal, 1 = Attack)
    pub fn as_flag(&self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Attack => 1,
        }
    }

    pub fn is_attack(&self) -> bool {
        matches!(self, Self::Attack)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("Normal"),
            Self::Attack => f.write_str("Attack"),
        }
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "0" => Ok(Self::Normal),
            "attack" | "1" => Ok(Self::Attack),
            other => Err(format!("unknown label '{}'", other)),
        }
    }
}

/// Severity tier derived from the risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// How the attack-category stage contributed to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    /// Binary label was Normal, stage not invoked
    Skipped,
    /// Category model produced the attack type
    Predicted,
    /// Category model not loaded
    Unavailable,
    /// Category model exceeded its time budget
    TimedOut,
}

/// Outcome of classifying one flow record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Binary label
    pub label: Label,

    /// Probability of the attack class (0.0-1.0)
    pub attack_probability: f64,

    /// Risk score (0.0-100.0, two decimals)
    pub risk_score: f64,

    /// Severity tier
    pub severity: Severity,

    /// Attack category, `Normal` for normal traffic
    pub attack_type: String,

    /// Whether the category stage ran
    pub category_status: CategoryStatus,
}

impl ClassificationResult {
    pub fn is_attack(&self) -> bool {
        self.label.is_attack()
    }

    /// Whether the category stage was expected but could not run
    pub fn is_degraded(&self) -> bool {
        matches!(
            self.category_status,
            CategoryStatus::Unavailable | CategoryStatus::TimedOut
        )
    }
}
