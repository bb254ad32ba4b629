//! Schema transformer: raw flow records to the scaler's feature vector
//!
//! The transformer applies, per column and in the scaler's fit-time order:
//! - missing-value fill from training-time statistics (median / mode)
//! - categorical encoding with the encoder's fallback for unseen categories
//! - standardization `(value - center) / scale`
//!
//! Ground-truth columns (`label`, `attack_cat`) are dropped. Callers check a
//! dataset's header once with [`SchemaTransformer::validate_columns`]; per
//! record only missing columns (and extras, in strict mode) are caught.

use crate::artifacts::{Encoder, EncoderSet, FillValues, Scaler};
use flowguard_core::{Error, FeatureValue, RawRecord, Result, TransformedRecord};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// How one output column is produced
#[derive(Debug, Clone)]
enum ColumnPlan {
    Numeric { fill: f64 },
    Categorical { encoder: Encoder, fill: String },
}

/// Converts raw records into classifier-ready vectors
#[derive(Debug, Clone)]
pub struct SchemaTransformer {
    columns: Arc<[String]>,
    known: HashSet<String>,
    plans: Vec<ColumnPlan>,
    scaler: Scaler,
    strict_columns: bool,
}

impl SchemaTransformer {
    /// Assemble a transformer from frozen artifacts
    ///
    /// Fails with `ArtifactLoad` when the artifacts disagree: an encoder for a
    /// column the scaler does not know, or a column without a fill value.
    pub fn new(encoders: EncoderSet, scaler: Scaler, fill: FillValues) -> Result<Self> {
        let scaler = scaler.validated()?;

        for column in encoders.columns() {
            if !scaler.feature_names.iter().any(|f| f == column) {
                return Err(Error::artifact(format!(
                    "encoder for '{}' but the scaler has no such feature",
                    column
                )));
            }
        }

        let mut plans = Vec::with_capacity(scaler.len());
        for name in &scaler.feature_names {
            let plan = match encoders.get(name) {
                Some(encoder) => {
                    let fill = fill.categorical.get(name).cloned().ok_or_else(|| {
                        Error::artifact(format!("no training mode for categorical '{}'", name))
                    })?;
                    ColumnPlan::Categorical {
                        encoder: encoder.clone(),
                        fill,
                    }
                }
                None => {
                    let fill = *fill.numeric.get(name).ok_or_else(|| {
                        Error::artifact(format!("no training median for numeric '{}'", name))
                    })?;
                    if !fill.is_finite() {
                        return Err(Error::artifact(format!(
                            "training median for '{}' is not finite",
                            name
                        )));
                    }
                    ColumnPlan::Numeric { fill }
                }
            };
            plans.push(plan);
        }

        let columns: Arc<[String]> = Arc::from(scaler.feature_names.clone());
        let known = scaler.feature_names.iter().cloned().collect();

        Ok(Self {
            columns,
            known,
            plans,
            scaler,
            strict_columns: false,
        })
    }

    /// Reject extra, non-label columns instead of ignoring them
    pub fn with_strict_columns(mut self, strict: bool) -> Self {
        self.strict_columns = strict;
        self
    }

    /// Fit-time column order shared by every record this transformer emits
    pub fn columns(&self) -> &Arc<[String]> {
        &self.columns
    }

    /// Number of output features
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Check an input column set against the fit-time schema
    pub fn validate_columns<'a>(&self, columns: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let input: Vec<&str> = columns.into_iter().collect();
        let present: HashSet<&str> = input.iter().copied().collect();

        let missing: Vec<&str> = self
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| !present.contains(c))
            .collect();
        if !missing.is_empty() {
            return Err(Error::schema(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        let extra: Vec<&str> = input
            .iter()
            .copied()
            .filter(|c| self.is_extra(c))
            .collect();
        if !extra.is_empty() {
            if self.strict_columns {
                return Err(Error::schema(format!(
                    "unexpected columns: {}",
                    extra.join(", ")
                )));
            }
            debug!("Ignoring columns not in schema: {}", extra.join(", "));
        }

        Ok(())
    }

    fn is_extra(&self, column: &str) -> bool {
        !RawRecord::is_label_column(column) && !self.known.contains(column)
    }

    /// Transform a batch of records
    pub fn transform(&self, records: &[RawRecord]) -> Result<Vec<TransformedRecord>> {
        records.iter().map(|r| self.transform_one(r)).collect()
    }

    /// Transform one record
    pub fn transform_one(&self, record: &RawRecord) -> Result<TransformedRecord> {
        if self.strict_columns {
            if let Some(extra) = record.columns().find(|c| self.is_extra(c)) {
                return Err(Error::schema(format!("unexpected column: {}", extra)));
            }
        }

        let mut values = Vec::with_capacity(self.width());
        for (i, (name, plan)) in self.columns.iter().zip(&self.plans).enumerate() {
            let raw = record
                .get(name)
                .ok_or_else(|| Error::schema(format!("missing required column '{}'", name)))?;
            let value = Self::resolve(name, raw, plan)?;
            values.push(self.scaler.apply(i, value));
        }

        Ok(TransformedRecord::new(values, Arc::clone(&self.columns)))
    }

    /// Fill and encode a single cell, before scaling
    fn resolve(name: &str, raw: &FeatureValue, plan: &ColumnPlan) -> Result<f64> {
        match plan {
            ColumnPlan::Numeric { fill } => {
                if raw.is_missing() {
                    return Ok(*fill);
                }
                let value = raw.as_number().ok_or_else(|| {
                    Error::schema(format!("non-numeric value {:?} in numeric column '{}'", raw, name))
                })?;
                if !value.is_finite() {
                    return Err(Error::schema(format!(
                        "non-finite value in numeric column '{}'",
                        name
                    )));
                }
                Ok(value)
            }
            ColumnPlan::Categorical { encoder, fill } => {
                let category = if raw.is_missing() {
                    fill.clone()
                } else {
                    raw.category_text().unwrap_or_else(|| fill.clone())
                };
                Ok(encoder.encode(&category) as f64)
            }
        }
    }
}
