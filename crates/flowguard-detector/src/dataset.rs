//! Flow-record datasets read from CSV
//!
//! Every cell becomes a [`FeatureValue`]; the raw text is kept alongside so
//! exports can reproduce the input columns unchanged.

use flowguard_core::{Error, FeatureValue, Label, RawRecord, Result};
use std::io::Read;
use std::path::Path;
use tracing::info;

const LABEL_COLUMN: &str = "label";
const CATEGORY_COLUMN: &str = "attack_cat";

/// An in-memory flow dataset
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    records: Vec<RawRecord>,
}

impl Dataset {
    /// Load a CSV file with a header row
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            Error::schema(format!("cannot open dataset {}: {}", path.display(), e))
        })?;
        let dataset = Self::from_reader(file)
            .map_err(|e| Error::schema(format!("{}: {}", path.display(), e)))?;
        info!(
            "Loaded {} records with {} columns from {:?}",
            dataset.len(),
            dataset.headers.len(),
            path
        );
        Ok(dataset)
    }

    /// Parse CSV from any reader; the first row is the header
    pub fn from_reader(reader: impl Read) -> std::result::Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();

        let mut rows = Vec::new();
        let mut records = Vec::new();
        for result in rdr.records() {
            let row = result?;
            let record = RawRecord::from_pairs(
                headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, cell)| (h.clone(), FeatureValue::parse(cell))),
            );
            rows.push(row.iter().map(|c| c.to_string()).collect());
            records.push(record);
        }

        Ok(Self {
            headers,
            rows,
            records,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    /// Raw cell text of row `i`, in header order
    pub fn row(&self, i: usize) -> Option<&[String]> {
        self.rows.get(i).map(Vec::as_slice)
    }

    /// Records `[start, start + size)`, clipped to the end
    pub fn window(&self, start: usize, size: usize) -> &[RawRecord] {
        let start = start.min(self.records.len());
        let end = start.saturating_add(size).min(self.records.len());
        &self.records[start..end]
    }

    pub fn has_ground_truth(&self) -> bool {
        self.headers.iter().any(|h| h == LABEL_COLUMN)
    }

    /// Ground-truth binary label of row `i`, if the dataset carries one
    pub fn label(&self, i: usize) -> Option<Label> {
        let value = self.records.get(i)?.get(LABEL_COLUMN)?;
        match value {
            FeatureValue::Number(n) if *n == 0.0 => Some(Label::Normal),
            FeatureValue::Number(n) if *n == 1.0 => Some(Label::Attack),
            FeatureValue::Text(t) => t.parse().ok(),
            _ => None,
        }
    }

    /// Ground-truth attack category of row `i`
    pub fn attack_category(&self, i: usize) -> Option<String> {
        self.records.get(i)?.get(CATEGORY_COLUMN)?.category_text()
    }
}
