//! Interactive analysis of an uploaded flow file
//!
//! Classifies every record with the shared artifacts and produces the input
//! table augmented with `Prediction, Attack_Probability, Risk_Score, Status,
//! Attack_Type`. Never touches the batch ledger.

use crate::dataset::Dataset;
use flowguard_classifiers::LoadedArtifacts;
use flowguard_core::{ClassificationResult, Error, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Columns appended to the input table
pub const RESULT_COLUMNS: [&str; 5] = [
    "Prediction",
    "Attack_Probability",
    "Risk_Score",
    "Status",
    "Attack_Type",
];

/// Classification of a whole uploaded file
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// One result per input row, in input order
    pub results: Vec<ClassificationResult>,

    pub attacks: usize,
    pub normal: usize,

    /// Attack count per attack type, attacks only
    pub attack_types: BTreeMap<String, usize>,

    /// Mean risk score over attacks, two decimals
    pub mean_attack_risk: Option<f64>,

    /// Attacks whose category could not be determined
    pub degraded: usize,
}

impl AnalysisReport {
    fn from_results(results: Vec<ClassificationResult>) -> Self {
        let mut attack_types = BTreeMap::new();
        let mut risk_sum = 0.0;
        let mut attacks = 0;
        let mut degraded = 0;

        for result in results.iter().filter(|r| r.is_attack()) {
            attacks += 1;
            risk_sum += result.risk_score;
            *attack_types.entry(result.attack_type.clone()).or_insert(0) += 1;
            if result.is_degraded() {
                degraded += 1;
            }
        }

        let mean_attack_risk =
            (attacks > 0).then(|| (risk_sum / attacks as f64 * 100.0).round() / 100.0);

        Self {
            normal: results.len() - attacks,
            results,
            attacks,
            attack_types,
            mean_attack_risk,
            degraded,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Attack types ordered by count, most frequent first
    pub fn attack_breakdown(&self) -> Vec<(&str, usize)> {
        let mut breakdown: Vec<(&str, usize)> = self
            .attack_types
            .iter()
            .map(|(t, n)| (t.as_str(), *n))
            .collect();
        breakdown.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        breakdown
    }
}

/// Classify every record of the dataset
///
/// The whole request fails on the first record that cannot be transformed
/// or classified.
pub async fn analyze(artifacts: &LoadedArtifacts, dataset: &Dataset) -> Result<AnalysisReport> {
    artifacts
        .transformer
        .validate_columns(dataset.headers().iter().map(String::as_str))?;

    let mut results = Vec::with_capacity(dataset.len());
    for (i, record) in dataset.records().iter().enumerate() {
        let result = artifacts
            .classify_raw(record)
            .await
            .map_err(|e| annotate(e, i))?;
        results.push(result);
    }

    let report = AnalysisReport::from_results(results);
    info!(
        "Analyzed {} records: {} attacks, {} normal",
        report.total(),
        report.attacks,
        report.normal
    );
    Ok(report)
}

fn annotate(error: Error, row: usize) -> Error {
    match error {
        Error::Schema(msg) => Error::schema(format!("row {}: {}", row + 1, msg)),
        other => other,
    }
}

/// Write the augmented table as CSV
pub fn write_csv(dataset: &Dataset, report: &AnalysisReport, writer: impl Write) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let header: Vec<&str> = dataset
        .headers()
        .iter()
        .map(String::as_str)
        .chain(RESULT_COLUMNS)
        .collect();
    wtr.write_record(&header).map_err(csv_error)?;

    for (i, result) in report.results.iter().enumerate() {
        let row = dataset
            .row(i)
            .ok_or_else(|| Error::internal(format!("no input row {}", i)))?;
        let mut out: Vec<String> = row.to_vec();
        out.push(result.label.as_flag().to_string());
        out.push(result.attack_probability.to_string());
        out.push(format!("{:.2}", result.risk_score));
        out.push(result.label.to_string());
        out.push(result.attack_type.clone());
        wtr.write_record(&out).map_err(csv_error)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write the augmented table to a file
pub fn export_csv(dataset: &Dataset, report: &AnalysisReport, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)?;
    write_csv(dataset, report, file)?;
    info!("Wrote {} rows to {:?}", report.total(), path);
    Ok(())
}

fn csv_error(e: csv::Error) -> Error {
    Error::internal(format!("csv export failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowguard_core::{CategoryStatus, Label, Severity};

    fn result(label: Label, risk: f64, attack_type: &str, status: CategoryStatus) -> ClassificationResult {
        ClassificationResult {
            label,
            attack_probability: risk / 100.0,
            risk_score: risk,
            severity: Severity::Low,
            attack_type: attack_type.to_string(),
            category_status: status,
        }
    }

    #[test]
    fn test_summary_counts() {
        let report = AnalysisReport::from_results(vec![
            result(Label::Attack, 35.0, "DoS", CategoryStatus::Predicted),
            result(Label::Normal, 5.0, "Normal", CategoryStatus::Skipped),
            result(Label::Attack, 65.0, "DoS", CategoryStatus::Predicted),
            result(Label::Attack, 92.0, "Unknown", CategoryStatus::TimedOut),
        ]);

        assert_eq!(report.total(), 4);
        assert_eq!(report.attacks, 3);
        assert_eq!(report.normal, 1);
        assert_eq!(report.degraded, 1);
        assert_eq!(report.mean_attack_risk, Some(64.0));
        assert_eq!(report.attack_breakdown(), vec![("DoS", 2), ("Unknown", 1)]);
    }

    #[test]
    fn test_csv_layout() {
        let dataset = Dataset::from_reader("dur,proto\n0.1,tcp\n2.0,udp\n".as_bytes()).unwrap();
        let report = AnalysisReport::from_results(vec![
            result(Label::Normal, 12.5, "Normal", CategoryStatus::Skipped),
            result(Label::Attack, 81.0, "Exploits", CategoryStatus::Predicted),
        ]);

        let mut out = Vec::new();
        write_csv(&dataset, &report, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "dur,proto,Prediction,Attack_Probability,Risk_Score,Status,Attack_Type"
        );
        assert_eq!(lines[1], "0.1,tcp,0,0.125,12.50,Normal,Normal");
        assert_eq!(lines[2], "2.0,udp,1,0.81,81.00,Attack,Exploits");
    }
}
