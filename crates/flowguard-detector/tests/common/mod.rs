//! Mock models and fixtures shared by the detector tests
//!
//! Records carry three features: `prob` (the attack probability the mock
//! binary model reports), `flag` (1 marks an attack, 9 makes the binary
//! model fail) and `proto` (tcp / udp, mapped to DoS / Exploits by the mock
//! category model). The scaler is the identity, so transformed values equal
//! the raw ones.

#![allow(dead_code)]

use async_trait::async_trait;
use flowguard_classifiers::{
    Classifier, Encoder, EncoderSet, FillValues, FlowClassifier, LoadedArtifacts, Prediction,
    Scaler, SchemaTransformer,
};
use flowguard_core::{Error, Result, TransformedRecord};
use flowguard_detector::{BatchRunner, Dataset, EndOfDataset};
use flowguard_telemetry::{BatchLedger, LedgerPaths};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const STAGE_TIMEOUT: Duration = Duration::from_millis(100);

/// Binary model driven by the `prob` and `flag` features
pub struct MockBinary {
    classes: Vec<String>,
    calls: AtomicU32,
}

impl MockBinary {
    pub fn new() -> Self {
        Self {
            classes: vec!["0".to_string(), "1".to_string()],
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Classifier for MockBinary {
    async fn classify(&self, record: &TransformedRecord) -> Result<Prediction> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let values = record.values();
        let (prob, flag) = (values[0], values[1]);
        if flag == 9.0 {
            return Err(Error::classifier("mock binary model failure"));
        }

        let label = if flag == 1.0 { "1" } else { "0" };
        let score = if flag == 1.0 { prob } else { 1.0 - prob };
        Ok(Prediction::new(label, score)
            .with_class_scores(vec![("0".into(), 1.0 - prob), ("1".into(), prob)]))
    }

    fn name(&self) -> &str {
        "mock_binary"
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Category model driven by the encoded `proto` feature
pub struct MockCategory {
    classes: Vec<String>,
    latency: Option<Duration>,
    calls: AtomicU32,
}

impl MockCategory {
    pub fn new() -> Self {
        Self {
            classes: vec!["DoS".to_string(), "Exploits".to_string()],
            latency: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Respond only after `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Classifier for MockCategory {
    async fn classify(&self, record: &TransformedRecord) -> Result<Prediction> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let label = if record.values()[2] == 0.0 { "DoS" } else { "Exploits" };
        Ok(Prediction::new(label, 0.9))
    }

    fn name(&self) -> &str {
        "mock_category"
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Identity-scaled transformer over `prob, flag, proto`
pub fn transformer() -> SchemaTransformer {
    let proto = Encoder::new("proto", vec!["tcp".into(), "udp".into()], "tcp").unwrap();
    let encoders = EncoderSet::from_encoders([proto]);

    let scaler = Scaler {
        version: Some("test".into()),
        feature_names: vec!["prob".into(), "flag".into(), "proto".into()],
        center: vec![0.0, 0.0, 0.0],
        scale: vec![1.0, 1.0, 1.0],
    };

    let fill = FillValues {
        version: None,
        numeric: HashMap::from([("prob".to_string(), 0.1), ("flag".to_string(), 0.0)]),
        categorical: HashMap::from([("proto".to_string(), "tcp".to_string())]),
    };

    SchemaTransformer::new(encoders, scaler, fill).unwrap()
}

pub fn artifacts_with(
    binary: Arc<dyn Classifier>,
    category: Option<Arc<dyn Classifier>>,
) -> Arc<LoadedArtifacts> {
    let classifier = FlowClassifier::new(binary, category, "1", STAGE_TIMEOUT).unwrap();
    Arc::new(LoadedArtifacts::new(transformer(), classifier))
}

pub fn artifacts() -> Arc<LoadedArtifacts> {
    artifacts_with(Arc::new(MockBinary::new()), Some(Arc::new(MockCategory::new())))
}

/// CSV with a ground-truth label and category
pub fn csv_from_rows(rows: &[(f64, u8, &str)]) -> String {
    let mut csv = String::from("prob,flag,proto,label,attack_cat\n");
    for (prob, flag, proto) in rows {
        let category = match (*flag, *proto) {
            (1, "tcp") => "DoS",
            (1, _) => "Exploits",
            _ => "Normal",
        };
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            prob,
            flag,
            proto,
            u8::from(*flag == 1),
            category
        ));
    }
    csv
}

pub fn dataset_from_rows(rows: &[(f64, u8, &str)]) -> Arc<Dataset> {
    Arc::new(Dataset::from_reader(csv_from_rows(rows).as_bytes()).unwrap())
}

/// Ten records, three attacks at rows 3, 6 and 9 with rising probability
pub fn ten_record_rows() -> Vec<(f64, u8, &'static str)> {
    vec![
        (0.05, 0, "tcp"),
        (0.10, 0, "udp"),
        (0.35, 1, "tcp"),
        (0.02, 0, "tcp"),
        (0.15, 0, "udp"),
        (0.65, 1, "udp"),
        (0.08, 0, "tcp"),
        (0.20, 0, "tcp"),
        (0.92, 1, "udp"),
        (0.01, 0, "udp"),
    ]
}

/// `n` normal records
pub fn normal_rows(n: usize) -> Vec<(f64, u8, &'static str)> {
    (0..n).map(|_| (0.1, 0, "tcp")).collect()
}

pub fn runner(
    dir: &std::path::Path,
    artifacts: Arc<LoadedArtifacts>,
    dataset: Arc<Dataset>,
    batch_size: usize,
    end_of_dataset: EndOfDataset,
) -> BatchRunner {
    let ledger = BatchLedger::open(LedgerPaths::in_dir(dir)).unwrap();
    BatchRunner::new(artifacts, dataset, ledger, batch_size, end_of_dataset)
}
