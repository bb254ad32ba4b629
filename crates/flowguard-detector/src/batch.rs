//! Batch orchestration over a held-out dataset
//!
//! Each run takes the next window of records at the persisted cursor,
//! classifies every record in memory and then commits the whole batch
//! through the ledger. Nothing reaches disk unless every record in the
//! window succeeded.

use crate::config::{DetectorConfig, EndOfDataset};
use crate::dataset::Dataset;
use flowguard_classifiers::LoadedArtifacts;
use flowguard_core::{ClassificationResult, Error, Result};
use flowguard_telemetry::event_log;
use flowguard_telemetry::{
    BatchCommit, BatchLedger, BatchState, BatchSummary, DetectionMetrics, EventLogEntry,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// The slice of the dataset a batch will process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u64,
    pub len: u64,

    /// The cursor was at the end and the window restarted at zero
    pub wrapped: bool,
}

/// One classified record of a committed batch
#[derive(Debug, Clone)]
pub struct DetectedEvent {
    pub event_id: u64,

    /// Row offset in the dataset
    pub offset: u64,

    pub result: ClassificationResult,
}

/// Outcome of a committed batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub window: Window,
    pub before: BatchState,
    pub after: BatchState,
    pub events: Vec<DetectedEvent>,
    pub summary: BatchSummary,
    pub latency_us: u64,
}

/// Drives batches from the dataset through the classifiers into the ledger
pub struct BatchRunner {
    artifacts: Arc<LoadedArtifacts>,
    dataset: Arc<Dataset>,
    ledger: BatchLedger,
    batch_size: usize,
    end_of_dataset: EndOfDataset,
    metrics: DetectionMetrics,
}

impl BatchRunner {
    pub fn new(
        artifacts: Arc<LoadedArtifacts>,
        dataset: Arc<Dataset>,
        ledger: BatchLedger,
        batch_size: usize,
        end_of_dataset: EndOfDataset,
    ) -> Self {
        Self {
            artifacts,
            dataset,
            ledger,
            batch_size,
            end_of_dataset,
            metrics: DetectionMetrics::new(),
        }
    }

    /// Load the dataset and open the ledger described by the configuration
    pub fn from_config(config: &DetectorConfig, artifacts: Arc<LoadedArtifacts>) -> Result<Self> {
        config.validate()?;
        let dataset = Dataset::load(&config.dataset)?;
        let ledger = BatchLedger::open(config.ledger_paths())?;
        Ok(Self::new(
            artifacts,
            Arc::new(dataset),
            ledger,
            config.batch_size,
            config.end_of_dataset,
        ))
    }

    /// Share counters with a caller-owned collector
    pub fn with_metrics(mut self, metrics: DetectionMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn state(&self) -> BatchState {
        self.ledger.state()
    }

    pub fn metrics(&self) -> &DetectionMetrics {
        &self.metrics
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// The window the next batch would process
    pub fn next_window(&self) -> Result<Window> {
        let len = self.dataset.len() as u64;
        let chunk_start = self.ledger.state().chunk_start;

        let (start, wrapped) = if chunk_start < len {
            (chunk_start, false)
        } else {
            match self.end_of_dataset {
                EndOfDataset::Wrap if len > 0 => (0, true),
                _ => return Err(Error::EndOfDataset { chunk_start, len }),
            }
        };

        Ok(Window {
            start,
            len: (self.batch_size as u64).min(len - start),
            wrapped,
        })
    }

    /// Process and commit one batch
    pub async fn run_batch(&mut self) -> Result<BatchReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("batch", run_id = %run_id);
        self.run_batch_inner(run_id).instrument(span).await
    }

    async fn run_batch_inner(&mut self, run_id: Uuid) -> Result<BatchReport> {
        let start_time = Instant::now();
        let before = self.ledger.state();
        let window = self.next_window()?;
        if window.wrapped {
            warn!(
                "Reached end of dataset at {}; wrapping to offset 0",
                before.chunk_start
            );
        }
        info!(
            "Processing records {}..{} (event_id {})",
            window.start,
            window.start + window.len,
            before.event_id
        );

        self.artifacts
            .transformer
            .validate_columns(self.dataset.headers().iter().map(String::as_str))?;

        let records = self
            .dataset
            .window(window.start as usize, window.len as usize);

        let mut events = Vec::with_capacity(records.len());
        let mut entries = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let offset = window.start + i as u64;
            let result = self.artifacts.classify_raw(record).await.map_err(|e| {
                warn!("Record {} failed, batch aborted: {}", offset, e);
                e
            })?;

            let event_id = before.event_id + i as u64 + 1;
            debug!(
                "Record {} -> event {}: {} {} risk {:.2} ({})",
                offset, event_id, result.label, result.severity, result.risk_score, result.attack_type
            );
            entries.push(EventLogEntry::from_result(event_log::now(), event_id, &result));
            events.push(DetectedEvent {
                event_id,
                offset,
                result,
            });
        }

        let results: Vec<ClassificationResult> = events.iter().map(|e| e.result.clone()).collect();
        let summary = BatchSummary::from_results(event_log::now(), &results);
        let next = before.after_window(window.start, records.len() as u64);

        let after = self.ledger.commit(BatchCommit {
            base: before,
            next,
            entries,
            summary: summary.clone(),
        })?;

        let latency_us = start_time.elapsed().as_micros() as u64;
        for result in &results {
            self.metrics.record_result(result);
        }
        self.metrics.record_batch(latency_us);

        info!(
            "Batch committed: total={} attacks={} normal={} mean_attack_risk={:?} in {}us",
            summary.total, summary.attacks, summary.normal, summary.mean_attack_risk, latency_us
        );

        Ok(BatchReport {
            run_id,
            window,
            before,
            after,
            events,
            summary,
            latency_us,
        })
    }

    /// Run up to `batches` batches, stopping at the first error
    ///
    /// Reports of batches committed before the error are returned with it.
    pub async fn run(&mut self, batches: usize) -> (Vec<BatchReport>, Option<Error>) {
        let mut reports = Vec::with_capacity(batches);
        for _ in 0..batches {
            match self.run_batch().await {
                Ok(report) => reports.push(report),
                Err(e) => return (reports, Some(e)),
            }
        }
        (reports, None)
    }
}
