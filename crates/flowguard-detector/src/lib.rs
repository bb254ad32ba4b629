//! FlowGuard Detector
//!
//! Batch and interactive intrusion detection over tabular flow records.
//!
//! - [`batch`]: walks a held-out dataset window by window and commits each
//!   batch to the journaled ledger
//! - [`analyze`]: classifies an uploaded file and exports the augmented table
//! - [`evaluate`]: scores the models against a labeled dataset

pub mod analyze;
pub mod batch;
pub mod config;
pub mod dataset;
pub mod evaluate;
pub mod report;

pub use analyze::{analyze, export_csv, AnalysisReport};
pub use batch::{BatchReport, BatchRunner, DetectedEvent, Window};
pub use config::{ConfigOverrides, DetectorConfig, EndOfDataset};
pub use dataset::Dataset;
pub use evaluate::{evaluate, Evaluation};
