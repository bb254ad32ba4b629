//! FlowGuard Core
//!
//! Core types and error handling shared across FlowGuard components.
//!
//! This crate provides:
//! - Raw and transformed flow-record types
//! - Detection labels, severity tiers and the per-record classification result
//! - The error taxonomy used by the transformer, classifiers and batch ledger

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    CategoryStatus, ClassificationResult, FeatureValue, Label, RawRecord, Severity,
    TransformedRecord, LABEL_COLUMNS, NORMAL_CATEGORY, UNKNOWN_CATEGORY,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{
        ClassificationResult, FeatureValue, Label, RawRecord, Severity, TransformedRecord,
    };
}
