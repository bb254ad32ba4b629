//! FlowGuard Telemetry
//!
//! Durable detection output and run metrics for FlowGuard.
//!
//! Provides:
//! - The persisted batch cursor (`key=value` state file)
//! - Append-only event and summary logs with query support
//! - A single-writer, journaled ledger that commits a batch atomically
//! - Detection metrics counters

pub mod event_log;
pub mod ledger;
pub mod metrics;
pub mod state;

pub use event_log::{AppendLog, BatchSummary, EventLogEntry, EventQuery, EventReader};
pub use ledger::{BatchCommit, BatchLedger, CommitJournal, LedgerPaths, LedgerStatus};
pub use metrics::{DetectionMetrics, MetricsSnapshot};
pub use state::BatchState;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::event_log::{BatchSummary, EventLogEntry, EventQuery};
    pub use crate::ledger::{BatchCommit, BatchLedger, LedgerPaths};
    pub use crate::metrics::DetectionMetrics;
    pub use crate::state::BatchState;
}
