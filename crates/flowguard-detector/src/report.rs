//! Human-readable reports for the command line

use crate::analyze::AnalysisReport;
use crate::batch::BatchReport;
use crate::evaluate::Evaluation;
use flowguard_classifiers::scoring::describe_attack;
use flowguard_telemetry::{BatchState, EventLogEntry, LedgerStatus, MetricsSnapshot};
use std::fmt::Write;

/// Per-record threat analysis followed by the traffic summary
pub fn render_batch(report: &BatchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "===== THREAT ANALYSIS REPORT (run {}) =====",
        report.run_id
    );
    if report.window.wrapped {
        let _ = writeln!(out, "(dataset exhausted; restarted at record 0)");
    }
    let _ = writeln!(out);

    for (i, event) in report.events.iter().enumerate() {
        let r = &event.result;
        let confidence = r.attack_probability.max(1.0 - r.attack_probability) * 100.0;
        let _ = writeln!(out, "Record {} (event {}, row {}):", i + 1, event.event_id, event.offset);
        let _ = writeln!(out, "  Type:       {}", r.label);
        let _ = writeln!(out, "  Severity:   {}", r.severity);
        let _ = writeln!(out, "  Risk Score: {:.2}", r.risk_score);
        let _ = writeln!(out, "  Confidence: {:.2}%", confidence);
        if r.is_attack() {
            let _ = writeln!(out, "  Attack Category: {}", r.attack_type);
            let _ = writeln!(out, "  Description:     {}", describe_attack(&r.attack_type));
            let _ = writeln!(out, "  Action:          Monitor or block suspicious traffic");
        }
        let _ = writeln!(out);
    }

    let s = &report.summary;
    let _ = writeln!(
        out,
        "Batch Detection Time: {:.4} sec",
        report.latency_us as f64 / 1_000_000.0
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "===== TRAFFIC SUMMARY =====");
    let _ = writeln!(out, "  Total Records:    {}", s.total);
    let _ = writeln!(out, "  Normal Traffic:   {}", s.normal);
    let _ = writeln!(out, "  Attacks Detected: {}", s.attacks);
    if let Some(mean) = s.mean_attack_risk {
        let _ = writeln!(out, "  Avg Risk Score:   {:.2}", mean);
    }
    let _ = write!(
        out,
        "  Cursor:           chunk_start={} event_id={}",
        report.after.chunk_start, report.after.event_id
    );
    out
}

/// Totals across all batches of one invocation
pub fn render_run_totals(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "===== RUN TOTALS =====");
    let _ = writeln!(out, "  Batches:          {}", snapshot.batches);
    let _ = writeln!(out, "  Records:          {}", snapshot.records);
    let _ = writeln!(out, "  Attacks:          {}", snapshot.attacks);
    let _ = writeln!(out, "  Uncategorized:    {}", snapshot.degraded);
    if let Some(mean) = snapshot.mean_attack_risk() {
        let _ = writeln!(out, "  Avg Risk Score:   {:.2}", mean);
    }
    let _ = write!(
        out,
        "  Avg Batch Time:   {} us",
        snapshot.avg_batch_latency_us()
    );
    out
}

/// Summary of an interactive analysis
pub fn render_analysis(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "===== ANALYSIS SUMMARY =====");
    let _ = writeln!(out, "  Total Records:    {}", report.total());
    let _ = writeln!(out, "  Normal Traffic:   {}", report.normal);
    let _ = writeln!(out, "  Attacks Detected: {}", report.attacks);
    if let Some(mean) = report.mean_attack_risk {
        let _ = writeln!(out, "  Avg Risk Score:   {:.2}", mean);
    }
    let breakdown = report.attack_breakdown();
    if !breakdown.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Attack Type Breakdown:");
        for (attack_type, count) in breakdown {
            let _ = writeln!(out, "  {:<16} {}", attack_type, count);
        }
    }
    out.trim_end().to_string()
}

/// Binary and category evaluation reports
pub fn render_evaluation(evaluation: &Evaluation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Binary Classification Results (Normal vs Attack):");
    let _ = writeln!(out, "{}", evaluation.binary);
    match &evaluation.category {
        Some(report) => {
            let _ = writeln!(out);
            let _ = writeln!(out, "Multi-class Classification Results (Attack Categories):");
            let _ = writeln!(out, "{}", report);
        }
        None => {
            let _ = writeln!(out);
            let _ = writeln!(out, "Attack category evaluation skipped.");
        }
    }
    if evaluation.unlabeled > 0 {
        let _ = writeln!(out, "{} unlabeled rows were skipped.", evaluation.unlabeled);
    }
    out.trim_end().to_string()
}

/// Cursor position against the dataset
pub fn render_status(status: &LedgerStatus, dataset_len: Option<usize>) -> String {
    let state: BatchState = status.effective_state();
    let mut out = String::new();
    let _ = writeln!(out, "chunk_start:  {}", state.chunk_start);
    let _ = writeln!(out, "event_id:     {}", state.event_id);
    if status.state.is_none() {
        let _ = writeln!(out, "state:        not initialised");
    }
    if let Some(len) = dataset_len {
        let remaining = (len as u64).saturating_sub(state.chunk_start);
        let _ = writeln!(out, "dataset:      {} records", len);
        let _ = writeln!(out, "remaining:    {}", remaining);
    }
    if status.pending_journal {
        let _ = writeln!(out, "journal:      pending (replayed on next run)");
    }
    if status.locked {
        let _ = writeln!(out, "lock:         held");
    }
    out.trim_end().to_string()
}

/// Event log entries in their on-disk line format
pub fn render_events(entries: &[EventLogEntry]) -> String {
    entries
        .iter()
        .map(EventLogEntry::to_line)
        .collect::<Vec<_>>()
        .join("\n")
}
