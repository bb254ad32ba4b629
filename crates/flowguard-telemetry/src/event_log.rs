//! Per-record event log and per-batch summary log
//!
//! Both logs are append-only CSV-like text files without a header:
//! - events: `timestamp,event_id,label,severity,risk_score,probability,attack_type`
//! - summaries: `timestamp,Total:<n>,Attacks:<n>,Normal:<n>`
//!
//! Appends go through [`AppendLog`], which fsyncs after every write and can
//! truncate back to a known length during journal replay.

use chrono::{Local, NaiveDateTime};
use flowguard_core::{ClassificationResult, Error, Label, Result, Severity};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Timestamp layout used in both logs (local time, microseconds)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Current local time truncated to the log precision
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    let text = now.format(TIMESTAMP_FORMAT).to_string();
    NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT).unwrap_or(now)
}

/// One line of the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub timestamp: NaiveDateTime,
    pub event_id: u64,
    pub label: Label,
    pub severity: Severity,
    pub risk_score: f64,

    /// Attack probability as logged (two decimals)
    pub probability: f64,

    pub attack_type: String,
}

impl EventLogEntry {
    /// Build an entry for a classified record
    pub fn from_result(timestamp: NaiveDateTime, event_id: u64, result: &ClassificationResult) -> Self {
        Self {
            timestamp,
            event_id,
            label: result.label,
            severity: result.severity,
            risk_score: result.risk_score,
            probability: result.attack_probability,
            attack_type: result.attack_type.clone(),
        }
    }

    /// Render as a log line, without the trailing newline
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{:.2},{:.2},{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.event_id,
            self.label,
            self.severity,
            self.risk_score,
            self.probability,
            self.attack_type.replace([',', '\n', '\r'], ";")
        )
    }

    /// Parse a log line
    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim_end().splitn(7, ',').collect();
        if fields.len() != 7 {
            return Err(Error::corruption(format!(
                "event line has {} fields, expected 7: {:?}",
                fields.len(),
                line
            )));
        }

        let bad = |what: &str| Error::corruption(format!("event line has invalid {}: {:?}", what, line));

        Ok(Self {
            timestamp: NaiveDateTime::parse_from_str(fields[0], TIMESTAMP_FORMAT)
                .map_err(|_| bad("timestamp"))?,
            event_id: fields[1].parse().map_err(|_| bad("event_id"))?,
            label: fields[2].parse().map_err(|_| bad("label"))?,
            severity: fields[3].parse().map_err(|_| bad("severity"))?,
            risk_score: fields[4].parse().map_err(|_| bad("risk_score"))?,
            probability: fields[5].parse().map_err(|_| bad("probability"))?,
            attack_type: fields[6].to_string(),
        })
    }
}

/// One line of the summary log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub timestamp: NaiveDateTime,
    pub total: u64,
    pub attacks: u64,
    pub normal: u64,

    /// Mean risk score over attacks; reported, not logged
    #[serde(default)]
    pub mean_attack_risk: Option<f64>,
}

impl BatchSummary {
    /// Summarize a processed window
    pub fn from_results(timestamp: NaiveDateTime, results: &[ClassificationResult]) -> Self {
        let attack_risks: Vec<f64> = results
            .iter()
            .filter(|r| r.is_attack())
            .map(|r| r.risk_score)
            .collect();
        let attacks = attack_risks.len() as u64;
        let mean_attack_risk = if attack_risks.is_empty() {
            None
        } else {
            let mean = attack_risks.iter().sum::<f64>() / attack_risks.len() as f64;
            Some((mean * 100.0).round() / 100.0)
        };

        Self {
            timestamp,
            total: results.len() as u64,
            attacks,
            normal: results.len() as u64 - attacks,
            mean_attack_risk,
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "{},Total:{},Attacks:{},Normal:{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.total,
            self.attacks,
            self.normal
        )
    }

    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim_end().split(',').collect();
        let bad = || Error::corruption(format!("invalid summary line: {:?}", line));
        if fields.len() != 4 {
            return Err(bad());
        }

        let count = |field: &str, key: &str| -> Result<u64> {
            field
                .strip_prefix(key)
                .and_then(|v| v.strip_prefix(':'))
                .and_then(|v| v.parse().ok())
                .ok_or_else(bad)
        };

        let summary = Self {
            timestamp: NaiveDateTime::parse_from_str(fields[0], TIMESTAMP_FORMAT)
                .map_err(|_| bad())?,
            total: count(fields[1], "Total")?,
            attacks: count(fields[2], "Attacks")?,
            normal: count(fields[3], "Normal")?,
            mean_attack_risk: None,
        };
        if summary.attacks + summary.normal != summary.total {
            return Err(bad());
        }
        Ok(summary)
    }
}

/// Append-only text log with durable writes
#[derive(Debug, Clone)]
pub struct AppendLog {
    path: PathBuf,
}

impl AppendLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length in bytes; zero when the file does not exist
    pub fn len(&self) -> Result<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Append lines and fsync
    pub fn append(&self, lines: &[String]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for line in lines {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        debug!("Appended {} lines to {:?}", lines.len(), self.path);
        Ok(())
    }

    /// Cut the log back to `len` bytes
    ///
    /// A log shorter than `len` means bytes that were durably written are
    /// gone, which is corruption rather than something to repair.
    pub fn truncate(&self, len: u64) -> Result<()> {
        let current = self.len()?;
        if current < len {
            return Err(Error::corruption(format!(
                "{:?} is {} bytes, shorter than the journaled {}",
                self.path, current, len
            )));
        }
        if current == len {
            return Ok(());
        }

        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(len)?;
        file.sync_all()?;
        warn!(
            "Truncated {:?} from {} to {} bytes",
            self.path, current, len
        );
        Ok(())
    }

    /// Non-empty lines, oldest first
    fn lines(&self) -> Result<Vec<String>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }
}

/// Filter over the event log
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Only this label
    pub label: Option<Label>,

    /// Only this severity or higher
    pub min_severity: Option<Severity>,

    /// Only this attack type
    pub attack_type: Option<String>,

    /// Only the most recent `limit` matches
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    pub fn attack_type(mut self, attack_type: impl Into<String>) -> Self {
        self.attack_type = Some(attack_type.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &EventLogEntry) -> bool {
        if self.label.is_some_and(|l| l != entry.label) {
            return false;
        }
        if self.min_severity.is_some_and(|s| entry.severity < s) {
            return false;
        }
        if let Some(ref attack_type) = self.attack_type {
            if &entry.attack_type != attack_type {
                return false;
            }
        }
        true
    }
}

/// Read-side access to the event and summary logs
pub struct EventReader {
    events: AppendLog,
    summaries: AppendLog,
}

impl EventReader {
    pub fn new(event_log: impl Into<PathBuf>, summary_log: impl Into<PathBuf>) -> Self {
        Self {
            events: AppendLog::new(event_log),
            summaries: AppendLog::new(summary_log),
        }
    }

    /// Matching events in log order; unparsable lines are skipped
    pub fn query(&self, query: &EventQuery) -> Result<Vec<EventLogEntry>> {
        let mut results = VecDeque::new();

        for line in self.events.lines()? {
            match EventLogEntry::parse_line(&line) {
                Ok(entry) => {
                    if !query.matches(&entry) {
                        continue;
                    }
                    results.push_back(entry);
                    if query.limit.is_some_and(|limit| results.len() > limit) {
                        results.pop_front();
                    }
                }
                Err(e) => {
                    debug!("Skipping event line: {}", e);
                }
            }
        }

        Ok(results.into())
    }

    /// Count events matching the query, ignoring its limit
    pub fn count(&self, query: &EventQuery) -> Result<usize> {
        let unlimited = EventQuery {
            limit: None,
            ..query.clone()
        };
        Ok(self.query(&unlimited)?.len())
    }

    /// Highest event id in the log, if any line parses
    pub fn last_event_id(&self) -> Result<Option<u64>> {
        Ok(self
            .events
            .lines()?
            .iter()
            .filter_map(|line| EventLogEntry::parse_line(line).ok())
            .map(|entry| entry.event_id)
            .max())
    }

    /// All batch summaries in log order
    pub fn summaries(&self) -> Result<Vec<BatchSummary>> {
        let mut out = Vec::new();
        for line in self.summaries.lines()? {
            match BatchSummary::parse_line(&line) {
                Ok(summary) => out.push(summary),
                Err(e) => debug!("Skipping summary line: {}", e),
            }
        }
        Ok(out)
    }
}
