//! Batch ledger: cursor state, event log and summary log committed together
//!
//! A batch is classified entirely in memory and then handed to
//! [`BatchLedger::commit`], which makes it durable with a journal:
//!
//! 1. write `journal.json` (previous state, next state, both log lengths,
//!    the lines to append) via temp file + fsync + rename
//! 2. append the lines to both logs and fsync them
//! 3. replace the state file atomically
//! 4. remove the journal
//!
//! Opening the ledger replays a leftover journal, so a crash at any point
//! either leaves no trace of the batch or completes it exactly once.
//!
//! The ledger is single-writer: it holds a lock file for its lifetime, and
//! every commit re-reads the on-disk state and refuses to proceed if it no
//! longer matches the state the batch was computed from.

use crate::event_log::{AppendLog, BatchSummary, EventLogEntry, EventReader};
use crate::state::{self, BatchState};
use chrono::Local;
use flowguard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File layout of a ledger directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPaths {
    pub state: PathBuf,
    pub event_log: PathBuf,
    pub summary_log: PathBuf,
    pub journal: PathBuf,
    pub lock: PathBuf,
}

impl LedgerPaths {
    /// Default file names under one directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            state: dir.join("system_state.txt"),
            event_log: dir.join("attack_events.csv"),
            summary_log: dir.join("ids_report_log.csv"),
            journal: dir.join("commit_journal.json"),
            lock: dir.join("ledger.lock"),
        }
    }

    fn ensure_dirs(&self) -> Result<()> {
        for path in [
            &self.state,
            &self.event_log,
            &self.summary_log,
            &self.journal,
            &self.lock,
        ] {
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(dir)?;
                }
            }
        }
        Ok(())
    }
}

/// Everything a classified batch contributes to the ledger
#[derive(Debug, Clone)]
pub struct BatchCommit {
    /// State the batch was computed from
    pub base: BatchState,

    /// State after the batch
    pub next: BatchState,

    /// One entry per processed record, ids `base.event_id + 1 ..= next.event_id`
    pub entries: Vec<EventLogEntry>,

    pub summary: BatchSummary,
}

impl BatchCommit {
    fn validate(&self) -> Result<()> {
        let expected = self.entries.len() as u64;
        if self.next.event_id != self.base.event_id + expected {
            return Err(Error::internal(format!(
                "batch advances event_id by {} for {} entries",
                self.next.event_id.saturating_sub(self.base.event_id),
                expected
            )));
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.event_id != self.base.event_id + i as u64 + 1 {
                return Err(Error::internal(format!(
                    "entry {} has event_id {}, expected {}",
                    i,
                    entry.event_id,
                    self.base.event_id + i as u64 + 1
                )));
            }
        }
        if self.summary.total != expected {
            return Err(Error::internal(format!(
                "summary counts {} records for {} entries",
                self.summary.total, expected
            )));
        }
        Ok(())
    }
}

/// Durable record of an in-flight commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitJournal {
    pub prev: BatchState,
    pub next: BatchState,
    pub event_log_len: u64,
    pub summary_log_len: u64,
    pub event_lines: Vec<String>,
    pub summary_line: String,
}

impl CommitJournal {
    pub fn read(path: &Path) -> Result<Option<Self>> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Error::corruption(format!("unreadable commit journal: {}", e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        state::write_atomic(path, &serde_json::to_vec(self)?)
    }
}

/// Exclusive ownership of a ledger directory, released on drop
#[derive(Debug)]
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: &Path) -> Result<Self> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "pid={}", std::process::id())?;
                writeln!(file, "acquired={}", Local::now().to_rfc3339())?;
                file.sync_all()?;
                debug!("Acquired ledger lock {:?}", path);
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(path).unwrap_or_default();
                Err(Error::CursorLocked(format!(
                    "{} is held ({})",
                    path.display(),
                    holder.trim().replace('\n', ", ")
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release ledger lock {:?}: {}", self.path, e);
        }
    }
}

/// Read-only view of a ledger, available without taking the lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStatus {
    /// Persisted state, `None` before the first commit
    pub state: Option<BatchState>,

    /// A commit journal is waiting to be replayed
    pub pending_journal: bool,

    /// Another process currently holds the ledger
    pub locked: bool,
}

impl LedgerStatus {
    pub fn read(paths: &LedgerPaths) -> Result<Self> {
        Ok(Self {
            state: state::read_state(&paths.state)?,
            pending_journal: paths.journal.exists(),
            locked: paths.lock.exists(),
        })
    }

    /// Effective state; a missing file means the initial state
    pub fn effective_state(&self) -> BatchState {
        self.state.unwrap_or_default()
    }
}

/// Exclusive, crash-safe owner of the batch cursor and logs
#[derive(Debug)]
pub struct BatchLedger {
    paths: LedgerPaths,
    state: BatchState,
    events: AppendLog,
    summaries: AppendLog,
    _lock: LockFile,
}

impl BatchLedger {
    /// Take the lock, replay any leftover journal and load the state
    ///
    /// A missing state file is initialised to zero.
    pub fn open(paths: LedgerPaths) -> Result<Self> {
        paths.ensure_dirs()?;
        let lock = LockFile::acquire(&paths.lock)?;

        let events = AppendLog::new(&paths.event_log);
        let summaries = AppendLog::new(&paths.summary_log);

        recover(&paths, &events, &summaries)?;

        let state = match state::read_state(&paths.state)? {
            Some(state) => state,
            None => {
                let initial = BatchState::default();
                state::write_state(&paths.state, &initial)?;
                info!("Initialised batch state at {:?}", paths.state);
                initial
            }
        };
        debug!(
            "Ledger opened at chunk_start={} event_id={}",
            state.chunk_start, state.event_id
        );

        Ok(Self {
            paths,
            state,
            events,
            summaries,
            _lock: lock,
        })
    }

    /// Current committed state
    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn paths(&self) -> &LedgerPaths {
        &self.paths
    }

    /// Durably apply a batch; returns the new state
    pub fn commit(&mut self, batch: BatchCommit) -> Result<BatchState> {
        batch.validate()?;

        // A journal here means an earlier commit on this ledger failed part way
        if self.paths.journal.exists() {
            warn!("Commit journal left by a failed commit; replaying it first");
            recover(&self.paths, &self.events, &self.summaries)?;
            self.state = state::read_state(&self.paths.state)?.unwrap_or_default();
        }

        if batch.base != self.state {
            return Err(Error::StateConflict(format!(
                "batch computed from {:?} but the ledger is at {:?}",
                batch.base, self.state
            )));
        }
        let on_disk = state::read_state(&self.paths.state)?.unwrap_or_default();
        if on_disk != batch.base {
            return Err(Error::StateConflict(format!(
                "state file changed underneath the ledger: expected {:?}, found {:?}",
                batch.base, on_disk
            )));
        }

        let journal = CommitJournal {
            prev: batch.base,
            next: batch.next,
            event_log_len: self.events.len()?,
            summary_log_len: self.summaries.len()?,
            event_lines: batch.entries.iter().map(EventLogEntry::to_line).collect(),
            summary_line: batch.summary.to_line(),
        };
        journal.write(&self.paths.journal)?;

        apply(&self.paths, &journal, &self.events, &self.summaries)?;

        self.state = batch.next;
        info!(
            "Committed {} events (event_id {} -> {}, chunk_start {} -> {})",
            batch.entries.len(),
            batch.base.event_id,
            batch.next.event_id,
            batch.base.chunk_start,
            batch.next.chunk_start
        );
        Ok(self.state)
    }

    /// Rewind the dataset cursor to the first record
    ///
    /// Logs are kept, and the event counter resumes after the highest
    /// event id already logged so ids stay unique across resets. A pending
    /// journal is discarded. Refuses to run while another ledger holds the
    /// lock.
    pub fn reset(paths: &LedgerPaths) -> Result<BatchState> {
        paths.ensure_dirs()?;
        let lock = LockFile::acquire(&paths.lock)?;
        remove_if_exists(&paths.journal)?;

        let last_event_id = EventReader::new(&paths.event_log, &paths.summary_log)
            .last_event_id()?
            .unwrap_or(0);
        let state = BatchState::new(0, last_event_id);
        state::write_state(&paths.state, &state)?;
        drop(lock);

        info!(
            "Reset batch state at {:?}; next event id is {}",
            paths.state,
            last_event_id + 1
        );
        Ok(state)
    }

    /// Forcefully remove a stale lock left by a crashed process
    pub fn break_lock(paths: &LedgerPaths) -> Result<bool> {
        let existed = paths.lock.exists();
        remove_if_exists(&paths.lock)?;
        if existed {
            warn!("Removed stale ledger lock {:?}", paths.lock);
        }
        Ok(existed)
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Steps 2-4 of a commit; also used to replay a journal
fn apply(
    paths: &LedgerPaths,
    journal: &CommitJournal,
    events: &AppendLog,
    summaries: &AppendLog,
) -> Result<()> {
    events.append(&journal.event_lines)?;
    summaries.append(std::slice::from_ref(&journal.summary_line))?;
    state::write_state(&paths.state, &journal.next)?;
    std::fs::remove_file(&paths.journal)?;
    state::sync_parent(&paths.journal);
    Ok(())
}

/// Bring the directory to a consistent state after a crash
fn recover(paths: &LedgerPaths, events: &AppendLog, summaries: &AppendLog) -> Result<()> {
    let Some(journal) = CommitJournal::read(&paths.journal)? else {
        return Ok(());
    };

    let on_disk = state::read_state(&paths.state)?.unwrap_or_default();

    if on_disk == journal.next {
        info!("Commit journal already applied; removing it");
        std::fs::remove_file(&paths.journal)?;
        return Ok(());
    }

    if on_disk != journal.prev {
        return Err(Error::corruption(format!(
            "commit journal moves {:?} -> {:?} but the state file holds {:?}",
            journal.prev, journal.next, on_disk
        )));
    }

    warn!(
        "Replaying interrupted commit of {} events (event_id {} -> {})",
        journal.event_lines.len(),
        journal.prev.event_id,
        journal.next.event_id
    );
    events.truncate(journal.event_log_len)?;
    summaries.truncate(journal.summary_log_len)?;
    apply(paths, &journal, events, summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::{EventQuery, TIMESTAMP_FORMAT};
    use chrono::NaiveDateTime;
    use flowguard_core::{Label, Severity};
    use tempfile::TempDir;

    fn ts() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-05-01 08:00:00.000001", TIMESTAMP_FORMAT).unwrap()
    }

    fn entry(event_id: u64) -> EventLogEntry {
        EventLogEntry {
            timestamp: ts(),
            event_id,
            label: Label::Normal,
            severity: Severity::Low,
            risk_score: 4.0,
            probability: 0.04,
            attack_type: "Normal".to_string(),
        }
    }

    fn batch(base: BatchState, n: u64) -> BatchCommit {
        BatchCommit {
            base,
            next: base.after_window(base.chunk_start, n),
            entries: (1..=n).map(|i| entry(base.event_id + i)).collect(),
            summary: BatchSummary {
                timestamp: ts(),
                total: n,
                attacks: 0,
                normal: n,
                mean_attack_risk: None,
            },
        }
    }

    fn reader(paths: &LedgerPaths) -> EventReader {
        EventReader::new(&paths.event_log, &paths.summary_log)
    }

    fn event_ids(paths: &LedgerPaths) -> Vec<u64> {
        reader(paths)
            .query(&EventQuery::new())
            .unwrap()
            .iter()
            .map(|e| e.event_id)
            .collect()
    }

    #[test]
    fn test_open_initialises_state() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());

        let ledger = BatchLedger::open(paths.clone()).unwrap();
        assert_eq!(ledger.state(), BatchState::default());
        assert_eq!(
            state::read_state(&paths.state).unwrap(),
            Some(BatchState::default())
        );
    }

    #[test]
    fn test_commits_advance_monotonically() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());
        let mut ledger = BatchLedger::open(paths.clone()).unwrap();

        for k in 1..=3u64 {
            let state = ledger.commit(batch(ledger.state(), 10)).unwrap();
            assert_eq!(state, BatchState::new(10 * k, 10 * k));
        }

        assert_eq!(event_ids(&paths), (1..=30).collect::<Vec<_>>());
        assert_eq!(reader(&paths).summaries().unwrap().len(), 3);
        assert!(!paths.journal.exists());
    }

    #[test]
    fn test_second_opener_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());

        let ledger = BatchLedger::open(paths.clone()).unwrap();
        let err = BatchLedger::open(paths.clone()).unwrap_err();
        assert!(matches!(err, Error::CursorLocked(_)));
        assert!(LedgerStatus::read(&paths).unwrap().locked);

        drop(ledger);
        assert!(BatchLedger::open(paths).is_ok());
    }

    #[test]
    fn test_commit_detects_external_state_change() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());
        let mut ledger = BatchLedger::open(paths.clone()).unwrap();

        state::write_state(&paths.state, &BatchState::new(50, 50)).unwrap();

        let err = ledger.commit(batch(ledger.state(), 10)).unwrap_err();
        assert!(matches!(err, Error::StateConflict(_)));
        assert!(event_ids(&paths).is_empty());
    }

    #[test]
    fn test_retry_after_failed_state_write_does_not_duplicate_events() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());
        let mut ledger = BatchLedger::open(paths.clone()).unwrap();

        // Block the atomic state write after both logs were appended
        let blocker = dir.path().join("system_state.txt.tmp");
        std::fs::create_dir(&blocker).unwrap();
        assert!(ledger.commit(batch(BatchState::default(), 10)).is_err());
        assert!(paths.journal.exists());
        std::fs::remove_dir(&blocker).unwrap();

        // The caller retries the same batch on the same ledger
        let retry = ledger.commit(batch(BatchState::default(), 10));
        assert!(matches!(retry, Err(Error::StateConflict(_))));
        assert_eq!(ledger.state(), BatchState::new(10, 10));
        assert_eq!(event_ids(&paths), (1..=10).collect::<Vec<_>>());
        assert_eq!(reader(&paths).summaries().unwrap().len(), 1);
        assert!(!paths.journal.exists());

        ledger.commit(batch(ledger.state(), 5)).unwrap();
        assert_eq!(event_ids(&paths), (1..=15).collect::<Vec<_>>());
    }

    #[test]
    fn test_commit_rejects_stale_base() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());
        let mut ledger = BatchLedger::open(paths).unwrap();

        let stale = batch(BatchState::new(5, 5), 10);
        assert!(matches!(
            ledger.commit(stale),
            Err(Error::StateConflict(_))
        ));
    }

    #[test]
    fn test_commit_rejects_gapped_event_ids() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());
        let mut ledger = BatchLedger::open(paths.clone()).unwrap();

        let mut bad = batch(ledger.state(), 3);
        bad.entries[1].event_id = 7;
        assert!(matches!(ledger.commit(bad), Err(Error::Internal(_))));
        assert_eq!(ledger.state(), BatchState::default());
        assert!(event_ids(&paths).is_empty());
    }

    #[test]
    fn test_replay_after_crash_mid_append() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());
        {
            let mut ledger = BatchLedger::open(paths.clone()).unwrap();
            ledger.commit(batch(ledger.state(), 10)).unwrap();
        }

        // Simulate a crash after the journal was written and the event log
        // was partially appended, before the state file was replaced.
        let base = BatchState::new(10, 10);
        let pending = batch(base, 10);
        let events = AppendLog::new(&paths.event_log);
        let summaries = AppendLog::new(&paths.summary_log);
        let journal = CommitJournal {
            prev: base,
            next: pending.next,
            event_log_len: events.len().unwrap(),
            summary_log_len: summaries.len().unwrap(),
            event_lines: pending.entries.iter().map(EventLogEntry::to_line).collect(),
            summary_line: pending.summary.to_line(),
        };
        journal.write(&paths.journal).unwrap();
        events.append(&journal.event_lines[..4]).unwrap();

        let ledger = BatchLedger::open(paths.clone()).unwrap();
        assert_eq!(ledger.state(), BatchState::new(20, 20));
        assert_eq!(event_ids(&paths), (1..=20).collect::<Vec<_>>());
        assert_eq!(reader(&paths).summaries().unwrap().len(), 2);
        assert!(!paths.journal.exists());
    }

    #[test]
    fn test_replay_when_already_applied() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());

        // Crash between the state replace and the journal removal
        let base = BatchState::default();
        let pending = batch(base, 5);
        let journal = CommitJournal {
            prev: base,
            next: pending.next,
            event_log_len: 0,
            summary_log_len: 0,
            event_lines: pending.entries.iter().map(EventLogEntry::to_line).collect(),
            summary_line: pending.summary.to_line(),
        };
        std::fs::create_dir_all(dir.path()).unwrap();
        AppendLog::new(&paths.event_log)
            .append(&journal.event_lines)
            .unwrap();
        AppendLog::new(&paths.summary_log)
            .append(std::slice::from_ref(&journal.summary_line))
            .unwrap();
        state::write_state(&paths.state, &pending.next).unwrap();
        journal.write(&paths.journal).unwrap();

        let ledger = BatchLedger::open(paths.clone()).unwrap();
        assert_eq!(ledger.state(), BatchState::new(5, 5));
        assert_eq!(event_ids(&paths), vec![1, 2, 3, 4, 5]);
        assert!(!paths.journal.exists());
    }

    #[test]
    fn test_journal_for_unrelated_state_is_corruption() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());

        state::write_state(&paths.state, &BatchState::new(40, 40)).unwrap();
        let pending = batch(BatchState::new(10, 10), 10);
        CommitJournal {
            prev: pending.base,
            next: pending.next,
            event_log_len: 0,
            summary_log_len: 0,
            event_lines: Vec::new(),
            summary_line: pending.summary.to_line(),
        }
        .write(&paths.journal)
        .unwrap();

        let err = BatchLedger::open(paths.clone()).unwrap_err();
        assert!(matches!(err, Error::StateCorruption(_)));
        // lock released on failure
        assert!(!paths.lock.exists());
    }

    #[test]
    fn test_reset_rewinds_cursor_and_keeps_event_ids_unique() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());
        {
            let mut ledger = BatchLedger::open(paths.clone()).unwrap();
            ledger.commit(batch(ledger.state(), 10)).unwrap();
        }

        let state = BatchLedger::reset(&paths).unwrap();
        assert_eq!(state, BatchState::new(0, 10));
        let status = LedgerStatus::read(&paths).unwrap();
        assert_eq!(status.state, Some(BatchState::new(0, 10)));
        assert!(!status.locked);
        assert_eq!(event_ids(&paths).len(), 10);

        let mut ledger = BatchLedger::open(paths.clone()).unwrap();
        assert_eq!(ledger.state(), BatchState::new(0, 10));
        ledger.commit(batch(ledger.state(), 5)).unwrap();
        assert_eq!(event_ids(&paths), (1..=15).collect::<Vec<_>>());
    }

    #[test]
    fn test_reset_on_empty_directory_starts_from_zero() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());

        assert_eq!(BatchLedger::reset(&paths).unwrap(), BatchState::default());
        let ledger = BatchLedger::open(paths).unwrap();
        assert_eq!(ledger.state(), BatchState::default());
    }

    #[test]
    fn test_reset_refused_while_locked() {
        let dir = TempDir::new().unwrap();
        let paths = LedgerPaths::in_dir(dir.path());
        let _ledger = BatchLedger::open(paths.clone()).unwrap();

        assert!(matches!(
            BatchLedger::reset(&paths),
            Err(Error::CursorLocked(_))
        ));
    }
}
