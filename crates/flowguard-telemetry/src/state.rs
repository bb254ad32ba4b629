//! Persisted batch cursor
//!
//! The state file is plain text, one `key=value` pair per line:
//!
//! ```text
//! chunk_start=20
//! event_id=20
//! ```
//!
//! Blank lines are ignored. Anything else that is not exactly the two known
//! keys with non-negative integer values is `StateCorruption`.

use flowguard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const CHUNK_START: &str = "chunk_start";
const EVENT_ID: &str = "event_id";

/// Cursor over the dataset plus the last assigned event id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchState {
    /// Offset of the next record to process
    pub chunk_start: u64,

    /// Last event id written; the next event gets `event_id + 1`
    pub event_id: u64,
}

impl BatchState {
    pub fn new(chunk_start: u64, event_id: u64) -> Self {
        Self {
            chunk_start,
            event_id,
        }
    }

    /// State after processing `processed` records starting at `window_start`
    pub fn after_window(&self, window_start: u64, processed: u64) -> Self {
        Self {
            chunk_start: window_start + processed,
            event_id: self.event_id + processed,
        }
    }

    /// Parse the `key=value` text form
    pub fn parse(text: &str) -> Result<Self> {
        let mut chunk_start = None;
        let mut event_id = None;

        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::corruption(format!("state line {} is not key=value: {:?}", n + 1, line))
            })?;
            let value: u64 = value.trim().parse().map_err(|_| {
                Error::corruption(format!(
                    "state line {} has a non-integer value: {:?}",
                    n + 1,
                    line
                ))
            })?;

            let slot = match key.trim() {
                CHUNK_START => &mut chunk_start,
                EVENT_ID => &mut event_id,
                other => {
                    return Err(Error::corruption(format!(
                        "unknown state key '{}' on line {}",
                        other,
                        n + 1
                    )))
                }
            };
            if slot.replace(value).is_some() {
                return Err(Error::corruption(format!(
                    "duplicate state key '{}' on line {}",
                    key.trim(),
                    n + 1
                )));
            }
        }

        match (chunk_start, event_id) {
            (Some(chunk_start), Some(event_id)) => Ok(Self::new(chunk_start, event_id)),
            (None, _) => Err(Error::corruption(format!("state is missing '{}'", CHUNK_START))),
            (_, None) => Err(Error::corruption(format!("state is missing '{}'", EVENT_ID))),
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}={}", CHUNK_START, self.chunk_start)?;
        writeln!(f, "{}={}", EVENT_ID, self.event_id)
    }
}

/// Read a state file; `Ok(None)` when it does not exist
pub fn read_state(path: &Path) -> Result<Option<BatchState>> {
    match std::fs::read_to_string(path) {
        Ok(text) => BatchState::parse(&text).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace a state file atomically
pub fn write_state(path: &Path, state: &BatchState) -> Result<()> {
    write_atomic(path, state.to_string().as_bytes())
}

/// Write `bytes` to `path` via a synced temp file and a rename
///
/// Readers observe either the old or the new content, never a mix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    sync_parent(path);
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Best-effort fsync of the containing directory so a rename is durable
pub(crate) fn sync_parent(path: &Path) {
    let Some(dir) = path.parent() else { return };
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!("Directory sync skipped for {:?}: {}", dir, e);
    }
}
