//! Append-only operation journal backing `--continue`, `--abort`, and `undo`.
//!
//! One JSON object per line in `.pancake/journal.log`. A state change appends
//! a fresh line for the same `op_id`; readers keep the last line per id, so a
//! torn write at the tail never corrupts earlier history. The entry on disk
//! IS the continuation: resuming after a crash or a conflict is a fresh
//! process re-running the remaining plan steps against the journaled plan.

use crate::{
    errors::{PkError, PkResult},
    plan::{Intent, Plan},
    store::StacksFile,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

/// Everything needed to rewind a partially applied operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreImage {
    /// The metadata file as it stood before the operation.
    pub metadata: StacksFile,
    /// Head commits of every branch the plan touches, before the operation.
    pub branch_heads: BTreeMap<String, String>,
}

/// Lifecycle of a journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum EntryState {
    /// Execution in progress.
    Open,
    /// Halted on a rebase conflict at the given step index.
    Suspended { at_step: usize, hint: String },
    /// All steps ran; metadata committed.
    Committed,
    /// Rolled back from pre-images.
    Aborted,
}

/// One journaled operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub op_id: u64,
    pub intent: Intent,
    pub plan: Plan,
    pub pre_image: PreImage,
    pub state: EntryState,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Set when this entry records an `undo`: the op it reversed. An undo
    /// entry's pre-image is the state *after* the reversed op, which is what
    /// `pk redo` restores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverses: Option<u64>,
}

impl JournalEntry {
    pub fn is_active(&self) -> bool {
        matches!(self.state, EntryState::Open | EntryState::Suspended { .. })
    }
}

/// Handle on `.pancake/journal.log`.
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Appends an entry line and flushes it to disk.
    pub fn append(&self, entry: &JournalEntry) -> PkResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// All entries, collapsed to the latest state per op id, oldest first.
    /// A torn final line (crash mid-append) is skipped.
    pub fn entries(&self) -> PkResult<Vec<JournalEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let mut latest: BTreeMap<u64, JournalEntry> = BTreeMap::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => {
                    latest.insert(entry.op_id, entry);
                }
                Err(_) => continue,
            }
        }
        Ok(latest.into_values().collect())
    }

    /// The single entry currently Open or Suspended, if any. The metadata
    /// lock guarantees there is at most one.
    pub fn active(&self) -> PkResult<Option<JournalEntry>> {
        Ok(self.entries()?.into_iter().rev().find(|e| e.is_active()))
    }

    /// Errors if an operation is already in flight.
    pub fn ensure_idle(&self) -> PkResult<()> {
        if let Some(active) = self.active()? {
            return Err(PkError::StackInconsistent {
                details: format!(
                    "a `pk {}` operation is in progress (op {}); finish it with --continue or --abort",
                    active.intent.command_name(),
                    active.op_id
                ),
            });
        }
        Ok(())
    }

    /// The most recent Committed entry, for `pk undo`.
    pub fn last_committed(&self) -> PkResult<Option<JournalEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .rev()
            .find(|e| e.state == EntryState::Committed))
    }

    /// The next operation id: one past the highest seen.
    pub fn next_op_id(&self) -> PkResult<u64> {
        Ok(self
            .entries()?
            .last()
            .map(|e| e.op_id + 1)
            .unwrap_or(1))
    }
}
