//! Coordinator decision log.
//!
//! The coordinator can record each distributed transaction's progress
//! (`Started`, `Commit`, `Abort`, `Completed`) before acting on it. After a
//! crash, [`DecisionLog::in_doubt`] lists the transactions whose outcome was
//! not fully delivered to participants.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading or writing the decision log.
#[derive(Debug, Error)]
pub enum DecisionLogError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A coordinator decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Phase 1 is about to start.
    Started,
    /// Every participant prepared and the local transaction committed.
    Commit,
    /// The transaction is being rolled back everywhere.
    Abort,
    /// The outcome reached every participant.
    Completed,
}

/// One entry of the decision log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub tx_id: String,
    pub decision: Decision,
    /// Names of the participants enlisted in the transaction.
    pub participants: Vec<String>,
    pub at: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(tx_id: impl Into<String>, decision: Decision, participants: Vec<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            decision,
            participants,
            at: Utc::now(),
        }
    }
}

/// A transaction whose outcome may not have reached every participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InDoubt {
    pub tx_id: String,
    /// Last recorded decision: `Commit` must be re-driven, anything else is
    /// presumed aborted.
    pub last: Decision,
    /// Participants enlisted when the transaction ran.
    pub participants: Vec<String>,
}

/// Append-only store for coordinator decisions.
pub trait DecisionLog: Send + Sync {
    /// Durably append one record.
    fn append(&self, record: &DecisionRecord) -> Result<(), DecisionLogError>;

    /// All records, oldest first.
    fn records(&self) -> Result<Vec<DecisionRecord>, DecisionLogError>;

    /// Transactions not yet `Completed`, in order of first appearance.
    fn in_doubt(&self) -> Result<Vec<InDoubt>, DecisionLogError> {
        Ok(fold_in_doubt(self.records()?))
    }
}

fn fold_in_doubt(records: Vec<DecisionRecord>) -> Vec<InDoubt> {
    let mut order = Vec::new();
    let mut last: HashMap<String, (Decision, Vec<String>)> = HashMap::new();
    for record in records {
        if !last.contains_key(&record.tx_id) {
            order.push(record.tx_id.clone());
        }
        last.insert(record.tx_id, (record.decision, record.participants));
    }

    order
        .into_iter()
        .filter_map(|tx_id| match last.remove(&tx_id) {
            Some((Decision::Completed, _)) | None => None,
            Some((decision, participants)) => Some(InDoubt {
                tx_id,
                last: decision,
                participants,
            }),
        })
        .collect()
}

/// Decision log kept in memory. Survives nothing; useful in tests and for
/// in-process bookkeeping.
#[derive(Debug, Default)]
pub struct InMemoryDecisionLog {
    records: Mutex<Vec<DecisionRecord>>,
}

impl InMemoryDecisionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecisionLog for InMemoryDecisionLog {
    fn append(&self, record: &DecisionRecord) -> Result<(), DecisionLogError> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<DecisionRecord>, DecisionLogError> {
        Ok(self.records.lock().clone())
    }
}

/// Decision log stored as JSON lines, synced to disk on every append.
#[derive(Debug)]
pub struct FileDecisionLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileDecisionLog {
    /// Open (creating if missing) the log at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DecisionLogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DecisionLog for FileDecisionLog {
    fn append(&self, record: &DecisionRecord) -> Result<(), DecisionLogError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.sync_data()?;
        Ok(())
    }

    fn records(&self) -> Result<Vec<DecisionRecord>, DecisionLogError> {
        // Hold the writer lock so a concurrent append is never half-read.
        let _writer = self.file.lock();
        let reader = BufReader::new(File::open(&self.path)?);

        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}
