//! bosun-audit — append-only record of every disruptive decision.
//!
//! One JSON object per line, flushed per record. Records are never
//! rewritten or reordered; the file is the authoritative trail and an
//! in-memory tail serves reads for the current process.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use bosun_core::{epoch_secs, MemberId, OperationKind};

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log io: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit record encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One decision or transition worth keeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRecord {
    /// Unix epoch seconds.
    pub ts: u64,
    /// Cluster context the operation ran against.
    pub context: String,
    /// Member the step applied to, when there is one.
    pub member: Option<MemberId>,
    pub kind: OperationKind,
    /// Step or transition name (cordon, drain, skip, abort, ...).
    pub step: String,
    /// What happened (started, ok, failed, overridden, ...).
    pub outcome: String,
    /// Free-form explanation, present on skips, failures, overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditRecord {
    pub fn new(
        context: impl Into<String>,
        member: Option<MemberId>,
        kind: OperationKind,
        step: impl Into<String>,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            ts: epoch_secs(),
            context: context.into(),
            member,
            kind,
            step: step.into(),
            outcome: outcome.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

struct Inner {
    file: Option<File>,
    tail: Vec<AuditRecord>,
}

/// Append-only audit sink. Clone-free; share via `Arc`.
pub struct AuditLog {
    inner: Mutex<Inner>,
}

impl AuditLog {
    /// Open (or create) a JSONL file and append to it.
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                file: Some(file),
                tail: Vec::new(),
            }),
        })
    }

    /// In-memory only. Used by tests and dry runs.
    pub fn ephemeral() -> Self {
        Self {
            inner: Mutex::new(Inner {
                file: None,
                tail: Vec::new(),
            }),
        }
    }

    /// Append one record. The line is written and flushed before the
    /// record becomes visible to `records()`.
    pub fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut inner = self.inner.lock().expect("audit lock poisoned");
        if let Some(file) = inner.file.as_mut() {
            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');
            file.write_all(&line)?;
            file.flush()?;
        }
        debug!(step = %record.step, outcome = %record.outcome, "audit");
        inner.tail.push(record);
        Ok(())
    }

    /// Records appended by this process, in append order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.inner.lock().expect("audit lock poisoned").tail.clone()
    }
}
