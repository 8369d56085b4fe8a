//! Batch execution of classified entries.
//!
//! The executor applies one entry set against a target tree: copy-in for
//! writes/updates/recovers, removal for deletes. Every admission goes
//! through the throttle first. One entry failing never aborts the batch,
//! and nothing is retried; outcomes are handed to the observer as they
//! happen and returned to the caller.

use serde::Serialize;
use tracing::{debug, warn};

use crate::fs::{Entry, StorageBackend};
use crate::sync::hash::hash_stream;
use crate::sync::limiter::Throttle;

/// Transfer direction. Push reads the master and writes the slave; pull is
/// the mirror, used by restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Push,
    Pull,
}

impl Direction {
    fn source_target<'a>(
        &self,
        master: &'a dyn StorageBackend,
        slave: &'a dyn StorageBackend,
    ) -> (&'a dyn StorageBackend, &'a dyn StorageBackend) {
        match self {
            Direction::Push => (master, slave),
            Direction::Pull => (slave, master),
        }
    }
}

/// What a batch is doing with its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferOp {
    Write,
    Update,
    Delete,
    Recover,
}

impl std::fmt::Display for TransferOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferOp::Write => write!(f, "write"),
            TransferOp::Update => write!(f, "update"),
            TransferOp::Delete => write!(f, "delete"),
            TransferOp::Recover => write!(f, "recover"),
        }
    }
}

/// Per-entry result. Skips are successes whose work was already done by an
/// earlier recursive directory delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    SkippedAbsent,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub path: String,
    pub op: TransferOp,
    pub status: OutcomeStatus,
    /// Bytes copied for file puts; zero for directories and deletes.
    pub bytes: u64,
}

impl TransferOutcome {
    pub fn failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed(_))
    }
}

/// Sink for per-entry outcomes. Reporting lives behind this seam so a slow
/// or fancy sink never sits inside the transfer loop's error handling.
pub trait SyncObserver: Send + Sync {
    fn on_phase(&self, _op: TransferOp, _total: usize) {}
    fn on_outcome(&self, _outcome: &TransferOutcome) {}
}

/// Observer that reports through tracing.
pub struct LogObserver;

impl SyncObserver for LogObserver {
    fn on_phase(&self, op: TransferOp, total: usize) {
        debug!(op = %op, total, "phase start");
    }

    fn on_outcome(&self, outcome: &TransferOutcome) {
        match &outcome.status {
            OutcomeStatus::Failed(reason) => {
                warn!(path = %outcome.path, op = %outcome.op, %reason, "transfer failed");
            }
            OutcomeStatus::SkippedAbsent => {
                debug!(path = %outcome.path, op = %outcome.op, "already absent, skipped");
            }
            OutcomeStatus::Succeeded => {
                debug!(path = %outcome.path, op = %outcome.op, bytes = outcome.bytes, "done");
            }
        }
    }
}

/// Applies classified entry sets. Borrowed per run; holds no state across
/// calls.
pub struct TransferExecutor<'a> {
    throttle: &'a dyn Throttle,
    observer: &'a dyn SyncObserver,
    verify: bool,
}

impl<'a> TransferExecutor<'a> {
    pub fn new(throttle: &'a dyn Throttle, observer: &'a dyn SyncObserver) -> Self {
        Self {
            throttle,
            observer,
            verify: false,
        }
    }

    /// Re-read both sides after each file copy and compare digests.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Apply a put batch (writes, updates, or recovers). Entries must be
    /// ordered parents-first; the diff engine guarantees that.
    pub async fn apply_puts(
        &self,
        entries: &[Entry],
        op: TransferOp,
        direction: Direction,
        master: &dyn StorageBackend,
        slave: &dyn StorageBackend,
    ) -> Vec<TransferOutcome> {
        let (source, target) = direction.source_target(master, slave);
        self.observer.on_phase(op, entries.len());

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            self.throttle.admit().await;

            let (status, bytes) = match self.put_entry(entry, source, target).await {
                Ok(bytes) => (OutcomeStatus::Succeeded, bytes),
                Err(err) => (OutcomeStatus::Failed(format!("{:#}", err)), 0),
            };

            let outcome = TransferOutcome {
                path: entry.path.clone(),
                op,
                status,
                bytes,
            };
            self.observer.on_outcome(&outcome);
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn put_entry(
        &self,
        entry: &Entry,
        source: &dyn StorageBackend,
        target: &dyn StorageBackend,
    ) -> anyhow::Result<u64> {
        if entry.is_dir() {
            target.create_dir(&entry.path).await?;
            return Ok(0);
        }

        let stream = source.read_stream(&entry.path).await?;
        let bytes = target.put_stream(&entry.path, stream).await?;

        if self.verify {
            let source_digest = hash_stream(source, &entry.path).await?;
            let target_digest = hash_stream(target, &entry.path).await?;
            if source_digest != target_digest {
                anyhow::bail!("Digest mismatch after copy: {}", entry.path);
            }
        }

        Ok(bytes)
    }

    /// Apply a delete batch against the direction's target tree. Entries
    /// must be ordered children-first.
    pub async fn apply_deletes(
        &self,
        entries: &[Entry],
        direction: Direction,
        master: &dyn StorageBackend,
        slave: &dyn StorageBackend,
    ) -> Vec<TransferOutcome> {
        let (_, target) = direction.source_target(master, slave);
        self.observer.on_phase(TransferOp::Delete, entries.len());

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            self.throttle.admit().await;

            let status = match self.delete_entry(entry, target).await {
                Ok(status) => status,
                Err(err) => OutcomeStatus::Failed(format!("{:#}", err)),
            };

            let outcome = TransferOutcome {
                path: entry.path.clone(),
                op: TransferOp::Delete,
                status,
                bytes: 0,
            };
            self.observer.on_outcome(&outcome);
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn delete_entry(
        &self,
        entry: &Entry,
        target: &dyn StorageBackend,
    ) -> anyhow::Result<OutcomeStatus> {
        // A directory delete earlier in the batch may have taken this path
        // with it.
        if !target.exists(&entry.path).await? {
            return Ok(OutcomeStatus::SkippedAbsent);
        }

        if entry.is_dir() {
            target.delete_dir(&entry.path).await?;
        } else {
            target.delete_file(&entry.path).await?;
        }

        Ok(OutcomeStatus::Succeeded)
    }
}
