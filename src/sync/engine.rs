//! Sync orchestration.
//!
//! The engine owns the two storage handles and the working scope, runs the
//! diff, and drives the transfer executor through the fixed phase order:
//! writes, then updates, then deletes. `sync` pushes master changes to the
//! slave and never deletes; `restore` pulls slave-only entries back onto
//! the master; destructive deletion exists only as the explicit `prune`
//! operation.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::fs::StorageBackend;
use crate::sync::diff::{order_parents_first, ChangeSet, ComparePolicy, DiffEngine};
use crate::sync::error::Result;
use crate::sync::limiter::{build_throttle, Pacing, RateLimit, Throttle};
use crate::sync::scope::WorkingScope;
use crate::sync::transfer::{
    Direction, LogObserver, OutcomeStatus, SyncObserver, TransferExecutor, TransferOp,
    TransferOutcome,
};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Working subtree and exclusions.
    pub scope: WorkingScope,
    /// Comparator for entries present on both trees.
    pub policy: ComparePolicy,
    /// Operations-per-second ceiling.
    pub rate: RateLimit,
    /// Pacing policy for the ceiling.
    pub pacing: Pacing,
    /// Re-read and compare digests after every file copy.
    pub verify: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            scope: WorkingScope::new("/"),
            policy: ComparePolicy::default(),
            rate: RateLimit::default(),
            pacing: Pacing::default(),
            verify: false,
        }
    }
}

/// Attempt counters for one operation class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpCounts {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// One entry that failed, with enough detail to diagnose it after the run.
#[derive(Debug, Clone, Serialize)]
pub struct FailureDetail {
    pub path: String,
    pub op: TransferOp,
    pub reason: String,
}

/// Aggregate result of one run. Built incrementally, returned at the end,
/// never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub writes: OpCounts,
    pub updates: OpCounts,
    pub deletes: OpCounts,
    pub recovers: OpCounts,
    pub bytes_copied: u64,
    pub elapsed_ms: u64,
    pub failures: Vec<FailureDetail>,
}

impl SyncReport {
    fn record(&mut self, kind: TransferOp, outcomes: Vec<TransferOutcome>) {
        let mut counts = OpCounts::default();
        for outcome in outcomes {
            counts.attempted += 1;
            self.bytes_copied += outcome.bytes;
            match outcome.status {
                OutcomeStatus::Failed(reason) => {
                    counts.failed += 1;
                    self.failures.push(FailureDetail {
                        path: outcome.path,
                        op: outcome.op,
                        reason,
                    });
                }
                _ => counts.succeeded += 1,
            }
        }

        let slot = match kind {
            TransferOp::Write => &mut self.writes,
            TransferOp::Update => &mut self.updates,
            TransferOp::Delete => &mut self.deletes,
            TransferOp::Recover => &mut self.recovers,
        };
        slot.attempted += counts.attempted;
        slot.succeeded += counts.succeeded;
        slot.failed += counts.failed;
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Top-level sync workflow over a master and a slave tree. No state is
/// shared between runs beyond the scope; concurrent engines over
/// overlapping scopes must be serialized by the caller.
pub struct SyncEngine {
    master: Arc<dyn StorageBackend>,
    slave: Arc<dyn StorageBackend>,
    scope: WorkingScope,
    diff: DiffEngine,
    throttle: Arc<dyn Throttle>,
    observer: Arc<dyn SyncObserver>,
    verify: bool,
}

impl SyncEngine {
    pub fn new(
        master: Arc<dyn StorageBackend>,
        slave: Arc<dyn StorageBackend>,
        options: SyncOptions,
    ) -> Self {
        Self {
            master,
            slave,
            scope: options.scope,
            diff: DiffEngine::new(options.policy),
            throttle: build_throttle(options.rate, options.pacing),
            observer: Arc::new(LogObserver),
            verify: options.verify,
        }
    }

    /// Replace the outcome sink (progress bar, collector, ...).
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the admission gate, e.g. with a virtual-clock throttle.
    pub fn with_throttle(mut self, throttle: Arc<dyn Throttle>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn scope(&self) -> &WorkingScope {
        &self.scope
    }

    /// Change the working subtree for subsequent operations. The scope is
    /// replaced wholesale; a run that already captured it is unaffected.
    pub fn set_scope(&mut self, folder: &str) {
        self.scope = self.scope.with_root(folder);
    }

    /// Add an exclusion prefix consulted by the next diff.
    pub fn exclude(&mut self, prefix: &str) -> Result<()> {
        self.scope = self.scope.with_exclude(prefix)?;
        Ok(())
    }

    fn narrow(&mut self, folder: Option<&str>) {
        if let Some(folder) = folder {
            self.set_scope(folder);
        }
    }

    fn executor(&self) -> TransferExecutor<'_> {
        TransferExecutor::new(&*self.throttle, &*self.observer).with_verify(self.verify)
    }

    /// Diff only: what a sync would transfer, without touching either tree.
    pub async fn plan(&mut self, folder: Option<&str>) -> Result<ChangeSet> {
        self.narrow(folder);
        self.diff
            .diff(&*self.master, &*self.slave, &self.scope)
            .await
    }

    /// Push master changes to the slave: writes, then updates. Entries
    /// present only on the slave are left untouched; see `restore` and
    /// `prune`.
    pub async fn sync(&mut self, folder: Option<&str>) -> Result<SyncReport> {
        self.narrow(folder);
        let started = Instant::now();
        info!(root = %self.scope.root(), "sync start");

        let changes = self
            .diff
            .diff(&*self.master, &*self.slave, &self.scope)
            .await?;

        let executor = self.executor();
        let mut report = SyncReport::default();

        let outcomes = executor
            .apply_puts(
                &changes.writes,
                TransferOp::Write,
                Direction::Push,
                &*self.master,
                &*self.slave,
            )
            .await;
        report.record(TransferOp::Write, outcomes);

        let outcomes = executor
            .apply_puts(
                &changes.updates,
                TransferOp::Update,
                Direction::Push,
                &*self.master,
                &*self.slave,
            )
            .await;
        report.record(TransferOp::Update, outcomes);

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            writes = report.writes.attempted,
            updates = report.updates.attempted,
            failed = report.failures.len(),
            elapsed_ms = report.elapsed_ms,
            "sync complete"
        );

        Ok(report)
    }

    /// Pull entries present on the slave but missing from the master back
    /// onto the master. The set a destructive mirror would delete is
    /// recovered instead.
    pub async fn restore(&mut self, folder: Option<&str>) -> Result<SyncReport> {
        self.narrow(folder);
        let started = Instant::now();
        info!(root = %self.scope.root(), "restore start");

        let changes = self
            .diff
            .diff(&*self.master, &*self.slave, &self.scope)
            .await?;

        // The deletes set arrives children-first for removal; recovery
        // creates, so parents go first.
        let mut recovers = changes.deletes;
        order_parents_first(&mut recovers);

        let executor = self.executor();
        let mut report = SyncReport::default();

        let outcomes = executor
            .apply_puts(
                &recovers,
                TransferOp::Recover,
                Direction::Pull,
                &*self.master,
                &*self.slave,
            )
            .await;
        report.record(TransferOp::Recover, outcomes);

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            recovered = report.recovers.attempted,
            failed = report.failures.len(),
            elapsed_ms = report.elapsed_ms,
            "restore complete"
        );

        Ok(report)
    }

    /// Destructively remove slave entries absent from the master. Callers
    /// must opt in explicitly; neither `sync` nor `restore` ever deletes.
    pub async fn prune(&mut self, folder: Option<&str>) -> Result<SyncReport> {
        self.narrow(folder);
        let started = Instant::now();
        info!(root = %self.scope.root(), "prune start");

        let changes = self
            .diff
            .diff(&*self.master, &*self.slave, &self.scope)
            .await?;

        let executor = self.executor();
        let mut report = SyncReport::default();

        let outcomes = executor
            .apply_deletes(&changes.deletes, Direction::Push, &*self.master, &*self.slave)
            .await;
        report.record(TransferOp::Delete, outcomes);

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            deletes = report.deletes.attempted,
            failed = report.failures.len(),
            elapsed_ms = report.elapsed_ms,
            "prune complete"
        );

        Ok(report)
    }
}
