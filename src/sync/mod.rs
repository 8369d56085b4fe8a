//! Reconciliation core.
//!
//! Diffing two storage trees, throttled transfer execution, and the
//! sync/restore orchestration on top.

pub mod diff;
pub mod engine;
pub mod error;
pub mod hash;
pub mod limiter;
pub mod scope;
pub mod transfer;

pub use diff::{ChangeSet, ComparePolicy, DiffEngine};
pub use engine::{FailureDetail, OpCounts, SyncEngine, SyncOptions, SyncReport};
pub use error::{SyncError, TreeSide};
pub use limiter::{build_throttle, Pacing, RateLimit, Throttle, DEFAULT_OPS_PER_SECOND};
pub use scope::{ExcludeSet, WorkingScope};
pub use transfer::{
    Direction, LogObserver, OutcomeStatus, SyncObserver, TransferExecutor, TransferOp,
    TransferOutcome,
};
