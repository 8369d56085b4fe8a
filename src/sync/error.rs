use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Which storage tree an enumeration failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeSide {
    Master,
    Slave,
}

impl std::fmt::Display for TreeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeSide::Master => write!(f, "master"),
            TreeSide::Slave => write!(f, "slave"),
        }
    }
}

/// Errors that abort a sync or restore run.
///
/// Per-entry transfer failures are not errors at this level; they are
/// collected into the run's [`SyncReport`](crate::sync::engine::SyncReport)
/// and the run completes as a partial success.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A storage tree could not be listed. Fatal to the run; nothing is
    /// transferred on a partial view of either tree.
    #[error("Failed to enumerate the {tree} tree under {root}")]
    Enumeration {
        tree: TreeSide,
        root: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An exclusion prefix could not be compiled into the scope matcher.
    #[error("Invalid exclude prefix {prefix:?}")]
    InvalidExclude {
        prefix: String,
        #[source]
        source: globset::Error,
    },
}
