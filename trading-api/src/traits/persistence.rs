use crate::model::recovery::{RecoveryState, SnapshotKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot {0} not found")]
    NotFound(SnapshotKey),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid run id `{0}`")]
    InvalidRunId(String),
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Blob store for recovery states, keyed by run id and timestamp.
///
/// Saving a state whose key is already taken stores it under the next free `seq`.
///
/// States are read back only during operator-initiated recovery.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, state: &RecoveryState) -> Result<SnapshotKey, StoreError>;

    fn load(&self, key: &SnapshotKey) -> Result<RecoveryState, StoreError>;

    /// Keys for a run, oldest first.
    fn list(&self, run_id: &str) -> Result<Vec<SnapshotKey>, StoreError>;

    fn latest(&self, run_id: &str) -> Result<Option<SnapshotKey>, StoreError> {
        Ok(self.list(run_id)?.pop())
    }
}
