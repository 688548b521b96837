use std::collections::BTreeMap;
use std::sync::Mutex;
use trading::{RecoveryState, SnapshotKey, SnapshotStore, StoreError};

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    states: Mutex<BTreeMap<SnapshotKey, RecoveryState>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<RecoveryState> {
        self.states
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, state: &RecoveryState) -> Result<SnapshotKey, StoreError> {
        let mut key = state.key();
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        while states.contains_key(&key) {
            key.seq += 1;
        }
        states.insert(key.clone(), state.clone());
        Ok(key)
    }

    fn load(&self, key: &SnapshotKey) -> Result<RecoveryState, StoreError> {
        self.states
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn list(&self, run_id: &str) -> Result<Vec<SnapshotKey>, StoreError> {
        Ok(self
            .states
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .filter(|k| k.run_id == run_id)
            .cloned()
            .collect())
    }
}
