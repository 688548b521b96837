use log::debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use trading::{RecoveryState, SnapshotKey, SnapshotStore, StoreError};

const PREFIX: &str = "portfolio_snapshot_";

/// One JSON file per state: `<dir>/portfolio_snapshot_<run>_<ts>.json`, with a
/// `.<seq>` before the extension when a run saves twice at the same timestamp.
///
/// Writes go to a temporary file that is synced and renamed into place, so a
/// reader never sees a half-written state.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &SnapshotKey) -> Result<PathBuf, StoreError> {
        check_run_id(&key.run_id)?;
        let name = if key.seq == 0 {
            format!("{}{}_{}.json", PREFIX, key.run_id, key.taken_at)
        } else {
            format!("{}{}_{}.{}.json", PREFIX, key.run_id, key.taken_at, key.seq)
        };
        Ok(self.dir.join(name))
    }
}

/// Run ids become part of a file name and must not leave the store directory.
fn check_run_id(run_id: &str) -> Result<(), StoreError> {
    if run_id.is_empty() || run_id.contains(['/', '\\']) || run_id.contains("..") {
        return Err(StoreError::InvalidRunId(run_id.to_string()));
    }
    Ok(())
}

fn parse_stamp(stamp: &str) -> Option<(i64, u32)> {
    match stamp.split_once('.') {
        Some((taken_at, seq)) => Some((taken_at.parse().ok()?, seq.parse().ok()?)),
        None => Some((stamp.parse().ok()?, 0)),
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, state: &RecoveryState) -> Result<SnapshotKey, StoreError> {
        let mut key = state.key();
        let mut path = self.path_for(&key)?;
        std::fs::create_dir_all(&self.dir)?;
        while path.exists() {
            key.seq += 1;
            path = self.path_for(&key)?;
        }
        let json = serde_json::to_string_pretty(state)?;

        let temp_path = path.with_extension("tmp");
        let mut temp_file = std::fs::File::create(&temp_path)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.sync_all()?;
        std::fs::rename(&temp_path, &path)?;

        debug!("snapshot {} written to {}", key, path.display());
        Ok(key)
    }

    fn load(&self, key: &SnapshotKey) -> Result<RecoveryState, StoreError> {
        let path = self.path_for(key)?;
        let file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let state = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(state)
    }

    fn list(&self, run_id: &str) -> Result<Vec<SnapshotKey>, StoreError> {
        check_run_id(run_id)?;
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let run_prefix = format!("{}{}_", PREFIX, run_id);

        let mut keys = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stamp) = name
                .strip_prefix(&run_prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            if let Some((taken_at, seq)) = parse_stamp(stamp) {
                keys.push(SnapshotKey::new(run_id, taken_at).with_seq(seq));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading::{PortfolioSnapshot, SnapshotReason};

    fn state(run: &str, ts: i64) -> RecoveryState {
        RecoveryState::new(
            run,
            ts,
            SnapshotReason::Periodic,
            PortfolioSnapshot::empty(1_000.0),
            Vec::new(),
        )
    }

    #[test]
    fn saves_lists_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());

        store.save(&state("run", 2_000)).unwrap();
        store.save(&state("run", 900)).unwrap();
        store.save(&state("run_b", 5_000)).unwrap();

        let keys = store.list("run").unwrap();
        assert_eq!(keys, vec![SnapshotKey::new("run", 900), SnapshotKey::new("run", 2_000)]);
        let latest = store.latest("run").unwrap().unwrap();
        assert_eq!(store.load(&latest).unwrap(), state("run", 2_000));
        assert!(!store.path_for(&latest).unwrap().with_extension("tmp").exists());
    }

    #[test]
    fn same_timestamp_saves_are_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());

        let first = store.save(&state("run", 700)).unwrap();
        let mut second_state = state("run", 700);
        second_state.reason = SnapshotReason::Operator;
        let second = store.save(&second_state).unwrap();

        assert_eq!(first, SnapshotKey::new("run", 700));
        assert_eq!(second, SnapshotKey::new("run", 700).with_seq(1));
        assert_eq!(store.list("run").unwrap(), vec![first.clone(), second.clone()]);
        assert_eq!(store.latest("run").unwrap(), Some(second.clone()));
        assert_eq!(store.load(&first).unwrap().reason, SnapshotReason::Periodic);
        assert_eq!(store.load(&second).unwrap().reason, SnapshotReason::Operator);
    }

    #[test]
    fn run_ids_that_leave_the_directory_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("snapshots"));

        for run in ["../escape", "a/b", "a\\b", ".."] {
            let err = store.save(&state(run, 1)).unwrap_err();
            assert!(matches!(err, StoreError::InvalidRunId(_)), "{run} accepted");
            assert!(matches!(store.list(run), Err(StoreError::InvalidRunId(_))));
        }
        assert!(!dir.path().join("escape").exists());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn missing_snapshot_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("never-created"));
        assert!(store.list("run").unwrap().is_empty());
        let err = store.load(&SnapshotKey::new("run", 1)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
