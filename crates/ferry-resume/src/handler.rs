//! Durable persistence for every active transfer's bitmap and byte counter.
//!
//! On open, the latest snapshot is loaded, then the journal is replayed
//! forward over it; any trailing corrupt/truncated journal record is
//! discarded rather than failing recovery. `save`/`remove` append to the
//! journal and update the in-memory index; `compact` folds the journal
//! into a fresh snapshot and truncates it.

use crate::journal::Journal;
use crate::record::Record;
use crate::snapshot;
use ferry_core::error::{Error, Result};
use ferry_core::types::{TransferId, TransferState};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persists [`TransferState`] across process restarts.
pub struct ResumeHandler {
    snapshot_path: PathBuf,
    journal: Journal,
    states: Mutex<HashMap<TransferId, TransferState>>,
}

impl ResumeHandler {
    /// Open (or create) the resume store under `state_dir`, recovering any
    /// state left by a previous run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if `state_dir` cannot be created, or
    /// [`Error::Corrupt`] if the snapshot exists but is malformed.
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self> {
        let state_dir = state_dir.as_ref();
        std::fs::create_dir_all(state_dir)?;

        let snapshot_path = state_dir.join("snapshot.dat");
        let journal_path = state_dir.join("journal.log");

        let mut states = snapshot::load(&snapshot_path)?;
        let journal = Journal::open(&journal_path)?;
        for record in journal.replay()? {
            match record {
                Record::Upsert(state) => {
                    states.insert(state.id, state);
                }
                Record::Remove(id) => {
                    states.remove(&id);
                }
            }
        }

        Ok(Self {
            snapshot_path,
            journal,
            states: Mutex::new(states),
        })
    }

    /// Upsert `state`, durably: the journal append is flushed and synced
    /// before this call returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the journal append fails.
    pub fn save(&self, state: TransferState) -> Result<()> {
        self.journal.append(&Record::Upsert(state.clone()))?;
        self.states.lock().expect("states mutex poisoned").insert(state.id, state);
        Ok(())
    }

    /// Look up the persisted state for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no state is tracked for `id`.
    pub fn load(&self, id: TransferId) -> Result<TransferState> {
        self.states
            .lock()
            .expect("states mutex poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Every currently-tracked transfer state, for crash-recovery
    /// enumeration. Order is unspecified.
    #[must_use]
    pub fn list(&self) -> Vec<TransferState> {
        self.states
            .lock()
            .expect("states mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Tombstone `id`: it will no longer appear in `load`/`list`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the journal append fails.
    pub fn remove(&self, id: TransferId) -> Result<()> {
        self.journal.append(&Record::Remove(id))?;
        self.states.lock().expect("states mutex poisoned").remove(&id);
        Ok(())
    }

    /// Force a snapshot rewrite: the current in-memory state is written to
    /// a fresh `snapshot.dat` (write-to-temp + atomic rename), then the
    /// journal is truncated, since every record it held is now reflected
    /// in the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the snapshot write or journal truncation
    /// fails.
    pub fn compact(&self) -> Result<()> {
        let states = self.states.lock().expect("states mutex poisoned");
        snapshot::save(&self.snapshot_path, &states)?;
        drop(states);
        self.journal.truncate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let handler = ResumeHandler::open(dir.path()).unwrap();
        let id = TransferId::new_v4();
        let state = TransferState::new(id, "a.bin".into(), 10, 1, [0; 32]);
        handler.save(state.clone()).unwrap();

        let loaded = handler.load(id).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn load_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let handler = ResumeHandler::open(dir.path()).unwrap();
        assert!(matches!(
            handler.load(TransferId::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn remove_tombstones_and_list_reflects_it() {
        let dir = tempdir().unwrap();
        let handler = ResumeHandler::open(dir.path()).unwrap();
        let id = TransferId::new_v4();
        handler
            .save(TransferState::new(id, "a.bin".into(), 10, 1, [0; 32]))
            .unwrap();
        assert_eq!(handler.list().len(), 1);

        handler.remove(id).unwrap();
        assert_eq!(handler.list().len(), 0);
        assert!(handler.load(id).is_err());
    }

    #[test]
    fn state_survives_reopen_via_journal_replay() {
        let dir = tempdir().unwrap();
        let id = TransferId::new_v4();
        {
            let handler = ResumeHandler::open(dir.path()).unwrap();
            let mut state = TransferState::new(id, "resume.bin".into(), 300 * 1024, 2, [9; 32]);
            state.mark_received(0, 256 * 1024);
            handler.save(state).unwrap();
        }

        let reopened = ResumeHandler::open(dir.path()).unwrap();
        let state = reopened.load(id).unwrap();
        assert_eq!(state.received_count(), 1);
        assert_eq!(state.bytes_written, 256 * 1024);
    }

    #[test]
    fn compact_folds_journal_into_snapshot_and_truncates_it() {
        let dir = tempdir().unwrap();
        let handler = ResumeHandler::open(dir.path()).unwrap();
        let id = TransferId::new_v4();
        handler
            .save(TransferState::new(id, "a.bin".into(), 10, 1, [0; 32]))
            .unwrap();
        handler.compact().unwrap();

        let reopened = ResumeHandler::open(dir.path()).unwrap();
        assert_eq!(reopened.list().len(), 1);
        assert!(reopened.journal.replay().unwrap().is_empty());
    }

    #[test]
    fn reopen_discards_corrupt_trailing_journal_record() {
        let dir = tempdir().unwrap();
        let id = TransferId::new_v4();
        {
            let handler = ResumeHandler::open(dir.path()).unwrap();
            handler
                .save(TransferState::new(id, "a.bin".into(), 10, 1, [0; 32]))
                .unwrap();
        }

        // Simulate a crash mid-write: append a truncated record.
        let journal_path = dir.path().join("journal.log");
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&journal_path)
            .unwrap();
        file.write_all(&[0, 0, 1, 0, 0, 0, 0, 1]).unwrap();

        let reopened = ResumeHandler::open(dir.path()).unwrap();
        assert_eq!(reopened.list().len(), 1);
        assert_eq!(reopened.load(id).unwrap().id, id);
    }
}
