//! Full-state snapshot, rewritten atomically on `compact()`.
//!
//! A snapshot is the same `[len][crc32][payload]` record stream as the
//! journal (see [`crate::record`]), one record per tracked transfer,
//! preceded by the same [`crate::journal::MAGIC`] header. Writing one is
//! write-to-temp + atomic rename so a crash mid-write never corrupts the
//! previous snapshot.

use crate::journal::MAGIC;
use crate::record::{decode_one, encode, Record};
use ferry_core::error::{Error, Result};
use ferry_core::types::{TransferId, TransferState};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

/// Load a snapshot file into a map of transfer id to state.
///
/// Returns an empty map if `path` does not exist (fresh install).
///
/// # Errors
///
/// Returns [`Error::Corrupt`] if the file exists but its header or any
/// record is malformed.
pub fn load(path: impl AsRef<Path>) -> Result<HashMap<TransferId, TransferState>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut magic = [0u8; 4];
    std::io::Read::read_exact(&mut reader, &mut magic)
        .map_err(|e| Error::Corrupt(format!("{}: missing RSM1 header: {e}", path.display())))?;
    if &magic != MAGIC {
        return Err(Error::Corrupt(format!(
            "{}: bad magic {magic:?}",
            path.display()
        )));
    }

    let mut states = HashMap::new();
    loop {
        match decode_one(&mut reader)? {
            Some(Record::Upsert(state)) => {
                states.insert(state.id, state);
            }
            Some(Record::Remove(id)) => {
                states.remove(&id);
            }
            None => break,
        }
    }
    Ok(states)
}

/// Atomically rewrite the snapshot at `path` with the full contents of
/// `states`: write to `path.tmp`, `fsync`, then rename over `path`.
///
/// # Errors
///
/// Returns [`Error::Io`] if the temp file cannot be written or the rename
/// fails.
pub fn save(path: impl AsRef<Path>, states: &HashMap<TransferId, TransferState>) -> Result<()> {
    let path = path.as_ref();
    let tmp_path = path.with_extension("tmp");

    let mut file = File::create(&tmp_path)?;
    file.write_all(MAGIC)?;
    for state in states.values() {
        file.write_all(&encode(&Record::Upsert(state.clone())))?;
    }
    file.sync_all()?;

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
