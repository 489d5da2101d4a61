//! Append-structured journal of [`Record`]s.
//!
//! Replay reads records from the start and stops at the first corrupt or
//! truncated record — a crash mid-write leaves at most one incomplete
//! trailing record, which is discarded rather than treated as a fatal
//! recovery error.

use crate::record::{decode_one, encode, Record};
use ferry_core::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// Magic bytes identifying a ferry resume journal/snapshot file.
pub const MAGIC: &[u8; 4] = b"RSM1";

/// Handle to an on-disk journal file.
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// Open (creating if necessary) the journal at `path`, writing the
    /// magic header if the file is new.
    ///
    /// # Errors
    ///
    /// Returns [`ferry_core::error::Error::Io`] if the file cannot be
    /// created or its header written.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            let mut file = File::create(&path)?;
            file.write_all(MAGIC)?;
            file.sync_all()?;
        }
        Ok(Self { path })
    }

    /// Append one record, durably: the write is followed by an `fsync`
    /// before this call returns.
    ///
    /// # Errors
    ///
    /// Returns [`ferry_core::error::Error::Io`] if the append or sync fails.
    pub fn append(&self, record: &Record) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&encode(record))?;
        file.sync_all()?;
        Ok(())
    }

    /// Replay every well-formed record from the start of the file, in
    /// order. Stops (without error) at the first corrupt or truncated
    /// record, logging a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ferry_core::error::Error::Corrupt`] if the file does not
    /// begin with [`MAGIC`].
    pub fn replay(&self) -> Result<Vec<Record>> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        read_magic(&mut reader, &self.path)?;

        let mut records = Vec::new();
        loop {
            match decode_one(&mut reader) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        "journal {} ends with a corrupt/truncated record, discarding tail: {e}",
                        self.path.display()
                    );
                    break;
                }
            }
        }
        Ok(records)
    }

    /// Truncate the journal back to just the magic header, e.g. after a
    /// snapshot has absorbed every record.
    ///
    /// # Errors
    ///
    /// Returns [`ferry_core::error::Error::Io`] if the file cannot be
    /// rewritten.
    pub fn truncate(&self) -> Result<()> {
        let mut file = File::create(&self.path)?;
        file.write_all(MAGIC)?;
        file.sync_all()?;
        Ok(())
    }
}

fn read_magic(reader: &mut impl std::io::Read, path: &Path) -> Result<()> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(|e| {
        ferry_core::error::Error::Corrupt(format!("{}: missing RSM1 header: {e}", path.display()))
    })?;
    if &magic != MAGIC {
        return Err(ferry_core::error::Error::Corrupt(format!(
            "{}: bad magic {magic:?}, expected {MAGIC:?}",
            path.display()
        )));
    }
    Ok(())
}
