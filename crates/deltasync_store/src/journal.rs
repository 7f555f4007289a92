//! Append-only commit journal.
//!
//! Each committed transaction is one line of JSON:
//!
//! ```text
//! {"seq":12,"writes":[{"table":"patients","id":"p1","doc":{...}}]}
//! ```
//!
//! Lines are written whole and flushed before the commit becomes visible.
//! A crash can leave a torn final line without a trailing newline; replay
//! drops it, since its transaction never became visible. A malformed line
//! anywhere else is corruption.

use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// One committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Commit sequence number.
    pub seq: u64,
    /// Documents written by the transaction.
    pub writes: Vec<JournalWrite>,
}

/// A single document write inside a [`JournalEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalWrite {
    /// Table name.
    pub table: String,
    /// Document id.
    pub id: String,
    /// Full document after the write.
    pub doc: Document,
}

/// A file-backed commit journal.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Opens or creates the journal at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry and flushes it.
    ///
    /// With `sync` set, the file is also fsynced before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn append(&mut self, entry: &JournalEntry, sync: bool) -> StoreResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        if sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Reads every complete entry from the journal at `path`.
    ///
    /// A missing file yields no entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupted`] if a line other than a torn
    /// trailing one fails to parse.
    pub fn replay(path: &Path) -> StoreResult<Vec<JournalEntry>> {
        let mut contents = String::new();
        match File::open(path) {
            Ok(mut file) => {
                file.read_to_string(&mut contents)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }

        let complete = contents.ends_with('\n');
        let lines: Vec<&str> = contents.lines().collect();
        let mut entries = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) if index + 1 == lines.len() && !complete => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "dropping torn journal tail"
                    );
                }
                Err(e) => {
                    return Err(StoreError::Corrupted(format!(
                        "journal line {} in {}: {}",
                        index + 1,
                        path.display(),
                        e
                    )));
                }
            }
        }

        Ok(entries)
    }

    /// Discards every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be truncated.
    pub fn truncate(&mut self) -> StoreResult<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(())
    }
}
