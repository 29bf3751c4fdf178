//! Day-partitioned, append-only journal.
//!
//! One NDJSON file per (day, event variant): `training_{variant}_{date}.log`
//! under the journal directory. Files are opened per write in append mode
//! and flushed before returning. Concurrent appends are serialized by the
//! caller holding the exclusive gate.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{Map, Value};

use crate::error::StoreResult;
use crate::event::EventKind;

#[derive(Debug)]
pub struct DayJournal {
    dir: PathBuf,
}

impl DayJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Journal file path for a variant on the current UTC day.
    pub fn file_for_today(&self, kind: EventKind) -> PathBuf {
        let day = Utc::now().format("%Y-%m-%d");
        self.dir.join(format!("training_{}_{}.log", kind.table(), day))
    }

    /// Appends one record as a single JSON line and flushes it to disk.
    pub fn append(&self, kind: EventKind, record: &Map<String, Value>) -> StoreResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.file_for_today(kind);
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(path)
    }
}
