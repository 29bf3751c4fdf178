//! Multi-table tabular store backed by a single JSON document.
//!
//! One table per event variant plus the aggregate operations table. Every
//! append reads the whole document, modifies it in memory, and atomically
//! replaces the file (temp write, fsync, rename), so a failed append leaves
//! the previous valid document untouched. Throughput is bounded by document
//! size; the type is the seam for substituting an append-optimized backend.
//!
//! Callers serialize through [`crate::gate::ExclusiveGate`]; this type does
//! no locking of its own.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};
use crate::event::{operations_header, EventKind, OPERATIONS_TABLE};

/// One named table: a header row followed by data rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    fn with_header(columns: &[&str]) -> Self {
        Self {
            header: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

/// The persisted document: an ordered map of table name to table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    pub tables: IndexMap<String, Table>,
}

/// File-backed store with schema self-healing and atomic whole-file replace.
#[derive(Debug)]
pub struct TabularStore {
    path: PathBuf,
}

impl TabularStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn declared_tables() -> Vec<(&'static str, Vec<&'static str>)> {
        let mut tables: Vec<(&'static str, Vec<&'static str>)> = EventKind::ALL
            .iter()
            .map(|kind| (kind.table(), kind.header()))
            .collect();
        tables.push((OPERATIONS_TABLE, operations_header()));
        tables
    }

    fn load(&self) -> StoreResult<StoreDocument> {
        if !self.path.exists() {
            return Ok(StoreDocument::default());
        }
        let file = File::open(&self.path)?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Writes the document to a temp file, fsyncs it, and renames it into
    /// place, so readers only ever observe a complete document.
    fn persist(&self, doc: &StoreDocument) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        serde_json::to_writer(&mut file, doc)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Adds any missing declared table and fills in any missing header.
    /// Returns whether the document changed.
    fn heal_schema(doc: &mut StoreDocument) -> bool {
        let mut changed = false;
        for (name, columns) in Self::declared_tables() {
            match doc.tables.get_mut(name) {
                None => {
                    doc.tables.insert(name.to_string(), Table::with_header(&columns));
                    changed = true;
                }
                Some(table) if table.header.is_empty() => {
                    table.header = columns.iter().map(|c| c.to_string()).collect();
                    changed = true;
                }
                Some(_) => {}
            }
        }
        changed
    }

    /// Idempotently guarantees the document exists with every declared table
    /// and header. Safe to call repeatedly.
    pub fn ensure_schema(&self) -> StoreResult<()> {
        let mut doc = self.load()?;
        if Self::heal_schema(&mut doc) {
            self.persist(&doc)?;
        }
        Ok(())
    }

    /// Appends one record to one table. See [`Self::append_all`].
    pub fn append(&self, table: &str, record: &Map<String, Value>) -> StoreResult<()> {
        self.append_all(&[(table, record)])
    }

    /// Appends a batch of records in one read-modify-write cycle.
    ///
    /// Fields are mapped onto each table's declared column order; a missing
    /// field becomes a null cell. On failure nothing is persisted.
    pub fn append_all(&self, batch: &[(&str, &Map<String, Value>)]) -> StoreResult<()> {
        let mut doc = self.load()?;
        Self::heal_schema(&mut doc);
        for (name, record) in batch {
            let table = doc
                .tables
                .get_mut(*name)
                .ok_or_else(|| StoreError::UnknownTable(name.to_string()))?;
            let row = table
                .header
                .iter()
                .map(|column| record.get(column).cloned().unwrap_or(Value::Null))
                .collect();
            table.rows.push(row);
        }
        self.persist(&doc)
    }

    /// Reads the whole document. Missing file yields the empty document.
    pub fn dump(&self) -> StoreResult<StoreDocument> {
        self.load()
    }
}
