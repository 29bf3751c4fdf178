//! Write-through chain: journal, variant table, aggregate table.
//!
//! One gate acquisition covers all three sinks, so the row order across
//! concurrent callers is the gate acquisition order and journal appends are
//! serialized without a second lock. The first failing sink aborts the
//! remaining ones.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::StoreResult;
use crate::event::{EventKind, EventRecord, OPERATIONS_TABLE};
use crate::gate::ExclusiveGate;
use crate::journal::DayJournal;
use crate::tabular::{StoreDocument, TabularStore};

const STORE_FILE: &str = "records.json";
const LOCK_FILE: &str = "store.lock";
const JOURNAL_DIR: &str = "logs";

/// Facade over the gate, the tabular store, and the journal.
#[derive(Debug)]
pub struct Recorder {
    gate: ExclusiveGate,
    store: TabularStore,
    journal: DayJournal,
}

impl Recorder {
    /// Lays the store file, lock file, and journal directory out under one
    /// data directory.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            gate: ExclusiveGate::new(data_dir.join(LOCK_FILE)),
            store: TabularStore::new(data_dir.join(STORE_FILE)),
            journal: DayJournal::new(data_dir.join(JOURNAL_DIR)),
        }
    }

    pub fn store(&self) -> &TabularStore {
        &self.store
    }

    /// Creates the store with its full schema. Called once at startup;
    /// harmless to repeat.
    pub fn init(&self) -> StoreResult<()> {
        self.gate.with_exclusive(|| self.store.ensure_schema())
    }

    /// Journals the event, then appends it to its variant table and the
    /// operations table in one read-modify-write cycle.
    pub fn record(&self, event: &EventRecord) -> StoreResult<()> {
        let named = event.named_fields();
        let operation = event.operation_fields();
        let table = event.kind().table();

        self.gate.with_exclusive(|| {
            let journal_path = self.journal.append(event.kind(), &named)?;
            self.store
                .append_all(&[(table, &named), (OPERATIONS_TABLE, &operation)])?;
            debug!(
                table,
                journal = %journal_path.display(),
                session_id = %event.session_id,
                "event recorded"
            );
            Ok(())
        })
    }

    /// Full dump of the tabular store. Reads see only complete documents
    /// thanks to the atomic replace on the write side.
    pub fn dump(&self) -> StoreResult<StoreDocument> {
        self.store.dump()
    }

    pub fn journal_file_for_today(&self, kind: EventKind) -> PathBuf {
        self.journal.file_for_today(kind)
    }
}
