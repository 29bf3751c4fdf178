//! Durable record store for training-drill events.
//!
//! Serializes concurrent writers into a shared multi-table tabular store and
//! a day-partitioned NDJSON journal, while keeping an in-memory session
//! registry consistent with what is on disk. All mutation goes through
//! [`Recorder`], which holds the [`gate::ExclusiveGate`] for the full
//! write-through chain.

pub mod error;
pub mod event;
pub mod gate;
pub mod journal;
pub mod recorder;
pub mod registry;
pub mod tabular;
pub mod upload;

pub use error::{StoreError, StoreResult};
pub use event::{
    decode_verification_code, now_iso, EventBody, EventKind, EventRecord, OPERATIONS_TABLE,
};
pub use gate::ExclusiveGate;
pub use journal::DayJournal;
pub use recorder::Recorder;
pub use registry::{Session, SessionRegistry};
pub use tabular::{StoreDocument, Table, TabularStore};
pub use upload::{SavedUpload, UploadStore};
