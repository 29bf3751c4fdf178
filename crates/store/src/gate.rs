//! Mutual exclusion gate for store mutation.
//!
//! Two layers, held together: an in-process mutex serializes callers inside
//! one server, then an advisory `flock` on a well-known lock file serializes
//! across processes sharing the same storage directory. The process mutex
//! must be taken first so same-process callers never stack on the OS lock.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use fs2::FileExt;

use crate::error::StoreResult;

/// Cross-process exclusive lock around all record-store mutation.
///
/// Acquisition blocks; there is no timeout. The lock file is created on
/// first use and never removed.
#[derive(Debug)]
pub struct ExclusiveGate {
    lock_path: PathBuf,
    local: Mutex<()>,
}

impl ExclusiveGate {
    pub fn new(lock_path: impl Into<PathBuf>) -> Self {
        Self {
            lock_path: lock_path.into(),
            local: Mutex::new(()),
        }
    }

    /// Runs `action` under both locks, releasing them on every exit path.
    pub fn with_exclusive<T>(&self, action: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        let _local = self.local.lock().unwrap();

        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let lock_file = File::create(&self.lock_path)?;
        lock_file.lock_exclusive()?;

        let result = action();

        // Dropping the handle would also release the flock; unlock explicitly
        // so the release is not tied to drop order.
        let _ = FileExt::unlock(&lock_file);
        result
    }
}
