//! Upload materializer.
//!
//! Streams an uploaded file to a destination keyed by employee id and
//! session id, under a timestamp-prefixed, sanitized file name. Bytes land
//! in a `.part` file first and are renamed into place only after a
//! successful fsync, so a failed write never leaves a registrable file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::StoreResult;

const FALLBACK_NAME: &str = "upload";

/// Root directory for materialized uploads:
/// `{root}/{employee_id}/{session_id}/{timestamp}_{name}`.
#[derive(Debug)]
pub struct UploadStore {
    root: PathBuf,
}

/// Where an upload landed and how big it was.
#[derive(Debug, Clone)]
pub struct SavedUpload {
    pub path: PathBuf,
    pub file_size_bytes: u64,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` under the session's upload directory and returns the
    /// final path. A partial file from a failed write is removed.
    pub fn materialize(
        &self,
        employee_id: &str,
        session_id: &str,
        original_filename: &str,
        bytes: &[u8],
    ) -> StoreResult<SavedUpload> {
        let dir = self
            .root
            .join(sanitize_component(employee_id))
            .join(sanitize_component(session_id));
        std::fs::create_dir_all(&dir)?;

        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let name = format!("{stamp}_{}", sanitize_filename(original_filename));
        let final_path = dir.join(&name);
        let part_path = dir.join(format!("{name}.part"));

        if let Err(err) = write_fully(&part_path, bytes) {
            let _ = std::fs::remove_file(&part_path);
            return Err(err.into());
        }
        std::fs::rename(&part_path, &final_path)?;

        Ok(SavedUpload {
            path: final_path,
            file_size_bytes: bytes.len() as u64,
        })
    }
}

fn write_fully(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Filesystem-safe form of a client-supplied file name: last path component
/// only, whitelisted characters, never empty.
pub fn sanitize_filename(raw: &str) -> String {
    let last = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw);
    let cleaned: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Same whitelist for path components built from ids.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        .collect();
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\x\\r\u{e9}sum\u{e9}.pdf"), "rsum.pdf");
        assert_eq!(sanitize_filename("report (final).xlsx"), "reportfinal.xlsx");
    }

    #[test]
    fn sanitize_never_returns_empty() {
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("///"), "upload");
        assert_eq!(sanitize_filename("...."), "upload");
    }

    #[test]
    fn materialize_writes_bytes_under_session_dir() {
        let dir = TempDir::new().unwrap();
        let uploads = UploadStore::new(dir.path());
        let saved = uploads
            .materialize("E1", "sess-1", "evidence.png", b"png-bytes")
            .unwrap();

        assert_eq!(saved.file_size_bytes, 9);
        assert!(saved.path.starts_with(dir.path().join("E1").join("sess-1")));
        assert!(saved
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_evidence.png"));
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"png-bytes");
    }

    #[test]
    fn hostile_ids_cannot_escape_the_root() {
        let dir = TempDir::new().unwrap();
        let uploads = UploadStore::new(dir.path());
        let saved = uploads
            .materialize("../../evil", "..", "f.txt", b"x")
            .unwrap();
        assert!(saved.path.starts_with(dir.path()));
    }

    #[test]
    fn no_part_file_remains_after_success() {
        let dir = TempDir::new().unwrap();
        let uploads = UploadStore::new(dir.path());
        let saved = uploads.materialize("E1", "S1", "a.bin", b"abc").unwrap();
        let siblings: Vec<_> = std::fs::read_dir(saved.path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(siblings.len(), 1);
    }
}
