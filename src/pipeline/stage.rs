//! Staging: write an upload to a uniquely named temporary file.
//!
//! The OCR service takes a file upload, so each PDF is written to disk for
//! the duration of its own pipeline run. Names combine a millisecond
//! timestamp, a random component from [`tempfile`], and the sanitised
//! original name, so concurrent requests never collide.
//!
//! The file is owned by a [`StagedDocument`]; it is deleted by
//! [`StagedDocument::cleanup`] on the normal path and by `Drop` on every
//! other path (early `?` return, panic, or the future being cancelled).

use crate::error::FileError;
use crate::model::UploadedFile;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempPath;
use tracing::{debug, warn};

const MAX_NAME_LEN: usize = 96;

/// An upload staged on disk. Deleted when dropped.
#[derive(Debug)]
pub struct StagedDocument {
    file_name: String,
    path: TempPath,
}

impl StagedDocument {
    /// Path of the staged copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Original upload name, used as the multipart file name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Delete the staged copy, logging rather than failing if it is already gone.
    pub fn cleanup(self) {
        let path = self.path.to_path_buf();
        match self.path.close() {
            Ok(()) => debug!("Removed staged file {}", path.display()),
            Err(e) => warn!("Failed to remove staged file {}: {}", path.display(), e),
        }
    }
}

/// Write `file` into `dir` under a unique name.
pub fn stage_document(dir: &Path, file: &UploadedFile) -> Result<StagedDocument, FileError> {
    let staging_err = |path: PathBuf, e: std::io::Error| FileError::Staging {
        path,
        detail: e.to_string(),
    };

    std::fs::create_dir_all(dir).map_err(|e| staging_err(dir.to_path_buf(), e))?;

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!("{millis}_"))
        .suffix(&format!("_{}", sanitise_file_name(&file.file_name)))
        .tempfile_in(dir)
        .map_err(|e| staging_err(dir.to_path_buf(), e))?;

    // On a failed write `tmp` is dropped here, which removes the partial file.
    tmp.write_all(&file.bytes)
        .and_then(|()| tmp.flush())
        .map_err(|e| staging_err(tmp.path().to_path_buf(), e))?;

    let path = tmp.into_temp_path();
    debug!(
        "Staged '{}' ({} bytes) at {}",
        file.file_name,
        file.bytes.len(),
        path.display()
    );

    Ok(StagedDocument {
        file_name: file.file_name.clone(),
        path,
    })
}

/// Reduce an upload name to a safe, single path component.
fn sanitise_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return "upload.pdf".to_string();
    }
    match cleaned.char_indices().nth(MAX_NAME_LEN) {
        Some((cut, _)) => cleaned[..cut].to_string(),
        None => cleaned.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_writes_bytes_and_cleanup_removes() {
        let dir = TempDir::new().unwrap();
        let file = UploadedFile::pdf("paper.pdf", b"%PDF-1.7 body".to_vec());

        let staged = stage_document(dir.path(), &file).unwrap();
        let path = staged.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7 body");
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_paper.pdf"));
        assert_eq!(staged.file_name(), "paper.pdf");

        staged.cleanup();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_staged_file() {
        let dir = TempDir::new().unwrap();
        let file = UploadedFile::pdf("paper.pdf", b"%PDF".to_vec());
        let path = {
            let staged = stage_document(dir.path(), &file).unwrap();
            staged.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_same_name_twice_does_not_collide() {
        let dir = TempDir::new().unwrap();
        let file = UploadedFile::pdf("paper.pdf", b"%PDF".to_vec());
        let a = stage_document(dir.path(), &file).unwrap();
        let b = stage_document(dir.path(), &file).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_creates_missing_staging_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("uploads_temp");
        let file = UploadedFile::pdf("a.pdf", b"%PDF".to_vec());
        let staged = stage_document(&nested, &file).unwrap();
        assert!(staged.path().starts_with(&nested));
    }

    #[test]
    fn test_staging_into_a_file_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();
        let err = stage_document(&blocker, &UploadedFile::pdf("a.pdf", b"%PDF".to_vec()))
            .unwrap_err();
        assert!(matches!(err, FileError::Staging { .. }), "got: {err:?}");
    }

    #[test]
    fn test_sanitise_file_name() {
        assert_eq!(sanitise_file_name("paper.pdf"), "paper.pdf");
        assert_eq!(sanitise_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitise_file_name("C:\\exams\\mid term.pdf"), "mid_term.pdf");
        assert_eq!(sanitise_file_name(".hidden"), "hidden");
        assert_eq!(sanitise_file_name(""), "upload.pdf");
        assert_eq!(sanitise_file_name(&"a".repeat(300)).len(), MAX_NAME_LEN);
    }
}
