//! Hash-gated atomic writer for the run outputs.
//!
//! ## `atomic_write` protocol
//!
//! 1. Normalise line endings and SHA-256 hash the content.
//! 2. Compare with the stored hash → skip if identical and the file exists.
//! 3. Write to `<path>.roster.tmp`.
//! 4. Rename to the final path (atomic on POSIX).
//! 5. Update the hash entry (caller saves the run state).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};
use crate::state::OutputHashes;

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped: content matches the stored hash.
    Unchanged { path: PathBuf },
    /// `--dry-run` mode: the file *would* have been written.
    WouldWrite { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path }
            | WriteResult::Unchanged { path }
            | WriteResult::WouldWrite { path } => path,
        }
    }
}

/// SHA-256 hex digest of `content` after line-ending normalisation.
pub fn content_hash(content: &str) -> String {
    let normalized = normalize_line_endings(content);
    let mut h = Sha256::new();
    h.update(normalized.as_bytes());
    hex::encode(h.finalize())
}

pub(crate) fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}

/// Atomically write `content` to `path` unless the stored hash says it is
/// already there.
pub fn atomic_write(
    path: &Path,
    content: &str,
    hashes: &mut OutputHashes,
    dry_run: bool,
) -> Result<WriteResult, SyncError> {
    let tmp = PathBuf::from(format!("{}.roster.tmp", path.display()));
    atomic_write_with_tmp(path, content, hashes, dry_run, &tmp)
}

fn atomic_write_with_tmp(
    path: &Path,
    content: &str,
    hashes: &mut OutputHashes,
    dry_run: bool,
    tmp: &Path,
) -> Result<WriteResult, SyncError> {
    let normalized = normalize_line_endings(content);
    let content = normalized.as_str();
    let digest = content_hash(content);

    let key = path.to_string_lossy().to_string();
    if hashes.get(&key) == Some(&digest) && path.exists() {
        tracing::debug!("unchanged: {}", path.display());
        return Ok(WriteResult::Unchanged {
            path: path.to_path_buf(),
        });
    }

    if dry_run {
        tracing::info!("[dry-run] would write: {}", path.display());
        return Ok(WriteResult::WouldWrite {
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    hashes.insert(key, digest);

    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

/// Write every `(path, content)` pair in order.
pub fn write_all(
    outputs: &[(PathBuf, String)],
    hashes: &mut OutputHashes,
    dry_run: bool,
) -> Result<Vec<WriteResult>, SyncError> {
    outputs
        .iter()
        .map(|(path, content)| atomic_write(path, content, hashes, dry_run))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn first_write_then_unchanged() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("public").join("index.html");
        let mut hashes = OutputHashes::new();

        let first = atomic_write(&path, "<html></html>", &mut hashes, false).unwrap();
        assert!(matches!(first, WriteResult::Written { .. }));
        assert!(path.exists(), "parent directories are created");

        let second = atomic_write(&path, "<html></html>", &mut hashes, false).unwrap();
        assert!(matches!(second, WriteResult::Unchanged { .. }));
    }

    #[test]
    fn changed_content_is_rewritten() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("groups.json");
        let mut hashes = OutputHashes::new();
        atomic_write(&path, "v1", &mut hashes, false).unwrap();
        let result = atomic_write(&path, "v2", &mut hashes, false).unwrap();
        assert!(matches!(result, WriteResult::Written { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "v2");
    }

    #[test]
    fn deleted_output_is_restored_despite_matching_hash() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.html");
        let mut hashes = OutputHashes::new();
        atomic_write(&path, "page", &mut hashes, false).unwrap();
        fs::remove_file(&path).unwrap();

        let result = atomic_write(&path, "page", &mut hashes, false).unwrap();
        assert!(matches!(result, WriteResult::Written { .. }));
        assert!(path.exists());
    }

    #[test]
    fn dry_run_does_not_write_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.html");
        let mut hashes = OutputHashes::new();
        let result = atomic_write(&path, "content", &mut hashes, true).unwrap();
        assert!(matches!(result, WriteResult::WouldWrite { .. }));
        assert!(!path.exists(), "dry-run must not create files");
        assert!(hashes.is_empty());
    }

    #[test]
    fn tmp_file_removed_after_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("clean.json");
        let mut hashes = OutputHashes::new();
        atomic_write(&path, "data", &mut hashes, false).unwrap();
        let tmp_path = PathBuf::from(format!("{}.roster.tmp", path.display()));
        assert!(!tmp_path.exists(), ".roster.tmp must be cleaned up");
    }

    #[test]
    fn crlf_and_lf_content_share_the_same_hash() {
        assert_eq!(content_hash("a\r\nb\r\n"), content_hash("a\nb\n"));
    }

    #[test]
    fn rename_failure_leaves_target_and_cleans_tmp() {
        let root = TempDir::new().unwrap();
        // A non-empty directory in the way makes the rename fail.
        let path = root.path().join("index.html");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("keep"), "original").unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp_path = tmp_dir.path().join("index.html.roster.tmp");

        let mut hashes = OutputHashes::new();
        atomic_write_with_tmp(&path, "new", &mut hashes, false, &tmp_path)
            .expect_err("rename onto a directory should fail");

        assert_eq!(fs::read_to_string(path.join("keep")).unwrap(), "original");
        assert!(!tmp_path.exists(), ".roster.tmp should be cleaned up");
        assert!(hashes.is_empty());
    }
}
