//! Unified diff of rendered outputs against what is on disk, for `roster diff`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use crate::error::{io_err, SyncError};
use crate::writer::normalize_line_endings;

/// A single output file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: PathBuf,
    pub unified_diff: String,
}

/// Compare each `(path, rendered)` pair with the current file content.
///
/// Files that would not change are omitted. Headers are relative to `base`.
/// No files are written.
pub fn diff_outputs(
    outputs: &[(PathBuf, String)],
    base: &Path,
) -> Result<Vec<FileDiff>, SyncError> {
    let mut diffs = Vec::new();
    for (path, rendered) in outputs {
        let rendered = normalize_line_endings(rendered);
        let existing = read_existing_or_empty(path)?;
        if existing == rendered {
            continue;
        }

        let relative = path.strip_prefix(base).unwrap_or(path.as_path());
        let old_header = format!("a/{}", relative.display());
        let new_header = format!("b/{}", relative.display());
        let unified = TextDiff::from_lines(&existing, &rendered)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string();

        diffs.push(FileDiff {
            path: path.clone(),
            unified_diff: unified,
        });
    }
    Ok(diffs)
}

fn read_existing_or_empty(path: &Path) -> Result<String, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(normalize_line_endings(&content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(io_err(path, err)),
    }
}
