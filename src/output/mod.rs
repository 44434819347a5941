//! Output naming and staged writing

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{TrimError, TrimResult};

pub mod writer;

pub use writer::StagingArea;

/// Extension used when neither the output nor the source carries one
pub const DEFAULT_EXTENSION: &str = "mp4";

/// Next free `<stem>_cut_<N>.<ext>` path next to `source`.
///
/// `N` is one more than the highest number already present in the
/// directory, starting at 1; the extension follows the source file.
pub fn next_output_path(source: &Path) -> TrimResult<PathBuf> {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| {
            TrimError::invalid_selection(format!("{} has no file name", source.display()))
        })?;
    let extension = extension_of(source);
    let dir = parent_dir(source);
    let prefix = format!("{stem}_cut_");
    let suffix = format!(".{extension}");

    let mut highest = 0u64;
    for entry in WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy();
        let number = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&suffix))
            .and_then(|n| n.parse::<u64>().ok());
        if let Some(n) = number {
            highest = highest.max(n);
        }
    }

    let path = dir.join(format!("{prefix}{}{suffix}", highest + 1));
    debug!("Next output path: {}", path.display());
    Ok(path)
}

/// Reject an output path that would overwrite the source
pub fn ensure_distinct_from_source(output: &Path, source: &Path) -> TrimResult<()> {
    let same = match (output.canonicalize(), source.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => output == source,
    };
    if same {
        return Err(TrimError::export_failed(format!(
            "Output {} would overwrite the source file",
            output.display()
        )));
    }
    Ok(())
}

/// Lowercase extension of `path`, or the default container extension
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Directory containing `path`, `.` for bare file names
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
