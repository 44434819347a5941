//! Staged output writing
//!
//! Intermediate files live in a hidden directory beside the final output so
//! the finished file can be moved into place with a same-filesystem rename.
//! Dropping the staging area removes everything it still holds.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{TrimError, TrimResult};
use crate::output::{extension_of, parent_dir};

/// Scratch directory for one export
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    extension: String,
}

impl StagingArea {
    /// Create the staging directory next to `output`.
    ///
    /// `fallback_extension` is used when `output` has none, so the tools can
    /// still infer the container.
    pub fn beside(output: &Path, fallback_extension: &str) -> TrimResult<Self> {
        let parent = parent_dir(output);
        let dir = tempfile::Builder::new()
            .prefix(".trimcut-")
            .tempdir_in(&parent)
            .map_err(|e| {
                TrimError::export_failed(format!(
                    "Cannot create staging directory in {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        let extension = match output.extension() {
            Some(_) => extension_of(output),
            None => fallback_extension.to_string(),
        };
        debug!("Staging export in {}", dir.path().display());
        Ok(Self { dir, extension })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for the intermediate file of segment `index`
    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.dir
            .path()
            .join(format!("segment_{index:03}.{}", self.extension))
    }

    /// Path the finished output is assembled at before promotion
    pub fn assembled_path(&self) -> PathBuf {
        self.dir.path().join(format!("output.{}", self.extension))
    }

    /// Move `finished` onto `destination` and discard the staging directory
    pub fn promote(self, finished: &Path, destination: &Path) -> TrimResult<()> {
        ensure_non_empty(finished)?;
        fs::rename(finished, destination).map_err(|e| {
            TrimError::export_failed(format!(
                "Failed to move output into place at {}: {}",
                destination.display(),
                e
            ))
        })?;
        let location = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove staging directory {}: {}", location.display(), e);
        }
        Ok(())
    }
}

/// A tool reporting success must still have produced a non-empty file
pub fn ensure_non_empty(path: &Path) -> TrimResult<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(TrimError::export_failed(format!(
            "{} is empty",
            path.display()
        ))),
        Err(e) => Err(TrimError::export_failed(format!(
            "{} was not produced: {}",
            path.display(),
            e
        ))),
    }
}
