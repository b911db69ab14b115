//! Output directory management
//!
//! Layout:
//! - `{output}/{report}`: metadata report
//! - `{output}/.covers/`: downloaded cover art
//! - `{output}/{book}/{Title}By{Author}.m4b`: converted book
//! - `{output}/{book}/.scratch/`: per-book temporary files, removed after conversion

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{BookTask, Settings};
use crate::error::ConfigError;

/// Name of the per-book scratch directory
const SCRATCH_DIR_NAME: &str = ".scratch";

/// Create the output directory, or empty it if it already exists
///
/// Runs once, single-threaded, before any book is scanned or converted.
/// Entries that cannot be removed are logged and left in place.
pub fn prepare_output_dir(settings: &Settings) -> Result<PathBuf, ConfigError> {
    settings.validate()?;
    let output_dir = &settings.output_dir;

    let dir_err = |source| ConfigError::OutputDir {
        path: output_dir.clone(),
        source,
    };

    if !output_dir.exists() {
        log::info!("Creating output directory: {}", output_dir.display());
        fs::create_dir_all(output_dir).map_err(dir_err)?;
        return Ok(output_dir.clone());
    }

    log::info!("Clearing output directory: {}", output_dir.display());
    for entry in fs::read_dir(output_dir).map_err(dir_err)?.flatten() {
        let path = entry.path();
        let result = match entry.file_type() {
            Ok(ft) if ft.is_dir() => fs::remove_dir_all(&path),
            _ => fs::remove_file(&path),
        };
        if let Err(e) = result {
            log::error!(
                "  [Error] Failed to delete {}. Reason: {}",
                path.display(),
                e
            );
        }
    }

    Ok(output_dir.clone())
}

/// Output and scratch locations for one book
#[derive(Debug, Clone)]
pub struct BookWorkspace {
    /// `{output}/{book}/`
    pub book_dir: PathBuf,
    /// `{output}/{book}/.scratch/`
    pub scratch_dir: PathBuf,
    /// Final M4B path
    pub output_file: PathBuf,
}

impl BookWorkspace {
    pub fn for_task(settings: &Settings, task: &BookTask) -> Self {
        let book_dir = settings.output_dir.join(&task.display_name);
        Self {
            scratch_dir: book_dir.join(SCRATCH_DIR_NAME),
            output_file: book_dir.join(task.output_file_name()),
            book_dir,
        }
    }

    /// Create the book and scratch directories
    pub async fn create(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.scratch_dir).await
    }

    /// Remove the scratch directory and everything in it
    pub async fn cleanup(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.scratch_dir).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            log::warn!(
                "  [Warning] Failed to clean up {}: {}",
                self.scratch_dir.display(),
                e
            );
        }
    }

    /// Remove a partially written output file
    pub async fn discard_output(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.output_file).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            log::warn!(
                "  [Warning] Failed to remove partial output {}: {}",
                self.output_file.display(),
                e
            );
        }
    }

    pub fn scratch_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.scratch_dir.join(name)
    }
}
