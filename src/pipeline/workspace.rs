//! Workspace allocation: one isolated temp directory per run.
//!
//! The source PDF is copied in as `<run_id>.pdf` so the extraction tool sees a
//! predictable name and writes its output to `<root>/<run_id>/`. The run id
//! is a fresh UUID; it doubles as the document's base name for the stable
//! output directory and the registry key.

use crate::error::EnrichError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

/// An isolated per-run directory holding the normalised PDF copy.
///
/// The directory is removed when the `Workspace` is dropped unless
/// [`Workspace::keep`] was called.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    root: PathBuf,
    run_id: String,
    pdf_path: PathBuf,
}

impl Workspace {
    /// Allocate a workspace and copy `source` into it as `<run_id>.pdf`.
    pub async fn create(source: &Path) -> Result<Self, EnrichError> {
        let dir = TempDir::with_prefix("pdf2text-").map_err(|e| EnrichError::Workspace {
            detail: "cannot create temporary directory".into(),
            source: e,
        })?;
        let root = dir.path().to_path_buf();
        let run_id = Uuid::new_v4().simple().to_string();
        let pdf_path = root.join(format!("{run_id}.pdf"));

        tokio::fs::copy(source, &pdf_path)
            .await
            .map_err(|e| EnrichError::Workspace {
                detail: format!("cannot copy '{}' into workspace", source.display()),
                source: e,
            })?;

        debug!("Workspace {} ready at {}", run_id, root.display());
        Ok(Self {
            dir: Some(dir),
            root,
            run_id,
            pdf_path,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Path of the normalised copy, `<root>/<run_id>.pdf`.
    pub fn pdf_path(&self) -> &Path {
        &self.pdf_path
    }

    /// Detach the directory from automatic cleanup.
    pub fn keep(&mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            let _ = dir.keep();
        }
        self.root.clone()
    }
}

/// Validate the source path before any workspace state exists.
pub fn validate_source(source: &Path) -> Result<(), EnrichError> {
    let is_pdf = source
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(EnrichError::UnsupportedInput {
            path: source.to_path_buf(),
        });
    }
    if !source.is_file() {
        return Err(EnrichError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }
    Ok(())
}

/// The source basename up to its first `.` (`report.v2.pdf` → `report`).
pub fn original_file_name(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy())
        .and_then(|n| n.split('.').next().map(str::to_string))
        .unwrap_or_default()
}
