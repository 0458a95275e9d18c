//! Extraction: run the external structure-extraction tool on the workspace.
//!
//! The tool contract is `<tool> <pdf> <out_dir>`; on success it leaves
//! `<out_dir>/<base>/<base>.md` plus zero or more raster images beside it.
//! Failures are never retried: a tool that rejects a PDF will reject it
//! again, so its diagnostics are surfaced verbatim instead.

use crate::error::EnrichError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// What the extraction tool left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutcome {
    /// `<out_dir>/<base>/`, where images are looked for.
    pub document_dir: PathBuf,
    /// `<document_dir>/<base>.md` if the tool produced it.
    pub text_path: Option<PathBuf>,
    /// Whatever the tool printed on stderr, kept for logging.
    pub diagnostics: String,
}

impl ExtractionOutcome {
    /// Locate the tool's output for `pdf_path` under `out_dir`.
    pub fn locate(pdf_path: &Path, out_dir: &Path, diagnostics: impl Into<String>) -> Self {
        let base = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let document_dir = out_dir.join(&base);
        let candidate = document_dir.join(format!("{base}.md"));
        let text_path = candidate.is_file().then_some(candidate);
        Self {
            document_dir,
            text_path,
            diagnostics: diagnostics.into(),
        }
    }
}

/// A document-structure extraction backend.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract `pdf_path` into `out_dir`, blocking until the backend is done.
    ///
    /// Returns [`EnrichError::Extraction`] when the backend reports failure.
    async fn extract(&self, pdf_path: &Path, out_dir: &Path)
        -> Result<ExtractionOutcome, EnrichError>;
}

/// Runs a command-line extraction tool (`marker_single` by default).
#[derive(Debug, Clone)]
pub struct MarkerExtractor {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl MarkerExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Arguments placed before the PDF and output paths.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Extractor for MarkerExtractor {
    async fn extract(
        &self,
        pdf_path: &Path,
        out_dir: &Path,
    ) -> Result<ExtractionOutcome, EnrichError> {
        info!("Running {} on {}", self.program, pdf_path.display());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(pdf_path)
            .arg(out_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let run = cmd.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                EnrichError::ExtractionTimeout {
                    secs: limit.as_secs(),
                }
            })?,
            None => run.await,
        }
        .map_err(|e| EnrichError::ExtractorNotFound {
            program: self.program.clone(),
            source: e,
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(EnrichError::Extraction {
                diagnostics: failure_diagnostics(&stderr, &output.stdout, output.status),
            });
        }

        debug!("{} exited cleanly", self.program);
        Ok(ExtractionOutcome::locate(pdf_path, out_dir, stderr))
    }
}

/// Pick the most useful text to surface for a failed run: stderr, then
/// stdout, then the bare exit status.
fn failure_diagnostics(stderr: &str, stdout: &[u8], status: std::process::ExitStatus) -> String {
    let stderr = stderr.trim_end();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = String::from_utf8_lossy(stdout);
    let stdout = stdout.trim_end();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    format!("extraction tool exited with {status}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn locate_finds_markdown() {
        let out = TempDir::new().unwrap();
        let doc = out.path().join("abc");
        std::fs::create_dir_all(&doc).unwrap();
        std::fs::write(doc.join("abc.md"), "# hi").unwrap();

        let outcome = ExtractionOutcome::locate(Path::new("/ws/abc.pdf"), out.path(), "");
        assert_eq!(outcome.document_dir, doc);
        assert_eq!(outcome.text_path, Some(doc.join("abc.md")));
    }

    #[test]
    fn locate_without_markdown() {
        let out = TempDir::new().unwrap();
        let outcome = ExtractionOutcome::locate(Path::new("/ws/abc.pdf"), out.path(), "warn");
        assert!(outcome.text_path.is_none());
        assert_eq!(outcome.diagnostics, "warn");
    }

    #[tokio::test]
    async fn missing_program_is_not_found() {
        let out = TempDir::new().unwrap();
        let ex = MarkerExtractor::new("definitely-not-a-real-extractor-binary");
        let err = ex
            .extract(&out.path().join("x.pdf"), out.path())
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::ExtractorNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_surfaces_stderr_verbatim() {
        let out = TempDir::new().unwrap();
        let ex = MarkerExtractor::new("sh").with_args(vec![
            "-c".into(),
            "echo 'invalid PDF' >&2; exit 1".into(),
            "extract".into(),
        ]);
        let err = ex
            .extract(&out.path().join("x.pdf"), out.path())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid PDF");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_failure_reports_status() {
        let out = TempDir::new().unwrap();
        let ex = MarkerExtractor::new("sh").with_args(vec![
            "-c".into(),
            "exit 3".into(),
            "extract".into(),
        ]);
        let err = ex
            .extract(&out.path().join("x.pdf"), out.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with"), "got: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_tool() {
        let out = TempDir::new().unwrap();
        let ex = MarkerExtractor::new("sh")
            .with_args(vec!["-c".into(), "sleep 5".into(), "extract".into()])
            .with_timeout(Some(Duration::from_millis(100)));
        let err = ex
            .extract(&out.path().join("x.pdf"), out.path())
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::ExtractionTimeout { .. }));
    }
}
