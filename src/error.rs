//! Error types for the pdf2text library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`EnrichError`] — **Fatal**: the run cannot proceed at all (missing
//!   source file, workspace not creatable, extraction tool failed). It
//!   short-circuits the pipeline and is folded into a
//!   [`crate::output::ConversionResult`] with status `error`.
//!
//! * [`DescriptionError`] — **Non-fatal**: one image could not be described.
//!   The image keeps an empty description and the run carries on.
//!
//! * [`RegistryError`] — the run registry could not be read, locked or
//!   written. Surfaces through [`EnrichError::Registry`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors produced by a conversion run.
#[derive(Debug, Error)]
pub enum EnrichError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    /// Source file does not carry a `.pdf` extension.
    #[error("Only PDF files are allowed (got '{path}')")]
    UnsupportedInput { path: PathBuf },

    // ── Workspace errors ──────────────────────────────────────────────────
    /// The isolated workspace could not be created or populated.
    #[error("Failed to prepare workspace: {detail}")]
    Workspace {
        detail: String,
        #[source]
        source: std::io::Error,
    },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The extraction program could not be spawned at all.
    #[error("Failed to launch extraction tool '{program}': {source}\nIs it installed and on PATH?")]
    ExtractorNotFound {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The extraction tool ran and reported failure.
    ///
    /// Displays the tool's diagnostic output verbatim.
    #[error("{diagnostics}")]
    Extraction { diagnostics: String },

    /// The extraction tool did not finish within the configured timeout.
    #[error("Extraction tool timed out after {secs}s")]
    ExtractionTimeout { secs: u64 },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not write a file under the stable output directory.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The run registry could not be updated.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    // ── Provider / config errors ──────────────────────────────────────────
    /// A provider was requested by name but could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image.
///
/// Logged and recorded in the run statistics; the image itself receives an
/// empty description.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DescriptionError {
    /// The description service returned an error after all retries.
    #[error("{image}: description service failed after {retries} retries: {detail}")]
    ServiceFailed {
        image: String,
        retries: u32,
        detail: String,
    },

    /// A single description call exceeded the configured timeout.
    #[error("{image}: description call timed out after {secs}s")]
    Timeout { image: String, secs: u64 },

    /// The image bytes could not be read from disk.
    #[error("{image}: failed to read image: {detail}")]
    ReadFailed { image: String, detail: String },
}

impl DescriptionError {
    /// Name of the image this error belongs to.
    pub fn image(&self) -> &str {
        match self {
            DescriptionError::ServiceFailed { image, .. }
            | DescriptionError::Timeout { image, .. }
            | DescriptionError::ReadFailed { image, .. } => image,
        }
    }
}

/// Errors raised by a [`crate::pipeline::registry::RegistryStore`].
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store exists but is not a JSON object of strings.
    #[error("Registry '{path}' is not a valid string map: {source}\nFix or remove the file; it is never overwritten while unreadable.")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Timed out after {secs}s waiting for registry lock '{path}'")]
    LockTimeout { path: PathBuf, secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_error_is_verbatim() {
        let e = EnrichError::Extraction {
            diagnostics: "invalid PDF".into(),
        };
        assert_eq!(e.to_string(), "invalid PDF");
    }

    #[test]
    fn unsupported_input_display() {
        let e = EnrichError::UnsupportedInput {
            path: PathBuf::from("notes.txt"),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("Only PDF files are allowed"), "got: {msg}");
        assert!(msg.contains("notes.txt"));
    }

    #[test]
    fn registry_error_is_transparent() {
        let e: EnrichError = RegistryError::LockTimeout {
            path: PathBuf::from("files_dict.json.lock"),
            secs: 10,
        }
        .into();
        assert!(e.to_string().contains("files_dict.json.lock"));
        assert!(e.to_string().contains("10s"));
    }

    #[test]
    fn description_error_names_image() {
        let e = DescriptionError::Timeout {
            image: "_page_1_Figure_0.png".into(),
            secs: 30,
        };
        assert_eq!(e.image(), "_page_1_Figure_0.png");
        assert!(e.to_string().contains("30s"));
    }
}
