//! Result and intermediate data types produced by a conversion run.

use crate::error::{DescriptionError, EnrichError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome class of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    /// Enriched text and source copy were written, registry updated.
    Converted,
    /// Extraction succeeded but produced no text artifact. Nothing was written.
    NoOutputFound,
    /// A fatal error aborted the run. See [`ConversionResult::message`].
    Error,
}

/// The structured value every run returns, success or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub status: ConversionStatus,
    /// "converted", a no-output explanation, or the fatal error text.
    pub message: String,
    /// Enriched text truncated to the preview limit, `...`-suffixed if cut.
    pub preview_text: String,
    /// Per-document output directory (`<output_root>/<run_id>`).
    pub output_path: Option<PathBuf>,
    /// Source basename up to its first `.`; empty if the run failed before
    /// the source was inspected.
    pub original_file_name: String,
    /// Generated identifier of this run; also the registry key.
    pub run_id: Option<String>,
    pub stats: ConversionStats,
}

impl ConversionResult {
    /// Fold a fatal error into an `error`-status result.
    pub fn from_error(err: &EnrichError, original_file_name: impl Into<String>) -> Self {
        Self {
            status: ConversionStatus::Error,
            message: err.to_string(),
            preview_text: String::new(),
            output_path: None,
            original_file_name: original_file_name.into(),
            run_id: None,
            stats: ConversionStats::default(),
        }
    }

    pub fn is_converted(&self) -> bool {
        self.status == ConversionStatus::Converted
    }
}

/// Per-run counters and timings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Raster images found in the extraction output.
    pub images_found: usize,
    /// Images that received a non-empty description.
    pub images_described: usize,
    /// Images never sent to the service (at/below threshold, or no service).
    pub images_skipped: usize,
    /// Eligible images whose description failed and degraded to empty.
    pub images_failed: usize,
    /// Per-image failures, in filename order.
    pub description_errors: Vec<DescriptionError>,
    pub extraction_duration_ms: u64,
    pub description_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// A raster image produced by the extraction tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedImage {
    /// Basename as referenced in the extracted text.
    pub file_name: String,
    pub byte_size: u64,
    /// Empty when not eligible, when no service is configured, or when the
    /// service call failed.
    pub description: String,
}

impl ExtractedImage {
    pub fn new(file_name: impl Into<String>, byte_size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            byte_size,
            description: String::new(),
        }
    }
}

/// Extracted text before and after image-reference splicing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedDocument {
    pub raw_text: String,
    pub enriched_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serialises_snake_case() {
        let json = serde_json::to_string(&ConversionStatus::NoOutputFound).unwrap();
        assert_eq!(json, "\"no_output_found\"");
    }

    #[test]
    fn from_error_carries_message() {
        let err = EnrichError::Extraction {
            diagnostics: "invalid PDF".into(),
        };
        let result = ConversionResult::from_error(&err, "report");
        assert_eq!(result.status, ConversionStatus::Error);
        assert_eq!(result.message, "invalid PDF");
        assert_eq!(result.original_file_name, "report");
        assert!(result.output_path.is_none());
        assert!(!result.is_converted());
    }
}
