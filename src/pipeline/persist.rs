//! Persistence: write the enriched artifact set and record the run.
//!
//! Layout under the output root, keyed by the run id (`<base>`):
//!
//! ```text
//! <output_root>/<base>/
//!   <base>.md          enriched text
//!   <base>.pdf         copy of the source
//!   image_dict.json    image → description (when a service was used)
//!   images/            raster copies referenced by <base>.md
//! ```
//!
//! Re-running with the same base name overwrites these files in place.

use crate::error::EnrichError;
use crate::output::ExtractedImage;
use crate::pipeline::registry::{Registry, RegistryStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Suffix appended to a truncated preview.
pub const ELLIPSIS: &str = "...";

/// Name of the per-document description index.
pub const IMAGE_INDEX_FILE: &str = "image_dict.json";

/// First `limit` characters of `text`, plus [`ELLIPSIS`] if anything was cut.
pub fn truncate_preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], ELLIPSIS),
        None => text.to_string(),
    }
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> EnrichError + '_ {
    move |e| EnrichError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    }
}

/// Write `<output_dir>/<base>.md` atomically and copy the source PDF beside it.
///
/// Returns the path of the written text artifact.
pub async fn write_outputs(
    output_dir: &Path,
    base: &str,
    enriched_text: &str,
    pdf_path: &Path,
) -> Result<PathBuf, EnrichError> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(write_err(output_dir))?;

    // Atomic write: write to temp, then rename
    let md_path = output_dir.join(format!("{base}.md"));
    let tmp_path = md_path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, enriched_text)
        .await
        .map_err(write_err(&md_path))?;
    tokio::fs::rename(&tmp_path, &md_path)
        .await
        .map_err(write_err(&md_path))?;

    let pdf_dest = output_dir.join(format!("{base}.pdf"));
    tokio::fs::copy(pdf_path, &pdf_dest)
        .await
        .map_err(write_err(&pdf_dest))?;

    debug!("Wrote {} and {}", md_path.display(), pdf_dest.display());
    Ok(md_path)
}

/// Write the `file name → description` map as pretty JSON.
pub async fn write_image_index(
    output_dir: &Path,
    images: &[ExtractedImage],
) -> Result<PathBuf, EnrichError> {
    let index: BTreeMap<&str, &str> = images
        .iter()
        .map(|i| (i.file_name.as_str(), i.description.as_str()))
        .collect();
    let json = serde_json::to_string_pretty(&index)
        .map_err(|e| EnrichError::Internal(format!("image index serialisation: {e}")))?;

    let path = output_dir.join(IMAGE_INDEX_FILE);
    tokio::fs::write(&path, json).await.map_err(write_err(&path))?;
    Ok(path)
}

/// Record `key → original_name` in the registry off the async executor.
pub async fn record_run(
    store: Arc<dyn RegistryStore>,
    key: &str,
    original_name: &str,
) -> Result<Registry, EnrichError> {
    let (k, v) = (key.to_string(), original_name.to_string());
    let registry = tokio::task::spawn_blocking(move || store.update(&k, &v))
        .await
        .map_err(|e| EnrichError::Internal(format!("Registry task panicked: {e}")))??;
    info!("Registry now holds {} runs", registry.len());
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::registry::MemoryRegistry;
    use tempfile::TempDir;

    #[test]
    fn short_text_untouched() {
        assert_eq!(truncate_preview("hello", 10), "hello");
        assert_eq!(truncate_preview("hello", 5), "hello");
    }

    #[test]
    fn long_text_truncated_with_ellipsis() {
        let text = "a".repeat(2_500);
        let preview = truncate_preview(&text, 2_000);
        assert_eq!(preview.chars().count(), 2_003);
        assert!(preview.ends_with(ELLIPSIS));
        assert!(text.starts_with(preview.trim_end_matches(ELLIPSIS)));
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let text = "é".repeat(10);
        assert_eq!(truncate_preview(&text, 4), "éééé...");
    }

    #[tokio::test]
    async fn outputs_written_and_overwritten() {
        let root = TempDir::new().unwrap();
        let pdf = root.path().join("src.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        let out = root.path().join("pdf_to_text").join("abc");

        let md = write_outputs(&out, "abc", "first", &pdf).await.unwrap();
        assert_eq!(md, out.join("abc.md"));
        write_outputs(&out, "abc", "second", &pdf).await.unwrap();

        assert_eq!(std::fs::read_to_string(out.join("abc.md")).unwrap(), "second");
        assert_eq!(std::fs::read(out.join("abc.pdf")).unwrap(), b"%PDF");
        assert!(!out.join("abc.md.tmp").exists());
    }

    #[tokio::test]
    async fn image_index_contents() {
        let out = TempDir::new().unwrap();
        let images = vec![
            ExtractedImage {
                file_name: "a.png".into(),
                byte_size: 30_000,
                description: "chart".into(),
            },
            ExtractedImage::new("b.png", 10),
        ];
        let path = write_image_index(out.path(), &images).await.unwrap();
        let parsed: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed["a.png"], "chart");
        assert_eq!(parsed["b.png"], "");
    }

    #[tokio::test]
    async fn record_run_updates_store() {
        let store = Arc::new(MemoryRegistry::new());
        record_run(store.clone(), "run1", "report").await.unwrap();
        assert_eq!(store.load().unwrap()["run1"], "report");
    }
}
