//! Conversion entry points: run the whole pipeline for one PDF.
//!
//! [`convert`] is the invocation surface: it always returns a
//! [`ConversionResult`], folding fatal errors into an `error`-status value.
//! [`try_convert`] runs the same pipeline but hands fatal errors back as
//! `Err` for callers that want to match on [`EnrichError`].

use crate::config::ConversionConfig;
use crate::error::EnrichError;
use crate::output::{ConversionResult, ConversionStats, ConversionStatus, ExtractedImage};
use crate::pipeline::describe::{self, resolve_describer};
use crate::pipeline::enrich::{self, IMAGE_DIR};
use crate::pipeline::extract::{Extractor, MarkerExtractor};
use crate::pipeline::images;
use crate::pipeline::persist;
use crate::pipeline::registry::{JsonFileRegistry, RegistryStore};
use crate::pipeline::workspace::{self, Workspace};
use crate::prompts::effective_prompt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Message carried by a `no_output_found` result.
pub const NO_OUTPUT_MESSAGE: &str = "No .md file found in the output directory.";

/// Convert one PDF into enriched Markdown.
///
/// # Arguments
/// * `source` — path to a local `.pdf` file
/// * `prompt` — instruction sent with each image; empty means
///   [`crate::prompts::DEFAULT_IMAGE_PROMPT`]
/// * `config` — run configuration
///
/// Never fails: fatal errors come back as a result with
/// [`ConversionStatus::Error`] and the error text as `message`.
pub async fn convert(
    source: impl AsRef<Path>,
    prompt: &str,
    config: &ConversionConfig,
) -> ConversionResult {
    let source = source.as_ref();
    match try_convert(source, prompt, config).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Conversion of {} failed: {}", source.display(), e);
            ConversionResult::from_error(&e, workspace::original_file_name(source))
        }
    }
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    source: impl AsRef<Path>,
    prompt: &str,
    config: &ConversionConfig,
) -> ConversionResult {
    let source = source.as_ref();
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(convert(source, prompt, config)),
        Err(e) => ConversionResult::from_error(
            &EnrichError::Internal(format!("Failed to create tokio runtime: {e}")),
            workspace::original_file_name(source),
        ),
    }
}

/// Run the pipeline, returning fatal errors as `Err`.
///
/// `Ok` covers both `converted` and `no_output_found` outcomes.
pub async fn try_convert(
    source: impl AsRef<Path>,
    prompt: &str,
    config: &ConversionConfig,
) -> Result<ConversionResult, EnrichError> {
    let total_start = Instant::now();
    let source = source.as_ref();
    info!("Starting conversion: {}", source.display());

    // ── Step 1: Validate input, resolve collaborators ────────────────────
    workspace::validate_source(source)?;
    let original_name = workspace::original_file_name(source);
    let prompt = effective_prompt(prompt);
    let describer = resolve_describer(config)?;
    let extractor = resolve_extractor(config);
    let registry = resolve_registry(config);
    let progress = config.progress_callback.as_ref();

    // ── Step 2: Workspace ────────────────────────────────────────────────
    let mut ws = Workspace::create(source).await?;
    if config.keep_workspace {
        info!("Keeping workspace at {}", ws.keep().display());
    }
    let base = ws.run_id().to_string();

    // ── Step 3: Extraction ───────────────────────────────────────────────
    if let Some(cb) = progress {
        cb.on_extraction_start(&original_name);
    }
    let extract_start = Instant::now();
    let outcome = extractor.extract(ws.pdf_path(), ws.root()).await?;
    let extraction_duration_ms = extract_start.elapsed().as_millis() as u64;
    if !outcome.diagnostics.trim().is_empty() {
        debug!("Extractor output: {}", outcome.diagnostics.trim_end());
    }
    info!("Extraction finished in {}ms", extraction_duration_ms);

    let Some(text_path) = outcome.text_path.as_deref() else {
        info!("{}", NO_OUTPUT_MESSAGE);
        return Ok(ConversionResult {
            status: ConversionStatus::NoOutputFound,
            message: NO_OUTPUT_MESSAGE.to_string(),
            preview_text: String::new(),
            output_path: None,
            original_file_name: original_name,
            run_id: Some(base),
            stats: ConversionStats {
                extraction_duration_ms,
                total_duration_ms: total_start.elapsed().as_millis() as u64,
                ..Default::default()
            },
        });
    };
    let raw_text = tokio::fs::read_to_string(text_path)
        .await
        .map_err(|e| EnrichError::Workspace {
            detail: format!("cannot read extracted text '{}'", text_path.display()),
            source: e,
        })?;

    // ── Step 4: Collect and classify images ──────────────────────────────
    let mut collected = images::collect_images(&outcome.document_dir).await?;
    if let Some(cb) = progress {
        cb.on_extraction_complete(collected.len());
    }
    let output_dir = config.output_root.join(&base);
    images::copy_images(&collected, &output_dir.join(IMAGE_DIR)).await?;

    // ── Step 5: Describe eligible images ─────────────────────────────────
    let describe_start = Instant::now();
    let summary =
        describe::describe_images(&mut collected, describer.as_deref(), prompt, config).await;
    let description_duration_ms = describe_start.elapsed().as_millis() as u64;

    // ── Step 6: Enrich text ──────────────────────────────────────────────
    let extracted: Vec<ExtractedImage> = collected.into_iter().map(|c| c.image).collect();
    let document = enrich::enrich_text(&raw_text, &extracted);

    // ── Step 7: Persist outputs and registry ─────────────────────────────
    persist::write_outputs(&output_dir, &base, &document.enriched_text, ws.pdf_path()).await?;
    if describer.is_some() && config.write_image_index {
        persist::write_image_index(&output_dir, &extracted).await?;
    }
    persist::record_run(registry, &base, &original_name).await?;

    let preview_text = persist::truncate_preview(&document.enriched_text, config.preview_char_limit);

    let stats = ConversionStats {
        images_found: extracted.len(),
        images_described: summary.described,
        images_skipped: summary.skipped,
        images_failed: summary.failed,
        description_errors: summary.errors,
        extraction_duration_ms,
        description_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    if let Some(cb) = progress {
        cb.on_conversion_complete(stats.images_described, stats.images_failed);
    }
    info!(
        "Done processing. Output saved to {} ({} images, {} described, {}ms)",
        output_dir.display(),
        stats.images_found,
        stats.images_described,
        stats.total_duration_ms
    );

    Ok(ConversionResult {
        status: ConversionStatus::Converted,
        message: "converted".to_string(),
        preview_text,
        output_path: Some(output_dir),
        original_file_name: original_name,
        run_id: Some(base),
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn resolve_extractor(config: &ConversionConfig) -> Arc<dyn Extractor> {
    if let Some(ref extractor) = config.extractor {
        return Arc::clone(extractor);
    }
    Arc::new(
        MarkerExtractor::new(config.extractor_program.clone())
            .with_args(config.extractor_args.clone())
            .with_timeout(config.extraction_timeout_secs.map(Duration::from_secs)),
    )
}

fn resolve_registry(config: &ConversionConfig) -> Arc<dyn RegistryStore> {
    match config.registry {
        Some(ref registry) => Arc::clone(registry),
        None => Arc::new(JsonFileRegistry::new(config.registry_path.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_pdf_is_error_result() {
        let config = ConversionConfig::builder()
            .auto_detect_provider(false)
            .build()
            .unwrap();
        let result = convert("notes.txt", "", &config).await;
        assert_eq!(result.status, ConversionStatus::Error);
        assert!(result.message.starts_with("Only PDF files are allowed"));
        assert_eq!(result.original_file_name, "notes");
    }

    #[tokio::test]
    async fn missing_pdf_is_error_result() {
        let config = ConversionConfig::builder()
            .auto_detect_provider(false)
            .build()
            .unwrap();
        let err = try_convert("/definitely/missing.pdf", "", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::SourceNotFound { .. }));
    }
}
