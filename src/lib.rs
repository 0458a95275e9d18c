//! # pdf2text
//!
//! Convert a PDF into enriched Markdown: a structure-extraction tool
//! (`marker_single` by default) produces the text and embedded images, a
//! vision language model describes the images worth describing, and the
//! descriptions are spliced back into the text where each image is
//! referenced.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Workspace  isolated temp dir, source copied as <run_id>.pdf
//!  ├─ 2. Extract    external tool → <run_id>.md + raster images
//!  ├─ 3. Images     sizes recorded, copied to pdf_to_text/<run_id>/images/
//!  ├─ 4. Describe   VLM call per image > 20 000 bytes (failures → empty)
//!  ├─ 5. Enrich     ![x](x) → ![x](images/x)<image_description>…</image_description>
//!  └─ 6. Persist    <run_id>.md + <run_id>.pdf, registry run_id → original name
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2text::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Description service auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ConversionConfig::default();
//!     let result = convert("document.pdf", "", &config).await;
//!     println!("{:?}: {}", result.status, result.preview_text);
//! }
//! ```
//!
//! ## Concurrency
//!
//! A run is sequential by default. The registry file is shared between runs
//! and is updated under a lock file, so concurrent runs against the same
//! registry do not lose entries.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2text` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert, convert_sync, try_convert};
pub use error::{DescriptionError, EnrichError, RegistryError};
pub use output::{
    ConversionResult, ConversionStats, ConversionStatus, EnrichedDocument, ExtractedImage,
};
pub use pipeline::describe::{Describer, Description, ImagePayload, LlmDescriber};
pub use pipeline::extract::{ExtractionOutcome, Extractor, MarkerExtractor};
pub use pipeline::registry::{JsonFileRegistry, MemoryRegistry, Registry, RegistryStore};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
