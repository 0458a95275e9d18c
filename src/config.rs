//! Configuration types for a PDF conversion-and-enrichment run.
//!
//! All run behaviour is controlled through [`ConversionConfig`], built via
//! its [`ConversionConfigBuilder`]. The external collaborators (extraction
//! tool, description service, registry store) are injectable here so tests
//! and embedders can swap them without touching the pipeline.

use crate::error::EnrichError;
use crate::pipeline::describe::Describer;
use crate::pipeline::extract::Extractor;
use crate::pipeline::registry::RegistryStore;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Images strictly larger than this many bytes are described.
pub const DEFAULT_DESCRIPTION_THRESHOLD_BYTES: u64 = 20_000;

/// Upper bound accepted for [`ConversionConfig::max_retries`].
pub const MAX_DESCRIBE_RETRIES: u32 = 10;

/// Maximum characters of enriched text returned as preview.
pub const DEFAULT_PREVIEW_CHAR_LIMIT: usize = 2_000;

/// Configuration for a conversion run.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2text::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .output_root("out")
///     .description_threshold_bytes(50_000)
///     .model("gpt-4o-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Root under which `<run_id>/` output directories are created. Default: `pdf_to_text`.
    pub output_root: PathBuf,

    /// Path of the JSON run registry. Default: `files_dict.json`.
    pub registry_path: PathBuf,

    /// Extraction program. Default: `marker_single`.
    ///
    /// Invoked as `<program> <extractor_args...> <pdf> <out_dir>`.
    pub extractor_program: String,

    /// Extra arguments placed before the PDF and output paths.
    pub extractor_args: Vec<String>,

    /// Kill the extraction tool after this many seconds. Default: None (wait forever).
    pub extraction_timeout_secs: Option<u64>,

    /// Images strictly larger than this are eligible for description. Default: 20 000.
    pub description_threshold_bytes: u64,

    /// Preview length in characters. Default: 2 000.
    pub preview_char_limit: usize,

    /// In-flight description requests. Default: 1 (sequential).
    pub describe_concurrency: usize,

    /// Retries per image after a failed description call. Default: 0, at most
    /// [`MAX_DESCRIBE_RETRIES`].
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubling per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call description timeout. Default: None.
    pub describe_timeout_secs: Option<u64>,

    /// LLM model identifier. If None, `gpt-4o` is used for auto-selected OpenAI.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed describer. Takes precedence over every provider setting.
    pub describer: Option<Arc<dyn Describer>>,

    /// Look for provider credentials in the environment when nothing else is
    /// configured. Default: true. When false and no provider is given, every
    /// image gets an empty description.
    pub auto_detect_provider: bool,

    /// Sampling temperature for description calls. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens per description. Default: 1024.
    pub max_tokens: usize,

    /// Write `image_dict.json` next to the enriched text. Default: true.
    pub write_image_index: bool,

    /// Leave the temporary workspace on disk after the run. Default: false.
    pub keep_workspace: bool,

    /// Extraction backend. If None, a [`crate::pipeline::extract::MarkerExtractor`]
    /// is built from `extractor_program` and `extractor_args`.
    pub extractor: Option<Arc<dyn Extractor>>,

    /// Registry backend. If None, a [`crate::pipeline::registry::JsonFileRegistry`]
    /// at `registry_path` is used.
    pub registry: Option<Arc<dyn RegistryStore>>,

    /// Optional progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("pdf_to_text"),
            registry_path: PathBuf::from("files_dict.json"),
            extractor_program: "marker_single".to_string(),
            extractor_args: Vec::new(),
            extraction_timeout_secs: None,
            description_threshold_bytes: DEFAULT_DESCRIPTION_THRESHOLD_BYTES,
            preview_char_limit: DEFAULT_PREVIEW_CHAR_LIMIT,
            describe_concurrency: 1,
            max_retries: 0,
            retry_backoff_ms: 500,
            describe_timeout_secs: None,
            model: None,
            provider_name: None,
            provider: None,
            describer: None,
            auto_detect_provider: true,
            temperature: 0.1,
            max_tokens: 1024,
            write_image_index: true,
            keep_workspace: false,
            extractor: None,
            registry: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("output_root", &self.output_root)
            .field("registry_path", &self.registry_path)
            .field("extractor_program", &self.extractor_program)
            .field("extractor_args", &self.extractor_args)
            .field("extraction_timeout_secs", &self.extraction_timeout_secs)
            .field("description_threshold_bytes", &self.description_threshold_bytes)
            .field("preview_char_limit", &self.preview_char_limit)
            .field("describe_concurrency", &self.describe_concurrency)
            .field("max_retries", &self.max_retries)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("describer", &self.describer.as_ref().map(|_| "<dyn Describer>"))
            .field("auto_detect_provider", &self.auto_detect_provider)
            .field("extractor", &self.extractor.as_ref().map(|_| "<dyn Extractor>"))
            .field("registry", &self.registry.as_ref().map(|_| "<dyn RegistryStore>"))
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_root = dir.into();
        self
    }

    pub fn registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.registry_path = path.into();
        self
    }

    pub fn extractor_program(mut self, program: impl Into<String>) -> Self {
        self.config.extractor_program = program.into();
        self
    }

    pub fn extractor_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.extractor_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn extraction_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extraction_timeout_secs = Some(secs);
        self
    }

    pub fn description_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.description_threshold_bytes = bytes;
        self
    }

    pub fn preview_char_limit(mut self, chars: usize) -> Self {
        self.config.preview_char_limit = chars;
        self
    }

    pub fn describe_concurrency(mut self, n: usize) -> Self {
        self.config.describe_concurrency = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn describe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.describe_timeout_secs = Some(secs);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn describer(mut self, describer: Arc<dyn Describer>) -> Self {
        self.config.describer = Some(describer);
        self
    }

    pub fn auto_detect_provider(mut self, v: bool) -> Self {
        self.config.auto_detect_provider = v;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn write_image_index(mut self, v: bool) -> Self {
        self.config.write_image_index = v;
        self
    }

    pub fn keep_workspace(mut self, v: bool) -> Self {
        self.config.keep_workspace = v;
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.config.extractor = Some(extractor);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn RegistryStore>) -> Self {
        self.config.registry = Some(registry);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, EnrichError> {
        let c = &self.config;
        if c.describe_concurrency == 0 {
            return Err(EnrichError::InvalidConfig(
                "Describe concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_retries > MAX_DESCRIBE_RETRIES {
            return Err(EnrichError::InvalidConfig(format!(
                "Max retries must be ≤ {MAX_DESCRIBE_RETRIES} (got {})",
                c.max_retries
            )));
        }
        if c.preview_char_limit == 0 {
            return Err(EnrichError::InvalidConfig(
                "Preview character limit must be ≥ 1".into(),
            ));
        }
        if c.extractor.is_none() && c.extractor_program.trim().is_empty() {
            return Err(EnrichError::InvalidConfig(
                "Extractor program must not be empty".into(),
            ));
        }
        if c.output_root.as_os_str().is_empty() {
            return Err(EnrichError::InvalidConfig(
                "Output root must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
