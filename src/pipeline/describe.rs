//! Image description: ask a vision model what each eligible image shows.
//!
//! The stage is deliberately forgiving. An image whose description call
//! fails keeps an empty description and the run continues; a run with no
//! configured service describes nothing and never makes a call.
//!
//! Requests go through the [`Describer`] trait so the pipeline does not care
//! whether descriptions come from an [`edgequake_llm`] provider, a local
//! model or a test double. Results are written back keyed by image index,
//! never by completion order, so raising `describe_concurrency` cannot
//! reorder anything downstream.

use crate::config::ConversionConfig;
use crate::error::{DescriptionError, EnrichError};
use crate::pipeline::images::{eligible_indices, is_eligible, CollectedImage};
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Error type returned by [`Describer`] implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Model used when OpenAI is selected from `OPENAI_API_KEY` with no model set.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// A description as returned by a service.
///
/// Some services answer with a bare string, others with an object carrying
/// the text under `content`. Both collapse to plain text via
/// [`Description::into_text`] before leaving this module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Description {
    Structured { content: String },
    PlainText(String),
}

impl Description {
    /// Interpret a raw service response, recognising a JSON `{"content": ..}`
    /// object and otherwise taking the trimmed text as-is.
    pub fn from_response(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') {
            if let Ok(d @ Description::Structured { .. }) = serde_json::from_str(trimmed) {
                return d;
            }
        }
        Description::PlainText(trimmed.to_string())
    }

    pub fn into_text(self) -> String {
        match self {
            Description::Structured { content } => content,
            Description::PlainText(text) => text,
        }
    }
}

impl From<String> for Description {
    fn from(s: String) -> Self {
        Description::PlainText(s)
    }
}

/// Image bytes ready to send, with a best-effort MIME type.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl ImagePayload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = detect_mime(&name, &bytes);
        Self {
            name,
            bytes,
            mime_type,
        }
    }
}

/// Sniff the image format from its magic bytes, falling back to the file
/// extension and finally to PNG.
pub fn detect_mime(name: &str, bytes: &[u8]) -> &'static str {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type();
    }
    match Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    }
}

/// A vision-capable description service.
#[async_trait]
pub trait Describer: Send + Sync {
    /// Describe one image following `prompt`.
    async fn describe(&self, prompt: &str, image: &ImagePayload) -> Result<Description, BoxError>;
}

/// [`Describer`] backed by an [`edgequake_llm`] vision provider.
pub struct LlmDescriber {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmDescriber {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Describer for LlmDescriber {
    async fn describe(&self, prompt: &str, image: &ImagePayload) -> Result<Description, BoxError> {
        let b64 = STANDARD.encode(&image.bytes);
        debug!("{}: {} bytes base64 as {}", image.name, b64.len(), image.mime_type);

        let messages = vec![ChatMessage::user_with_images(
            prompt,
            vec![ImageData::new(b64, image.mime_type)],
        )];
        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| BoxError::from(format!("{e}")))?;

        Ok(Description::from_response(&response.content))
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, EnrichError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        EnrichError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn env_set(key: &str) -> bool {
    std::env::var(key).is_ok_and(|v| !v.is_empty())
}

/// Resolve the description service, from most-specific to least-specific.
///
/// 1. **Pre-built describer** (`config.describer`).
/// 2. **Pre-built provider** (`config.provider`), wrapped in [`LlmDescriber`].
/// 3. **Named provider** (`config.provider_name`): a creation failure here is
///    a configuration error and aborts the run.
/// 4. **Environment** (only with `auto_detect_provider`): the
///    `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` pair, then
///    `OPENAI_API_KEY`, then any other provider key via
///    [`ProviderFactory::from_env`]. Failures degrade to no service.
///
/// `Ok(None)` means no service is available and every image will get an
/// empty description without a single call being made.
pub fn resolve_describer(
    config: &ConversionConfig,
) -> Result<Option<Arc<dyn Describer>>, EnrichError> {
    if let Some(ref describer) = config.describer {
        return Ok(Some(Arc::clone(describer)));
    }

    let wrap = |p: Arc<dyn LLMProvider>| -> Arc<dyn Describer> {
        Arc::new(LlmDescriber::new(p, config))
    };

    if let Some(ref provider) = config.provider {
        return Ok(Some(wrap(Arc::clone(provider))));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_provider(name, model).map(|p| Some(wrap(p)));
    }

    if !config.auto_detect_provider {
        info!("Description service disabled; images will not be described");
        return Ok(None);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return Ok(degrade(create_provider(&prov, &env_model)).map(wrap));
        }
    }

    if env_set("OPENAI_API_KEY") {
        return Ok(degrade(create_provider("openai", model)).map(wrap));
    }

    if ["ANTHROPIC_API_KEY", "GEMINI_API_KEY", "MISTRAL_API_KEY"]
        .iter()
        .any(|k| env_set(k))
    {
        return Ok(match ProviderFactory::from_env() {
            Ok((llm, _embedding)) => Some(wrap(llm)),
            Err(e) => {
                warn!("Provider auto-detection failed, images will not be described: {e}");
                None
            }
        });
    }

    info!("No description service configured; images will not be described");
    Ok(None)
}

fn degrade(result: Result<Arc<dyn LLMProvider>, EnrichError>) -> Option<Arc<dyn LLMProvider>> {
    match result {
        Ok(p) => Some(p),
        Err(e) => {
            warn!("Images will not be described: {e}");
            None
        }
    }
}

/// Counters from the description stage.
#[derive(Debug, Default)]
pub struct DescribeSummary {
    pub described: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<DescriptionError>,
}

/// Fill in `description` for every eligible image.
///
/// Images at or below the threshold, and every image when `describer` is
/// `None`, keep an empty description and are never sent anywhere.
pub async fn describe_images(
    images: &mut [CollectedImage],
    describer: Option<&dyn Describer>,
    prompt: &str,
    config: &ConversionConfig,
) -> DescribeSummary {
    let progress = config.progress_callback.as_ref();
    let mut summary = DescribeSummary::default();

    let Some(describer) = describer else {
        for img in images.iter_mut() {
            img.image.description.clear();
            if let Some(cb) = progress {
                cb.on_image_skipped(&img.image.file_name, img.image.byte_size);
            }
        }
        summary.skipped = images.len();
        return summary;
    };

    let threshold = config.description_threshold_bytes;
    let eligible = eligible_indices(images, threshold);
    for img in images
        .iter_mut()
        .filter(|c| !is_eligible(c.image.byte_size, threshold))
    {
        img.image.description.clear();
        summary.skipped += 1;
        if let Some(cb) = progress {
            cb.on_image_skipped(&img.image.file_name, img.image.byte_size);
        }
    }

    if let Some(cb) = progress {
        cb.on_describe_start(eligible.len());
    }
    info!("Describing {} of {} images", eligible.len(), images.len());

    let jobs = eligible.iter().map(|&i| {
        let name = images[i].image.file_name.clone();
        let path = images[i].source.clone();
        async move {
            if let Some(cb) = progress {
                cb.on_image_start(&name);
            }
            let result = describe_one(describer, prompt, &name, &path, config, progress).await;
            (i, result)
        }
    });
    let results: Vec<_> = stream::iter(jobs)
        .buffered(config.describe_concurrency.max(1))
        .collect()
        .await;

    for (i, result) in results {
        let img = &mut images[i].image;
        match result {
            Ok(text) => {
                if !text.is_empty() {
                    summary.described += 1;
                }
                img.description = text;
            }
            Err(e) => {
                img.description.clear();
                summary.failed += 1;
                summary.errors.push(e);
            }
        }
    }

    summary
}

/// Describe a single image with retry and optional timeout.
///
/// Never propagates: the caller receives either the normalised description
/// text or a [`DescriptionError`] to record.
async fn describe_one(
    describer: &dyn Describer,
    prompt: &str,
    name: &str,
    path: &Path,
    config: &ConversionConfig,
    progress: Option<&ProgressCallback>,
) -> Result<String, DescriptionError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            let err = DescriptionError::ReadFailed {
                image: name.to_string(),
                detail: e.to_string(),
            };
            report_failure(progress, name, &err);
            return Err(err);
        }
    };
    let payload = ImagePayload::new(name, bytes);

    let mut last_err: Option<DescriptionError> = None;
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_delay(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                name,
                attempt,
                config.max_retries,
                backoff.as_millis()
            );
            sleep(backoff).await;
        }

        let call = describer.describe(prompt, &payload);
        let outcome = match config.describe_timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), call).await {
                Ok(r) => r,
                Err(_) => {
                    warn!("{}: attempt {} timed out after {}s", name, attempt + 1, secs);
                    last_err = Some(DescriptionError::Timeout {
                        image: name.to_string(),
                        secs,
                    });
                    continue;
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(description) => {
                let text = description.into_text();
                debug!("{}: {} chars of description", name, text.len());
                if let Some(cb) = progress {
                    cb.on_image_complete(name, text.len());
                }
                return Ok(text);
            }
            Err(e) => {
                warn!("{}: attempt {} failed: {}", name, attempt + 1, e);
                last_err = Some(DescriptionError::ServiceFailed {
                    image: name.to_string(),
                    retries: config.max_retries,
                    detail: e.to_string(),
                });
            }
        }
    }

    let err = last_err.unwrap_or_else(|| DescriptionError::ServiceFailed {
        image: name.to_string(),
        retries: config.max_retries,
        detail: "Unknown error".to_string(),
    });
    report_failure(progress, name, &err);
    Err(err)
}

/// Longest pause between two attempts on the same image.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Delay before retry number `attempt` (1-based): `base_ms * 2^(attempt-1)`,
/// saturating at [`MAX_RETRY_BACKOFF`].
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    let ms = base_ms.saturating_mul(factor);
    Duration::from_millis(ms).min(MAX_RETRY_BACKOFF)
}

fn report_failure(progress: Option<&ProgressCallback>, name: &str, err: &DescriptionError) {
    warn!("Error describing image: {err}");
    if let Some(cb) = progress {
        cb.on_image_error(name, &err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::{ChatRole, LLMResponse, LlmError, MockProvider};
    use std::sync::Mutex;

    /// Records every chat request; answers with `reply` or fails.
    struct RecordingProvider {
        reply: Option<String>,
        requests: Mutex<Vec<(Vec<ChatMessage>, Option<CompletionOptions>)>>,
    }

    impl RecordingProvider {
        fn answering(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn model(&self) -> &str {
            "recording-model"
        }

        fn max_context_length(&self) -> usize {
            4096
        }

        async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            Err(LlmError::InvalidRequest("chat only".into()))
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete(prompt).await
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((messages.to_vec(), options.cloned()));
            match self.reply {
                Some(ref r) => Ok(LLMResponse::new(r.clone(), "recording-model")),
                None => Err(LlmError::ApiError("service unavailable".into())),
            }
        }
    }

    fn describer_for(provider: Arc<dyn LLMProvider>) -> LlmDescriber {
        let config = ConversionConfig::builder()
            .temperature(0.3)
            .max_tokens(256)
            .auto_detect_provider(false)
            .build()
            .unwrap();
        LlmDescriber::new(provider, &config)
    }

    #[tokio::test]
    async fn llm_describer_unwraps_structured_reply() {
        let mock = MockProvider::new();
        mock.add_response(r#"{"content":"a bar chart"}"#).await;
        let describer = describer_for(Arc::new(mock));

        let payload = ImagePayload::new("fig.png", vec![0u8; 16]);
        let text = describer
            .describe("What is shown?", &payload)
            .await
            .unwrap()
            .into_text();
        assert_eq!(text, "a bar chart");
    }

    #[tokio::test]
    async fn llm_describer_sends_prompt_image_and_options() {
        let provider = Arc::new(RecordingProvider::answering("  a pie chart\n"));
        let describer = describer_for(provider.clone());

        let jpeg_magic = vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];
        let payload = ImagePayload::new("photo.bin", jpeg_magic.clone());
        let description = describer.describe("Describe it.", &payload).await.unwrap();
        assert_eq!(description, Description::PlainText("a pie chart".into()));

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (messages, options) = &requests[0];
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[0].content, "Describe it.");

        let images = messages[0].images.as_ref().expect("image attached");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/jpeg");
        assert_eq!(images[0].data, STANDARD.encode(&jpeg_magic));

        let options = options.as_ref().expect("options passed");
        assert_eq!(options.temperature, Some(0.3));
        assert_eq!(options.max_tokens, Some(256));
    }

    #[tokio::test]
    async fn llm_describer_surfaces_provider_error() {
        let describer = describer_for(Arc::new(RecordingProvider::failing()));
        let payload = ImagePayload::new("fig.png", vec![1, 2, 3]);

        let err = describer.describe("x", &payload).await.unwrap_err();
        assert!(err.to_string().contains("service unavailable"));
    }

    #[test]
    fn structured_response_uses_content() {
        let d = Description::from_response(r#"{"content": "a bar chart", "role": "assistant"}"#);
        assert_eq!(d, Description::Structured { content: "a bar chart".into() });
        assert_eq!(d.into_text(), "a bar chart");
    }

    #[test]
    fn plain_response_is_trimmed() {
        let d = Description::from_response("  a pie chart \n");
        assert_eq!(d.into_text(), "a pie chart");
    }

    #[test]
    fn json_without_content_stays_plain() {
        let raw = r#"{"caption": "x"}"#;
        assert_eq!(Description::from_response(raw).into_text(), raw);
    }

    #[test]
    fn mime_from_magic_then_extension() {
        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(detect_mime("x.jpg", &png_magic), "image/png");
        assert_eq!(detect_mime("x.JPEG", b"not an image"), "image/jpeg");
        assert_eq!(detect_mime("x.bin", b"not an image"), "image/png");
    }

    #[test]
    fn payload_carries_detected_mime() {
        let p = ImagePayload::new("a.jpeg", vec![1, 2, 3]);
        assert_eq!(p.mime_type, "image/jpeg");
        assert_eq!(p.name, "a.jpeg");
    }

    #[test]
    fn backoff_doubles_then_saturates() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 3), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(0, 70), Duration::ZERO);
        assert_eq!(backoff_delay(u64::MAX, 2), MAX_RETRY_BACKOFF);
        assert_eq!(backoff_delay(1, 200), MAX_RETRY_BACKOFF);
    }

    #[test]
    fn disabled_auto_detect_yields_none() {
        let config = ConversionConfig::builder()
            .auto_detect_provider(false)
            .build()
            .unwrap();
        assert!(resolve_describer(&config).unwrap().is_none());
    }
}
