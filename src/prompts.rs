//! Prompts sent to the description service alongside each image.
//!
//! Callers pass their own prompt per run; the constants here are used only
//! when the caller's prompt is empty.

/// Fallback instruction when the run's prompt is empty.
pub const DEFAULT_IMAGE_PROMPT: &str = "Describe this image concisely.";

/// A longer instruction suited to maps, charts and diagrams.
///
/// Exposed for callers (and the CLI's `--detailed` flag) that want richer
/// descriptions than [`DEFAULT_IMAGE_PROMPT`] produces.
pub const DETAILED_IMAGE_PROMPT: &str = "Analyze the provided image and extract detailed information. \
The image may contain a map, diagram, chart, or other visual elements. Your task is to describe \
the content meaningfully and provide a comprehensive explanation of the key components, patterns, \
and any insights that can be drawn from the image. Ensure the description is clear and relevant, \
avoiding any unnecessary details";

/// Resolve the prompt for a run: the caller's text, or the default when it
/// is empty or whitespace.
pub fn effective_prompt(prompt: &str) -> &str {
    if prompt.trim().is_empty() {
        DEFAULT_IMAGE_PROMPT
    } else {
        prompt
    }
}
