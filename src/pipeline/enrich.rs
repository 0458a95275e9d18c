//! Text enrichment: splice image descriptions into the extracted Markdown.
//!
//! The extraction tool references each image as `![name](name)`. Each such
//! reference is rewritten to point at the stable `images/` copy and, when a
//! description exists, followed by an `<image_description>` tag:
//!
//! ```text
//! ![fig.png](fig.png)
//!   → ![fig.png](images/fig.png)<image_description>a bar chart</image_description>
//! ```
//!
//! Replacement is exact substring matching, one image at a time. Because the
//! rewritten reference no longer matches `![name](name)`, running the
//! enricher again over its own output changes nothing.

use crate::output::{EnrichedDocument, ExtractedImage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::warn;

/// Directory name, relative to the enriched text, holding image copies.
pub const IMAGE_DIR: &str = "images";

/// The literal reference the extraction tool emits for `name`.
pub fn raw_reference(name: &str) -> String {
    format!("![{name}]({name})")
}

/// The rewritten reference for `name`, with its description tag if any.
pub fn enriched_reference(name: &str, description: &str) -> String {
    if description.is_empty() {
        format!("![{name}]({IMAGE_DIR}/{name})")
    } else {
        format!("![{name}]({IMAGE_DIR}/{name})<image_description>{description}</image_description>")
    }
}

/// Rewrite every image reference in `raw_text`.
///
/// `raw_text` is left untouched; the result carries both versions.
pub fn enrich_text(raw_text: &str, images: &[ExtractedImage]) -> EnrichedDocument {
    let mut enriched = raw_text.to_string();
    for img in images {
        let old = raw_reference(&img.file_name);
        if enriched.contains(&old) {
            enriched = enriched.replace(&old, &enriched_reference(&img.file_name, &img.description));
        }
    }

    for name in unresolved_references(&enriched, images) {
        warn!("Image reference '{}' has no extracted image", name);
    }

    EnrichedDocument {
        raw_text: raw_text.to_string(),
        enriched_text: enriched,
    }
}

static RE_SELF_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]\n]+)\]\(([^)\s]+)\)").unwrap());

/// Raw `![x](x)` references left in `text` that name none of `images`.
pub fn unresolved_references(text: &str, images: &[ExtractedImage]) -> Vec<String> {
    let known: HashSet<&str> = images.iter().map(|i| i.file_name.as_str()).collect();
    let mut seen = HashSet::new();
    RE_SELF_REFERENCE
        .captures_iter(text)
        .filter(|c| c[1] == c[2])
        .map(|c| c[1].to_string())
        .filter(|name| !known.contains(name.as_str()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
