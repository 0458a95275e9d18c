//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline extracts the document and describes each image.
//!
//! # Example
//!
//! ```rust
//! use pdf2text::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     described: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, name: &str, description_len: usize) {
//!         self.described.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{name}: {description_len} chars");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     described: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it advances through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: with
/// `describe_concurrency > 1` the per-image hooks may fire from several
/// in-flight requests.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called just before the extraction tool is launched.
    fn on_extraction_start(&self, pdf_name: &str) {
        let _ = pdf_name;
    }

    /// Called once the extraction tool has exited successfully.
    ///
    /// # Arguments
    /// * `image_count` — raster images found next to the text artifact
    fn on_extraction_complete(&self, image_count: usize) {
        let _ = image_count;
    }

    /// Called before the description stage with the number of eligible images.
    fn on_describe_start(&self, eligible: usize) {
        let _ = eligible;
    }

    /// Called just before the description request for an image is sent.
    fn on_image_start(&self, name: &str) {
        let _ = name;
    }

    /// Called when an image receives a description.
    fn on_image_complete(&self, name: &str, description_len: usize) {
        let _ = (name, description_len);
    }

    /// Called when an image is not sent to the service.
    fn on_image_skipped(&self, name: &str, byte_size: u64) {
        let _ = (name, byte_size);
    }

    /// Called when an image's description failed and degraded to empty.
    fn on_image_error(&self, name: &str, error: &str) {
        let _ = (name, error);
    }

    /// Called once after persistence, or never if the run aborted.
    fn on_conversion_complete(&self, described: usize, failed: usize) {
        let _ = (described, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        skips: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_image_start(&self, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_complete(&self, _name: &str, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_skipped(&self, _name: &str, _size: u64) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_error(&self, _name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start("doc.pdf");
        cb.on_extraction_complete(3);
        cb.on_describe_start(1);
        cb.on_image_start("a.png");
        cb.on_image_complete("a.png", 12);
        cb.on_image_skipped("b.png", 500);
        cb.on_image_error("c.png", "boom");
        cb.on_conversion_complete(1, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_image_start("a.png");
        tracker.on_image_complete("a.png", 40);
        tracker.on_image_start("b.png");
        tracker.on_image_error("b.png", "503");
        tracker.on_image_skipped("c.png", 120);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.skips.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_image_start("x.jpg");
    }
}
