//! Pipeline stages for PDF conversion and enrichment.
//!
//! Each submodule implements exactly one step so stages can be tested and
//! swapped (e.g. a different extraction backend) independently.
//!
//! ## Data Flow
//!
//! ```text
//! workspace ──▶ extract ──▶ images ──▶ describe ──▶ enrich ──▶ persist
//! (temp dir)    (tool)      (sizes)    (VLM)        (splice)   (+ registry)
//! ```
//!
//! 1. [`workspace`] — isolated temp dir holding `<run_id>.pdf`
//! 2. [`extract`]   — run the structure-extraction tool; the only stage whose
//!    failure is surfaced verbatim
//! 3. [`images`]    — enumerate rasters, record sizes, copy to the stable dir
//! 4. [`describe`]  — per-image VLM descriptions; failures degrade to empty
//! 5. [`enrich`]    — rewrite `![name](name)` references
//! 6. [`persist`]   — write outputs, compute the preview, update the
//!    [`registry`]

pub mod describe;
pub mod enrich;
pub mod extract;
pub mod images;
pub mod persist;
pub mod registry;
pub mod workspace;
