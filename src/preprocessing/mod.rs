//! Image enhancement for handwritten essay photographs
//!
//! A fixed, flag-gated sequence of classical transforms that turns an
//! arbitrary photo into a clean raster suited to text recognition.

pub mod buffer;
pub mod pipeline;
pub mod steps;

pub use pipeline::{enhance, EnhancementConfig, Pipeline, PreprocessingResult};
