use crate::error::EnhanceError;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::buffer::{Channels, PixelBuffer};
use super::steps;

/// Which enhancement steps to run. Missing fields take their documented default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Convert to single-channel luminance (default: on)
    pub grayscale: bool,
    /// Adaptive mean binarization, single-channel only (default: on)
    pub threshold: bool,
    /// Non-local means denoising (default: on)
    pub denoise: bool,
    /// CLAHE, 8x8 tiles, clip limit 2.0 (default: off)
    pub contrast_enhance: bool,
    /// Dilate then erode with a 2x2 element, single-channel only (default: off)
    pub morphological: bool,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            grayscale: true,
            threshold: true,
            denoise: true,
            contrast_enhance: false,
            morphological: false,
        }
    }
}

impl EnhancementConfig {
    /// Every step disabled: decode and re-encode only
    pub fn passthrough() -> Self {
        Self {
            grayscale: false,
            threshold: false,
            denoise: false,
            contrast_enhance: false,
            morphological: false,
        }
    }

    /// Channel layout of the output, fixed by the grayscale flag since
    /// decoding always yields color
    pub fn output_channels(&self) -> Channels {
        if self.grayscale {
            Channels::Gray
        } else {
            Channels::Color
        }
    }

    /// Enabled steps that will be no-ops on the output's channel layout
    pub fn inapplicable_steps(&self) -> Vec<&'static str> {
        if self.output_channels() == Channels::Gray {
            return Vec::new();
        }
        [("threshold", self.threshold), ("morphological", self.morphological)]
            .into_iter()
            .filter_map(|(name, enabled)| enabled.then_some(name))
            .collect()
    }
}

/// Timing information for a single preprocessing step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of preprocessing including timing stats
#[derive(Debug, Clone, Serialize)]
pub struct PreprocessingResult {
    /// PNG-encoded output (not serialized)
    #[serde(skip)]
    pub image: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: Channels,
    /// Total preprocessing time in milliseconds
    pub total_time_ms: u64,
    /// Steps that ran, in order
    pub steps: Vec<StepTiming>,
    /// Enabled steps that did not apply to the buffer's channel layout
    pub skipped: Vec<String>,
}

/// Runs the enabled enhancement steps in their fixed order
pub struct Pipeline {
    config: EnhancementConfig,
}

impl Pipeline {
    pub fn new(config: EnhancementConfig) -> Self {
        Self { config }
    }

    /// Decode, transform and re-encode an image as PNG
    pub fn process(&self, image_bytes: &[u8]) -> Result<PreprocessingResult, EnhanceError> {
        let start = Instant::now();
        let mut timings = Vec::new();
        let mut skipped = Vec::new();

        let mut img = PixelBuffer::decode(image_bytes)?;

        if self.config.grayscale {
            img = self.run_step("grayscale", img, &mut timings, PixelBuffer::into_gray);
        }

        // Before thresholding, so binarization sees a better separated histogram
        if self.config.contrast_enhance {
            img = self.run_step("contrast_enhance", img, &mut timings, |buf| {
                buf.map(steps::contrast::apply, steps::contrast::apply_color)
            });
        }

        if self.config.threshold {
            if img.channels() == Channels::Gray {
                img = self.run_step("threshold", img, &mut timings, |buf| {
                    buf.map_gray(steps::threshold::apply)
                });
            } else {
                tracing::debug!("Skipping threshold: buffer has {:?} channels", img.channels());
                skipped.push("threshold".to_string());
            }
        }

        // After binarization, before denoising so edges are cleaned while still crisp
        if self.config.morphological {
            if img.channels() == Channels::Gray {
                img = self.run_step("morphological", img, &mut timings, |buf| {
                    buf.map_gray(steps::morphology::apply)
                });
            } else {
                tracing::debug!(
                    "Skipping morphological: buffer has {:?} channels",
                    img.channels()
                );
                skipped.push("morphological".to_string());
            }
        }

        if self.config.denoise {
            img = self.run_step("denoise", img, &mut timings, |buf| {
                buf.map(steps::denoise::apply, steps::denoise::apply_color)
            });
        }

        let (width, height) = img.dimensions();
        let channels = img.channels();
        let image = img.encode_png()?;

        Ok(PreprocessingResult {
            image,
            width,
            height,
            channels,
            total_time_ms: start.elapsed().as_millis() as u64,
            steps: timings,
            skipped,
        })
    }

    fn run_step<F>(
        &self,
        name: &str,
        img: PixelBuffer,
        timings: &mut Vec<StepTiming>,
        step_fn: F,
    ) -> PixelBuffer
    where
        F: FnOnce(PixelBuffer) -> PixelBuffer,
    {
        let step_start = Instant::now();
        let result = step_fn(img);
        let time_ms = step_start.elapsed().as_millis() as u64;
        tracing::debug!(step = name, time_ms, "Preprocessing step finished");
        timings.push(StepTiming {
            name: name.to_string(),
            time_ms,
        });
        result
    }
}

/// Enhance an encoded image and return the PNG bytes
pub fn enhance(image_bytes: &[u8], config: &EnhancementConfig) -> Result<Vec<u8>, EnhanceError> {
    Pipeline::new(*config)
        .process(image_bytes)
        .map(|result| result.image)
}
