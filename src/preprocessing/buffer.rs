use super::steps;
use crate::error::EnhanceError;
use image::{DynamicImage, GrayImage, ImageFormat, ImageReader, Limits, RgbImage};
use serde::Serialize;
use std::io::Cursor;

/// Largest accepted width or height; denoising cost grows with every pixel
pub const MAX_DIMENSION: u32 = 10_000;

/// Channel arrangement of a working buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channels {
    Gray,
    Color,
}

impl Channels {
    pub fn count(self) -> u8 {
        match self {
            Self::Gray => 1,
            Self::Color => 3,
        }
    }
}

/// Decoded working image, either single-channel luminance or 3-channel RGB
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    Gray(GrayImage),
    Color(RgbImage),
}

impl PixelBuffer {
    /// Decode any supported raster format into a 3-channel color buffer
    pub fn decode(bytes: &[u8]) -> Result<Self, EnhanceError> {
        let mut limits = Limits::default();
        limits.max_image_width = Some(MAX_DIMENSION);
        limits.max_image_height = Some(MAX_DIMENSION);

        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| EnhanceError::Decode(e.to_string()))?;
        reader.limits(limits);
        let img = reader
            .decode()
            .map_err(|e| EnhanceError::Decode(e.to_string()))?;
        Ok(Self::Color(img.into_rgb8()))
    }

    /// Wrap an already decoded image, keeping single-channel images single-channel
    #[cfg(test)]
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => Self::Gray(gray),
            other => Self::Color(other.into_rgb8()),
        }
    }

    pub fn channels(&self) -> Channels {
        match self {
            Self::Gray(_) => Channels::Gray,
            Self::Color(_) => Channels::Color,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Gray(img) => img.dimensions(),
            Self::Color(img) => img.dimensions(),
        }
    }

    /// Collapse to luminance. Already single-channel buffers pass through.
    pub fn into_gray(self) -> Self {
        match self {
            Self::Color(img) => Self::Gray(steps::grayscale::apply(&img)),
            gray => gray,
        }
    }

    /// Apply the matching transform for the current channel arrangement
    pub fn map<G, C>(self, gray_fn: G, color_fn: C) -> Self
    where
        G: FnOnce(&GrayImage) -> GrayImage,
        C: FnOnce(&RgbImage) -> RgbImage,
    {
        match self {
            Self::Gray(img) => Self::Gray(gray_fn(&img)),
            Self::Color(img) => Self::Color(color_fn(&img)),
        }
    }

    /// Apply a single-channel transform; color buffers are returned untouched
    pub fn map_gray<G>(self, gray_fn: G) -> Self
    where
        G: FnOnce(&GrayImage) -> GrayImage,
    {
        match self {
            Self::Gray(img) => Self::Gray(gray_fn(&img)),
            color => color,
        }
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, EnhanceError> {
        let mut out = Cursor::new(Vec::new());
        let written = match self {
            Self::Gray(img) => img.write_to(&mut out, ImageFormat::Png),
            Self::Color(img) => img.write_to(&mut out, ImageFormat::Png),
        };
        written.map_err(|e| EnhanceError::Encode(e.to_string()))?;
        Ok(out.into_inner())
    }
}
