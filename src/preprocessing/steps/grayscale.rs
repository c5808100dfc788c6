use image::{GrayImage, Luma, RgbImage};

// BT.601 weights 0.299 / 0.587 / 0.114 in 14-bit fixed point
const SHIFT: u32 = 14;
const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;

/// Convert a color image to single-channel luminance
/// Every channel-sensitive step downstream keys off this conversion
pub fn apply(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let weighted =
            r as u32 * R_WEIGHT + g as u32 * G_WEIGHT + b as u32 * B_WEIGHT + (1 << (SHIFT - 1));
        Luma([(weighted >> SHIFT) as u8])
    })
}
