use image::{GrayImage, Luma};
use imageproc::integral_image::integral_image;

/// Side length of the square neighbourhood the local mean is taken over
pub const BLOCK_SIZE: u32 = 11;
/// Subtracted from the local mean before comparing
pub const OFFSET: i32 = 2;

pub const FOREGROUND: u8 = 0;
pub const BACKGROUND: u8 = 255;

/// Adaptive mean thresholding
///
/// A pixel becomes white when it is brighter than the rounded mean of its
/// `BLOCK_SIZE` x `BLOCK_SIZE` neighbourhood minus `OFFSET`, black otherwise.
/// Borders replicate the edge pixels.
pub fn apply(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let radius = BLOCK_SIZE / 2;
    let padded = GrayImage::from_fn(width + 2 * radius, height + 2 * radius, |x, y| {
        let sx = x.saturating_sub(radius).min(width - 1);
        let sy = y.saturating_sub(radius).min(height - 1);
        *image.get_pixel(sx, sy)
    });
    // One extra leading row and column of zeros
    let sums = integral_image::<_, u64>(&padded);
    let area = (BLOCK_SIZE * BLOCK_SIZE) as u64;

    GrayImage::from_fn(width, height, |x, y| {
        let (x1, y1) = (x + BLOCK_SIZE, y + BLOCK_SIZE);
        let total = sums.get_pixel(x1, y1).0[0] + sums.get_pixel(x, y).0[0]
            - sums.get_pixel(x, y1).0[0]
            - sums.get_pixel(x1, y).0[0];
        // The area is odd, so the rounded mean never ties
        let mean = ((total + area / 2) / area) as i32;
        let pixel = image.get_pixel(x, y).0[0] as i32;
        if pixel - mean > -OFFSET {
            Luma([BACKGROUND])
        } else {
            Luma([FOREGROUND])
        }
    })
}
