use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};

/// Side length of the square all-ones structuring element
pub const KERNEL_SIZE: u32 = 2;

/// One dilation followed by one erosion (a morphological closing of the
/// bright background, which thins isolated dark specks)
pub fn apply(image: &GrayImage) -> GrayImage {
    let mask = element();
    grayscale_erode(&grayscale_dilate(image, &mask), &mask)
}

/// Maximum over the structuring element
pub fn dilate(image: &GrayImage) -> GrayImage {
    grayscale_dilate(image, &element())
}

/// Minimum over the structuring element
pub fn erode(image: &GrayImage) -> GrayImage {
    grayscale_erode(image, &element())
}

// Anchored at the bottom-right cell, so the window for (x, y) spans
// x-1..=x and y-1..=y. Samples outside the image are ignored.
fn element() -> Mask {
    let anchor = (KERNEL_SIZE - 1) as u8;
    Mask::from_image(
        &GrayImage::from_pixel(KERNEL_SIZE, KERNEL_SIZE, Luma([255])),
        anchor,
        anchor,
    )
}
