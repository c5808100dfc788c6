use super::{color, reflect_101};
use image::{GrayImage, Luma, RgbImage};

/// Number of tiles along each axis
pub const TILE_GRID: u32 = 8;
/// Histogram clip limit, relative to a flat histogram
pub const CLIP_LIMIT: f32 = 2.0;

const HIST_SIZE: usize = 256;

/// Contrast Limited Adaptive Histogram Equalization on a luminance image
pub fn apply(image: &GrayImage) -> GrayImage {
    clahe(image, TILE_GRID, TILE_GRID, CLIP_LIMIT)
}

/// CLAHE on the lightness channel of a color image; chroma is carried through
pub fn apply_color(image: &RgbImage) -> RgbImage {
    let mut lab = color::rgb_to_lab(image);
    lab.l = apply(&lab.l);
    color::lab_to_rgb(&lab)
}

fn clahe(image: &GrayImage, tiles_x: u32, tiles_y: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    // Tiles cover a virtual image padded up to a multiple of the grid
    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);
    let tile_area = (tile_w * tile_h) as usize;

    let clip = ((clip_limit * tile_area as f32 / HIST_SIZE as f32) as usize).max(1);
    let lut_scale = 255.0 / tile_area as f32;

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = [0usize; HIST_SIZE];
            for y in ty * tile_h..(ty + 1) * tile_h {
                let sy = reflect_101(y as i64, height as usize) as u32;
                for x in tx * tile_w..(tx + 1) * tile_w {
                    let sx = reflect_101(x as i64, width as usize) as u32;
                    hist[image.get_pixel(sx, sy).0[0] as usize] += 1;
                }
            }
            clip_histogram(&mut hist, clip);
            luts.push(build_lut(&hist, lut_scale));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    let inv_tw = 1.0 / tile_w as f32;
    let inv_th = 1.0 / tile_h as f32;

    GrayImage::from_fn(width, height, |x, y| {
        let (tx1, tx2, xa) = neighbours(x as f32 * inv_tw - 0.5, tiles_x);
        let (ty1, ty2, ya) = neighbours(y as f32 * inv_th - 0.5, tiles_y);
        let v = image.get_pixel(x, y).0[0] as usize;

        let top = lut_at(tx1, ty1)[v] as f32 * (1.0 - xa) + lut_at(tx2, ty1)[v] as f32 * xa;
        let bottom = lut_at(tx1, ty2)[v] as f32 * (1.0 - xa) + lut_at(tx2, ty2)[v] as f32 * xa;
        let blended = top * (1.0 - ya) + bottom * ya;

        Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}

/// Cap every bin at `clip` and hand the excess back out evenly
fn clip_histogram(hist: &mut [usize; HIST_SIZE], clip: usize) {
    let mut clipped = 0;
    for bin in hist.iter_mut() {
        if *bin > clip {
            clipped += *bin - clip;
            *bin = clip;
        }
    }

    let batch = clipped / HIST_SIZE;
    let mut residual = clipped - batch * HIST_SIZE;
    for bin in hist.iter_mut() {
        *bin += batch;
    }

    if residual > 0 {
        let step = (HIST_SIZE / residual).max(1);
        let mut i = 0;
        while i < HIST_SIZE && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

fn build_lut(hist: &[usize; HIST_SIZE], scale: f32) -> [u8; HIST_SIZE] {
    let mut lut = [0u8; HIST_SIZE];
    let mut sum = 0usize;
    for (entry, &count) in lut.iter_mut().zip(hist.iter()) {
        sum += count;
        *entry = (sum as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// The two tiles whose centers bracket `pos`, and the blend weight toward the second
fn neighbours(pos: f32, tiles: u32) -> (u32, u32, f32) {
    let first = pos.floor();
    let weight = pos - first;
    let first = first as i64;
    let lo = first.max(0) as u32;
    let hi = (first + 1).min(tiles as i64 - 1) as u32;
    (lo, hi, weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_clahe_keeps_uniform_image_uniform() {
        let img = GrayImage::from_pixel(64, 64, Luma([90]));
        let result = apply(&img);
        let first = result.get_pixel(0, 0).0[0];
        assert!(result.pixels().all(|p| p.0[0] == first));
    }

    #[test]
    fn test_clahe_stretches_low_contrast_texture() {
        // 128x128 checkerboard of 100/110 -> 16x16 tiles, clip limit of 2 per bin
        let img = GrayImage::from_fn(128, 128, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([100])
            } else {
                Luma([110])
            }
        });

        let result = apply(&img);
        assert_eq!(result.get_pixel(0, 0).0[0], 103);
        assert_eq!(result.get_pixel(1, 0).0[0], 115);
    }

    #[test]
    fn test_clahe_handles_sizes_not_divisible_by_grid() {
        let img = GrayImage::from_fn(13, 5, |x, y| Luma([(x * 10 + y) as u8]));
        let result = apply(&img);
        assert_eq!(result.dimensions(), (13, 5));
    }

    #[test]
    fn test_clip_histogram_preserves_total() {
        let mut hist = [0usize; HIST_SIZE];
        hist[10] = 500;
        hist[200] = 12;
        clip_histogram(&mut hist, 4);
        assert_eq!(hist.iter().sum::<usize>(), 512);
        assert!(hist[10] < 500);
    }

    #[test]
    fn test_color_clahe_preserves_dimensions_and_neutral_chroma() {
        let img = RgbImage::from_fn(32, 32, |x, _| {
            let v = 100 + (x % 2) as u8 * 10;
            Rgb([v, v, v])
        });
        let result = apply_color(&img);
        assert_eq!(result.dimensions(), (32, 32));
        for p in result.pixels() {
            let spread = p.0.iter().max().unwrap() - p.0.iter().min().unwrap();
            assert!(spread <= 3, "gray input should stay near-gray, got {:?}", p.0);
        }
    }
}
