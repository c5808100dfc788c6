use super::{color, reflect_101};
use image::{GrayImage, Luma, RgbImage};

/// Filter strength for luminance
pub const H_LUMINANCE: f32 = 3.0;
/// Filter strength for the chroma planes of color images
pub const H_COLOR: f32 = 3.0;
/// Comparison patch is (2 * r + 1) square
pub const TEMPLATE_RADIUS: usize = 3;
/// Candidate patches are searched within a (2 * r + 1) square window
pub const SEARCH_RADIUS: usize = 10;
/// Patches whose weight falls below this contribute nothing
const WEIGHT_THRESHOLD: f32 = 0.001;

/// Non-local means denoising of a single-channel image
pub fn apply(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let out = nl_means(image.as_raw(), width as usize, height as usize, 1, H_LUMINANCE);
    plane_from_vec(width, height, &out, 1, 0)
}

/// Non-local means on a color image: lightness and chroma are filtered
/// separately in L*a*b* space, then converted back
pub fn apply_color(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut lab = color::rgb_to_lab(image);

    let l = nl_means(lab.l.as_raw(), w, h, 1, H_LUMINANCE);
    lab.l = plane_from_vec(width, height, &l, 1, 0);

    let ab: Vec<u8> = lab
        .a
        .as_raw()
        .iter()
        .zip(lab.b.as_raw())
        .flat_map(|(&a, &b)| [a, b])
        .collect();
    let ab = nl_means(&ab, w, h, 2, H_COLOR);
    lab.a = plane_from_vec(width, height, &ab, 2, 0);
    lab.b = plane_from_vec(width, height, &ab, 2, 1);

    color::lab_to_rgb(&lab)
}

fn plane_from_vec(width: u32, height: u32, data: &[u8], channels: usize, channel: usize) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let idx = (y as usize * width as usize + x as usize) * channels + channel;
        Luma([data[idx]])
    })
}

/// Interleaved `channels`-sample image in, same layout out.
///
/// For every search offset the squared differences between the image and its
/// shifted copy are summed into an integral image, so each patch distance is
/// four lookups regardless of the template size.
fn nl_means(src: &[u8], width: usize, height: usize, channels: usize, h: f32) -> Vec<u8> {
    if width == 0 || height == 0 {
        return src.to_vec();
    }

    let tr = TEMPLATE_RADIUS;
    let sr = SEARCH_RADIUS;
    let pad = tr + sr;
    let pw = width + 2 * pad;
    let ph = height + 2 * pad;

    let mut padded = vec![0u8; pw * ph * channels];
    for py in 0..ph {
        let sy = reflect_101(py as i64 - pad as i64, height);
        for px in 0..pw {
            let sx = reflect_101(px as i64 - pad as i64, width);
            let dst = (py * pw + px) * channels;
            let from = (sy * width + sx) * channels;
            padded[dst..dst + channels].copy_from_slice(&src[from..from + channels]);
        }
    }

    // Region of the padded image covered by every template around a real pixel
    let rw = width + 2 * tr;
    let rh = height + 2 * tr;
    let stride = rw + 1;
    let mut integral = vec![0u64; stride * (rh + 1)];

    let template_len = (2 * tr + 1) * (2 * tr + 1);
    let norm = 1.0 / (template_len * channels) as f32;
    let inv_h2 = 1.0 / (h * h);

    let mut acc = vec![0f32; width * height * channels];
    let mut weights = vec![0f32; width * height];

    for dy in -(sr as isize)..=sr as isize {
        for dx in -(sr as isize)..=sr as isize {
            for ry in 0..rh {
                let mut row_sum = 0u64;
                let py = ry + sr;
                let qy = (py as isize + dy) as usize;
                for rx in 0..rw {
                    let px = rx + sr;
                    let qx = (px as isize + dx) as usize;
                    let p = (py * pw + px) * channels;
                    let q = (qy * pw + qx) * channels;
                    for c in 0..channels {
                        let diff = padded[p + c] as i64 - padded[q + c] as i64;
                        row_sum += (diff * diff) as u64;
                    }
                    integral[(ry + 1) * stride + rx + 1] = integral[ry * stride + rx + 1] + row_sum;
                }
            }

            for y in 0..height {
                let y2 = y + 2 * tr + 1;
                for x in 0..width {
                    let x2 = x + 2 * tr + 1;
                    let ssd = integral[y2 * stride + x2] + integral[y * stride + x]
                        - integral[y * stride + x2]
                        - integral[y2 * stride + x];

                    let weight = (-(ssd as f32 * norm) * inv_h2).exp();
                    if weight < WEIGHT_THRESHOLD {
                        continue;
                    }

                    let qy = (y + pad) as isize + dy;
                    let qx = (x + pad) as isize + dx;
                    let q = (qy as usize * pw + qx as usize) * channels;
                    let out = (y * width + x) * channels;
                    for c in 0..channels {
                        acc[out + c] += weight * padded[q + c] as f32;
                    }
                    weights[y * width + x] += weight;
                }
            }
        }
    }

    acc.iter()
        .enumerate()
        .map(|(i, &sum)| {
            // The zero offset always contributes weight 1
            let w = weights[i / channels];
            (sum / w).round().clamp(0.0, 255.0) as u8
        })
        .collect()
}
