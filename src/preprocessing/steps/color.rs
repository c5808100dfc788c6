use image::{GrayImage, Luma, Rgb, RgbImage};

// sRGB (D65) <-> XYZ matrices
const RGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.412453, 0.357580, 0.180423],
    [0.212671, 0.715160, 0.072169],
    [0.019334, 0.119193, 0.950227],
];
const XYZ_TO_RGB: [[f32; 3]; 3] = [
    [3.240479, -1.537150, -0.498535],
    [-0.969256, 1.875991, 0.041556],
    [0.055648, -0.204043, 1.057311],
];
const WHITE_X: f32 = 0.950456;
const WHITE_Z: f32 = 1.088754;

const EPSILON: f32 = 0.008856;
const KAPPA: f32 = 903.3;

/// 8-bit CIE L*a*b* planes: L scaled to 0..=255, a and b offset by 128
#[derive(Debug, Clone, PartialEq)]
pub struct LabPlanes {
    pub l: GrayImage,
    pub a: GrayImage,
    pub b: GrayImage,
}

pub fn rgb_to_lab(image: &RgbImage) -> LabPlanes {
    let (width, height) = image.dimensions();
    let linear = srgb_to_linear_table();

    let mut l = GrayImage::new(width, height);
    let mut a = GrayImage::new(width, height);
    let mut b = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let rgb = pixel.0.map(|c| linear[c as usize]);
        let [xs, ys, zs] = mul(&RGB_TO_XYZ, rgb);

        let fx = lab_f(xs / WHITE_X);
        let fy = lab_f(ys);
        let fz = lab_f(zs / WHITE_Z);

        let lightness = if ys > EPSILON {
            116.0 * ys.cbrt() - 16.0
        } else {
            KAPPA * ys
        };

        l.put_pixel(x, y, Luma([to_u8(lightness * 255.0 / 100.0)]));
        a.put_pixel(x, y, Luma([to_u8(500.0 * (fx - fy) + 128.0)]));
        b.put_pixel(x, y, Luma([to_u8(200.0 * (fy - fz) + 128.0)]));
    }

    LabPlanes { l, a, b }
}

pub fn lab_to_rgb(planes: &LabPlanes) -> RgbImage {
    let (width, height) = planes.l.dimensions();

    RgbImage::from_fn(width, height, |x, y| {
        let lightness = planes.l.get_pixel(x, y).0[0] as f32 * 100.0 / 255.0;
        let a = planes.a.get_pixel(x, y).0[0] as f32 - 128.0;
        let b = planes.b.get_pixel(x, y).0[0] as f32 - 128.0;

        let fy = (lightness + 16.0) / 116.0;
        let fx = fy + a / 500.0;
        let fz = fy - b / 200.0;

        let ys = if lightness > KAPPA * EPSILON {
            fy * fy * fy
        } else {
            lightness / KAPPA
        };
        let xs = lab_f_inv(fx) * WHITE_X;
        let zs = lab_f_inv(fz) * WHITE_Z;

        let rgb = mul(&XYZ_TO_RGB, [xs, ys, zs]);
        Rgb(rgb.map(|c| to_u8(linear_to_srgb(c) * 255.0)))
    })
}

fn srgb_to_linear_table() -> [f32; 256] {
    let mut table = [0.0f32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let c = i as f32 / 255.0;
        *entry = if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        };
    }
    table
}

fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f32) -> f32 {
    if t > EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(f: f32) -> f32 {
    let cubed = f * f * f;
    if cubed > EPSILON {
        cubed
    } else {
        (f - 16.0 / 116.0) / 7.787
    }
}

fn mul(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_channel_error(a: &RgbImage, b: &RgbImage) -> i32 {
        a.pixels()
            .zip(b.pixels())
            .flat_map(|(p, q)| (0..3).map(move |c| (p.0[c] as i32 - q.0[c] as i32).abs()))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_neutral_gray_has_no_chroma() {
        let img = RgbImage::from_pixel(2, 2, Rgb([128, 128, 128]));
        let lab = rgb_to_lab(&img);
        let a = lab.a.get_pixel(0, 0).0[0] as i32;
        let b = lab.b.get_pixel(0, 0).0[0] as i32;
        assert!((a - 128).abs() <= 1, "a = {}", a);
        assert!((b - 128).abs() <= 1, "b = {}", b);
    }

    #[test]
    fn test_lightness_extremes() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([255, 255, 255]));
        let lab = rgb_to_lab(&img);
        assert_eq!(lab.l.get_pixel(0, 0).0[0], 0);
        assert_eq!(lab.l.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn test_round_trip_is_close_for_paper_tones() {
        // Mid-range colors, the kind that make up photographed paper and ink
        let img = RgbImage::from_fn(16, 16, |x, y| {
            Rgb([(64 + x * 10) as u8, (64 + y * 10) as u8, (64 + (x + y) * 5) as u8])
        });
        let back = lab_to_rgb(&rgb_to_lab(&img));
        assert!(max_channel_error(&img, &back) <= 8);
    }

    #[test]
    fn test_round_trip_is_bounded_for_saturated_colors() {
        // 8-bit a/b steps are coarse where the sRGB curve is steep near 0
        let img = RgbImage::from_fn(16, 16, |x, y| {
            Rgb([(x * 16) as u8, (y * 16) as u8, ((x + y) * 8) as u8])
        });
        let back = lab_to_rgb(&rgb_to_lab(&img));
        assert!(max_channel_error(&img, &back) <= 24);

        let edge = RgbImage::from_pixel(1, 1, Rgb([0, 240, 120]));
        let back = lab_to_rgb(&rgb_to_lab(&edge));
        assert!(max_channel_error(&edge, &back) <= 24);
    }
}
