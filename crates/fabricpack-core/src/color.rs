//! Color statistics used to compare and group fabrics: mean color, a
//! coarse dominant-color estimate, and the textile-tuned CIE1994
//! perceptual distance used by the bin solver's contrast objectives.
//!
//! Ground truth: `original_source/src/utils/binning.py::color_distance`
//! and `get_mode_color`.

use image::RgbaImage;
use palette::{FromColor, Lab, Srgb};
use std::collections::HashMap;

/// CIE1994 weighting constants tuned for textile surfaces in the original
/// project (graphic-arts applications use `K1 = 0.045, K2 = 0.015`).
const K_L: f32 = 2.0;
const K1: f32 = 0.048;
const K2: f32 = 0.014;
const KC: f32 = 1.0;
const KH: f32 = 1.0;

/// The arithmetic mean of every opaque-enough pixel's RGB, in `[0, 1]`.
/// Pixels with alpha below 128 (background/transparency) are excluded,
/// matching the original's practice of masking before averaging.
pub fn mean_color(image: &RgbaImage) -> [f32; 3] {
    let mut sum = [0f64; 3];
    let mut count = 0u64;
    for px in image.pixels() {
        if px.0[3] < 128 {
            continue;
        }
        sum[0] += px.0[0] as f64;
        sum[1] += px.0[1] as f64;
        sum[2] += px.0[2] as f64;
        count += 1;
    }
    if count == 0 {
        return [0.0, 0.0, 0.0];
    }
    [
        (sum[0] / count as f64 / 255.0) as f32,
        (sum[1] / count as f64 / 255.0) as f32,
        (sum[2] / count as f64 / 255.0) as f32,
    ]
}

/// A coarse stand-in for the original's k-means/histogram "mode color":
/// pixels are quantized to a 32-level-per-channel RGB grid, the most
/// frequent bucket wins, and its bucket center is converted to HSV and
/// returned as `[hue, saturation, value]`, each in `[0, 1]`. Callers index
/// this as `[0]` (hue) / `[2]` (value) for the bin hue-partitioning and
/// contrast objectives, so the conversion (not raw RGB) is the contract.
/// Clustering proper is out of scope; this keeps the same "most common
/// hue" intent with a deterministic, allocation-light implementation.
pub fn dominant_color(image: &RgbaImage) -> [f32; 3] {
    const LEVELS: u32 = 32;
    const BUCKET: u32 = 256 / LEVELS;

    let mut counts: HashMap<(u8, u8, u8), u32> = HashMap::new();
    for px in image.pixels() {
        if px.0[3] < 128 {
            continue;
        }
        let key = (
            (px.0[0] as u32 / BUCKET) as u8,
            (px.0[1] as u32 / BUCKET) as u8,
            (px.0[2] as u32 / BUCKET) as u8,
        );
        *counts.entry(key).or_insert(0) += 1;
    }
    let Some((&(r, g, b), _)) = counts.iter().max_by_key(|(_, &c)| c) else {
        return [0.0, 0.0, 0.0];
    };
    let center = |bucket: u8| -> f32 { (bucket as f32 * BUCKET as f32 + BUCKET as f32 / 2.0) / 255.0 };
    rgb_to_hsv([center(r), center(g), center(b)])
}

/// `[r, g, b]` (each in `[0, 1]`) to `[hue, saturation, value]` (each in
/// `[0, 1]`, hue as a fraction of the full circle rather than degrees so
/// it composes directly with [`circular_distance`]).
fn rgb_to_hsv(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta.abs() < 1e-6 {
        0.0
    } else if max == r {
        (((g - b) / delta).rem_euclid(6.0)) / 6.0
    } else if max == g {
        (((b - r) / delta) + 2.0) / 6.0
    } else {
        (((r - g) / delta) + 4.0) / 6.0
    };
    let saturation = if max <= 1e-6 { 0.0 } else { delta / max };
    [hue, saturation, max]
}

fn to_lab(rgb: [f32; 3]) -> Lab {
    Lab::from_color(Srgb::new(rgb[0], rgb[1], rgb[2]))
}

/// The hue or value component of two colors expressed as a circular
/// distance on `[0, 1]`: the shorter way around the wheel, so a hue of
/// `0.02` and a hue of `0.98` are `0.04` apart, not `0.96`. Ground truth:
/// `binning.py::color_distance`'s `min(abs(d), 1 - abs(d))` step.
pub fn circular_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).abs();
    d.min(1.0 - d)
}

/// Combined circular hue/value distance between two colors expressed as
/// `(hue, value)` pairs in `[0, 1]`, used by filters that only care about
/// one axis of perceptual difference rather than full CIE1994 contrast.
pub fn hue_value_distance(a_hue: f32, a_value: f32, b_hue: f32, b_value: f32) -> f32 {
    let dh = circular_distance(a_hue, b_hue);
    let dv = circular_distance(a_value, b_value);
    (dh * dh + dv * dv).sqrt()
}

/// CIE1994 perceptual color distance between two sRGB colors (each
/// component in `[0, 1]`), using the textile-weighted constants from the
/// original project rather than the graphic-arts defaults.
pub fn cie1994_distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let lab_a = to_lab(a);
    let lab_b = to_lab(b);

    let delta_l = lab_a.l - lab_b.l;
    let c_a = (lab_a.a * lab_a.a + lab_a.b * lab_a.b).sqrt();
    let c_b = (lab_b.a * lab_b.a + lab_b.b * lab_b.b).sqrt();
    let delta_c = c_a - c_b;
    let delta_a = lab_a.a - lab_b.a;
    let delta_b = lab_a.b - lab_b.b;
    let delta_h_sq = (delta_a * delta_a + delta_b * delta_b - delta_c * delta_c).max(0.0);
    let delta_h = delta_h_sq.sqrt();

    let s_l = 1.0;
    let s_c = 1.0 + K1 * c_a;
    let s_h = 1.0 + K2 * c_a;

    let term_l = delta_l / (K_L * s_l);
    let term_c = delta_c / (KC * s_c);
    let term_h = delta_h / (KH * s_h);

    (term_l * term_l + term_c * term_c + term_h * term_h).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn mean_color_of_solid_image_is_exact() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([51, 102, 153, 255]));
        let c = mean_color(&img);
        assert!((c[0] - 51.0 / 255.0).abs() < 1e-6);
        assert!((c[1] - 102.0 / 255.0).abs() < 1e-6);
        assert!((c[2] - 153.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn transparent_pixels_are_excluded_from_mean() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([255, 255, 255, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 0]));
        let c = mean_color(&img);
        assert!((c[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identical_colors_have_zero_distance() {
        let c = [0.4, 0.5, 0.6];
        assert!(cie1994_distance(c, c) < 1e-4);
    }

    #[test]
    fn circular_distance_wraps_around() {
        assert!((circular_distance(0.02, 0.98) - 0.04).abs() < 1e-6);
    }

    #[test]
    fn dominant_color_picks_majority_bucket() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([200, 50, 50, 255]));
        img.put_pixel(0, 0, Rgba([10, 200, 10, 255]));
        let d = dominant_color(&img);
        // Majority bucket is a saturated red (g == b), so hue sits at 0
        // and value (the max channel) is the bright end of the range.
        assert!(d[0] < 0.05, "hue should be near red (0.0), got {}", d[0]);
        assert!(d[2] > 0.5, "value should reflect the bright red bucket, got {}", d[2]);
    }

    #[test]
    fn rgb_to_hsv_matches_known_primaries() {
        let red = rgb_to_hsv([1.0, 0.0, 0.0]);
        assert!(red[0].abs() < 1e-5);
        let green = rgb_to_hsv([0.0, 1.0, 0.0]);
        assert!((green[0] - 1.0 / 3.0).abs() < 1e-5);
        let blue = rgb_to_hsv([0.0, 0.0, 1.0]);
        assert!((blue[0] - 2.0 / 3.0).abs() < 1e-5);
        let gray = rgb_to_hsv([0.5, 0.5, 0.5]);
        assert!(gray[1].abs() < 1e-5, "gray should have zero saturation");
    }
}
