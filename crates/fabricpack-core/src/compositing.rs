//! Image composition: alpha-aware pasting of a strip onto the growing
//! composite, plus the UI-facing annotations the original renders on top
//! of a preview (seam guide lines, a dashed crop-line overlay, a border).
//!
//! Ground truth: `original_source/src/utils/image_utils.py`'s paste/draw
//! helpers, invoked from `bin_pack_api.py::pack_with_option` after every
//! strip is composed.

use image::{Rgba, RgbaImage};

/// Straight alpha-over compositing of `src` onto `canvas` at `(dx, dy)`.
/// Pixels of `src` that fall outside `canvas` are silently clipped, since
/// strips are sized to fit the target geometry by construction and a
/// stray one-pixel overhang from rounding should not panic.
pub fn paste_alpha(canvas: &mut RgbaImage, src: &RgbaImage, dx: i64, dy: i64) {
    let (cw, ch) = canvas.dimensions();
    let (sw, sh) = src.dimensions();
    for sy in 0..sh {
        let cy = dy + sy as i64;
        if cy < 0 || cy >= ch as i64 {
            continue;
        }
        for sx in 0..sw {
            let cx = dx + sx as i64;
            if cx < 0 || cx >= cw as i64 {
                continue;
            }
            let src_px = *src.get_pixel(sx, sy);
            let a = src_px.0[3] as f32 / 255.0;
            if a >= 1.0 {
                canvas.put_pixel(cx as u32, cy as u32, src_px);
            } else if a > 0.0 {
                let dst_px = *canvas.get_pixel(cx as u32, cy as u32);
                let blended = blend(src_px, dst_px, a);
                canvas.put_pixel(cx as u32, cy as u32, blended);
            }
        }
    }
}

fn blend(src: Rgba<u8>, dst: Rgba<u8>, a: f32) -> Rgba<u8> {
    let mix = |s: u8, d: u8| -> u8 { (s as f32 * a + d as f32 * (1.0 - a)).round() as u8 };
    let out_a = (a * 255.0 + dst.0[3] as f32 * (1.0 - a)).round() as u8;
    Rgba([
        mix(src.0[0], dst.0[0]),
        mix(src.0[1], dst.0[1]),
        mix(src.0[2], dst.0[2]),
        out_a.max(src.0[3]),
    ])
}

/// Allocates a fully opaque white canvas, the background the original
/// composes strips against.
pub fn new_canvas(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
}

/// Draws a solid one-pixel guide line along the seam between the
/// previous composite and the newly attached strip, at `offset` pixels
/// from the composite's origin along the growth axis. `horizontal` means
/// the line runs left-to-right (the strip grew the composite's height).
pub fn draw_seam_guide_line(canvas: &mut RgbaImage, horizontal: bool, offset: u32, color: Rgba<u8>) {
    let (w, h) = canvas.dimensions();
    if horizontal {
        if offset < h {
            for x in 0..w {
                canvas.put_pixel(x, offset, color);
            }
        }
    } else if offset < w {
        for y in 0..h {
            canvas.put_pixel(offset, y, color);
        }
    }
}

/// Draws a dashed line marking a pending crop boundary (the UI preview's
/// "this part will be trimmed" overlay), `dash_len` on, `dash_len` off.
pub fn draw_crop_line(canvas: &mut RgbaImage, horizontal: bool, offset: u32, color: Rgba<u8>, dash_len: u32) {
    let (w, h) = canvas.dimensions();
    let dash_len = dash_len.max(1);
    if horizontal {
        if offset < h {
            for x in 0..w {
                if (x / dash_len) % 2 == 0 {
                    canvas.put_pixel(x, offset, color);
                }
            }
        }
    } else if offset < w {
        for y in 0..h {
            if (y / dash_len) % 2 == 0 {
                canvas.put_pixel(offset, y, color);
            }
        }
    }
}

/// Draws a solid border of `thickness` pixels around the full canvas, the
/// final-composite frame the original adds before writing the result.
pub fn draw_border(canvas: &mut RgbaImage, thickness: u32, color: Rgba<u8>) {
    let (w, h) = canvas.dimensions();
    for t in 0..thickness {
        if t >= w || t >= h {
            break;
        }
        for x in 0..w {
            canvas.put_pixel(x, t, color);
            canvas.put_pixel(x, h - 1 - t, color);
        }
        for y in 0..h {
            canvas.put_pixel(t, y, color);
            canvas.put_pixel(w - 1 - t, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_paste_overwrites_destination() {
        let mut canvas = new_canvas(10, 10);
        let src = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        paste_alpha(&mut canvas, &src, 2, 2);
        assert_eq!(*canvas.get_pixel(3, 3), Rgba([0, 0, 0, 255]));
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn paste_clips_against_canvas_bounds() {
        let mut canvas = new_canvas(4, 4);
        let src = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        paste_alpha(&mut canvas, &src, 2, 2);
        assert_eq!(*canvas.get_pixel(3, 3), Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn semi_transparent_paste_blends() {
        let mut canvas = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let src = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 128]));
        paste_alpha(&mut canvas, &src, 0, 0);
        let px = canvas.get_pixel(0, 0);
        assert!(px.0[0] > 100 && px.0[0] < 155);
    }

    #[test]
    fn border_paints_outer_ring() {
        let mut canvas = new_canvas(5, 5);
        draw_border(&mut canvas, 1, Rgba([1, 2, 3, 255]));
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([1, 2, 3, 255]));
        assert_eq!(*canvas.get_pixel(2, 2), Rgba([255, 255, 255, 255]));
    }
}
