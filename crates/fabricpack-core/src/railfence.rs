//! Rail-fence final composition: joining the two half-assemblies the
//! 12-iteration schedule produces (`block12`, the top+right strips; and
//! `block34`, the bottom+left strips) into one quilt.
//!
//! [`crate::session::PackingSession`] drives the schedule itself (stashing
//! `block12` and resetting the composite at the iteration-6 boundary,
//! per `cfg.rail_fence`); this module only holds the pure pixel join,
//! since that's the one piece of rail-fence bookkeeping that isn't
//! already folded into [`crate::strategy`]'s per-iteration block
//! arithmetic.
//!
//! Ground truth: `original_source/src/utils/plot.py::rail_fence_compose`.

use image::RgbaImage;

/// Joins `block12` (top+right) above `block34` (bottom+left). Whichever
/// half is wider is cropped from its left edge to match the narrower
/// one's width first, since the two halves are assembled independently
/// and can drift apart by a few pixels of trimming. `block34`'s top `sa`
/// rows are dropped before pasting, since they duplicate the seam
/// `block12`'s bottom edge already carries.
pub fn compose_blocks(block12: &RgbaImage, block34: &RgbaImage, sa: u32) -> RgbaImage {
    let (w12, h12) = block12.dimensions();
    let (w34, h34) = block34.dimensions();
    let width = w12.min(w34);

    let top = if w12 > width {
        image::imageops::crop_imm(block12, 0, 0, width, h12).to_image()
    } else {
        block12.clone()
    };
    let bottom = if w34 > width {
        image::imageops::crop_imm(block34, 0, 0, width, h34).to_image()
    } else {
        block34.clone()
    };

    let top_h = h12.saturating_sub(sa).max(1).min(h12);
    let top = image::imageops::crop_imm(&top, 0, 0, width, top_h).to_image();

    let bottom = if h34 > sa {
        image::imageops::crop_imm(&bottom, 0, sa, width, h34 - sa).to_image()
    } else {
        bottom
    };

    let (_, top_h) = top.dimensions();
    let (_, bottom_h) = bottom.dimensions();
    let mut out = crate::compositing::new_canvas(width, top_h + bottom_h);
    crate::compositing::paste_alpha(&mut out, &top, 0, 0);
    crate::compositing::paste_alpha(&mut out, &bottom, 0, top_h as i64);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }

    #[test]
    fn compose_blocks_stacks_vertically_and_drops_duplicated_seam() {
        let top = solid(200, 300, [200, 0, 0]);
        let bottom = solid(200, 150, [0, 200, 0]);
        let joined = compose_blocks(&top, &bottom, 25);
        let (w, h) = joined.dimensions();
        assert_eq!(w, 200);
        assert_eq!(h, (300 - 25) + (150 - 25));
    }

    #[test]
    fn compose_blocks_crops_wider_half_from_the_left() {
        let top = solid(220, 300, [200, 0, 0]);
        let bottom = solid(200, 150, [0, 200, 0]);
        let joined = compose_blocks(&top, &bottom, 25);
        let (w, _) = joined.dimensions();
        assert_eq!(w, 200, "the wider half should be cropped down to the narrower one's width");
    }
}
