//! The strategy kernel: pure functions indexed by `(Strategy, iter)` that
//! compute target lengths, attach sides, strip geometry, rotation, and
//! trim/crop rectangles. None of these functions touch a session or a
//! bin — they only know about the current composite shape and the
//! iteration counter, exactly like `original_source/src/utils/pack.py`,
//! whose per-iteration branch structure this module mirrors function for
//! function.

use crate::config::Strategy;
use crate::error::{FabricPackError, Result};
use crate::geometry::{ImageShape, Side};
use image::RgbaImage;

/// Which side of the composite the strip at this iteration attaches to.
pub fn attach_side(strategy: Strategy, iter: u32) -> Side {
    match strategy {
        Strategy::LogCabin => match iter % 4 {
            0 => Side::Left,
            1 => Side::Top,
            2 => Side::Right,
            _ => Side::Bottom,
        },
        Strategy::CourthouseSteps => match iter % 4 {
            0 => Side::Top,
            1 => Side::Bottom,
            2 => Side::Left,
            _ => Side::Right,
        },
        Strategy::RailFence => match iter % 12 {
            0 | 1 | 2 => Side::Top,
            3 | 4 | 5 => Side::Right,
            6 | 7 | 8 => Side::Bottom,
            _ => Side::Left,
        },
    }
}

/// The length the next strip must match so the composite remains
/// rectangular. For log-cabin/courthouse-steps this alternates between
/// the composite's width and height every other iteration; for
/// rail-fence it alternates every three iterations (one per block side).
pub fn target_length(strategy: Strategy, iter: u32, shape: &ImageShape) -> u32 {
    match strategy {
        Strategy::CourthouseSteps => {
            if iter % 4 == 0 || iter % 4 == 1 {
                shape.w
            } else {
                shape.h
            }
        }
        Strategy::LogCabin => {
            if iter % 4 == 0 || iter % 4 == 2 {
                shape.h
            } else {
                shape.w
            }
        }
        Strategy::RailFence => {
            if (iter / 3) % 2 == 0 {
                shape.w
            } else {
                shape.h
            }
        }
    }
}

/// Projected high-res composite size after the current strip (of high-res
/// thickness `thickness_high_res`) is attached.
pub fn high_res_packed_fabric_size(
    strategy: Strategy,
    iter: u32,
    current: (u32, u32),
    thickness_high_res: u32,
    sa: u32,
) -> (u32, u32) {
    let (w, h) = current;
    let grown = thickness_high_res + 2 * sa;
    let grows_height = match strategy {
        Strategy::LogCabin => iter % 4 == 1 || iter % 4 == 3,
        Strategy::CourthouseSteps => iter % 4 == 0 || iter % 4 == 1,
        Strategy::RailFence => (iter / 3) % 2 == 0,
    };
    if grows_height {
        (w, h + grown)
    } else {
        (w + grown, h)
    }
}

/// Top-left pixel position of the new strip relative to the composite,
/// before any per-fabric shifting. The strip is placed just outside the
/// composite on the attach side, overlapping by `sa` so the seam
/// allowance is shared rather than doubled.
pub fn top_left(strategy: Strategy, iter: u32, shape: &ImageShape, thickness: u32, sa: u32) -> (i64, i64) {
    let off = -(thickness as i64) - 2 * sa as i64;
    match strategy {
        Strategy::CourthouseSteps => match iter % 4 {
            0 => (0, off),
            1 => (0, shape.h as i64 - sa as i64),
            2 => (off, 0),
            _ => (shape.w as i64 - sa as i64, 0),
        },
        Strategy::LogCabin => match iter % 4 {
            0 => (off, 0),
            1 => (0, off),
            2 => (shape.w as i64 - sa as i64, 0),
            _ => (0, shape.h as i64 - sa as i64),
        },
        Strategy::RailFence => match iter % 12 {
            0 | 1 | 2 => (0, off),
            3 | 4 | 5 => (shape.w as i64 - sa as i64, 0),
            6 | 7 | 8 => (0, shape.h as i64 - sa as i64),
            _ => (off, 0),
        },
    }
}

/// Per-fabric offset inside the strip when a fabric's other-dim exceeds
/// the strip thickness: it hangs off on the side that trimming will
/// later remove.
pub fn shifted_top_left(
    strategy: Strategy,
    iter: u32,
    tl: (i64, i64),
    thickness: u32,
    other_dim: u32,
    w: u32,
    h: u32,
    sa: u32,
) -> ImageShape {
    let overhang = other_dim as i64 - thickness as i64 - sa as i64;
    let (x, y) = match strategy {
        Strategy::CourthouseSteps => match iter % 4 {
            0 | 2 => tl,
            1 => (tl.0, tl.1 - overhang),
            _ => (tl.0 - overhang, tl.1),
        },
        Strategy::LogCabin => match iter % 4 {
            0 | 1 => tl,
            2 => (tl.0 - overhang, tl.1),
            _ => (tl.0, tl.1 - overhang),
        },
        Strategy::RailFence => match iter % 12 {
            0 | 1 | 2 => tl,
            3 | 4 | 5 => (tl.0 - overhang, tl.1),
            6 | 7 | 8 => (tl.0, tl.1 - overhang),
            _ => tl,
        },
    };
    ImageShape::new(x, y, w, h)
}

/// Cursor advance inside the strip after placing one fabric of the given
/// edge length; the first fabric (`op_index == 0`) contributes one extra
/// `sa` of margin so seams do not coincide with the strip edge.
pub fn next_top_left(strategy: Strategy, iter: u32, op_index: usize, tl: (i64, i64), edge_len: u32, sa: u32) -> (i64, i64) {
    let horizontal = match strategy {
        Strategy::CourthouseSteps => iter % 4 == 0 || iter % 4 == 1,
        Strategy::LogCabin => iter % 4 == 0 || iter % 4 == 2,
        Strategy::RailFence => (iter / 3) % 2 == 0,
    };
    let margin = if op_index == 0 { sa as i64 } else { 0 };
    if horizontal {
        match strategy {
            Strategy::LogCabin => (tl.0, tl.1 + edge_len as i64 + margin),
            _ => (tl.0 + edge_len as i64 + margin, tl.1),
        }
    } else {
        match strategy {
            Strategy::LogCabin => (tl.0 + edge_len as i64 + margin, tl.1),
            _ => (tl.0, tl.1 + edge_len as i64 + margin),
        }
    }
}

/// Whether the fabric must be rotated 90 degrees so the selected edge
/// aligns with the strip's long axis. Fails with
/// [`FabricPackError::DimensionMismatch`] if neither side matches
/// `edge_len` — indicates a bug upstream, never a user-facing condition.
pub fn rotate_image_shape(
    strategy: Strategy,
    iter: u32,
    shape: &mut ImageShape,
    w: u32,
    h: u32,
    edge_len: u32,
    sa: u32,
    use_high_res: bool,
) -> Result<bool> {
    let margin = if use_high_res { 50 } else { 2 * sa };
    let width = w.saturating_sub(margin);
    let height = h.saturating_sub(margin);

    let height_first = match strategy {
        Strategy::CourthouseSteps => iter % 4 == 2 || iter % 4 == 3,
        Strategy::LogCabin => iter % 4 == 0 || iter % 4 == 2,
        Strategy::RailFence => (iter / 3) % 2 == 1,
    };

    let (primary, secondary) = if height_first { (height, width) } else { (width, height) };
    if primary == edge_len {
        Ok(false)
    } else if secondary == edge_len {
        shape.rotate(90);
        Ok(true)
    } else {
        Err(FabricPackError::DimensionMismatch {
            iter,
            strategy,
            edge_len,
            fabric_w: w,
            fabric_h: h,
        })
    }
}

fn is_horizontal_axis(strategy: Strategy, iter: u32) -> bool {
    match strategy {
        Strategy::CourthouseSteps => iter % 4 == 0 || iter % 4 == 1,
        Strategy::LogCabin => iter % 4 == 1 || iter % 4 == 3,
        Strategy::RailFence => (iter / 3) % 2 == 0,
    }
}

fn crop(image: &RgbaImage, x: i64, y: i64, w: i64, h: i64) -> RgbaImage {
    let x = x.max(0) as u32;
    let y = y.max(0) as u32;
    let w = w.max(0) as u32;
    let h = h.max(0) as u32;
    image::imageops::crop_imm(image, x, y, w, h).to_image()
}

/// Trims the shared seam allowance between adjacent fabrics inside a
/// strip so the final strip has no doubled seam margin. Fabrics at
/// either end of the strip keep the outer seam allowance; interior
/// fabrics lose it on both sides.
pub fn trim_image_in_strip(
    strategy: Strategy,
    iter: u32,
    image: &RgbaImage,
    im_index: usize,
    n_edges: usize,
    rotated: bool,
    sa: u32,
) -> RgbaImage {
    if n_edges == 1 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let sa = sa as i64;
    let horizontal = is_horizontal_axis(strategy, iter);
    // `rotated` flips which raw axis (w vs h) the strip direction maps to.
    let strip_is_vertical_axis = horizontal != rotated;

    if strip_is_vertical_axis {
        if im_index > 0 && im_index < n_edges - 1 {
            crop(image, sa, 0, w as i64 - 2 * sa, h as i64)
        } else if im_index == n_edges - 1 {
            crop(image, 0, 0, w as i64 - sa, h as i64)
        } else {
            crop(image, sa, 0, w as i64 - sa, h as i64)
        }
    } else if im_index > 0 && im_index < n_edges - 1 {
        crop(image, 0, sa, w as i64, h as i64 - 2 * sa)
    } else if im_index == 0 {
        crop(image, 0, 0, w as i64, h as i64 - sa)
    } else {
        crop(image, 0, sa, w as i64, h as i64)
    }
}

/// Splits a placed fabric's raster into the portion to keep (matching the
/// strip thickness) and the portion trimmed off as a possible remnant.
/// Returns `(kept, wasted_area_of_trim)`.
pub fn trim_image(strategy: Strategy, iter: u32, image: &RgbaImage, thickness: u32, rotated: bool) -> (RgbaImage, u64) {
    let (w, h) = image.dimensions();
    let t = thickness as i64;
    let height_first = match strategy {
        Strategy::LogCabin => iter % 4 == 0 || iter % 4 == 2,
        Strategy::CourthouseSteps => iter % 4 == 2 || iter % 4 == 3,
        Strategy::RailFence => (3..6).contains(&(iter % 12)) || (9..12).contains(&(iter % 12)),
    };
    // `height_first` true => the kept region spans the full height and is
    // cropped along width (or vice versa), following `rotated`.
    let crop_along_width = height_first != rotated;
    let kept = if crop_along_width {
        crop(image, 0, 0, t, h as i64)
    } else {
        crop(image, 0, 0, w as i64, t)
    };
    let (kw, kh) = kept.dimensions();
    let wasted = (w as u64 * h as u64).saturating_sub(kw as u64 * kh as u64);
    (kept, wasted)
}

/// The part of a placed fabric's raster that [`trim_image`] crops away,
/// kept as a possible remnant when it is large enough to be worth saving.
pub fn trim_image_remainder(strategy: Strategy, iter: u32, image: &RgbaImage, thickness: u32, rotated: bool) -> RgbaImage {
    let (w, h) = image.dimensions();
    let t = thickness as i64;
    let height_first = match strategy {
        Strategy::LogCabin => iter % 4 == 0 || iter % 4 == 2,
        Strategy::CourthouseSteps => iter % 4 == 2 || iter % 4 == 3,
        Strategy::RailFence => (3..6).contains(&(iter % 12)) || (9..12).contains(&(iter % 12)),
    };
    let crop_along_width = height_first != rotated;
    if crop_along_width {
        crop(image, t, 0, w as i64 - t, h as i64)
    } else {
        crop(image, 0, t, w as i64, h as i64 - t)
    }
}

/// High-res counterpart of [`trim_image`]: tracks only the trimmed-off
/// size, not an actual raster.
pub fn trim_image_high_res(strategy: Strategy, iter: u32, image_size: (u32, u32), thickness: u32, rotated: bool) -> (u32, u32) {
    let (w, h) = image_size;
    let height_first = match strategy {
        Strategy::LogCabin => iter % 4 == 0 || iter % 4 == 2,
        Strategy::CourthouseSteps => iter % 4 == 2 || iter % 4 == 3,
        Strategy::RailFence => (iter / 3) % 2 == 1,
    };
    if height_first != rotated {
        (w, h.saturating_sub(thickness))
    } else {
        (w.saturating_sub(thickness), h)
    }
}

/// Crops the assembled strip so every fabric shares the common
/// `thickness`, keeping `sa` pixels of outer seam allowance.
pub fn crop_curr_strip(strategy: Strategy, iter: u32, image: &RgbaImage, thickness: u32, sa: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    let band = (thickness + sa) as i64;
    match strategy {
        Strategy::CourthouseSteps => match iter % 4 {
            0 => crop(image, 0, 0, w as i64, band),
            1 => crop(image, 0, h as i64 - band, w as i64, h as i64),
            2 => crop(image, 0, 0, band, h as i64),
            _ => crop(image, w as i64 - band, 0, w as i64, h as i64),
        },
        Strategy::LogCabin => match iter % 4 {
            0 => crop(image, 0, 0, band, h as i64),
            1 => crop(image, 0, 0, w as i64, band),
            2 => crop(image, w as i64 - band, 0, w as i64, h as i64),
            _ => crop(image, 0, h as i64 - band, w as i64, h as i64),
        },
        Strategy::RailFence => match iter % 12 {
            0 | 1 | 2 => crop(image, 0, 0, w as i64, band),
            3 | 4 | 5 => crop(image, w as i64 - band, 0, w as i64, h as i64),
            6 | 7 | 8 => crop(image, 0, h as i64 - band, w as i64, h as i64),
            _ => crop(image, 0, 0, band, h as i64),
        },
    }
}

/// Crops the current strip/composite down to the target length along its
/// growth axis.
pub fn crop_curr_image(strategy: Strategy, iter: u32, image: &RgbaImage, target_l: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    if is_horizontal_axis(strategy, iter) {
        crop(image, 0, 0, target_l as i64, h as i64)
    } else {
        crop(image, 0, 0, w as i64, target_l as i64)
    }
}

/// Keeps the part of an over-long strip beyond `target_l`, to be
/// retained as a remnant.
pub fn trim_curr_image(strategy: Strategy, iter: u32, image: &RgbaImage, target_l: u32) -> Option<RgbaImage> {
    let (w, h) = image.dimensions();
    if is_horizontal_axis(strategy, iter) {
        if target_l >= w {
            return None;
        }
        Some(crop(image, target_l as i64, 0, w as i64 - target_l as i64, h as i64))
    } else {
        if target_l >= h {
            return None;
        }
        Some(crop(image, 0, target_l as i64, w as i64, h as i64 - target_l as i64))
    }
}

/// High-res size of the part trimmed off by [`trim_curr_image`].
pub fn trim_curr_image_high_res(strategy: Strategy, iter: u32, image_size: (u32, u32), trimmed_length: u32, rotated: bool) -> (u32, u32) {
    let (w, h) = image_size;
    let horizontal = is_horizontal_axis(strategy, iter);
    if horizontal != rotated {
        (trimmed_length, h)
    } else {
        (w, trimmed_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_side_cycles_log_cabin() {
        assert_eq!(attach_side(Strategy::LogCabin, 0), Side::Left);
        assert_eq!(attach_side(Strategy::LogCabin, 1), Side::Top);
        assert_eq!(attach_side(Strategy::LogCabin, 2), Side::Right);
        assert_eq!(attach_side(Strategy::LogCabin, 3), Side::Bottom);
        assert_eq!(attach_side(Strategy::LogCabin, 4), Side::Left);
    }

    #[test]
    fn target_length_alternates_for_log_cabin() {
        let shape = ImageShape::new(0, 0, 400, 200);
        assert_eq!(target_length(Strategy::LogCabin, 0, &shape), 200);
        assert_eq!(target_length(Strategy::LogCabin, 1, &shape), 400);
    }

    #[test]
    fn target_length_alternates_every_block_for_rail_fence() {
        let shape = ImageShape::new(0, 0, 350, 150);
        for iter in 0..3 {
            assert_eq!(target_length(Strategy::RailFence, iter, &shape), 350);
        }
        for iter in 3..6 {
            assert_eq!(target_length(Strategy::RailFence, iter, &shape), 150);
        }
    }

    #[test]
    fn rotate_detects_mismatch() {
        let mut shape = ImageShape::new(0, 0, 200, 100);
        let err = rotate_image_shape(Strategy::LogCabin, 1, &mut shape, 200, 100, 999, 0, false).unwrap_err();
        assert!(matches!(err, FabricPackError::DimensionMismatch { .. }));
    }

    #[test]
    fn rotate_picks_correct_orientation_without_rotating() {
        let mut shape = ImageShape::new(0, 0, 200, 100);
        // iter 1 (log-cabin): not height_first, so the unrotated width (200)
        // already matches the edge length -> no rotation needed.
        let rotated = rotate_image_shape(Strategy::LogCabin, 1, &mut shape, 200, 100, 200, 0, false).unwrap();
        assert!(!rotated);
    }

    #[test]
    fn rotate_rotates_when_only_the_other_axis_matches() {
        let mut shape = ImageShape::new(0, 0, 200, 100);
        // iter 1 (log-cabin, not height_first): width(200) is primary, height(100)
        // is secondary. Target 100 only matches secondary -> rotation required.
        let rotated = rotate_image_shape(Strategy::LogCabin, 1, &mut shape, 200, 100, 100, 0, false).unwrap();
        assert!(rotated);
        assert_eq!((shape.w, shape.h), (100, 200));
    }
}
