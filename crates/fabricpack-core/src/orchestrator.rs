//! Drives one packing step end to end: [`next_packing_options`] asks the
//! solver for candidate strips against the current composite, and
//! [`pack_with_option`] realizes a chosen option into pixels, growing the
//! composite and updating the bins.
//!
//! Ground truth: `original_source/src/bin_pack_api.py` (`next_packing_options`,
//! `pack_with_option`), built on the pure [`crate::strategy`] kernel.

use crate::bin::{bin_filter_matches, objective_for, UserFabricBins};
use crate::color::{cie1994_distance, circular_distance};
use crate::compositing;
use crate::config::{BinFilter, OptionFilter, OptionRank, PackingConfig, PackingOption};
use crate::error::{FabricPackError, Result};
use crate::geometry::{home_image_shapes, ImageShape, Side};
use crate::model::{EdgeId, FabricArena, FabricId};
use crate::solver::{default_solver, SubsetSumQuery};
use crate::strategy;
use image::RgbaImage;
use std::collections::HashSet;

/// Outcome of one [`pack_with_option`] call: the grown composite plus the
/// bookkeeping the session layer needs to update its own state.
#[derive(Debug, Clone)]
pub struct PackStepResult {
    pub composite: RgbaImage,
    pub composite_shape: ImageShape,
    pub attach_side: Side,
    pub thickness: u32,
    /// Every fabric placed this step, whether fully consumed or trimmed
    /// and retained.
    pub used_fabric_ids: Vec<FabricId>,
    /// The subset of `used_fabric_ids` whose raster survives (updated in
    /// place via [`FabricArena::update_after_trimming`]) rather than being
    /// fully consumed.
    pub trimmed_fabric_ids: Vec<FabricId>,
    pub wasted_area: u64,
    pub used_area: u64,
    pub iter: u32,
}

fn compute_target_len(cfg: &PackingConfig, bins: &UserFabricBins, composite_shape: Option<ImageShape>, iter: u32) -> u32 {
    match composite_shape {
        Some(shape) => strategy::target_length(cfg.strategy, iter, &shape),
        // `composite_shape` is also `None` at iter 6, where rail-fence
        // starts the bottom+left half against a fresh composite;
        // `PackingSession` seeds `target_length.bottom` from `block12`'s
        // width before this iteration runs (spec.md §4.4).
        None if cfg.strategy == crate::config::Strategy::RailFence && iter == 6 && cfg.rail_fence.target_length.bottom.is_some() => {
            cfg.rail_fence.target_length.bottom.unwrap()
        }
        None => cfg
            .rail_fence
            .start_length
            .unwrap_or_else(|| bins.inner.bins.iter().map(|b| b.max_length).max().unwrap_or(0)),
    }
}

fn build_option(subset: &[EdgeId], arena: &FabricArena, sa: u32) -> PackingOption {
    let other_dims: Vec<u32> = subset.iter().map(|&e| arena.other_dim(e, true).saturating_sub(2 * sa)).collect();
    let shortest_side = other_dims.iter().copied().min().unwrap_or(0);
    let total_area: u64 = subset.iter().zip(&other_dims).map(|(&e, &od)| arena.length(e, true) as u64 * od as u64).sum();
    let used_area: u64 = subset.iter().map(|&e| arena.length(e, true) as u64 * shortest_side as u64).sum();
    PackingOption {
        index: 0,
        edge_subset: subset.to_vec(),
        other_dims,
        shortest_side,
        total_area,
        wasted_area: total_area.saturating_sub(used_area),
        shortest_side_px: None,
    }
}

fn average_contrast(opt: &PackingOption, arena: &FabricArena, rank: OptionRank) -> f64 {
    let fabrics: Vec<FabricId> = opt.edge_subset.iter().map(|&e| arena.edge(e).fabric).collect();
    let mut total = 0f64;
    let mut count = 0u32;
    for i in 0..fabrics.len() {
        for j in (i + 1)..fabrics.len() {
            let fi = arena.fabric(fabrics[i]);
            let fj = arena.fabric(fabrics[j]);
            let d = match rank {
                OptionRank::LoValueContrast | OptionRank::HiValueContrast => {
                    circular_distance(fi.dominant_color[2], fj.dominant_color[2]) as f64
                }
                OptionRank::LoHueContrast | OptionRank::HiHueContrast => {
                    circular_distance(fi.dominant_color[0], fj.dominant_color[0]) as f64
                }
                _ => cie1994_distance(fi.color, fj.color) as f64,
            };
            total += d;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

fn rank_key(opt: &PackingOption, arena: &FabricArena, rank: OptionRank) -> f64 {
    match rank {
        OptionRank::WastedArea => opt.wasted_area as f64,
        OptionRank::MaxThickness => -(opt.shortest_side as f64),
        OptionRank::MinThickness => opt.shortest_side as f64,
        OptionRank::HiFabricCount => -(opt.edge_subset.len() as f64),
        OptionRank::LoFabricCount => opt.edge_subset.len() as f64,
        OptionRank::LoContrast => average_contrast(opt, arena, rank),
        OptionRank::HiContrast => -average_contrast(opt, arena, rank),
        OptionRank::LoValueContrast => average_contrast(opt, arena, rank),
        OptionRank::HiValueContrast => -average_contrast(opt, arena, rank),
        OptionRank::LoHueContrast => average_contrast(opt, arena, rank),
        OptionRank::HiHueContrast => -average_contrast(opt, arena, rank),
    }
}

/// Lists candidate strips for the next step, ranked and truncated to
/// `cfg.max_options`. `composite_shape` is `None` only for the very first
/// strip of a fresh composite.
pub fn next_packing_options(
    cfg: &PackingConfig,
    arena: &FabricArena,
    bins: &UserFabricBins,
    composite_shape: Option<ImageShape>,
    iter: u32,
    rank: OptionRank,
    filter: OptionFilter,
    bin_filter: &BinFilter,
) -> Result<Vec<PackingOption>> {
    if cfg.strategy == crate::config::Strategy::RailFence && iter >= 12 {
        return Err(FabricPackError::StrategyDone { iter, max_iter: 12 });
    }

    let target_len = compute_target_len(cfg, bins, composite_shape, iter);
    // The solver reasons in "sum of edge lengths", which excludes the two
    // outer seam allowances the assembled strip still carries against the
    // target composite length (spec.md §4.3 step 3: `target_sum =
    // target_L_high_res - 50` at the default 25px sa; ported from
    // `bin_pack_api.py::next_packing_options`'s `target_sum = target_L - 2 * config.sa`).
    let target_sum = target_len.saturating_sub(2 * cfg.sa);

    let candidate_indices: Vec<usize> = bins
        .inner
        .bins
        .iter()
        .enumerate()
        .filter(|(_, b)| bin_filter_matches(bin_filter, b))
        .filter(|(_, b)| b.can_afford(target_sum, cfg.threshold))
        .map(|(i, _)| i)
        .collect();

    if candidate_indices.is_empty() {
        return Err(FabricPackError::NoFeasibleOption {
            target_len: target_sum,
            threshold: cfg.threshold,
            bins_checked: bins.inner.bins.len(),
        });
    }

    let objective = objective_for(cfg.strategy, rank);
    let (thickness_min, thickness_max) = match filter {
        OptionFilter::Thickness { min, max } => (min, max),
        OptionFilter::None => (None, None),
    };
    let n_bins = candidate_indices.len().max(1) as u64;
    let time_limit_ms = (30_000 / n_bins).clamp(1_000, 30_000);

    let solver = default_solver();
    let mut options = Vec::new();
    for &bi in &candidate_indices {
        let bin = &bins.inner.bins[bi];
        let query = SubsetSumQuery {
            target_len: target_sum,
            threshold: cfg.threshold,
            sa: cfg.sa,
            objective,
            thickness_min,
            thickness_max,
            fabric_count_min: None,
            fabric_count_max: None,
            time_limit_ms,
            solution_limit: cfg.max_options,
        };
        for sol in bin.find_best_subsets(arena, &query, solver.as_ref()) {
            for subset in sol.subsets {
                options.push(build_option(&subset, arena, cfg.sa));
            }
        }
    }

    if options.is_empty() {
        return Err(FabricPackError::NoFeasibleOption {
            target_len,
            threshold: cfg.threshold,
            bins_checked: candidate_indices.len(),
        });
    }

    let mut seen = HashSet::new();
    options.retain(|opt| {
        let mut lens: Vec<u32> = opt.edge_subset.iter().map(|&e| arena.length(e, true)).collect();
        lens.sort_unstable();
        seen.insert((opt.shortest_side, lens))
    });

    options.sort_by(|a, b| rank_key(a, arena, rank).partial_cmp(&rank_key(b, arena, rank)).unwrap());
    options.truncate(cfg.max_options);
    for (i, opt) in options.iter_mut().enumerate() {
        opt.index = i;
    }
    Ok(options)
}

/// Realizes a chosen [`PackingOption`] into pixels: rotates and trims each
/// fabric to the common strip thickness, concatenates them into a strip,
/// attaches the strip to the composite, and crops the result to the
/// target length. `composite`/`composite_shape` are `None` only on the
/// very first step.
pub fn pack_with_option(
    cfg: &PackingConfig,
    arena: &mut FabricArena,
    bins: &mut UserFabricBins,
    composite: Option<&RgbaImage>,
    composite_shape: Option<ImageShape>,
    iter: u32,
    option: &PackingOption,
) -> Result<PackStepResult> {
    let side = strategy::attach_side(cfg.strategy, iter);
    let thickness = option.shortest_side;
    let sa = cfg.sa;
    let n = option.edge_subset.len();
    let strip_vertical = matches!(side, Side::Left | Side::Right);

    let mut cursor = (0i64, 0i64);
    let mut pieces: Vec<(i64, i64, RgbaImage)> = Vec::with_capacity(n);
    let mut used_fabric_ids = Vec::with_capacity(n);
    let mut trimmed_fabric_ids = Vec::new();
    let mut wasted_area: u64 = 0;
    let mut used_area: u64 = 0;

    for (i, &edge) in option.edge_subset.iter().enumerate() {
        let fabric_id = arena.edge(edge).fabric;
        let (fw, fh) = arena.fabric(fabric_id).image.dimensions();
        let edge_len = arena.length(edge, false);
        // `option.other_dims[i]` is already in `sibling − 2·sa` units (set by
        // `build_option`), the same units as `thickness`. `arena.other_dim`
        // is one `2·sa` subtraction short of that and would make an
        // exactly-fitting fabric look like it needs trimming.
        let other_dim = option.other_dims[i];
        // `bin_pack_api.py`'s `length_to_keep`: the keep-length passed to
        // the raw-pixel trim functions has to be back in `other_dim`'s raw
        // scale, i.e. `thickness` plus both outer seam allowances.
        let keep_len = thickness + 2 * sa;

        let mut shape = ImageShape::new(0, 0, fw, fh);
        let rotated = strategy::rotate_image_shape(cfg.strategy, iter, &mut shape, fw, fh, edge_len, sa, false)?;
        let mut img = arena.fabric(fabric_id).image.clone();
        if rotated {
            img = image::imageops::rotate90(&img);
        }
        // Once the raster has been physically turned to match `rotated`,
        // every downstream crop/trim call already sees the canonical
        // (unrotated-convention) orientation, so they all take `rotated:
        // false` regardless of whether a turn happened above.

        let (kept, waste) = if other_dim > thickness {
            strategy::trim_image(cfg.strategy, iter, &img, keep_len, false)
        } else {
            (img.clone(), 0)
        };

        used_fabric_ids.push(fabric_id);
        if other_dim > thickness + cfg.min_scrap_size {
            let remainder = strategy::trim_image_remainder(cfg.strategy, iter, &img, keep_len, false);
            arena.update_after_trimming(fabric_id, remainder, sa, None);
            trimmed_fabric_ids.push(fabric_id);
        } else {
            wasted_area += waste;
        }

        let trimmed = strategy::trim_image_in_strip(cfg.strategy, iter, &kept, i, n, false, sa);
        let (pw, ph) = trimmed.dimensions();
        used_area += pw as u64 * ph as u64;
        pieces.push((cursor.0, cursor.1, trimmed));
        cursor = strategy::next_top_left(cfg.strategy, iter, i, cursor, edge_len, sa);
    }

    let strip_len = if strip_vertical { cursor.1 } else { cursor.0 }.max(0) as u32;
    let band = thickness + 2 * sa;
    let (strip_w, strip_h) = if strip_vertical { (band, strip_len) } else { (strip_len, band) };

    let mut strip = compositing::new_canvas(strip_w.max(1), strip_h.max(1));
    for (x, y, img) in &pieces {
        compositing::paste_alpha(&mut strip, img, *x, *y);
    }
    let strip = strategy::crop_curr_strip(cfg.strategy, iter, &strip, thickness, sa);

    let (canvas, new_shape) = match (composite, composite_shape) {
        (Some(existing), Some(old_shape)) => {
            let tl = strategy::top_left(cfg.strategy, iter, &old_shape, thickness, sa);
            let (sw, sh) = strip.dimensions();
            let mut shapes = [ImageShape::new(0, 0, old_shape.w, old_shape.h), ImageShape::new(tl.0, tl.1, sw, sh)];
            home_image_shapes(&mut shapes);
            let [old_is, strip_is] = shapes;
            let canvas_w = old_is.rect().right().max(strip_is.rect().right()) as u32;
            let canvas_h = old_is.rect().bottom().max(strip_is.rect().bottom()) as u32;
            let mut canvas = compositing::new_canvas(canvas_w, canvas_h);
            compositing::paste_alpha(&mut canvas, existing, old_is.x, old_is.y);
            compositing::paste_alpha(&mut canvas, &strip, strip_is.x, strip_is.y);
            (canvas, ImageShape::new(0, 0, canvas_w, canvas_h))
        }
        _ => {
            let (w, h) = strip.dimensions();
            (strip, ImageShape::new(0, 0, w, h))
        }
    };

    let target_len = compute_target_len(cfg, bins, composite_shape, iter);
    let cropped = strategy::crop_curr_image(cfg.strategy, iter, &canvas, target_len);
    if let Some(leftover) = strategy::trim_curr_image(cfg.strategy, iter, &canvas, target_len) {
        let (lw, lh) = leftover.dimensions();
        wasted_area += lw as u64 * lh as u64;
    }
    let (fw, fh) = cropped.dimensions();
    let final_shape = ImageShape::new(0, 0, fw, fh);
    let _ = new_shape;

    bins.update_fabrics(arena, &used_fabric_ids, &trimmed_fabric_ids)?;

    Ok(PackStepResult {
        composite: cropped,
        composite_shape: final_shape,
        attach_side: side,
        thickness,
        used_fabric_ids,
        trimmed_fabric_ids,
        wasted_area,
        used_area,
        iter: iter + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bin::UserFabricBins;
    use crate::config::Strategy;
    use image::Rgba;

    fn solid(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([200, 100, 50, 255]))
    }

    #[test]
    fn two_square_fabrics_pack_without_waste_in_log_cabin() {
        let mut arena = FabricArena::new();
        let f1 = arena.add_fabric(solid(250, 250), 25, None, None);
        let f2 = arena.add_fabric(solid(300, 250), 25, None, None);

        let mut bins = UserFabricBins::default();
        bins.create_bin_from_fabrics(&arena, &[f1, f2], None);

        let cfg = PackingConfig::default();
        let options = next_packing_options(&cfg, &arena, &bins, None, 0, OptionRank::WastedArea, OptionFilter::None, &BinFilter::All).unwrap();
        assert!(!options.is_empty());

        let best = &options[0];
        let result = pack_with_option(&cfg, &mut arena, &mut bins, None, None, 0, best).unwrap();
        assert_eq!(result.wasted_area, 0);
        assert!(result.composite_shape.w > 0 && result.composite_shape.h > 0);
    }

    #[test]
    fn rail_fence_refuses_options_past_iteration_twelve() {
        let arena = FabricArena::new();
        let bins = UserFabricBins::default();
        let mut cfg = PackingConfig::default();
        cfg.strategy = Strategy::RailFence;
        let err = next_packing_options(&cfg, &arena, &bins, None, 12, OptionRank::WastedArea, OptionFilter::None, &BinFilter::All).unwrap_err();
        assert!(matches!(err, FabricPackError::StrategyDone { .. }));
    }
}
