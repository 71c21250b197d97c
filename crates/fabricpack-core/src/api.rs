//! The remaining programmatic entry points from spec.md §6 beyond
//! `next_packing_options`/`pack_with_option` (which live in
//! [`crate::orchestrator`]) and the session step/undo loop (in
//! [`crate::session`]): bulk bin construction (`estimate_nbins`,
//! `group_fabrics`), loading a bin set from the wire specification
//! (`load_bins`), rendering a single option to a preview raster
//! (`option_to_strip_image`), and replaying a persisted session against a
//! fresh load of its source images (`reconstruct_high_res`).
//!
//! Ground truth: `original_source/src/utils/bin_pack_api.py` and
//! `original_source/src/utils/binning.py` for `estimate_nbins`/`group_fabrics`'s
//! role (the clustering machinery itself is out of scope — see
//! Design Notes §9 and DESIGN.md's Open Question resolution).

use crate::bin::{ColorFabricBins, FabricBin, FabricBins, UserFabricBins};
use crate::compositing;
use crate::config::{PackingConfig, PackingOption};
use crate::error::Result;
use crate::geometry::{ImageShape, Side};
use crate::model::{FabricArena, FabricId};
use crate::session::{Instruction, PackingSession, SessionSnapshot};
use crate::strategy;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Which fabric attribute `estimate_nbins`/`group_fabrics` partition on —
/// the same two axes [`FabricBins`]/[`ColorFabricBins`] already bucket by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinCriterion {
    Length,
    Hue,
}

/// How `estimate_nbins` derives a suggested bin count from a pool size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinEstimateMode {
    /// `ceil(sqrt(n))`: balances solver tractability (small bins keep the
    /// DP subset-sum state space bounded) against coverage (few enough
    /// bins that each still spans a useful length/hue range).
    SquareRoot,
    /// `ceil(n / target_per_bin)`: aim for roughly `target_per_bin`
    /// fabrics per bin regardless of pool size.
    FixedSize { target_per_bin: usize },
}

/// Suggests how many bins `group_fabrics` should target for a pool of
/// `fabrics.len()` fabrics. `criterion` has no effect on the count itself
/// (both axes use the same pool-size heuristic) but is accepted to match
/// spec.md §6's signature and so a future criterion-specific heuristic has
/// somewhere to live.
pub fn estimate_nbins(fabrics: &[FabricId], _criterion: BinCriterion, mode: BinEstimateMode) -> usize {
    let n = fabrics.len();
    if n == 0 {
        return 0;
    }
    match mode {
        BinEstimateMode::SquareRoot => (n as f64).sqrt().ceil() as usize,
        BinEstimateMode::FixedSize { target_per_bin } => n.div_ceil(target_per_bin.max(1)),
    }
    .max(1)
}

fn fabrics_of(arena: &FabricArena, bin: &FabricBin) -> Vec<FabricId> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for &e in &bin.edges {
        let f = arena.edge(e).fabric;
        if seen.insert(f) {
            out.push(f);
        }
    }
    out
}

/// Partitions `fabrics` into `n_bins` groups along `criterion`, or returns
/// `fixed_bins` verbatim when the caller supplies a user-authored
/// partition instead of asking for one to be derived (spec.md §6's
/// `[fixed_bins]` parameter — mirrors `UserFabricBins`' "never
/// auto-partition over a user's explicit bins" rule).
pub fn group_fabrics(
    arena: &FabricArena,
    fabrics: &[FabricId],
    n_bins: usize,
    criterion: BinCriterion,
    fixed_bins: Option<Vec<Vec<FabricId>>>,
) -> Vec<Vec<FabricId>> {
    if let Some(fixed) = fixed_bins {
        return fixed;
    }
    match criterion {
        BinCriterion::Length => {
            let bins = FabricBins::create_bins(arena, fabrics, n_bins, None, None);
            bins.bins.iter().map(|b| fabrics_of(arena, b)).collect()
        }
        BinCriterion::Hue => {
            let bins = ColorFabricBins::create_bins(arena, fabrics, n_bins, None, None);
            bins.inner.bins.iter().map(|b| fabrics_of(arena, b)).collect()
        }
    }
}

/// One fabric entry in a wire bin specification: an id (used only for
/// request/response correlation, not addressing) and an image path
/// relative to `public_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricSpecEntry {
    pub id: u32,
    pub image_path: String,
}

/// One bin entry in a wire bin specification (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinSpecEntry {
    pub id: u32,
    pub name: String,
    pub fabrics: Vec<FabricSpecEntry>,
}

/// Whichever of `_resized`/`_tiny` suffixes `public_dir`'s own directory
/// name carries is stripped to find its high-res sibling directory
/// (spec.md §6: "an optional parallel high-res directory is discovered by
/// stripping an `_resized` / `_tiny` suffix"). Returns `None` if neither
/// suffix applies or the sibling doesn't exist.
fn high_res_sibling(public_dir: &Path) -> Option<std::path::PathBuf> {
    let name = public_dir.file_name()?.to_str()?;
    for suffix in ["_resized", "_tiny"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            let candidate = public_dir.with_file_name(stripped);
            if candidate.is_dir() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Loads a wire bin specification into a fresh arena plus
/// [`UserFabricBins`], resolving every fabric's raster against
/// `public_dir` and, when a high-res sibling directory is discoverable,
/// recording each fabric's high-res size alongside its low-res raster
/// (spec.md §6).
pub fn load_bins(public_dir: &Path, bin_spec: Vec<BinSpecEntry>, sa: u32) -> Result<(FabricArena, UserFabricBins)> {
    let high_res_dir = high_res_sibling(public_dir);
    let mut arena = FabricArena::new();
    let mut bins = UserFabricBins::default();

    for entry in bin_spec {
        let mut fabric_ids = Vec::with_capacity(entry.fabrics.len());
        for f in &entry.fabrics {
            let path = public_dir.join(&f.image_path);
            let img = image::open(&path)?.to_rgba8();
            let high_res_size = high_res_dir
                .as_ref()
                .and_then(|dir| image::image_dimensions(dir.join(&f.image_path)).ok());
            let id = arena.add_fabric(img, sa, Some(f.image_path.clone()), high_res_size);
            fabric_ids.push(id);
        }
        bins.create_bin_from_fabrics(&arena, &fabric_ids, Some(entry.name));
    }
    Ok((arena, bins))
}

/// Renders the strip a [`PackingOption`] would produce, without mutating
/// the arena or bins — a preview a UI can show before the caller commits
/// to [`crate::orchestrator::pack_with_option`]/[`PackingSession::step`].
/// Mirrors `pack_with_option`'s placement loop through the strip-crop
/// step; skips the trimming mutation and composite attachment, since a
/// preview neither consumes fabrics nor grows the composite.
fn render_strip_preview(cfg: &PackingConfig, arena: &FabricArena, iter: u32, option: &PackingOption) -> Result<RgbaImage> {
    let thickness = option.shortest_side;
    let sa = cfg.sa;
    let n = option.edge_subset.len();

    let mut cursor = (0i64, 0i64);
    let mut pieces: Vec<(i64, i64, RgbaImage)> = Vec::with_capacity(n);

    for (i, &edge) in option.edge_subset.iter().enumerate() {
        let fabric_id = arena.edge(edge).fabric;
        let (fw, fh) = arena.fabric(fabric_id).image.dimensions();
        let edge_len = arena.length(edge, false);
        // Same units as `pack_with_option`: `option.other_dims[i]` already
        // carries the `−2·sa` subtraction `thickness` does, unlike
        // `arena.other_dim`.
        let other_dim = option.other_dims[i];
        let keep_len = thickness + 2 * sa;

        let mut shape = ImageShape::new(0, 0, fw, fh);
        let rotated = strategy::rotate_image_shape(cfg.strategy, iter, &mut shape, fw, fh, edge_len, sa, false)?;
        let mut img = arena.fabric(fabric_id).image.clone();
        if rotated {
            img = image::imageops::rotate90(&img);
        }

        let (kept, _waste) = if other_dim > thickness {
            strategy::trim_image(cfg.strategy, iter, &img, keep_len, false)
        } else {
            (img, 0)
        };

        let trimmed = strategy::trim_image_in_strip(cfg.strategy, iter, &kept, i, n, false, sa);
        pieces.push((cursor.0, cursor.1, trimmed));
        cursor = strategy::next_top_left(cfg.strategy, iter, i, cursor, edge_len, sa);
    }

    let strip_vertical = matches!(strategy::attach_side(cfg.strategy, iter), Side::Left | Side::Right);
    let strip_len = if strip_vertical { cursor.1 } else { cursor.0 }.max(0) as u32;
    let band = thickness + 2 * sa;
    let (strip_w, strip_h) = if strip_vertical { (band, strip_len) } else { (strip_len, band) };

    let mut strip = compositing::new_canvas(strip_w.max(1), strip_h.max(1));
    for (x, y, img) in &pieces {
        compositing::paste_alpha(&mut strip, img, *x, *y);
    }
    Ok(strategy::crop_curr_strip(cfg.strategy, iter, &strip, thickness, sa))
}

/// A deterministic, content-addressed handle for a [`PackingOption`]: the
/// option is fully reconstructible from its edge subset, so there's no
/// reason to persist solver state (a "pickle") behind the handle — the
/// handle is just a stable key the caller can use to re-submit the exact
/// same option later. Resolves spec.md §9's Open Question: the original
/// duplicated this rendering step between two modules returning
/// differently-shaped keys (`pickle_path` vs `option_key`); `option_key`
/// is canonical here.
fn option_key(option: &PackingOption) -> String {
    use std::fmt::Write;
    let mut key = String::new();
    for &e in &option.edge_subset {
        let _ = write!(key, "{:08x}-", e.0);
    }
    let _ = write!(key, "t{:x}", option.shortest_side);
    key
}

/// Renders `option` to a preview strip raster and a persistable
/// `option_key` handle (spec.md §6's `option_to_strip_image`).
pub fn option_to_strip_image(cfg: &PackingConfig, arena: &FabricArena, iter: u32, option: &PackingOption) -> Result<(RgbaImage, String)> {
    let strip = render_strip_preview(cfg, arena, iter, option)?;
    Ok((strip, option_key(option)))
}

/// Replays a persisted [`SessionSnapshot`] against a fresh load of its
/// source fabric folder, reproducing the final composite and the
/// per-step instruction trace (spec.md §6's `reconstruct_high_res`).
///
/// Fabrics are (re)loaded from `fabric_folder` in the same sorted-path
/// order [`crate::session`]'s own session-construction helpers use, so
/// freshly-assigned [`crate::model::FabricId`]/`EdgeId`s line up with
/// those `snapshot.chosen_options` was recorded against — this crate's
/// one working-resolution simplification (documented in DESIGN.md)
/// applies here too: there is no separate high-res raster path, so this
/// reconstructs at whatever resolution `fabric_folder`'s images are
/// stored at.
pub fn reconstruct_high_res(snapshot: &SessionSnapshot, fabric_folder: &Path) -> Result<(RgbaImage, Vec<Instruction>)> {
    let mut paths: Vec<std::path::PathBuf> = std::fs::read_dir(fabric_folder)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase()).as_deref(),
                Some("png" | "jpg" | "jpeg")
            )
        })
        .collect();
    paths.sort();

    let mut arena = FabricArena::new();
    let mut fabric_ids = Vec::with_capacity(paths.len());
    for path in &paths {
        let img = image::open(path)?.to_rgba8();
        let id = arena.add_fabric(img, snapshot.config.sa, path.to_str().map(String::from), None);
        fabric_ids.push(id);
    }

    let mut bins = UserFabricBins::default();
    bins.create_bin_from_fabrics(&arena, &fabric_ids, Some("reconstructed".to_string()));

    let mut session = PackingSession::new(snapshot.config.clone(), arena, bins);
    let mut instructions = Vec::with_capacity(snapshot.chosen_options.len());
    for option in &snapshot.chosen_options {
        instructions.push(session.step(option)?);
    }

    let composite = session.composite().cloned().unwrap_or_else(|| compositing::new_canvas(1, 1));
    Ok((composite, instructions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BinFilter, OptionFilter, OptionRank};
    use image::Rgba;

    fn solid(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([40, 80, 120, 255]))
    }

    #[test]
    fn estimate_nbins_uses_sqrt_heuristic() {
        let mut arena = FabricArena::new();
        let ids: Vec<FabricId> = (0..9).map(|_| arena.add_fabric(solid(100, 100), 0, None, None)).collect();
        assert_eq!(estimate_nbins(&ids, BinCriterion::Length, BinEstimateMode::SquareRoot), 3);
        assert_eq!(
            estimate_nbins(&ids, BinCriterion::Length, BinEstimateMode::FixedSize { target_per_bin: 4 }),
            3
        );
        assert_eq!(estimate_nbins(&[], BinCriterion::Length, BinEstimateMode::SquareRoot), 0);
    }

    #[test]
    fn group_fabrics_returns_fixed_bins_verbatim_when_supplied() {
        let mut arena = FabricArena::new();
        let f1 = arena.add_fabric(solid(100, 100), 0, None, None);
        let f2 = arena.add_fabric(solid(200, 100), 0, None, None);
        let fixed = vec![vec![f1], vec![f2]];
        let out = group_fabrics(&arena, &[f1, f2], 2, BinCriterion::Length, Some(fixed.clone()));
        assert_eq!(out, fixed);
    }

    #[test]
    fn group_fabrics_by_length_covers_every_fabric_exactly_once() {
        let mut arena = FabricArena::new();
        let ids: Vec<FabricId> = [100u32, 200, 300, 400].iter().map(|&w| arena.add_fabric(solid(w, 50), 0, None, None)).collect();
        let groups = group_fabrics(&arena, &ids, 2, BinCriterion::Length, None);
        let mut seen: Vec<FabricId> = groups.into_iter().flatten().collect();
        seen.sort_by_key(|f| f.0);
        let mut expected = ids.clone();
        expected.sort_by_key(|f| f.0);
        assert_eq!(seen, expected);
    }

    #[test]
    fn option_to_strip_image_renders_and_keys_deterministically() {
        let mut arena = FabricArena::new();
        let f1 = arena.add_fabric(solid(250, 250), 25, None, None);
        let f2 = arena.add_fabric(solid(300, 250), 25, None, None);
        let mut bins = UserFabricBins::default();
        bins.create_bin_from_fabrics(&arena, &[f1, f2], None);

        let cfg = PackingConfig::default();
        let options = crate::orchestrator::next_packing_options(&cfg, &arena, &bins, None, 0, OptionRank::WastedArea, OptionFilter::None, &BinFilter::All).unwrap();
        let (strip_a, key_a) = option_to_strip_image(&cfg, &arena, 0, &options[0]).unwrap();
        let (strip_b, key_b) = option_to_strip_image(&cfg, &arena, 0, &options[0]).unwrap();
        assert_eq!(key_a, key_b, "the same option must always key the same");
        assert_eq!(strip_a.dimensions(), strip_b.dimensions());
    }

    #[test]
    fn reconstruct_high_res_replays_a_snapshot_to_completion() {
        let dir = std::env::temp_dir().join(format!("fabricpack-api-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        solid(250, 250).save(dir.join("a.png")).unwrap();
        solid(300, 250).save(dir.join("b.png")).unwrap();

        let mut arena = FabricArena::new();
        let f1 = arena.add_fabric(solid(250, 250), 25, None, None);
        let f2 = arena.add_fabric(solid(300, 250), 25, None, None);
        let mut bins = UserFabricBins::default();
        bins.create_bin_from_fabrics(&arena, &[f1, f2], None);
        let mut session = PackingSession::new(PackingConfig::default(), arena, bins);
        let options = session.options(OptionRank::WastedArea, OptionFilter::None, &BinFilter::All).unwrap();
        session.step(&options[0]).unwrap();
        let snapshot = session.snapshot();

        let (composite, instructions) = reconstruct_high_res(&snapshot, &dir).unwrap();
        assert_eq!(instructions.len(), 1);
        assert!(composite.dimensions().0 > 0 && composite.dimensions().1 > 0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
