//! [`PackingSession`]: the stateful, steppable, undoable wrapper around
//! the orchestrator that an interactive caller (a CLI batch driver, or
//! eventually a server handler) actually holds onto between requests.
//!
//! Ground truth: the teacher's `AtlasSession` (`runtime.rs`), adapted from
//! "accumulate placed rects into a runtime atlas" to "accumulate packed
//! strips into a growing composite, with a one-slot undo".

use crate::bin::UserFabricBins;
use crate::config::{BinFilter, OptionFilter, OptionRank, PackingConfig, PackingOption, Strategy};
use crate::error::Result;
use crate::geometry::ImageShape;
use crate::model::{FabricArena, FabricId};
use crate::orchestrator::{self, PackStepResult};
use crate::railfence;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// Serializes writes to any output path a session writes to, mirroring
/// the teacher's page-write serialization in its pipeline, generalized
/// here since a session writes one preview per step rather than once
/// per run.
static WRITE_LOCK: Mutex<()> = Mutex::new(());

/// A realized step, returned from [`PackingSession::step`] in a form that
/// can be traced to a log or a JSON file without carrying raw pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub iter: u32,
    pub attach_side: String,
    pub thickness: u32,
    pub used_fabric_ids: Vec<u32>,
    pub trimmed_fabric_ids: Vec<u32>,
    pub wasted_area: u64,
    pub used_area: u64,
    pub composite_width: u32,
    pub composite_height: u32,
}

impl From<&PackStepResult> for Instruction {
    fn from(r: &PackStepResult) -> Self {
        Self {
            iter: r.iter,
            attach_side: format!("{:?}", r.attach_side).to_ascii_lowercase(),
            thickness: r.thickness,
            used_fabric_ids: r.used_fabric_ids.iter().map(|f| f.0).collect(),
            trimmed_fabric_ids: r.trimmed_fabric_ids.iter().map(|f| f.0).collect(),
            wasted_area: r.wasted_area,
            used_area: r.used_area,
            composite_width: r.composite_shape.w,
            composite_height: r.composite_shape.h,
        }
    }
}

/// A metadata-only snapshot of a session, serde-serializable so the
/// format round-trips losslessly (spec.md §6). The composite raster
/// itself is not embedded; callers that need pixel-perfect undo across a
/// process boundary should also persist the composite PNG alongside this.
/// `chosen_options` is the ordered list of options realized so far —
/// together with `config` and a fresh load of the original fabric
/// folder, it is everything [`crate::api::reconstruct_high_res`] needs to
/// replay a session from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub config: PackingConfig,
    pub iter: u32,
    pub wasted_total: u64,
    pub used_total: u64,
    pub composite_width: u32,
    pub composite_height: u32,
    pub chosen_options: Vec<PackingOption>,
}

/// One-slot undo state: a full deep copy of everything `step` mutates,
/// taken before the mutation (Design Notes §9: "undo is a deep copy, not
/// an inverse operation").
#[derive(Clone)]
struct UndoState {
    arena: FabricArena,
    bins: UserFabricBins,
    composite: Option<RgbaImage>,
    composite_shape: Option<ImageShape>,
    iter: u32,
    wasted_total: u64,
    used_total: u64,
    history_len: usize,
}

/// Owns everything a live packing session needs between requests: the
/// config, the fabric/edge arena, the current bins, the growing
/// composite, and running totals. `step`/`options` are the only ways to
/// advance it; `undo` restores the state from immediately before the
/// last `step`.
pub struct PackingSession {
    pub config: PackingConfig,
    arena: FabricArena,
    bins: UserFabricBins,
    composite: Option<RgbaImage>,
    composite_shape: Option<ImageShape>,
    iter: u32,
    wasted_total: u64,
    used_total: u64,
    /// Every option realized so far, in order. Replayed by
    /// [`crate::api::reconstruct_high_res`]; trimmed back to its
    /// pre-step length on [`Self::undo`] alongside everything else.
    history: Vec<PackingOption>,
    undo: Option<UndoState>,
}

impl PackingSession {
    pub fn new(config: PackingConfig, arena: FabricArena, bins: UserFabricBins) -> Self {
        Self {
            config,
            arena,
            bins,
            composite: None,
            composite_shape: None,
            iter: 0,
            wasted_total: 0,
            used_total: 0,
            history: Vec::new(),
            undo: None,
        }
    }

    /// Every option realized so far, in chosen order.
    pub fn history(&self) -> &[PackingOption] {
        &self.history
    }

    pub fn arena(&self) -> &FabricArena {
        &self.arena
    }

    pub fn bins(&self) -> &UserFabricBins {
        &self.bins
    }

    pub fn bins_mut(&mut self) -> &mut UserFabricBins {
        &mut self.bins
    }

    pub fn composite(&self) -> Option<&RgbaImage> {
        self.composite.as_ref()
    }

    pub fn iter(&self) -> u32 {
        self.iter
    }

    pub fn totals(&self) -> (u64, u64) {
        (self.used_total, self.wasted_total)
    }

    /// Lists candidate strips for the current step.
    pub fn options(&mut self, rank: OptionRank, filter: OptionFilter, bin_filter: &BinFilter) -> Result<Vec<PackingOption>> {
        self.sync_rail_fence_boundary();
        orchestrator::next_packing_options(&self.config, &self.arena, &self.bins, self.composite_shape, self.iter, rank, filter, bin_filter)
    }

    /// At the rail-fence block2/block3 boundary (iter 6), stashes the
    /// just-completed top+right half as `block12`, derives the
    /// bottom+left half's target length from its width, and resets the
    /// composite so the second half assembles independently. Idempotent:
    /// a second call once `block12` is stashed is a no-op.
    ///
    /// Ground truth: `original_source/src/utils/bin_pack_api.py::bin_pack_rail_fence`'s
    /// `target_L['bottom'] = block12.size[0] - config.target_L['top'] + 2 * config.sa`.
    fn sync_rail_fence_boundary(&mut self) {
        if self.config.strategy != Strategy::RailFence || self.iter != 6 || self.config.rail_fence.block12.is_some() {
            return;
        }
        let (Some(composite), Some(shape)) = (self.composite.take(), self.composite_shape.take()) else {
            return;
        };
        let top_target = self.config.rail_fence.start_length.unwrap_or(shape.w);
        self.config.rail_fence.target_length.bottom = Some((shape.w + 2 * self.config.sa).saturating_sub(top_target));
        self.config.rail_fence.block12_size = Some((shape.w, shape.h));
        self.config.rail_fence.block12 = Some(composite);
    }

    /// After the bottom+left half finishes (iter 12), joins it beneath
    /// the stashed top+right half into the final rail-fence composite.
    /// A no-op for every other strategy, or if called more than once.
    fn maybe_join_rail_fence_halves(&mut self) {
        if self.config.strategy != Strategy::RailFence || self.iter < 12 {
            return;
        }
        let Some(block12) = self.config.rail_fence.block12.take() else {
            return;
        };
        let Some(block34) = self.composite.take() else {
            return;
        };
        let joined = railfence::compose_blocks(&block12, &block34, self.config.sa);
        let (w, h) = joined.dimensions();
        self.composite_shape = Some(ImageShape::new(0, 0, w, h));
        self.composite = Some(joined);
    }

    /// Realizes `option`, growing the composite and advancing the
    /// iteration counter. Snapshots the prior state first so [`undo`] can
    /// restore it.
    pub fn step(&mut self, option: &PackingOption) -> Result<Instruction> {
        self.sync_rail_fence_boundary();
        self.undo = Some(UndoState {
            arena: self.arena.clone(),
            bins: self.bins.clone(),
            composite: self.composite.clone(),
            composite_shape: self.composite_shape,
            iter: self.iter,
            wasted_total: self.wasted_total,
            used_total: self.used_total,
            history_len: self.history.len(),
        });

        let result = orchestrator::pack_with_option(
            &self.config,
            &mut self.arena,
            &mut self.bins,
            self.composite.as_ref(),
            self.composite_shape,
            self.iter,
            option,
        )?;

        self.wasted_total += result.wasted_area;
        self.used_total += result.used_area;
        self.iter = result.iter;
        self.composite_shape = Some(result.composite_shape);
        let mut instruction = Instruction::from(&result);
        self.composite = Some(result.composite);
        self.history.push(option.clone());

        self.maybe_join_rail_fence_halves();
        if let Some(shape) = self.composite_shape {
            instruction.composite_width = shape.w;
            instruction.composite_height = shape.h;
        }
        Ok(instruction)
    }

    /// Restores the state from immediately before the last `step`. A
    /// second consecutive call with nothing stepped in between is a
    /// no-op returning `false`.
    pub fn undo(&mut self) -> bool {
        let Some(state) = self.undo.take() else {
            return false;
        };
        self.arena = state.arena;
        self.bins = state.bins;
        self.composite = state.composite;
        self.composite_shape = state.composite_shape;
        self.iter = state.iter;
        self.wasted_total = state.wasted_total;
        self.used_total = state.used_total;
        self.history.truncate(state.history_len);
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (w, h) = self.composite_shape.map(|s| (s.w, s.h)).unwrap_or((0, 0));
        SessionSnapshot {
            config: self.config.clone(),
            iter: self.iter,
            wasted_total: self.wasted_total,
            used_total: self.used_total,
            composite_width: w,
            composite_height: h,
            chosen_options: self.history.clone(),
        }
    }

    pub fn remove_fabric(&mut self, fabric_id: FabricId) -> Option<(u32, u32)> {
        self.bins.remove_fabric(&self.arena, fabric_id)
    }

    /// Saves the current composite to `path`, serializing concurrent
    /// writers to the same process against accidental interleaved writes.
    pub fn save_composite(&self, path: &Path) -> Result<()> {
        let _guard = WRITE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(composite) = &self.composite {
            composite.save(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([5, 5, 5, 255]))
    }

    #[test]
    fn undo_restores_iter_and_totals() {
        let mut arena = FabricArena::new();
        let f1 = arena.add_fabric(solid(250, 250), 25, None, None);
        let f2 = arena.add_fabric(solid(300, 250), 25, None, None);
        let mut bins = UserFabricBins::default();
        bins.create_bin_from_fabrics(&arena, &[f1, f2], None);

        let mut session = PackingSession::new(PackingConfig::default(), arena, bins);
        let options = session.options(OptionRank::WastedArea, OptionFilter::None, &BinFilter::All).unwrap();
        session.step(&options[0]).unwrap();
        assert_eq!(session.iter(), 1);

        assert!(session.undo());
        assert_eq!(session.iter(), 0);
        assert!(session.composite().is_none());
        assert!(session.history().is_empty(), "undo must also roll back the option history");
        assert!(!session.undo());
    }

    #[test]
    fn snapshot_carries_chosen_option_history() {
        let mut arena = FabricArena::new();
        let f1 = arena.add_fabric(solid(250, 250), 25, None, None);
        let f2 = arena.add_fabric(solid(300, 250), 25, None, None);
        let mut bins = UserFabricBins::default();
        bins.create_bin_from_fabrics(&arena, &[f1, f2], None);

        let mut session = PackingSession::new(PackingConfig::default(), arena, bins);
        let options = session.options(OptionRank::WastedArea, OptionFilter::None, &BinFilter::All).unwrap();
        session.step(&options[0]).unwrap();

        let snap = session.snapshot();
        assert_eq!(snap.chosen_options.len(), 1);
        assert_eq!(session.history().len(), 1);

        let json = serde_json::to_string(&snap).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.chosen_options.len(), snap.chosen_options.len());
    }

    #[test]
    fn rail_fence_boundary_stashes_block12_and_resets_composite() {
        let mut arena = FabricArena::new();
        let f1 = arena.add_fabric(solid(350, 150), 25, None, None);
        let mut bins = UserFabricBins::default();
        bins.create_bin_from_fabrics(&arena, &[f1], None);

        let mut cfg = PackingConfig::default();
        cfg.strategy = Strategy::RailFence;
        let mut session = PackingSession::new(cfg, arena, bins);

        // fake having already advanced through blocks 0-1 by setting the
        // iteration counter directly and seeding a composite, rather than
        // driving six real steps through a single fabric's edges.
        session.iter = 6;
        session.composite = Some(solid(300, 200));
        session.composite_shape = Some(ImageShape::new(0, 0, 300, 200));

        session.sync_rail_fence_boundary();

        assert!(session.composite().is_none(), "composite resets so the bottom+left half starts fresh");
        assert!(session.config.rail_fence.block12.is_some());
        assert_eq!(session.config.rail_fence.block12_size, Some((300, 200)));
        assert!(session.config.rail_fence.target_length.bottom.is_some());

        // calling it again at the same iteration is a no-op
        session.composite = Some(solid(1, 1));
        session.sync_rail_fence_boundary();
        assert!(session.composite().is_some(), "a second call past the boundary must not reset an in-progress composite again");
    }
}
