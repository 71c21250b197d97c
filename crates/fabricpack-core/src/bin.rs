//! Bins: named subsets of edges that restrict the solver's search space.
//! A [`FabricBin`] precomputes the structures `find_best_subsets` needs
//! (an order matrix and pairwise color differences); [`FabricBins`] and
//! [`ColorFabricBins`] partition a fabric pool into bins by length or
//! hue; [`UserFabricBins`] adds the bulk re-bin/remove/update operations
//! the session layer needs between pack steps.
//!
//! Ground truth: `original_source/src/utils/bins.py`.

use crate::color::{cie1994_distance, circular_distance};
use crate::config::{BinFilter, Strategy};
use crate::error::{FabricPackError, Result};
use crate::model::{EdgeId, FabricArena, FabricId};
use crate::solver::{Objective, SubsetSumQuery, SubsetSumSolution, SubsetSumSolver};
use std::collections::HashMap;

/// A set of edges plus the structures the solver needs, rebuilt whenever
/// the edge list changes (spec.md §3 invariant: "after any mutation...
/// all precomputed structures are rebuilt before the next query").
#[derive(Debug, Clone)]
pub struct FabricBin {
    pub id: u32,
    pub name: String,
    pub edges: Vec<EdgeId>,
    pub min_length: u32,
    pub max_length: u32,
    /// `order[i][j] == true` iff `edges[i].length() <= edges[j].length()`.
    order: Vec<Vec<bool>>,
    /// CIE1994 distance between each cross-fabric pair of edges, indexed
    /// by position within `edges`.
    color_diffs: HashMap<(usize, usize), f32>,
    value_diffs: HashMap<(usize, usize), f32>,
    hue_diffs: HashMap<(usize, usize), f32>,
}

impl FabricBin {
    pub fn new(id: u32, name: String, edges: Vec<EdgeId>, arena: &FabricArena) -> Self {
        let mut bin = Self {
            id,
            name,
            edges,
            min_length: 0,
            max_length: 0,
            order: Vec::new(),
            color_diffs: HashMap::new(),
            value_diffs: HashMap::new(),
            hue_diffs: HashMap::new(),
        };
        bin.update_precomputed(arena);
        bin
    }

    /// Rebuilds `min_length`/`max_length`, the order matrix, and the
    /// pairwise color-difference maps from the current edge list. Called
    /// automatically on construction and must be called again after any
    /// direct mutation of `edges`.
    pub fn update_precomputed(&mut self, arena: &FabricArena) {
        let fabrics: Vec<FabricId> = {
            let mut ids: Vec<FabricId> = self.edges.iter().map(|&e| arena.edge(e).fabric).collect();
            ids.sort_by_key(|f| f.0);
            ids.dedup();
            ids
        };

        if fabrics.is_empty() {
            self.min_length = 0;
            self.max_length = 0;
        } else {
            self.max_length = fabrics
                .iter()
                .map(|&f| {
                    let rec = arena.fabric(f);
                    arena.length(rec.e1, true).max(arena.length(rec.e2, true))
                })
                .sum();
            self.min_length = fabrics
                .iter()
                .map(|&f| {
                    let rec = arena.fabric(f);
                    arena.length(rec.e1, true).min(arena.length(rec.e2, true))
                })
                .min()
                .unwrap_or(0);
        }

        let n = self.edges.len();
        self.order = vec![vec![false; n]; n];
        for i in 0..n {
            for j in 0..n {
                self.order[i][j] = arena.length(self.edges[i], true) <= arena.length(self.edges[j], true);
            }
        }

        self.color_diffs.clear();
        self.value_diffs.clear();
        self.hue_diffs.clear();
        for i in 0..n {
            for j in (i + 1)..n {
                let fi = arena.edge(self.edges[i]).fabric;
                let fj = arena.edge(self.edges[j]).fabric;
                if fi == fj {
                    self.color_diffs.insert((i, j), 0.0);
                    self.value_diffs.insert((i, j), 0.0);
                    self.hue_diffs.insert((i, j), 0.0);
                    continue;
                }
                let ri = arena.fabric(fi);
                let rj = arena.fabric(fj);
                self.color_diffs.insert((i, j), cie1994_distance(ri.color, rj.color));
                self.value_diffs.insert(
                    (i, j),
                    circular_distance(ri.dominant_color[2], rj.dominant_color[2]),
                );
                self.hue_diffs.insert(
                    (i, j),
                    circular_distance(ri.dominant_color[0], rj.dominant_color[0]),
                );
            }
        }
    }

    /// Whether this bin could possibly span `target_len` within half a
    /// threshold's slack on either side.
    pub fn can_afford(&self, target_len: u32, threshold: u32) -> bool {
        let slack = threshold / 2;
        self.min_length.saturating_sub(slack) <= target_len && target_len <= self.max_length + slack
    }

    pub fn find_best_subsets(
        &self,
        arena: &FabricArena,
        query: &SubsetSumQuery,
        solver: &dyn SubsetSumSolver,
    ) -> Vec<SubsetSumSolution> {
        solver.solve(&self.edges, arena, query)
    }
}

/// Ordered collection of bins with unique ids. Two flavors:
/// length-partitioned (the default `create_bins`) and hue-partitioned
/// (`ColorFabricBins`, below).
#[derive(Debug, Clone, Default)]
pub struct FabricBins {
    pub bins: Vec<FabricBin>,
    next_id: u32,
}

impl FabricBins {
    pub fn can_merge(&self) -> bool {
        self.bins.len() > 3
    }

    /// Pairwise-merges adjacent bins, halving the bin count (rounding up
    /// for an odd trailing bin). Ground truth: `FabricBins.merge_bins`.
    pub fn merge_bins(&mut self, arena: &FabricArena) {
        let mut merged = Vec::new();
        let mut i = 0;
        self.next_id = 0;
        while i < self.bins.len() {
            if i + 1 < self.bins.len() {
                let mut edges = self.bins[i].edges.clone();
                edges.extend(self.bins[i + 1].edges.clone());
                let id = self.next_id;
                self.next_id += 1;
                merged.push(FabricBin::new(id, format!("Bin {}", id + 1), edges, arena));
                i += 2;
            } else {
                merged.push(self.bins[i].clone());
                i += 1;
            }
        }
        self.bins = merged;
    }

    /// Partitions every fabric's two edges into `n` uniform length
    /// buckets spanning `[min_size or observed-min, max_size or
    /// observed-max]`. Ground truth: `FabricBins.create_bins`.
    pub fn create_bins(arena: &FabricArena, fabrics: &[FabricId], n: usize, min_size: Option<u32>, max_size: Option<u32>) -> Self {
        let edges: Vec<EdgeId> = fabrics.iter().flat_map(|&f| [arena.fabric(f).e1, arena.fabric(f).e2]).collect();
        let lengths: Vec<u32> = edges.iter().map(|&e| arena.length(e, true)).collect();
        let min_len = min_size.unwrap_or_else(|| lengths.iter().copied().min().unwrap_or(0)) as f64;
        let max_len = max_size.unwrap_or_else(|| lengths.iter().copied().max().unwrap_or(0)) as f64;
        let n = n.max(1);
        let step = if n > 0 { (max_len - min_len) / n as f64 } else { 0.0 };

        let mut buckets: Vec<Vec<EdgeId>> = vec![Vec::new(); n];
        for &edge in &edges {
            let len = arena.length(edge, true) as f64;
            for i in 0..n {
                let lo = min_len + step * i as f64;
                let hi = min_len + step * (i + 1) as f64;
                if len >= lo && len <= hi {
                    buckets[i].push(edge);
                    break;
                }
            }
        }

        let mut id = 0;
        let bins = buckets
            .into_iter()
            .filter(|b| !b.is_empty())
            .map(|edges| {
                let bin = FabricBin::new(id, format!("Bin {}", id + 1), edges, arena);
                id += 1;
                bin
            })
            .collect();
        Self { bins, next_id: id }
    }

    /// Selects bins whose `[min_length, max_length]` range can span
    /// `target_len`, merging adjacent bins and retrying if none qualify
    /// (spec.md §4.3 step 4).
    pub fn select_bins(&mut self, arena: &FabricArena, target_len: u32, threshold: u32, allow_merge: bool) -> Option<Vec<usize>> {
        loop {
            let valid: Vec<usize> = (0..self.bins.len()).filter(|&i| self.bins[i].can_afford(target_len, threshold)).collect();
            if !valid.is_empty() {
                return Some(valid);
            }
            if allow_merge && self.can_merge() {
                self.merge_bins(arena);
                continue;
            }
            return None;
        }
    }
}

/// A length-partitioned bin additionally tagged with the hue range it
/// was built from.
#[derive(Debug, Clone)]
pub struct ColorFabricBins {
    pub inner: FabricBins,
    pub hue_ranges: Vec<(f32, f32)>,
}

impl ColorFabricBins {
    /// Partitions fabrics into `n` uniform hue buckets using each
    /// fabric's dominant-color hue. Ground truth: `ColorFabricBins.create_bins`.
    pub fn create_bins(arena: &FabricArena, fabrics: &[FabricId], n: usize, min_hue: Option<f32>, max_hue: Option<f32>) -> Self {
        let hues: Vec<f32> = fabrics.iter().map(|&f| arena.fabric(f).dominant_color[0]).collect();
        let min_h = min_hue.unwrap_or_else(|| hues.iter().cloned().fold(f32::INFINITY, f32::min));
        let max_h = max_hue.unwrap_or_else(|| hues.iter().cloned().fold(f32::NEG_INFINITY, f32::max));
        let n = n.max(1);
        let step = (max_h - min_h) / n as f32;

        let mut buckets: Vec<Vec<EdgeId>> = vec![Vec::new(); n];
        let mut ranges = vec![(0.0f32, 0.0f32); n];
        for i in 0..n {
            ranges[i] = (min_h + step * i as f32, min_h + step * (i + 1) as f32);
        }
        for (&fid, &hue) in fabrics.iter().zip(&hues) {
            for i in 0..n {
                if hue >= ranges[i].0 && hue <= ranges[i].1 {
                    let rec = arena.fabric(fid);
                    buckets[i].push(rec.e1);
                    buckets[i].push(rec.e2);
                    break;
                }
            }
        }

        let mut id = 0;
        let mut hue_ranges = Vec::new();
        let bins = buckets
            .into_iter()
            .zip(ranges)
            .filter(|(b, _)| !b.is_empty())
            .map(|(edges, range)| {
                let bin = FabricBin::new(id, format!("Bin {}", id + 1), edges, arena);
                id += 1;
                hue_ranges.push(range);
                bin
            })
            .collect();
        Self {
            inner: FabricBins { bins, next_id: id },
            hue_ranges,
        }
    }
}

/// One record of a fabric trimmed during a pack step: its new raster
/// size and, when the trim produced more than one remnant, the extra
/// fresh-id fabrics to add alongside it.
#[derive(Debug, Clone)]
pub struct TrimmingRecord {
    pub fabric_id: FabricId,
    pub trimmed_high_res_size: Option<(u32, u32)>,
}

/// Bulk-editable bin container backing a live packing session: supports
/// replacing bins wholesale from a wire specification, removing a
/// specific fabric across all bins, and updating bins after a pack step
/// (spec.md §3 `UserFabricBins`).
#[derive(Debug, Clone, Default)]
pub struct UserFabricBins {
    pub inner: FabricBins,
}

impl UserFabricBins {
    pub fn create_bin_from_fabrics(&mut self, arena: &FabricArena, fabrics: &[FabricId], name: Option<String>) {
        if fabrics.is_empty() {
            return;
        }
        let edges: Vec<EdgeId> = fabrics.iter().flat_map(|&f| [arena.fabric(f).e1, arena.fabric(f).e2]).collect();
        let id = self.inner.next_id;
        self.inner.next_id += 1;
        let name = name.unwrap_or_else(|| format!("Bin {}", id + 1));
        self.inner.bins.push(FabricBin::new(id, name, edges, arena));
    }

    /// Removes every edge belonging to `fabric_id` from every bin,
    /// dropping bins left empty. Returns whether anything was removed
    /// and, if so, the removed fabric's raster size.
    pub fn remove_fabric(&mut self, arena: &FabricArena, fabric_id: FabricId) -> Option<(u32, u32)> {
        let mut removed_size = None;
        for bin in &mut self.inner.bins {
            let before = bin.edges.len();
            bin.edges.retain(|&e| arena.edge(e).fabric != fabric_id);
            if bin.edges.len() < before {
                removed_size = Some(arena.fabric(fabric_id).image.dimensions());
            }
        }
        self.inner.bins.retain(|b| !b.edges.is_empty());
        for bin in &mut self.inner.bins {
            bin.update_precomputed(arena);
        }
        removed_size
    }

    /// Removes consumed fabrics, keeps trimmed fabrics' edges in place
    /// (their lengths already updated in the arena by the caller), and
    /// rebuilds precomputed structures for every touched bin. Ground
    /// truth: `UserFabricBins.update_fabrics`.
    pub fn update_fabrics(&mut self, arena: &FabricArena, used_fabric_ids: &[FabricId], trimmed_fabric_ids: &[FabricId]) -> Result<()> {
        let used: std::collections::HashSet<u32> = used_fabric_ids.iter().map(|f| f.0).collect();
        let trimmed: std::collections::HashSet<u32> = trimmed_fabric_ids.iter().map(|f| f.0).collect();

        for bin in &mut self.inner.bins {
            bin.edges.retain(|&e| {
                let fid = arena.edge(e).fabric.0;
                !used.contains(&fid) || trimmed.contains(&fid)
            });
            bin.update_precomputed(arena);
        }
        Ok(())
    }

    /// Replaces the bin set wholesale from a wire specification. Every
    /// referenced fabric must already be present in the current bins;
    /// the point of this operation is to shuffle existing fabrics
    /// between bins, never to introduce new ones.
    pub fn update_bins(&mut self, arena: &FabricArena, specs: Vec<(Option<String>, Vec<FabricId>)>) -> Result<()> {
        let current = self.to_fabric_map(arena);
        for (_, fabrics) in &specs {
            for f in fabrics {
                if !current.contains(f) {
                    return Err(FabricPackError::BinUpdateFailure { fabric_id: f.0 });
                }
            }
        }
        self.inner.bins.clear();
        self.inner.next_id = 0;
        for (name, fabrics) in specs {
            self.create_bin_from_fabrics(arena, &fabrics, name);
        }
        Ok(())
    }

    /// Every fabric currently present in any bin.
    pub fn to_fabric_map(&self, arena: &FabricArena) -> std::collections::HashSet<FabricId> {
        let mut set = std::collections::HashSet::new();
        for bin in &self.inner.bins {
            for &e in &bin.edges {
                set.insert(arena.edge(e).fabric);
            }
        }
        set
    }
}

pub fn bin_filter_matches(filter: &BinFilter, bin: &FabricBin) -> bool {
    match filter {
        BinFilter::All => true,
        BinFilter::ById(ids) => ids.contains(&bin.id),
        BinFilter::UserSelected => true,
    }
}

/// Resolves a strategy-agnostic objective to the one the solver should
/// optimize for this step, given the configured ranking.
pub fn objective_for(strategy: Strategy, rank: crate::config::OptionRank) -> Objective {
    let _ = strategy;
    Objective::from(rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([10, 20, 30, 255]))
    }

    #[test]
    fn bin_can_afford_checks_length_range() {
        let mut arena = FabricArena::new();
        let f1 = arena.add_fabric(solid(200, 100), 0, None, None);
        let f2 = arena.add_fabric(solid(300, 100), 0, None, None);
        let edges = vec![arena.fabric(f1).e1, arena.fabric(f2).e1];
        let bin = FabricBin::new(0, "Bin 1".into(), edges, &arena);
        assert!(bin.can_afford(250, 100));
        assert!(!bin.can_afford(10_000, 0));
    }

    #[test]
    fn create_bins_partitions_by_length() {
        let mut arena = FabricArena::new();
        let mut fabrics = Vec::new();
        for w in [100, 200, 300, 400, 500] {
            fabrics.push(arena.add_fabric(solid(w, 50), 0, None, None));
        }
        let bins = FabricBins::create_bins(&arena, &fabrics, 5, None, None);
        assert!(!bins.bins.is_empty());
        let total_edges: usize = bins.bins.iter().map(|b| b.edges.len()).sum();
        assert_eq!(total_edges, fabrics.len() * 2);
    }

    #[test]
    fn merge_bins_halves_count() {
        let mut arena = FabricArena::new();
        let mut fabrics = Vec::new();
        for w in [50, 100, 150, 200, 250, 300, 350, 400] {
            fabrics.push(arena.add_fabric(solid(w, 50), 0, None, None));
        }
        let mut bins = FabricBins::create_bins(&arena, &fabrics, 8, None, None);
        let before = bins.bins.len();
        bins.merge_bins(&arena);
        assert!(bins.bins.len() <= before.div_ceil(2));
    }
}
