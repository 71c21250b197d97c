//! Session-wide packing configuration: the quilt strategy, DPI-derived
//! geometry constants, rail-fence scaffolding, and the tagged-variant
//! filters/rankings the solver and orchestrator dispatch on.
//!
//! Ground truth: `original_source/src/utils/config.py` (`PackingConfig`,
//! `PackingOption`) and `original_source/src/utils/filters.py` (rank/filter
//! class hierarchy, flattened here into enums per Design Notes §9).

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Quilt assembly strategy. Determines the strip attach-side order and
/// target-length alternation the strategy kernel uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    LogCabin,
    CourthouseSteps,
    RailFence,
}

impl FromStr for Strategy {
    type Err = crate::error::FabricPackError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "log-cabin" | "logcabin" => Ok(Self::LogCabin),
            "courthouse-steps" | "courthousesteps" => Ok(Self::CourthouseSteps),
            "rail-fence" | "railfence" => Ok(Self::RailFence),
            other => Err(crate::error::FabricPackError::InvalidStrategy(
                other.to_string(),
            )),
        }
    }
}

/// Ranking objective applied to a list of candidate `PackingOption`s,
/// mirroring `filters.py`'s rank classes as tagged variants (Design
/// Notes §9) instead of a class hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OptionRank {
    /// Ascending wasted area; the default.
    WastedArea,
    MaxThickness,
    MinThickness,
    HiFabricCount,
    LoFabricCount,
    LoContrast,
    HiContrast,
    LoValueContrast,
    HiValueContrast,
    LoHueContrast,
    HiHueContrast,
}

impl Default for OptionRank {
    fn default() -> Self {
        Self::WastedArea
    }
}

impl FromStr for OptionRank {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "wasted_area" => Ok(Self::WastedArea),
            "max_thickness" => Ok(Self::MaxThickness),
            "min_thickness" => Ok(Self::MinThickness),
            "hi_fabric_count" => Ok(Self::HiFabricCount),
            "lo_fabric_count" => Ok(Self::LoFabricCount),
            "lo_contrast" => Ok(Self::LoContrast),
            "hi_contrast" => Ok(Self::HiContrast),
            "lo_value_contrast" => Ok(Self::LoValueContrast),
            "hi_value_contrast" => Ok(Self::HiValueContrast),
            "lo_hue_contrast" => Ok(Self::LoHueContrast),
            "hi_hue_contrast" => Ok(Self::HiHueContrast),
            _ => Err(()),
        }
    }
}

/// Post-solve filter applied to candidate options before ranking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptionFilter {
    #[default]
    None,
    Thickness {
        min: Option<u32>,
        max: Option<u32>,
    },
}

/// Which bins `next_packing_options` should consider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BinFilter {
    #[default]
    All,
    ById(Vec<u32>),
    UserSelected,
}

/// Low- or high-res target lengths for the four rail-fence sides, filled
/// in progressively as blocks complete (§4.1's rail-fence state schedule).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TargetLengths {
    pub top: Option<u32>,
    pub right: Option<u32>,
    pub bottom: Option<u32>,
    pub left: Option<u32>,
}

/// Rail-fence scaffolding: per-side target lengths at both resolutions,
/// plus the two partially-assembled quadrant composites.
#[derive(Debug, Clone, Default)]
pub struct RailFenceState {
    pub start_length: Option<u32>,
    pub target_length: TargetLengths,
    pub target_length_high_res: TargetLengths,
    pub block12: Option<RgbaImage>,
    pub block12_size: Option<(u32, u32)>,
    pub block12_high_res_size: Option<(u32, u32)>,
    pub block34: Option<RgbaImage>,
    pub block34_size: Option<(u32, u32)>,
    pub block34_high_res_size: Option<(u32, u32)>,
}

/// Session-wide packing settings (spec.md §3 `PackingConfig`). DPI-derived
/// quantities (`sa`, `threshold`, `min_scrap_size`) are always recomputed
/// from `dpi` via [`PackingConfig::update_dpi`], never mutated directly,
/// so that `update_dpi(d); update_dpi(d0)` is exact regardless of the path
/// taken (spec.md §8 invariant 9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackingConfig {
    /// Pixels per inch. Default 100.
    pub dpi: u32,
    /// Seam allowance in pixels, derived from `dpi` (25px @ 100dpi).
    pub sa: u32,
    /// Minimum retained scrap size in pixels, derived from `dpi` (100px @ 100dpi).
    pub min_scrap_size: u32,
    /// Tolerance band around the target length, in pixels (100px @ 100dpi).
    pub threshold: u32,
    pub strategy: Strategy,
    /// Maximum number of options returned per step.
    pub max_options: usize,
    /// Allow 0/90 degree rotation when fitting an edge to a target length.
    pub allow_rotation: bool,
    #[serde(skip)]
    pub rail_fence: RailFenceState,
}

const BASE_DPI: u32 = 100;
const BASE_SA: u32 = 25;
const BASE_MIN_SCRAP: u32 = 100;
const BASE_THRESHOLD: u32 = 100;

fn scale_from_base(base: u32, dpi: u32) -> u32 {
    ((base as u64 * dpi as u64) / BASE_DPI as u64) as u32
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            dpi: BASE_DPI,
            sa: BASE_SA,
            min_scrap_size: BASE_MIN_SCRAP,
            threshold: BASE_THRESHOLD,
            strategy: Strategy::LogCabin,
            max_options: 20,
            allow_rotation: true,
            rail_fence: RailFenceState::default(),
        }
    }
}

impl PackingConfig {
    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::new()
    }

    /// Rescales `sa`, `threshold`, and `min_scrap_size` for a new DPI.
    /// Each quantity is recomputed fresh from its 100-dpi base value, so
    /// repeated calls are exact: `update_dpi(d); update_dpi(d0)` always
    /// restores the original values bit-for-bit.
    pub fn update_dpi(&mut self, dpi: u32) {
        self.dpi = dpi;
        self.sa = scale_from_base(BASE_SA, dpi);
        self.min_scrap_size = scale_from_base(BASE_MIN_SCRAP, dpi);
        self.threshold = scale_from_base(BASE_THRESHOLD, dpi);
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.dpi == 0 {
            return Err(crate::error::FabricPackError::InvalidConfig(
                "dpi must be non-zero".into(),
            ));
        }
        if self.max_options == 0 {
            return Err(crate::error::FabricPackError::InvalidConfig(
                "max_options must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`PackingConfig`].
#[derive(Debug, Default, Clone)]
pub struct PackingConfigBuilder {
    cfg: PackingConfig,
}

impl PackingConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: PackingConfig::default(),
        }
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.cfg.update_dpi(dpi);
        self
    }
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.cfg.strategy = strategy;
        self
    }
    pub fn max_options(mut self, n: usize) -> Self {
        self.cfg.max_options = n;
        self
    }
    pub fn allow_rotation(mut self, v: bool) -> Self {
        self.cfg.allow_rotation = v;
        self
    }
    pub fn start_length(mut self, v: u32) -> Self {
        self.cfg.rail_fence.start_length = Some(v);
        self
    }
    pub fn build(self) -> PackingConfig {
        self.cfg
    }
}

/// One candidate strip produced by the solver/orchestrator (spec.md §3
/// `PackingOption`). `edge_subset` is ordered; [`PackingOption::reorder`]
/// permutes it (and `other_dims` in lockstep) once the orchestrator
/// decides a placement order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackingOption {
    pub index: usize,
    pub edge_subset: Vec<crate::model::EdgeId>,
    /// Sibling-edge length minus `2*sa`, one per entry in `edge_subset`.
    pub other_dims: Vec<u32>,
    /// `min(other_dims)`: the strip thickness.
    pub shortest_side: u32,
    pub total_area: u64,
    pub wasted_area: u64,
    /// Thickness in pixels including the seam allowance, when tracked
    /// separately from `shortest_side` (high-res reconstruction).
    pub shortest_side_px: Option<u32>,
}

impl PackingOption {
    pub fn reorder(&mut self, order: &[usize]) {
        self.edge_subset = order.iter().map(|&i| self.edge_subset[i]).collect();
        self.other_dims = order.iter().map(|&i| self.other_dims[i]).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_roundtrip_restores_exact_values() {
        let mut cfg = PackingConfig::default();
        let (sa0, thr0, scrap0) = (cfg.sa, cfg.threshold, cfg.min_scrap_size);
        cfg.update_dpi(300);
        assert_eq!(cfg.sa, 75);
        cfg.update_dpi(100);
        assert_eq!((cfg.sa, cfg.threshold, cfg.min_scrap_size), (sa0, thr0, scrap0));
    }

    #[test]
    fn strategy_from_str_accepts_hyphen_and_underscore() {
        assert_eq!(Strategy::from_str("rail-fence").unwrap(), Strategy::RailFence);
        assert_eq!(Strategy::from_str("rail_fence").unwrap(), Strategy::RailFence);
        assert!(Strategy::from_str("nonsense").is_err());
    }

    #[test]
    fn option_rank_defaults_to_wasted_area() {
        assert_eq!(OptionRank::default(), OptionRank::WastedArea);
    }
}
