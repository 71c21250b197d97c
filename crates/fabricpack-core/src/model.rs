//! The fabric/edge data model: an arena of fabrics and their two
//! orthogonal edges, addressed by stable integer ids rather than the
//! cyclic object references the original implementation used (Design
//! Notes §9). Ground truth: `original_source/src/utils/bins.py`'s
//! `Fabric`/`Edge` classes.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Seam allowance baked into every high-resolution edge length in the
/// original project's default (100 dpi) configuration: `2 * 25`. Kept as
/// a named constant rather than the literal `50` that appears throughout
/// `pack.py`/`bins.py`.
pub const DEFAULT_HIGH_RES_SA: u32 = 25;

/// Stable index into a [`FabricArena`]'s fabric table. Never reused: a
/// trimmed fabric keeps its id, and a fabric split into multiple remnants
/// allocates a fresh id for every remnant beyond the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FabricId(pub u32);

/// Stable index into a [`FabricArena`]'s edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub fabric: FabricId,
    pub sibling: EdgeId,
    pub is_e1: bool,
    length: u32,
    high_res_length: Option<u32>,
}

impl EdgeRecord {
    /// The edge's own length; prefers the high-res length when present,
    /// matching `Edge.length(use_high_res=True)` in `bins.py`.
    pub fn length(&self, use_high_res: bool) -> u32 {
        if use_high_res {
            self.high_res_length.unwrap_or(self.length)
        } else {
            self.length
        }
    }
}

#[derive(Debug, Clone)]
pub struct FabricRecord {
    /// Stable id (equal to the `FabricId` index that owns this record).
    pub id: FabricId,
    pub image: RgbaImage,
    pub image_path: Option<String>,
    pub high_res_image_size: Option<(u32, u32)>,
    /// Mean RGB in `[0, 1]`.
    pub color: [f32; 3],
    /// Dominant color as `[hue, saturation, value]` in `[0, 1]` (most
    /// frequent coarsely-quantized bucket; see [`crate::color::dominant_color`]).
    pub dominant_color: [f32; 3],
    pub e1: EdgeId,
    pub e2: EdgeId,
}

/// Owns every fabric and edge ever created in a session. Bins and the
/// orchestrator hold `EdgeId`/`FabricId` handles into this arena instead
/// of object references, so there is no cyclic ownership to model.
#[derive(Debug, Clone, Default)]
pub struct FabricArena {
    fabrics: Vec<FabricRecord>,
    edges: Vec<EdgeRecord>,
}

impl FabricArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new fabric from a loaded raster. `sa` is the seam
    /// allowance subtracted from each raw raster dimension to get the
    /// low-res edge lengths (`bins.py::Fabric.__init__`).
    pub fn add_fabric(
        &mut self,
        image: RgbaImage,
        sa: u32,
        image_path: Option<String>,
        high_res_image_size: Option<(u32, u32)>,
    ) -> FabricId {
        let (w, h) = image.dimensions();
        let color = crate::color::mean_color(&image);
        let dominant_color = crate::color::dominant_color(&image);

        let fabric_idx = self.fabrics.len() as u32;
        let fid = FabricId(fabric_idx);

        let e1_len = w.saturating_sub(2 * sa);
        let e2_len = h.saturating_sub(2 * sa);
        let (e1_hi, e2_hi) = match high_res_image_size {
            Some((hw, hh)) => (
                Some(hw.saturating_sub(2 * DEFAULT_HIGH_RES_SA)),
                Some(hh.saturating_sub(2 * DEFAULT_HIGH_RES_SA)),
            ),
            None => (None, None),
        };

        let e1_id = EdgeId(self.edges.len() as u32);
        self.edges.push(EdgeRecord {
            fabric: fid,
            sibling: EdgeId(e1_id.0 + 1),
            is_e1: true,
            length: e1_len,
            high_res_length: e1_hi,
        });
        let e2_id = EdgeId(self.edges.len() as u32);
        self.edges.push(EdgeRecord {
            fabric: fid,
            sibling: e1_id,
            is_e1: false,
            length: e2_len,
            high_res_length: e2_hi,
        });

        self.fabrics.push(FabricRecord {
            id: fid,
            image,
            image_path,
            high_res_image_size,
            color,
            dominant_color,
            e1: e1_id,
            e2: e2_id,
        });
        fid
    }

    /// Clones an existing fabric's raster/color data under a fresh id,
    /// used when a single trimming step yields more than one remnant.
    pub fn clone_fabric_with_fresh_id(&mut self, fabric: FabricId, sa: u32) -> FabricId {
        let image = self.fabric(fabric).image.clone();
        let path = self.fabric(fabric).image_path.clone();
        let hi = self.fabric(fabric).high_res_image_size;
        self.add_fabric(image, sa, path, hi)
    }

    pub fn fabric(&self, id: FabricId) -> &FabricRecord {
        &self.fabrics[id.0 as usize]
    }

    pub fn edge(&self, id: EdgeId) -> &EdgeRecord {
        &self.edges[id.0 as usize]
    }

    pub fn sibling(&self, id: EdgeId) -> EdgeId {
        self.edges[id.0 as usize].sibling
    }

    /// The sibling edge's length: the fabric dimension orthogonal to the
    /// edge `id` (`Edge.get_other_dim` in `bins.py`).
    pub fn other_dim(&self, id: EdgeId, use_high_res: bool) -> u32 {
        self.edge(self.sibling(id)).length(use_high_res)
    }

    pub fn length(&self, id: EdgeId, use_high_res: bool) -> u32 {
        self.edge(id).length(use_high_res)
    }

    /// Replaces a fabric's raster after trimming, recomputing color and
    /// both edge lengths while preserving the sibling relationship.
    /// Ground truth: `bins.py::Fabric.update_after_trimming`.
    pub fn update_after_trimming(
        &mut self,
        fabric: FabricId,
        trimmed: RgbaImage,
        sa: u32,
        high_res_image_size: Option<(u32, u32)>,
    ) {
        let color = crate::color::mean_color(&trimmed);
        let (w, h) = trimmed.dimensions();
        let e1 = self.fabrics[fabric.0 as usize].e1;
        let e2 = self.fabrics[fabric.0 as usize].e2;

        self.edges[e1.0 as usize].length = w.saturating_sub(2 * sa);
        self.edges[e2.0 as usize].length = h.saturating_sub(2 * sa);
        if let Some((hw, hh)) = high_res_image_size {
            self.edges[e1.0 as usize].high_res_length =
                Some(hw.saturating_sub(2 * DEFAULT_HIGH_RES_SA));
            self.edges[e2.0 as usize].high_res_length =
                Some(hh.saturating_sub(2 * DEFAULT_HIGH_RES_SA));
        }

        let rec = &mut self.fabrics[fabric.0 as usize];
        rec.image = trimmed;
        rec.color = color;
        rec.high_res_image_size = high_res_image_size.or(rec.high_res_image_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(px))
    }

    #[test]
    fn edges_are_siblings_and_lengths_subtract_seam_allowance() {
        let mut arena = FabricArena::new();
        let fid = arena.add_fabric(solid(200, 100, [10, 10, 10, 255]), 25, None, None);
        let f = arena.fabric(fid);
        assert_eq!(arena.length(f.e1, false), 150);
        assert_eq!(arena.length(f.e2, false), 50);
        assert_eq!(arena.sibling(f.e1), f.e2);
        assert_eq!(arena.sibling(f.e2), f.e1);
        assert_eq!(arena.other_dim(f.e1, false), 50);
    }

    #[test]
    fn trimming_updates_lengths_and_preserves_siblings() {
        let mut arena = FabricArena::new();
        let fid = arena.add_fabric(solid(200, 100, [0, 0, 0, 255]), 25, None, None);
        arena.update_after_trimming(fid, solid(120, 100, [0, 0, 0, 255]), 25, None);
        let f = arena.fabric(fid);
        assert_eq!(arena.length(f.e1, false), 70);
        assert_eq!(arena.sibling(f.e1), f.e2);
    }
}
