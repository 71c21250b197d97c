//! Core library for packing a pool of fabric scraps into a single
//! rectangular composite, following a quilt assembly strategy (log-cabin,
//! courthouse-steps, or rail-fence).
//!
//! - Strategy kernel (`strategy`): pure functions indexed by `(Strategy, iter)`
//!   computing attach sides, target lengths, and trim/crop geometry.
//! - Bin solver (`solver`, `bin`): a constrained subset-sum search over
//!   fabric edges, grouped into bins to bound the search space.
//! - Orchestrator (`orchestrator`, `railfence`): drives one packing step
//!   from candidate options to a realized, composited strip.
//! - `session`: the stateful, steppable, undoable wrapper a caller holds
//!   between requests.
//!
//! Quick example:
//! ```ignore
//! use fabricpack_core::prelude::*;
//!
//! let mut arena = FabricArena::new();
//! let f1 = arena.add_fabric(img1, 25, None, None);
//! let f2 = arena.add_fabric(img2, 25, None, None);
//! let mut bins = UserFabricBins::default();
//! bins.create_bin_from_fabrics(&arena, &[f1, f2], None);
//!
//! let mut session = PackingSession::new(PackingConfig::default(), arena, bins);
//! let options = session.options(OptionRank::WastedArea, OptionFilter::None, &BinFilter::All)?;
//! let instruction = session.step(&options[0])?;
//! # Ok::<(), FabricPackError>(())
//! ```

pub mod api;
pub mod bin;
pub mod color;
pub mod compositing;
pub mod config;
pub mod error;
pub mod geometry;
pub mod model;
pub mod orchestrator;
pub mod railfence;
pub mod session;
pub mod solver;
pub mod strategy;

/// Convenience prelude for common types and functions.
/// Importing `fabricpack_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::api::{
        estimate_nbins, group_fabrics, load_bins, option_to_strip_image, reconstruct_high_res, BinCriterion,
        BinEstimateMode, BinSpecEntry, FabricSpecEntry,
    };
    pub use crate::bin::{ColorFabricBins, FabricBin, FabricBins, UserFabricBins};
    pub use crate::config::{
        BinFilter, OptionFilter, OptionRank, PackingConfig, PackingConfigBuilder, PackingOption, Strategy,
    };
    pub use crate::error::{FabricPackError, Result};
    pub use crate::geometry::{ImageShape, Rect, Side};
    pub use crate::model::{EdgeId, FabricArena, FabricId};
    pub use crate::orchestrator::{pack_with_option, next_packing_options, PackStepResult};
    pub use crate::session::{Instruction, PackingSession, SessionSnapshot};
    pub use crate::solver::{DpSolver, Objective, SubsetSumSolver};
}
