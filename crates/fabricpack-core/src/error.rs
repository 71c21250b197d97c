use thiserror::Error;

/// Errors surfaced by the packing core. None of the public operations in
/// [`crate::orchestrator`] or [`crate::session`] swallow a failure; every
/// non-local condition is one of these variants.
#[derive(Debug, Error)]
pub enum FabricPackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No bin yields any subset within tolerance, even after merging.
    #[error("no feasible packing option for target length {target_len} (tolerance {threshold}) after checking {bins_checked} bin(s)")]
    NoFeasibleOption {
        target_len: u32,
        threshold: u32,
        bins_checked: usize,
    },

    /// The rail-fence driver has reached its terminal iteration (12).
    #[error("rail-fence strategy is done at iteration {iter} (max {max_iter})")]
    StrategyDone { iter: u32, max_iter: u32 },

    #[error("invalid strategy tag: '{0}'")]
    InvalidStrategy(String),

    /// A fabric's rotated edge does not equal the selected edge length.
    /// Indicates a bug upstream; fails fast with full context.
    #[error("dimension mismatch at iter {iter} ({strategy:?}): edge length {edge_len} does not match either side of fabric {fabric_w}x{fabric_h}")]
    DimensionMismatch {
        iter: u32,
        strategy: crate::config::Strategy,
        edge_len: u32,
        fabric_w: u32,
        fabric_h: u32,
    },

    /// A bulk re-bin payload referenced a fabric id not currently present.
    #[error("bin update failed: fabric id {fabric_id} not found in any bin")]
    BinUpdateFailure { fabric_id: u32 },

    /// The solver exhausted its time limit with no feasible solution.
    /// Treated as [`FabricPackError::NoFeasibleOption`] by callers.
    #[error("solver timed out after {time_limit_ms}ms with no feasible solution")]
    SolverTimeout { time_limit_ms: u64 },
}

pub type Result<T> = std::result::Result<T, FabricPackError>;
