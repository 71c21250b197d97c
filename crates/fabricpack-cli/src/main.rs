//! Batch driver for `fabricpack-core`: loads a directory of fabric
//! images, runs the packing session to completion by always choosing the
//! best-ranked option (a greedy batch policy — there is no interactive
//! chooser here), and writes the composite PNG plus a JSON trace of the
//! instructions taken at every step.

use anyhow::{bail, Context, Result};
use clap::Parser;
use fabricpack_core::config::{OptionFilter, Strategy};
use fabricpack_core::prelude::*;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "fabricpack", version, about = "Pack a directory of fabric scraps into a composite quilt strip")]
struct Cli {
    /// Directory of input fabric images (png/jpg/jpeg).
    input_dir: PathBuf,

    /// Output composite PNG path.
    #[arg(short, long, default_value = "composite.png")]
    output: PathBuf,

    /// Optional path to write a JSON trace of every step's instruction.
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Optional YAML file with a serialized `PackingConfig`. CLI flags
    /// below override individual fields on top of it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Quilt strategy: log-cabin, courthouse-steps, or rail-fence.
    #[arg(long)]
    strategy: Option<String>,

    /// Pixels per inch.
    #[arg(long)]
    dpi: Option<u32>,

    /// Maximum candidate options considered per step.
    #[arg(long)]
    max_options: Option<usize>,

    /// Ranking used to choose among candidate options each step.
    #[arg(long, default_value = "wasted_area")]
    rank: String,

    /// Allow 0/90 degree rotation when fitting a fabric to an edge length.
    #[arg(long)]
    allow_rotation: Option<bool>,

    /// Cap the number of steps taken, regardless of strategy completion.
    #[arg(long)]
    max_steps: Option<u32>,
}

fn load_config(cli: &Cli) -> Result<PackingConfig> {
    let mut cfg = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => PackingConfig::default(),
    };
    if let Some(dpi) = cli.dpi {
        cfg.update_dpi(dpi);
    }
    if let Some(strategy) = &cli.strategy {
        cfg.strategy = Strategy::from_str(strategy).map_err(|e| anyhow::anyhow!("{e}"))?;
    }
    if let Some(max_options) = cli.max_options {
        cfg.max_options = max_options;
    }
    if let Some(allow_rotation) = cli.allow_rotation {
        cfg.allow_rotation = allow_rotation;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn load_fabrics(dir: &std::path::Path, sa: u32, arena: &mut FabricArena) -> Result<Vec<FabricId>> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            matches!(
                e.path().extension().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase()).as_deref(),
                Some("png" | "jpg" | "jpeg")
            )
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();

    if paths.is_empty() {
        bail!("no png/jpg fabric images found under {}", dir.display());
    }

    let mut ids = Vec::with_capacity(paths.len());
    for path in &paths {
        let img = image::open(path).with_context(|| format!("loading {}", path.display()))?.to_rgba8();
        let id = arena.add_fabric(img, sa, path.to_str().map(String::from), None);
        ids.push(id);
    }
    info!(count = ids.len(), "loaded fabrics");
    Ok(ids)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    let rank = OptionRank::from_str(&cli.rank).map_err(|_| anyhow::anyhow!("unknown rank '{}'", cli.rank))?;

    let mut arena = FabricArena::new();
    let fabric_ids = load_fabrics(&cli.input_dir, cfg.sa, &mut arena)?;

    let mut bins = UserFabricBins::default();
    bins.create_bin_from_fabrics(&arena, &fabric_ids, Some("all".to_string()));

    let mut session = PackingSession::new(cfg, arena, bins);
    let mut trace = Vec::new();
    let max_steps = cli.max_steps.unwrap_or(u32::MAX);

    loop {
        if session.iter() >= max_steps {
            info!(iter = session.iter(), "stopping at max_steps");
            break;
        }
        let options = match session.options(rank, OptionFilter::None, &BinFilter::All) {
            Ok(opts) if !opts.is_empty() => opts,
            Ok(_) => {
                info!(iter = session.iter(), "no candidate options remain");
                break;
            }
            Err(FabricPackError::StrategyDone { iter, max_iter }) => {
                info!(iter, max_iter, "strategy complete");
                break;
            }
            Err(FabricPackError::NoFeasibleOption { target_len, threshold, bins_checked }) => {
                warn!(target_len, threshold, bins_checked, "no feasible option this step, stopping");
                break;
            }
            Err(e) => return Err(e.into()),
        };
        let instruction = session.step(&options[0])?;
        info!(iter = instruction.iter, side = %instruction.attach_side, wasted = instruction.wasted_area, "packed strip");
        trace.push(instruction);
    }

    session.save_composite(&cli.output)?;
    info!(path = %cli.output.display(), "wrote composite");

    if let Some(trace_path) = &cli.trace {
        let json = serde_json::to_string_pretty(&trace)?;
        std::fs::write(trace_path, json).with_context(|| format!("writing trace {}", trace_path.display()))?;
        info!(path = %trace_path.display(), "wrote trace");
    }

    let (used, wasted) = session.totals();
    println!("steps: {}  used_area: {used}  wasted_area: {wasted}", session.iter());
    Ok(())
}
