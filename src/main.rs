//! mapsched Command Line Interface
//!
//! Usage:
//!   mapsched [OPTIONS] [FILE]
//!   mapsched --help
//!
//! Examples:
//!   mapsched fragment.json                        # Enumerate a fragment stored as JSON
//!   mapsched --kernel matmul --size 256 --limit 20  # Built-in kernel, first 20 candidates
//!   mapsched --kernel scale --resume 0,1,2,0,0      # Start at a coordinate
//!   mapsched --kernel stencil --checkpoint run.json # Record progress
//!   mapsched --kernel stencil --resume-from run.json  # Continue after the checkpoint

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use mapsched::autotuning::{Checkpoint, Coordinate, EnumeratorConfig, MapScheduleEnumerator, Outcome};
use mapsched::ir::{Fragment, Kernel};
use std::fs;
use std::path::PathBuf;

/// mapsched - Map-Schedule Enumerator
#[derive(Parser, Debug)]
#[command(name = "mapsched")]
#[command(version)]
#[command(about = "Enumerates legal map-nest schedules of a dataflow fragment", long_about = None)]
struct Cli {
    /// Fragment to enumerate (JSON)
    #[arg(value_name = "FILE", required_unless_present = "kernel", conflicts_with = "kernel")]
    input: Option<PathBuf>,

    /// Use a built-in kernel instead of a file
    #[arg(short, long)]
    kernel: Option<KernelArg>,

    /// Problem size of the built-in kernel
    #[arg(short = 'n', long, default_value = "64")]
    size: i64,

    /// Start at this coordinate, inclusive (e.g. 0,1,0,2,1)
    #[arg(long, value_name = "C", conflicts_with = "resume_from")]
    resume: Option<Coordinate>,

    /// Continue after the coordinate recorded in a checkpoint file
    #[arg(long, value_name = "CHECKPOINT")]
    resume_from: Option<PathBuf>,

    /// Write a checkpoint after every candidate
    #[arg(long, value_name = "FILE")]
    checkpoint: Option<PathBuf>,

    /// Stop after this many candidates
    #[arg(short, long)]
    limit: Option<usize>,

    /// Smallest tile exponent (tile size 2^k)
    #[arg(long, default_value = "0")]
    min_tile_exp: u32,

    /// Largest tile exponent
    #[arg(long, default_value = "8")]
    max_tile_exp: u32,

    /// Vector widths (comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 1.., default_value = "1,2,4,8,16")]
    vector_widths: Vec<u32>,

    /// Skip validation of the input fragment
    #[arg(long)]
    no_validate: bool,

    /// Write every candidate fragment as JSON into this directory
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// What to print per candidate
    #[arg(long, default_value = "lines")]
    emit: EmitKind,

    /// Also print rejected combinations (stderr)
    #[arg(long)]
    show_rejections: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KernelArg {
    /// C[i,j] += A[i,k] * B[k,j]
    Matmul,
    /// B[i] = alpha * A[i]
    Scale,
    /// Three-point row stencil
    Stencil,
}

impl From<KernelArg> for Kernel {
    fn from(arg: KernelArg) -> Self {
        match arg {
            KernelArg::Matmul => Kernel::Matmul,
            KernelArg::Scale => Kernel::Scale,
            KernelArg::Stencil => Kernel::Stencil,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmitKind {
    /// `coordinate  description`
    Lines,
    /// One JSON object per candidate
    Json,
    /// Only the final summary
    Summary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("mapsched v{}", mapsched::VERSION);

    let fragment = load_input(&cli)?;
    let config = build_config(&cli);
    debug!("Enumerator config: {:?}", config);

    let mut enumerator = MapScheduleEnumerator::new(fragment, config)
        .context("Failed to prepare enumeration")?;
    let size = enumerator.space_size();
    info!(
        "Search space: {} permutations x {} tilings x ... x {} widths",
        size.permutations, size.tilings, size.vectorizations
    );

    if let Some(coordinate) = cli.resume {
        enumerator = enumerator.resume_from(coordinate);
    } else if let Some(ref path) = cli.resume_from {
        let checkpoint = Checkpoint::load(path)
            .with_context(|| format!("Failed to read checkpoint: {:?}", path))?;
        enumerator = enumerator.resume_after(checkpoint.coordinate);
    }

    if let Some(ref dir) = cli.output {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    }

    let limit = cli.limit.unwrap_or(usize::MAX);
    let mut yielded = 0;
    while yielded < limit {
        let Some(outcome) = enumerator.next_outcome() else { break };
        let candidate = match outcome {
            Outcome::Valid(candidate) => candidate,
            Outcome::Rejected(rejection) => {
                if cli.show_rejections {
                    eprintln!("rejected {}  {}: {}", rejection.coordinate, rejection.stage, rejection.reason);
                }
                continue;
            }
        };
        yielded += 1;

        match cli.emit {
            EmitKind::Lines => println!("{}  {}", candidate.coordinate, candidate.description),
            EmitKind::Json => println!(
                "{}",
                serde_json::json!({
                    "coordinate": candidate.coordinate,
                    "description": candidate.description,
                })
            ),
            EmitKind::Summary => {}
        }

        if let Some(ref dir) = cli.output {
            let path = dir.join(candidate.file_name());
            fs::write(&path, candidate.fragment.to_json()?)
                .with_context(|| format!("Failed to write candidate: {:?}", path))?;
        }
        if let (Some(path), Some(checkpoint)) = (&cli.checkpoint, enumerator.checkpoint()) {
            checkpoint.save(path).with_context(|| format!("Failed to write checkpoint: {:?}", path))?;
        }
    }

    let stats = enumerator.stats();
    if cli.emit == EmitKind::Summary || cli.verbose > 0 {
        println!("{} candidates, {} rejected", stats.yielded, stats.total_rejected());
        for (stage, count) in &stats.rejected {
            println!("  {:<16} {}", stage.to_string(), count);
        }
    }

    Ok(())
}

fn load_input(cli: &Cli) -> Result<Fragment> {
    if let Some(kernel) = cli.kernel {
        let kernel = Kernel::from(kernel);
        info!("Building kernel {} (n = {})", kernel, cli.size);
        return kernel.build(cli.size).with_context(|| format!("Failed to build kernel {}", kernel));
    }
    let path = cli.input.as_ref().context("No input file given")?;
    debug!("Input file: {:?}", path);
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {:?}", path))?;
    mapsched::load_fragment(&json).with_context(|| format!("Failed to parse fragment: {:?}", path))
}

fn build_config(cli: &Cli) -> EnumeratorConfig {
    EnumeratorConfig::new()
        .tile_exponents(cli.min_tile_exp, cli.max_tile_exp)
        .vector_widths(cli.vector_widths.clone())
        .validate_input(!cli.no_validate)
}
