//! mempool command-line tool
//!
//! Runs token workloads against the allocators and prints their statistics.
//!
//! # Examples
//!
//! ```bash
//! # Tokenize a corpus and report pool usage
//! mempool simulate --input corpus.txt
//!
//! # Synthetic tokens on four workers, JSON output
//! mempool simulate --tokens 100000 --workers 4 --json
//!
//! # Occupancy map of a single pool
//! mempool map --item-size 24 --items-per-block 16 --allocs 40 --free-every 3
//!
//! # Effective configuration
//! mempool --config mempool.toml config
//! ```

use clap::{Args, Parser, Subcommand};
use mempool::config::MemConfig;
use mempool::workload::{self, WorkloadReport};
use mempool::FixedSizePool;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Block-based size-class allocators for NLP records
#[derive(Parser, Debug)]
#[command(name = "mempool")]
#[command(version = mempool::VERSION)]
#[command(about = "Block-based size-class allocators for NLP records", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "MEMPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "MEMPOOL_LOG_DIR")]
    log_dir: PathBuf,

    /// Log file name inside the log directory, rotated daily
    #[arg(long, global = true, default_value = "mempool.log")]
    log_file: String,

    /// Log level or filter directives (e.g. `info`, `mempool::pool=debug`)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a token workload through tiered storage and a string stack
    Simulate(SimulateArgs),

    /// Print the occupancy map of a fixed-size pool
    Map(MapArgs),

    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Text file to tokenize (synthetic tokens if omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Number of synthetic tokens
    #[arg(long, default_value = "10000")]
    tokens: usize,

    /// Worker threads, each with its own storage
    #[arg(short, long, default_value = "1")]
    workers: usize,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct MapArgs {
    /// Item size in bytes (defaults to the configured pool)
    #[arg(long)]
    item_size: Option<usize>,

    /// Items per block (defaults to the configured pool)
    #[arg(long)]
    items_per_block: Option<usize>,

    /// Items to allocate
    #[arg(long, default_value = "32")]
    allocs: usize,

    /// Free every n-th item after allocating (0 frees nothing)
    #[arg(long, default_value = "2")]
    free_every: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    let config = MemConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate(args) => simulate_command(&config, args),
        Commands::Map(args) => map_command(&config, args),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Console on stderr, so reports on stdout stay machine-readable, plus a
/// daily rolling file. File lines carry thread ids to tell workers apart.
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, &cli.log_file);

    let filter = EnvFilter::try_new(&cli.log_level)
        .map_err(|e| anyhow::anyhow!("Invalid log filter '{}': {}", cli.log_level, e))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(!cli.no_color),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_thread_ids(true)
                .with_ansi(false),
        )
        .with(filter)
        .init();

    info!(
        dir = %cli.log_dir.display(),
        file = %cli.log_file,
        "Logging initialized"
    );
    Ok(())
}

fn simulate_command(config: &MemConfig, args: SimulateArgs) -> anyhow::Result<()> {
    let text;
    let owned;
    let tokens: Vec<&[u8]> = match &args.input {
        Some(path) => {
            info!(path = %path.display(), "Reading corpus");
            text = std::fs::read_to_string(path)?;
            workload::tokenize(&text)
        }
        None => {
            owned = workload::synthetic_tokens(args.tokens);
            owned.iter().map(Vec::as_slice).collect()
        }
    };

    let reports = if args.workers > 1 {
        workload::run_parallel(&tokens, config, args.workers)?
    } else {
        vec![workload::run(&tokens, config)?]
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for (i, report) in reports.iter().enumerate() {
            print_report(i, report);
        }
    }
    Ok(())
}

fn print_report(worker: usize, report: &WorkloadReport) {
    println!(
        "worker {}: {} tokens, {} bytes, {} us",
        worker, report.tokens, report.bytes, report.elapsed_micros
    );
    println!("{}", report.storage);
    println!("{}", report.strings);
    if report.skipped_strings > 0 {
        println!("  {} tokens too long for the string stack", report.skipped_strings);
    }
}

fn map_command(config: &MemConfig, args: MapArgs) -> anyhow::Result<()> {
    let item_size = args.item_size.unwrap_or(config.pool.item_size);
    let items_per_block = args.items_per_block.unwrap_or(config.pool.items_per_block);
    let mut pool = FixedSizePool::new(item_size, items_per_block)?;

    let slots: Vec<_> = (0..args.allocs).map(|_| pool.allocate()).collect();
    if args.free_every > 0 {
        for slot in slots.iter().step_by(args.free_every) {
            pool.free(*slot)?;
        }
    }

    let mut out = String::new();
    pool.map(&mut out)?;
    pool.stat(&mut out)?;
    print!("{}", out);
    Ok(())
}
