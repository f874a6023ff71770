//! e2ntropy - randomness metrics for the unused blocks of an ext filesystem
//!
//! Walks every free block of DEVICE and prints `<block>, <values...>` for
//! each one that passes the filters.

use anyhow::{Context, Result};
use clap::Parser;
use entropy_rs::{
    Algorithm, BinSize, Ext4Image, FilesystemAdapter, FreeBlockIterator, FrequencyContext,
    MetricPlan, OutputFormat, ReportWriter, ScanOptions,
};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "e2ntropy")]
#[command(about = "Measure the randomness of unallocated blocks on an ext2/3/4 filesystem")]
struct Args {
    /// Metric to report: entropy, chisq or bfd (repeatable) [default: entropy]
    #[arg(short = 'm', long = "metric", value_parser = parse_metric)]
    metrics: Vec<Algorithm>,

    /// Bin width for bfd output, a power of two in [1, 128]
    #[arg(long, value_parser = parse_bin_size)]
    bin_size: Option<BinSize>,

    /// Only report blocks with at least this much entropy
    #[arg(long)]
    min_entropy: Option<f64>,

    /// Only report blocks with at most this chi-square statistic
    #[arg(long = "max-chisq")]
    max_chi_square: Option<f64>,

    /// Output format (csv, json)
    #[arg(long, default_value = "csv", value_parser = parse_format)]
    format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Block device or filesystem image
    device: PathBuf,
}

fn parse_metric(s: &str) -> Result<Algorithm, String> {
    s.parse().map_err(|e: entropy_rs::EntropyError| e.to_string())
}

fn parse_bin_size(s: &str) -> Result<BinSize, String> {
    s.parse().map_err(|e: entropy_rs::EntropyError| e.to_string())
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    s.parse().map_err(|e: entropy_rs::EntropyError| e.to_string())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut builder = ScanOptions::builder().format(args.format);
    if !args.metrics.is_empty() {
        builder = builder.metrics(args.metrics.iter().copied());
    }
    if let Some(size) = args.bin_size {
        builder = builder.bin_size(size);
    }
    if let Some(threshold) = args.min_entropy {
        builder = builder.min_entropy(threshold);
    }
    if let Some(threshold) = args.max_chi_square {
        builder = builder.max_chi_square(threshold);
    }
    let options = builder.build()?;
    let plan = MetricPlan::new(&options)?;

    let mut fs = Ext4Image::open(&args.device)
        .with_context(|| format!("Unable to open device {:?}", args.device))?;
    info!(
        "Opened {:?}: {} groups, {} byte blocks",
        args.device,
        fs.group_count(),
        fs.block_size()
    );

    let stdout = io::stdout();
    let mut report = ReportWriter::new(
        BufWriter::new(stdout.lock()),
        options.format,
        options.bin_size,
    );

    let mut iter = FreeBlockIterator::new(&mut fs)
        .with_context(|| format!("Unable to size device {:?}", args.device))?;
    let mut ctx = FrequencyContext::new();
    let visited = iter
        .for_each_free_block(|block, data| {
            ctx.reset();
            ctx.update(data);
            if let Some(measurements) = plan.evaluate(&ctx)? {
                report.write_unit(Some(block), &measurements)?;
            }
            Ok(())
        })
        .with_context(|| format!("Scan of {:?} aborted", args.device))?;

    info!(
        "{} free blocks scanned, {} reported",
        visited,
        report.lines_written()
    );
    report.flush()?;
    Ok(())
}
