//! entropy - randomness metrics for files and pipes
//!
//! Prints one line per measured unit to stdout; diagnostics go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use entropy_rs::{
    parse_number, Algorithm, BinSize, FileScanner, OutputFormat, ReportWriter, ScanOptions,
    ScanOptionsBuilder,
};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "entropy")]
#[command(about = "Compute entropy, chi-square or byte frequency distribution of files")]
struct Args {
    /// Report one result per block of this many bytes (decimal or 0x hex)
    #[arg(short = 'b', long, value_parser = parse_size)]
    blocksize: Option<u64>,

    /// Stop after reading this many bytes
    #[arg(short = 'l', long = "limit", value_parser = parse_size)]
    size_limit: Option<u64>,

    /// Skip this many bytes before measuring
    #[arg(short = 's', long = "skip", value_parser = parse_size)]
    skip_offset: Option<u64>,

    /// Metric to report: entropy, chisq or bfd (repeatable) [default: entropy]
    #[arg(short = 'm', long = "metric", value_parser = parse_metric)]
    metrics: Vec<Algorithm>,

    /// Bin width for bfd output, a power of two in [1, 128]
    #[arg(long, value_parser = parse_bin_size)]
    bin_size: Option<BinSize>,

    /// Only report units with at least this much entropy
    #[arg(long)]
    min_entropy: Option<f64>,

    /// Only report units with at most this chi-square statistic
    #[arg(long = "max-chisq")]
    max_chi_square: Option<f64>,

    /// Output format (csv, json)
    #[arg(long, value_parser = parse_format)]
    format: Option<OutputFormat>,

    /// TOML file with default options; flags override it
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Files to scan; none or "-" reads stdin
    files: Vec<PathBuf>,
}

fn parse_size(s: &str) -> Result<u64, String> {
    parse_number(s).map_err(|e| e.to_string())
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

fn build_options(args: &Args) -> Result<ScanOptions> {
    let base = match &args.config {
        Some(path) => ScanOptions::load(path)
            .with_context(|| format!("Cannot load configuration {:?}", path))?,
        None => ScanOptions::default(),
    };

    let mut builder = ScanOptionsBuilder::from_options(base);
    if let Some(size) = args.blocksize {
        builder = builder.block_size(size);
    }
    if let Some(limit) = args.size_limit {
        builder = builder.size_limit(limit);
    }
    if let Some(offset) = args.skip_offset {
        builder = builder.skip_offset(offset);
    }
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
    if let Some(format) = args.format {
        builder = builder.format(format);
    }

    Ok(builder.build()?)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let options = build_options(&args)?;
    info!("Scan options: {:?}", options);

    let scanner = FileScanner::new(options.clone())?;
    let stdout = io::stdout();
    let mut report = ReportWriter::new(
        BufWriter::new(stdout.lock()),
        options.format,
        options.bin_size,
    );

    let inputs = if args.files.is_empty() {
        vec![PathBuf::from("-")]
    } else {
        args.files.clone()
    };

    for path in &inputs {
        let summary = if path.as_os_str() == "-" {
            scanner
                .scan_reader(io::stdin().lock(), &mut report)
                .context("Cannot scan standard input")?
        } else {
            scanner
                .scan_path(path, &mut report)
                .with_context(|| format!("Cannot scan {:?}", path))?
        };
        info!(
            "{:?}: {} bytes, {} of {} units reported",
            path, summary.bytes_read, summary.reported, summary.units
        );
    }

    report.flush()?;
    Ok(())
}
