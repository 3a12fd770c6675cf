//! Prints what a `DrainBuffer` request returned.
//!
//! The OS-side client saves the drained bytes to a file; this tool walks
//! the entries and prints them as text (the driver's own debug line) or
//! as JSON lines.
//!
//! 1. Parse flags and `log_dump.toml`, flags win
//! 2. Set up diagnostics on stderr (and optionally a file)
//! 3. Walk the dump and print the matching entries to stdout

mod config;
mod render;

use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    process,
};

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use fern::Dispatch;
use log::{LevelFilter, info, warn};
use shared::Guid;
use shared::wire::OperationKind;

use crate::config::{Config, Filter, Format, LoggingConfig};

#[derive(Debug, Parser)]
#[command(author, version, about = "Print entries drained from the variable monitor")]
struct Cli {
    /// File holding the bytes returned by DrainBuffer.
    dump: PathBuf,
    /// Configuration file; skipped when absent.
    #[arg(long, short, default_value = "log_dump.toml")]
    config: PathBuf,
    /// Output format.
    #[arg(long, value_enum)]
    format: Option<Format>,
    /// Only print this operation (get or set); repeatable.
    #[arg(long = "kind", value_parser = config::parse_kind)]
    kinds: Vec<OperationKind>,
    /// Only print entries of this vendor GUID.
    #[arg(long, value_parser = config::parse_guid)]
    vendor: Option<Guid>,
    /// Only print calls that failed.
    #[arg(long)]
    failed_only: bool,
    /// Diagnostic level (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

fn setup_logging(logging: &LoggingConfig) -> Result<(), fern::InitError> {
    let level: LevelFilter = logging.level_filter();
    let log_path = logging.enable.then(|| logging.file.as_deref().unwrap_or("log_dump.log"));

    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                msg
            ))
        })
        .level(level)
        .chain(io::stderr());

    if let Some(path) = log_path {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

/// Fold the command line over the file settings.
fn apply_overrides(cli: &Cli, cfg: &mut Config, filter: &mut Filter) {
    if let Some(level) = &cli.log_level {
        cfg.logging.level = level.clone();
    }
    if let Some(format) = cli.format {
        cfg.output.format = format;
    }
    if !cli.kinds.is_empty() {
        filter.kinds = cli.kinds.clone();
    }
    if cli.vendor.is_some() {
        filter.vendor = cli.vendor;
    }
    filter.failed_only |= cli.failed_only;
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut cfg = if cli.config.exists() { config::load(&cli.config)? } else { Config::default() };
    let mut filter = Filter::from_config(&cfg.filter).context("invalid [filter] table")?;
    apply_overrides(&cli, &mut cfg, &mut filter);
    setup_logging(&cfg.logging).context("setting up logging")?;

    let bytes = fs::read(&cli.dump).with_context(|| format!("reading {}", cli.dump.display()))?;
    info!("{}: {} bytes", cli.dump.display(), bytes.len());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = render::render(&bytes, &filter, cfg.output.format, &mut out)?;
    out.flush()?;

    info!("{} entries printed, {} filtered out", summary.shown, summary.filtered);
    if summary.damaged {
        warn!("dump ends in a malformed entry");
    }
    Ok(!summary.damaged)
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(err) => {
            eprintln!("log_dump: {err:#}");
            process::exit(1);
        }
    }
}
