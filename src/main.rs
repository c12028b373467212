//! fetchpi: concurrent fetches next to a pi approximation that runs until
//! the last fetch finishes.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use fetchpi::report::JsonReport;
use fetchpi::summary::render_summary;
use fetchpi::{Algorithm, HttpFetcher, Orchestrator, RunConfig};

/// Fetch a page several times while approximating pi until the last fetch
/// completes
#[derive(Debug, Parser)]
#[command(name = "fetchpi", version, about, long_about = None)]
struct Cli {
    /// Approximation algorithm
    #[arg(long, value_enum, env = "FETCHPI_ALGORITHM")]
    algorithm: Option<Algorithm>,

    /// Shorthand for `--algorithm fast-series`
    #[arg(long, conflicts_with = "algorithm")]
    quality: bool,

    /// Number of fetch tasks
    #[arg(long, visible_alias = "copies", env = "FETCHPI_FETCHES")]
    fetches: Option<usize>,

    /// Pool capacity (defaults to fetches + 1)
    #[arg(long, visible_alias = "greenlets", env = "FETCHPI_CAPACITY")]
    capacity: Option<usize>,

    /// Fetch target
    #[arg(long, env = "FETCHPI_URL")]
    url: Option<String>,

    /// Extra delay after each fetch, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Per-request timeout, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Producer steps between yields to the scheduler
    #[arg(long, visible_alias = "piswitch")]
    yield_cadence: Option<u64>,

    /// Fractional digits of the published estimate
    #[arg(long)]
    precision: Option<u32>,

    /// Check for the last survivor on this interval instead of on pool events
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// TOML config file; flags override its values
    #[arg(long, env = "FETCHPI_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => RunConfig::default(),
    };
    apply_overrides(&mut config, &cli);

    // One cooperative scheduler for the pool, the producer and the monitor.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    runtime.block_on(execute(config, &cli))
}

async fn execute(config: RunConfig, cli: &Cli) -> Result<()> {
    let fetcher = Arc::new(HttpFetcher::new(config.timeout()));
    let orchestrator = Orchestrator::new(config.clone(), fetcher)?;

    let report = tokio::select! {
        report = orchestrator.run() => report.context("Run failed")?,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("Interrupted"),
    };

    match cli.format {
        OutputFormat::Text => {
            if cli.no_color || !std::io::stdout().is_terminal() {
                colored::control::set_override(false);
            }
            println!("{}", render_summary(&report));
        }
        OutputFormat::Json => {
            let json = JsonReport::from_run(&report, &config).to_json_pretty()?;
            println!("{json}");
        }
    }
    Ok(())
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--debug`.
fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}

/// Apply CLI flag overrides to a loaded config.
fn apply_overrides(config: &mut RunConfig, cli: &Cli) {
    if cli.quality {
        config.approximation.algorithm = Algorithm::FastSeries;
    }
    if let Some(algorithm) = cli.algorithm {
        config.approximation.algorithm = algorithm;
    }
    if let Some(fetches) = cli.fetches {
        config.pool.fetches = fetches;
    }
    if let Some(capacity) = cli.capacity {
        config.pool.capacity = Some(capacity);
    }
    if let Some(url) = &cli.url {
        config.fetch.url = url.clone();
    }
    if let Some(delay_ms) = cli.delay_ms {
        config.fetch.delay_ms = delay_ms;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.fetch.timeout_ms = timeout_ms;
    }
    if let Some(cadence) = cli.yield_cadence {
        config.approximation.yield_cadence = cadence;
    }
    if let Some(precision) = cli.precision {
        config.approximation.precision = Some(precision);
    }
    if let Some(interval) = cli.poll_interval_ms {
        config.pool.poll_interval_ms = Some(interval);
    }
}
