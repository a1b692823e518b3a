//! MacroLens CLI: pipeline run, data fetch, universe listing and cache status.
//!
//! Commands:
//! - `run`: fetch, align, derive features, map influences, write outputs
//! - `fetch`: fetch instruments into the Parquet cache only
//! - `universe`: list the configured instruments and mapping rules
//! - `cache status`: per-instrument cache coverage

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use macrolens_core::data::{
    fetch_universe, CircuitBreaker, CoverageResult, DataProvider, FetchConfig, LogProgress,
    ParquetCache, YahooConfig, YahooProvider,
};
use macrolens_core::domain::InstrumentCategory;
use macrolens_runner::{run_pipeline, PipelineConfig, PipelineOutput, RunOptions};

#[derive(Parser)]
#[command(
    name = "macrolens",
    about = "MacroLens: equity / macro factor data pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the output tables.
    Run {
        /// Path to a TOML pipeline config. Built-in defaults when absent.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Window start (YYYY-MM-DD), overrides the config.
        #[arg(long)]
        start: Option<String>,

        /// Window end (YYYY-MM-DD), overrides the config.
        #[arg(long)]
        end: Option<String>,

        /// Offline mode: cache only, no network access.
        #[arg(long, default_value_t = false)]
        offline: bool,

        /// Fill unavailable instruments with synthetic data (tagged in the manifest).
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Ignore the cache and re-fetch everything.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Cache directory.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Output directory, overrides the config.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Fetch worker count, overrides the config.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Fetch instruments into the cache without running the pipeline.
    Fetch {
        /// Symbols to fetch. The whole configured universe when empty.
        symbols: Vec<String>,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        /// Re-fetch even if the cache covers the window.
        #[arg(long, default_value_t = false)]
        force: bool,

        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// List instruments and mapping rules.
    Universe {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Per-instrument cache coverage for the configured universe.
    Status {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            start,
            end,
            offline,
            synthetic,
            force,
            cache_dir,
            output_dir,
            workers,
        } => {
            if offline && force {
                bail!("--offline and --force are mutually exclusive");
            }
            let mut cfg = load_config(config.as_deref())?;
            apply_window(&mut cfg, start.as_deref(), end.as_deref())?;
            if let Some(dir) = output_dir {
                cfg.output.dir = dir;
            }
            if let Some(workers) = workers {
                cfg.fetch.workers = workers;
            }
            cfg.validate().context("invalid configuration after CLI overrides")?;

            let opts = RunOptions {
                offline,
                synthetic,
                force,
                today: None,
            };
            run_cmd(&cfg, &cache_dir, &opts)
        }
        Commands::Fetch {
            symbols,
            config,
            start,
            end,
            force,
            cache_dir,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            apply_window(&mut cfg, start.as_deref(), end.as_deref())?;
            cfg.validate()?;
            fetch_cmd(&cfg, symbols, force, &cache_dir)
        }
        Commands::Universe { config } => universe_cmd(&load_config(config.as_deref())?),
        Commands::Cache { action } => match action {
            CacheAction::Status { config, cache_dir } => {
                cache_status_cmd(&load_config(config.as_deref())?, &cache_dir)
            }
        },
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("macrolens=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn parse_date(value: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("{flag} must be YYYY-MM-DD, got '{value}'"))
}

fn apply_window(cfg: &mut PipelineConfig, start: Option<&str>, end: Option<&str>) -> Result<()> {
    if let Some(start) = start {
        cfg.window.start = parse_date(start, "--start")?;
    }
    if let Some(end) = end {
        cfg.window.end = Some(parse_date(end, "--end")?);
    }
    Ok(())
}

fn yahoo_provider(cfg: &PipelineConfig) -> Result<YahooProvider> {
    let breaker = Arc::new(CircuitBreaker::default_provider());
    let config = YahooConfig {
        timeout: Duration::from_secs(cfg.fetch.timeout_secs),
        max_retries: cfg.fetch.max_retries,
        ..YahooConfig::default()
    };
    Ok(YahooProvider::with_config(breaker, config)?)
}

fn run_cmd(cfg: &PipelineConfig, cache_dir: &Path, opts: &RunOptions) -> Result<()> {
    let cache = ParquetCache::new(cache_dir);
    let provider = if opts.offline {
        None
    } else {
        Some(yahoo_provider(cfg)?)
    };
    let provider_ref = provider.as_ref().map(|p| p as &dyn DataProvider);

    let output = run_pipeline(cfg, &cache, provider_ref, opts)?;
    print_summary(&output);
    Ok(())
}

fn fetch_cmd(
    cfg: &PipelineConfig,
    symbols: Vec<String>,
    force: bool,
    cache_dir: &Path,
) -> Result<()> {
    let universe = cfg.universe()?;
    let symbols = if symbols.is_empty() {
        universe.symbols().into_iter().map(String::from).collect()
    } else {
        symbols
    };
    let start = cfg.window.start;
    let end = cfg.end_date(chrono::Local::now().date_naive());
    let cache = ParquetCache::new(cache_dir);

    let to_fetch: Vec<String> = symbols
        .into_iter()
        .filter(|s| force || cache.covers_range(s, start, end) != CoverageResult::FullyCovered)
        .collect();
    if to_fetch.is_empty() {
        info!("cache already covers {start}..{end} for every symbol");
        return Ok(());
    }

    let provider = yahoo_provider(cfg)?;
    let fetch_config = FetchConfig {
        workers: cfg.fetch.workers,
    };
    let report = fetch_universe(&provider, &to_fetch, start, end, &fetch_config, &LogProgress)?;

    let mut write_failures = 0usize;
    for (symbol, fetched) in &report.series {
        if let Err(e) = cache.write(symbol, &fetched.points, (start, end), fetched.source) {
            warn!(symbol = %symbol, error = %e, "failed to write cache");
            write_failures += 1;
        }
    }

    println!(
        "Fetched {} / {} symbol(s) into {}",
        report.succeeded() - write_failures,
        to_fetch.len(),
        cache_dir.display()
    );
    for (symbol, err) in &report.unavailable {
        eprintln!("  {symbol}: {err}");
    }
    if !report.all_succeeded() || write_failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn universe_cmd(cfg: &PipelineConfig) -> Result<()> {
    let universe = cfg.universe()?;
    let rules = cfg.rule_table(&universe);

    for category in [InstrumentCategory::Equity, InstrumentCategory::Macro] {
        let members: Vec<_> = universe.by_category(category).collect();
        println!("{} ({})", category, members.len());
        for inst in members {
            println!("  {:<12} {}", inst.symbol, inst.name);
        }
        println!();
    }

    println!("Rules ({})", rules.len());
    for (equity, factor) in rules.iter() {
        println!(
            "  {:<12} -> {:<12} {}",
            equity,
            factor,
            universe.display_name(factor)
        );
    }
    Ok(())
}

fn cache_status_cmd(cfg: &PipelineConfig, cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }
    let universe = cfg.universe()?;
    let cache = ParquetCache::new(cache_dir);
    let status = cache.status(&universe.symbols());
    let cached = status.iter().filter(|s| s.cached).count();

    println!("Cache: {}", cache_dir.display());
    println!("Cached: {cached} / {}", status.len());
    println!();
    println!(
        "{:<12} {:<25} {:>8} {:<14}",
        "Symbol", "Date Range", "Points", "Source"
    );
    println!("{}", "-".repeat(62));
    for s in &status {
        let range = match (s.first_date, s.last_date) {
            (Some(first), Some(last)) => format!("{first} to {last}"),
            _ => "(not cached)".to_string(),
        };
        let points = s.point_count.map(|n| n.to_string()).unwrap_or_default();
        let source = s
            .source
            .map(|src| format!("{src:?}"))
            .unwrap_or_default();
        println!("{:<12} {:<25} {:>8} {:<14}", s.symbol, range, points, source);
    }
    Ok(())
}

fn print_summary(output: &PipelineOutput) {
    let manifest = &output.results.manifest;
    println!();
    println!("=== MacroLens Run ===");
    println!(
        "Window:        {} to {}",
        manifest.window_start, manifest.window_end
    );
    println!("Calendar:      {}", manifest.calendar);
    println!("Trading days:  {}", manifest.rows);
    println!(
        "Instruments:   {} ({} unavailable)",
        manifest.instruments,
        manifest.unavailable.len()
    );
    println!(
        "Mapping:       {} rule, {} correlation, {} unmapped",
        manifest.mapping.rule, manifest.mapping.correlation, manifest.mapping.unmapped
    );
    println!("Dataset hash:  {}", manifest.dataset_hash);
    for (symbol, reason) in &manifest.unavailable {
        println!("WARNING: {symbol} unavailable: {reason}");
    }
    if manifest.has_synthetic {
        println!("WARNING: output includes SYNTHETIC data");
    }
    println!();
    println!("Output:");
    for path in [
        &output.files.enriched,
        &output.files.mapping,
        &output.files.risk_return,
        &output.files.sensitivity,
        &output.files.rolling_correlation,
        &output.files.manifest,
    ] {
        println!("  {}", path.display());
    }
}
