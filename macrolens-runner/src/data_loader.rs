//! Data loading and resolution for the pipeline.
//!
//! Resolves every instrument of the universe with this fallback policy:
//! 1. Cached data covering the requested window → use it (unless `force`)
//! 2. Otherwise, if online with a provider → parallel fetch, written back to cache
//! 3. If still missing and `synthetic` → deterministic random walk (tagged)
//! 4. Otherwise → instrument is unavailable (all-null column downstream)
//!
//! A missing instrument is never fatal here. The loaded series are aligned
//! and fingerprinted before they are handed to the feature stage.

use chrono::NaiveDate;
use macrolens_core::align::{align, AlignError, AlignedSeries, AlignmentReport, CalendarPolicy};
use macrolens_core::data::{
    fetch_universe, ingest, CoverageResult, DataError, DataProvider, DataSource, DownloadProgress,
    FetchConfig, ParquetCache, SyntheticProvider, Universe,
};
use macrolens_core::domain::PricePoint;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from the data loading layer.
///
/// Per-instrument failures are not errors; they land in
/// [`LoadedData::unavailable`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("alignment failed: {0}")]
    Align(#[from] AlignError),
}

/// Options controlling how series are loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Never make network requests.
    pub offline: bool,
    /// Generate synthetic series for instruments that could not be loaded.
    pub synthetic: bool,
    /// Ignore the cache and re-fetch everything.
    pub force: bool,
    /// Fetch pool size.
    pub workers: usize,
    pub calendar: CalendarPolicy,
}

/// Loaded and aligned data with provenance.
#[derive(Debug)]
pub struct LoadedData {
    pub aligned: AlignedSeries,
    pub report: AlignmentReport,
    /// Source per loaded instrument.
    pub sources: BTreeMap<String, DataSource>,
    /// Reason per instrument that could not be loaded.
    pub unavailable: BTreeMap<String, String>,
    /// BLAKE3 over the aligned table.
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

/// Load, align and fingerprint every instrument of `universe`.
pub fn load_universe_data(
    universe: &Universe,
    cache: &ParquetCache,
    provider: Option<&dyn DataProvider>,
    progress: &dyn DownloadProgress,
    opts: &LoadOptions,
) -> Result<LoadedData, LoadError> {
    let mut series: BTreeMap<String, Vec<PricePoint>> = BTreeMap::new();
    let mut sources: BTreeMap<String, DataSource> = BTreeMap::new();
    let mut unavailable: BTreeMap<String, String> = BTreeMap::new();

    // Step 1: cache
    let mut misses: Vec<String> = Vec::new();
    for symbol in universe.symbols() {
        match load_cached(cache, symbol, opts) {
            Some(points) => {
                debug!(symbol, points = points.len(), "cache hit");
                series.insert(symbol.to_string(), points);
                sources.insert(symbol.to_string(), DataSource::Cache);
            }
            None => misses.push(symbol.to_string()),
        }
    }
    info!(
        cached = series.len(),
        to_fetch = misses.len(),
        "resolved cache"
    );

    // Step 2: provider
    match provider {
        Some(provider) if !opts.offline && !misses.is_empty() => {
            let config = FetchConfig {
                workers: opts.workers,
            };
            let report =
                fetch_universe(provider, &misses, opts.start, opts.end, &config, progress)?;
            for (symbol, fetched) in report.series {
                if let Err(e) = cache.write(
                    &symbol,
                    &fetched.points,
                    (opts.start, opts.end),
                    fetched.source,
                ) {
                    warn!(symbol = %symbol, error = %e, "failed to write cache");
                }
                sources.insert(symbol.clone(), fetched.source);
                series.insert(symbol, fetched.points);
            }
            for (symbol, e) in report.unavailable {
                unavailable.insert(symbol, e.to_string());
            }
        }
        _ => {
            let reason = if opts.offline {
                "not cached (offline)"
            } else {
                "not cached and no provider configured"
            };
            for symbol in misses {
                unavailable.insert(symbol, reason.to_string());
            }
        }
    }

    // Step 3: synthetic fallback
    let mut has_synthetic = false;
    if opts.synthetic && !unavailable.is_empty() {
        let synthetic = SyntheticProvider::new();
        let pending: Vec<String> = unavailable.keys().cloned().collect();
        for symbol in pending {
            let generated = synthetic
                .fetch(&symbol, opts.start, opts.end)
                .and_then(|raw| ingest(raw.points, opts.start, opts.end));
            match generated {
                Ok(cleaned) => {
                    warn!(symbol = %symbol, "using synthetic data; results are tagged synthetic");
                    unavailable.remove(&symbol);
                    sources.insert(symbol.clone(), DataSource::Synthetic);
                    series.insert(symbol, cleaned.points);
                    has_synthetic = true;
                }
                Err(e) => debug!(symbol = %symbol, error = %e, "no synthetic data"),
            }
        }
    }

    for (symbol, reason) in &unavailable {
        warn!(symbol = %symbol, reason = %reason, "instrument unavailable");
    }

    let (aligned, report) = align(&series, universe, &opts.calendar)?;
    let dataset_hash = compute_dataset_hash(&aligned);

    Ok(LoadedData {
        aligned,
        report,
        sources,
        unavailable,
        dataset_hash,
        has_synthetic,
    })
}

fn load_cached(cache: &ParquetCache, symbol: &str, opts: &LoadOptions) -> Option<Vec<PricePoint>> {
    if opts.force {
        return None;
    }
    match cache.covers_range(symbol, opts.start, opts.end) {
        CoverageResult::FullyCovered => {}
        CoverageResult::PartiallyCovered {
            cached_start,
            cached_end,
        } => {
            debug!(symbol, %cached_start, %cached_end, "cache only partially covers window");
            return None;
        }
        CoverageResult::NotCached => return None,
    }
    match cache.load_range(symbol, opts.start, opts.end) {
        Ok(points) if !points.is_empty() => Some(points),
        Ok(_) => None,
        Err(e) => {
            warn!(symbol, error = %e, "cache unreadable, treating as a miss");
            None
        }
    }
}

/// Deterministic BLAKE3 hash over the aligned table.
///
/// Covers the date index and every column in universe order, null cells
/// included, so two runs with identical inputs hash identically.
pub fn compute_dataset_hash(aligned: &AlignedSeries) -> String {
    let mut hasher = blake3::Hasher::new();
    for date in aligned.dates() {
        hasher.update(date.to_string().as_bytes());
    }
    for (symbol, column) in aligned.columns() {
        hasher.update(symbol.as_bytes());
        for cell in column {
            match cell {
                Some(v) => {
                    hasher.update(&[1]);
                    hasher.update(&v.to_le_bytes());
                }
                None => {
                    hasher.update(&[0]);
                }
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}
