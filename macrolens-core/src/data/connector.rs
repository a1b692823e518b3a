//! Source connector: fetch a whole universe concurrently.
//!
//! Fetches run on a bounded rayon pool. Every worker produces its own
//! `(symbol, result)` slot and the slots are only merged after the pool has
//! drained, so nothing is shared between workers except the provider (and
//! its circuit breaker).

use super::ingest::ingest;
use super::provider::{DataError, DataProvider, DownloadProgress, FetchResult};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Connector settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Size of the worker pool.
    pub workers: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { workers: 8 }
    }
}

/// Outcome of fetching a universe.
///
/// Every requested symbol appears in exactly one of the two maps.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub series: BTreeMap<String, FetchResult>,
    pub unavailable: BTreeMap<String, DataError>,
}

impl FetchReport {
    pub fn succeeded(&self) -> usize {
        self.series.len()
    }

    pub fn failed(&self) -> usize {
        self.unavailable.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.unavailable.is_empty()
    }
}

/// Fetch and ingest every symbol over `[start, end]`.
///
/// A failure for one symbol never aborts the batch. Once the provider
/// reports itself unavailable (breaker open), remaining symbols fail fast
/// with `CircuitBreakerTripped`. The only error returned is a failure to
/// build the worker pool.
pub fn fetch_universe(
    provider: &dyn DataProvider,
    symbols: &[String],
    start: NaiveDate,
    end: NaiveDate,
    config: &FetchConfig,
    progress: &dyn DownloadProgress,
) -> Result<FetchReport, DataError> {
    let total = symbols.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build()
        .map_err(|e| DataError::Other(format!("failed to build fetch pool: {e}")))?;

    let started = AtomicUsize::new(0);
    let slots: Vec<(String, Result<FetchResult, DataError>)> = pool.install(|| {
        symbols
            .par_iter()
            .map(|symbol| {
                let index = started.fetch_add(1, Ordering::Relaxed);
                progress.on_start(symbol, index, total);
                let result = fetch_one(provider, symbol, start, end);
                let status = result.as_ref().map(|_| ()).map_err(Clone::clone);
                progress.on_complete(symbol, index, total, &status);
                (symbol.clone(), result)
            })
            .collect()
    });

    let mut report = FetchReport::default();
    for (symbol, result) in slots {
        match result {
            Ok(fetched) => {
                report.series.insert(symbol, fetched);
            }
            Err(e) => {
                report.unavailable.insert(symbol, e);
            }
        }
    }

    progress.on_batch_complete(report.succeeded(), report.failed(), total);
    Ok(report)
}

fn fetch_one(
    provider: &dyn DataProvider,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<FetchResult, DataError> {
    if !provider.is_available() {
        return Err(DataError::CircuitBreakerTripped);
    }
    let raw = provider.fetch(symbol, start, end)?;
    let cleaned = ingest(raw.points, start, end)?;
    if cleaned.dropped() > 0 {
        debug!(
            symbol,
            duplicates = cleaned.duplicates_dropped,
            out_of_window = cleaned.out_of_window,
            unusable = cleaned.unusable_close,
            "dropped points during ingest"
        );
    }
    Ok(FetchResult {
        symbol: raw.symbol,
        points: cleaned.points,
        source: raw.source,
    })
}
