//! Parquet cache of fetched price series.
//!
//! Layout: `{cache_dir}/symbol={SYMBOL}/{year}.parquet` plus a `meta.json`
//! sidecar per symbol recording the window that was requested, the data
//! hash and where the series came from.
//!
//! Writes go to `.tmp` and are renamed into place. A partition that fails
//! to load is renamed to `{file}.quarantined` and invalidates the symbol's
//! entry, so the next load is a miss rather than a series with a gap.

use super::provider::{DataError, DataSource};
use crate::domain::PricePoint;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

/// Metadata sidecar for a cached symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    /// Window that was requested when the series was fetched.
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    /// First and last dates actually present.
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub point_count: usize,
    pub data_hash: String,
    pub source: DataSource,
    pub cached_at: NaiveDateTime,
}

pub struct ParquetCache {
    cache_dir: PathBuf,
}

impl ParquetCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.cache_dir.join(format!("symbol={symbol}"))
    }

    fn year_path(&self, symbol: &str, year: i32) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join("meta.json")
    }

    /// Replace the cached series for `symbol`.
    ///
    /// `points` must already be ingested (sorted, unique dates). Partitions
    /// from an earlier write that the new series does not cover are removed.
    pub fn write(
        &self,
        symbol: &str,
        points: &[PricePoint],
        window: (NaiveDate, NaiveDate),
        source: DataSource,
    ) -> Result<CacheMeta, DataError> {
        let (first, last) = match (points.first(), points.last()) {
            (Some(f), Some(l)) => (f.date, l.date),
            _ => return Err(DataError::CacheError("no points to cache".into())),
        };

        let sym_dir = self.symbol_dir(symbol);
        fs::create_dir_all(&sym_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let mut by_year: BTreeMap<i32, Vec<&PricePoint>> = BTreeMap::new();
        for p in points {
            by_year.entry(p.date.year()).or_default().push(p);
        }

        for (year, year_points) in &by_year {
            let mut df = points_to_dataframe(year_points)?;
            let path = self.year_path(symbol, *year);
            let tmp_path = path.with_extension("parquet.tmp");
            write_parquet(&mut df, &tmp_path)?;
            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                DataError::CacheError(format!("atomic rename failed: {e}"))
            })?;
        }

        self.remove_stale_partitions(symbol, &by_year)?;

        let meta = CacheMeta {
            symbol: symbol.to_string(),
            window_start: window.0,
            window_end: window.1,
            first_date: first,
            last_date: last,
            point_count: points.len(),
            data_hash: hash_points(points)?,
            source,
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        let meta_path = self.meta_path(symbol);
        let tmp_meta = meta_path.with_extension("json.tmp");
        fs::write(&tmp_meta, meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;
        fs::rename(&tmp_meta, &meta_path)
            .map_err(|e| DataError::CacheError(format!("meta rename: {e}")))?;

        debug!(symbol, points = points.len(), "cached series");
        Ok(meta)
    }

    fn remove_stale_partitions(
        &self,
        symbol: &str,
        keep: &BTreeMap<i32, Vec<&PricePoint>>,
    ) -> Result<(), DataError> {
        let entries = fs::read_dir(self.symbol_dir(symbol))
            .map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            let year = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i32>().ok());
            if let Some(year) = year {
                if !keep.contains_key(&year) {
                    fs::remove_file(&path).map_err(|e| {
                        warn!(
                            symbol,
                            path = %path.display(),
                            error = %e,
                            "failed to remove stale partition"
                        );
                        DataError::CacheError(format!("remove stale {year}.parquet: {e}"))
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Load every cached point for a symbol, sorted by date.
    ///
    /// If any partition fails to load, it is quarantined, the symbol's
    /// `meta.json` is dropped so the window reads as not cached, and the
    /// load fails. A partial series is never returned.
    pub fn load(&self, symbol: &str) -> Result<Vec<PricePoint>, DataError> {
        let sym_dir = self.symbol_dir(symbol);
        if !sym_dir.exists() {
            return Err(DataError::NoCachedData {
                symbol: symbol.to_string(),
            });
        }

        let entries =
            fs::read_dir(&sym_dir).map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;

        let mut points = Vec::new();
        let mut quarantined = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }

            match load_and_validate_parquet(&path) {
                Ok(loaded) => points.extend(loaded),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "quarantining corrupt cache partition"
                    );
                    if let Err(e) = fs::rename(&path, path.with_extension("parquet.quarantined")) {
                        warn!(path = %path.display(), error = %e, "quarantine rename failed");
                    }
                    quarantined.push(path.display().to_string());
                }
            }
        }

        if !quarantined.is_empty() {
            let meta_path = self.meta_path(symbol);
            if meta_path.exists() {
                if let Err(e) = fs::remove_file(&meta_path) {
                    warn!(symbol, error = %e, "failed to invalidate cache meta");
                }
            }
            return Err(DataError::CacheError(format!(
                "{symbol}: quarantined corrupt partition(s): {}",
                quarantined.join(", ")
            )));
        }

        if points.is_empty() {
            return Err(DataError::NoCachedData {
                symbol: symbol.to_string(),
            });
        }

        points.sort_by_key(|p| p.date);
        Ok(points)
    }

    /// Load cached points restricted to `[start, end]`.
    pub fn load_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, DataError> {
        let mut points = self.load(symbol)?;
        points.retain(|p| p.date >= start && p.date <= end);
        Ok(points)
    }

    pub fn get_meta(&self, symbol: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Cache status for each symbol, in the order given.
    pub fn status(&self, symbols: &[&str]) -> Vec<CacheStatus> {
        symbols
            .iter()
            .map(|sym| {
                let meta = self.get_meta(sym);
                CacheStatus {
                    symbol: sym.to_string(),
                    cached: meta.is_some(),
                    first_date: meta.as_ref().map(|m| m.first_date),
                    last_date: meta.as_ref().map(|m| m.last_date),
                    point_count: meta.as_ref().map(|m| m.point_count),
                    source: meta.as_ref().map(|m| m.source),
                }
            })
            .collect()
    }

    /// Whether a previous fetch already requested a window containing `[start, end]`.
    pub fn covers_range(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> CoverageResult {
        match self.get_meta(symbol) {
            None => CoverageResult::NotCached,
            Some(meta) if meta.window_start <= start && meta.window_end >= end => {
                CoverageResult::FullyCovered
            }
            Some(meta) => CoverageResult::PartiallyCovered {
                cached_start: meta.window_start,
                cached_end: meta.window_end,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: String,
    pub cached: bool,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub point_count: Option<usize>,
    pub source: Option<DataSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoverageResult {
    NotCached,
    FullyCovered,
    PartiallyCovered {
        cached_start: NaiveDate,
        cached_end: NaiveDate,
    },
}

fn hash_points(points: &[PricePoint]) -> Result<String, DataError> {
    let bytes = serde_json::to_vec(points)
        .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn points_to_dataframe(points: &[&PricePoint]) -> Result<DataFrame, DataError> {
    let epoch = NaiveDate::default();
    let dates: Vec<i32> = points
        .iter()
        .map(|p| (p.date - epoch).num_days() as i32)
        .collect();
    let opens: Vec<f64> = points.iter().map(|p| p.open).collect();
    let highs: Vec<f64> = points.iter().map(|p| p.high).collect();
    let lows: Vec<f64> = points.iter().map(|p| p.low).collect();
    let closes: Vec<f64> = points.iter().map(|p| p.close).collect();
    let volumes: Vec<u64> = points.iter().map(|p| p.volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<PricePoint>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::ValidationError("empty parquet file".into()));
    }
    for col_name in COLUMNS {
        if df.column(col_name).is_err() {
            return Err(DataError::ValidationError(format!(
                "missing column '{col_name}'"
            )));
        }
    }

    dataframe_to_points(&df)
}

fn dataframe_to_points(df: &DataFrame) -> Result<Vec<PricePoint>, DataError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::ParquetError(format!("column read: {e}")))
    };
    let type_err = |name: &str, e: PolarsError| {
        DataError::ParquetError(format!("{name} column type: {e}"))
    };

    let date_ca = col("date")?.date().map_err(|e| type_err("date", e))?;
    let open_ca = col("open")?.f64().map_err(|e| type_err("open", e))?;
    let high_ca = col("high")?.f64().map_err(|e| type_err("high", e))?;
    let low_ca = col("low")?.f64().map_err(|e| type_err("low", e))?;
    let close_ca = col("close")?.f64().map_err(|e| type_err("close", e))?;
    let vol_ca = col("volume")?.u64().map_err(|e| type_err("volume", e))?;

    let epoch = NaiveDate::default();
    let mut points = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let days = date_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
        points.push(PricePoint {
            date: epoch + chrono::Duration::days(days as i64),
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0),
        });
    }
    Ok(points)
}
