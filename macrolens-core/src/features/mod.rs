//! Feature engine: per-instrument derived series.
//!
//! Each transform maps one aligned close column to a derived column of the
//! same length. Transforms are pure and see one instrument at a time; there
//! is no cross-instrument interaction here.

pub mod rebase;
pub mod returns;
pub mod volatility;

pub use rebase::Rebase;
pub use returns::LogReturn;
pub use volatility::RollingVolatility;

use crate::align::AlignedSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A column transform.
///
/// `compute` returns exactly one cell per input cell. No output at index `t`
/// may depend on input after `t`.
pub trait SeriesTransform: Send + Sync {
    /// Column name (e.g. "log_return", "volatility_30").
    fn name(&self) -> &str;

    /// Observations needed before the first defined output of a run.
    fn lookback(&self) -> usize;

    fn compute(&self, prices: &[Option<f64>]) -> Vec<Option<f64>>;
}

/// Feature engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureConfig {
    pub volatility_window: usize,
    pub annualization_days: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            volatility_window: 30,
            annualization_days: 252,
        }
    }
}

/// Derived columns for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentFeatures {
    pub close: Vec<Option<f64>>,
    pub log_return: Vec<Option<f64>>,
    pub volatility: Vec<Option<f64>>,
    pub rebased: Vec<Option<f64>>,
}

impl InstrumentFeatures {
    /// Number of non-null closes.
    pub fn history_len(&self) -> usize {
        self.close.iter().filter(|v| v.is_some()).count()
    }

    pub fn has_history(&self) -> bool {
        self.close.iter().any(Option::is_some)
    }
}

/// One instrument on one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub close: Option<f64>,
    pub log_return: Option<f64>,
    pub volatility: Option<f64>,
    pub rebased: Option<f64>,
}

/// Features for the whole universe on the aligned index.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    features: Vec<InstrumentFeatures>,
}

impl FeatureTable {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn get(&self, symbol: &str) -> Option<&InstrumentFeatures> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|i| &self.features[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InstrumentFeatures)> {
        self.symbols
            .iter()
            .map(String::as_str)
            .zip(self.features.iter())
    }

    pub fn row(&self, symbol: &str, index: usize) -> Option<FeatureRow> {
        let f = self.get(symbol)?;
        let date = *self.dates.get(index)?;
        Some(FeatureRow {
            date,
            close: f.close[index],
            log_return: f.log_return[index],
            volatility: f.volatility[index],
            rebased: f.rebased[index],
        })
    }

    /// All rows for one instrument, in date order.
    pub fn rows(&self, symbol: &str) -> Vec<FeatureRow> {
        (0..self.len())
            .filter_map(|i| self.row(symbol, i))
            .collect()
    }
}

/// Compute every feature column for every aligned instrument.
pub fn compute_features(aligned: &AlignedSeries, config: &FeatureConfig) -> FeatureTable {
    let log_return = LogReturn::new();
    let volatility = RollingVolatility::new(config.volatility_window, config.annualization_days);
    let rebase = Rebase::new();

    let (symbols, features): (Vec<String>, Vec<InstrumentFeatures>) = aligned
        .columns()
        .map(|(symbol, close)| {
            let features = InstrumentFeatures {
                close: close.to_vec(),
                log_return: log_return.compute(close),
                volatility: volatility.compute(close),
                rebased: rebase.compute(close),
            };
            (symbol.to_string(), features)
        })
        .unzip();

    FeatureTable {
        dates: aligned.dates().to_vec(),
        symbols,
        features,
    }
}

#[cfg(test)]
pub(crate) fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.unwrap_or_else(|| panic!("expected {expected}, got None"));
    assert!(
        (actual - expected).abs() < 1e-10,
        "actual={actual}, expected={expected}"
    );
}
