//! One daily OHLCV observation of an instrument.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV record as delivered by a provider.
///
/// The owning instrument is implied by the series the point lives in.
/// Fields a provider left blank are NaN; `close` is the only field the
/// pipeline relies on, and ingest drops points without a usable close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PricePoint {
    /// A point with every price field set to `close`. Handy for macro series
    /// (yields, FX) that only publish one value per day.
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        }
    }

    /// True when the close is a finite, strictly positive number.
    ///
    /// Log returns and rebasing are undefined for anything else.
    pub fn has_usable_close(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }
}
