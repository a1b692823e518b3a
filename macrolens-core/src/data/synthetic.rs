//! Synthetic data provider.
//!
//! Produces a deterministic random walk per symbol so the pipeline can be
//! exercised offline. Synthetic series are tagged as such in the run
//! manifest and must never be mistaken for market data.

use super::provider::{DataError, DataProvider, DataSource, FetchResult};
use crate::domain::PricePoint;
use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random-walk provider seeded from the symbol name.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    start_price: f64,
    daily_range: f64,
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self {
            start_price: 100.0,
            daily_range: 0.03,
        }
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate weekday points for `symbol` over `[start, end]`.
pub fn generate_points(
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    start_price: f64,
    daily_range: f64,
) -> Vec<PricePoint> {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut points = Vec::new();
    let mut price = start_price;
    let mut current = start;

    while current <= end {
        if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            current += chrono::Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-daily_range..daily_range);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64);

        points.push(PricePoint {
            date: current,
            open,
            high,
            low,
            close,
            volume,
        });

        price = close;
        current += chrono::Duration::days(1);
    }

    points
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        if start > end {
            return Err(DataError::ValidationError(format!(
                "window start {start} is after end {end}"
            )));
        }
        let points = generate_points(symbol, start, end, self.start_price, self.daily_range);
        Ok(FetchResult {
            symbol: symbol.to_string(),
            points,
            source: DataSource::Synthetic,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}
