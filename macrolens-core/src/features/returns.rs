//! Log returns.
//!
//! `ln(P_t / P_{t-1})`. Null at the first non-null price of a run and
//! wherever either price is null. Lookback: 1.

use super::SeriesTransform;

#[derive(Debug, Clone, Default)]
pub struct LogReturn;

impl LogReturn {
    pub fn new() -> Self {
        Self
    }
}

impl SeriesTransform for LogReturn {
    fn name(&self) -> &str {
        "log_return"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, prices: &[Option<f64>]) -> Vec<Option<f64>> {
        let mut out = vec![None; prices.len()];
        for t in 1..prices.len() {
            if let (Some(prev), Some(cur)) = (prices[t - 1], prices[t]) {
                let r = (cur / prev).ln();
                if r.is_finite() {
                    out[t] = Some(r);
                }
            }
        }
        out
    }
}
