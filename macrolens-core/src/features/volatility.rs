//! Rolling annualized volatility of log returns.
//!
//! At index `t` the value is defined iff every price in the `window` slots
//! ending at `t` is non-null. It is the sample standard deviation of the log
//! returns available in those slots, scaled by `sqrt(annualization_days)`.
//! The first `window - 1` observations of a run are null.

use super::returns::LogReturn;
use super::SeriesTransform;

#[derive(Debug, Clone)]
pub struct RollingVolatility {
    window: usize,
    annualization: f64,
    name: String,
}

impl RollingVolatility {
    pub fn new(window: usize, annualization_days: u32) -> Self {
        assert!(window >= 3, "volatility window must be >= 3");
        Self {
            window,
            annualization: f64::from(annualization_days).sqrt(),
            name: format!("volatility_{window}"),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl Default for RollingVolatility {
    fn default() -> Self {
        Self::new(30, 252)
    }
}

impl SeriesTransform for RollingVolatility {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window - 1
    }

    fn compute(&self, prices: &[Option<f64>]) -> Vec<Option<f64>> {
        let n = prices.len();
        let mut out = vec![None; n];
        if n < self.window {
            return out;
        }
        let returns = LogReturn.compute(prices);

        // Length of the non-null price run ending at each index.
        let mut run = 0usize;
        for t in 0..n {
            run = if prices[t].is_some() { run + 1 } else { 0 };
            if run < self.window {
                continue;
            }
            let slots = &returns[t + 1 - self.window..=t];
            out[t] = sample_std(slots.iter().flatten().copied()).map(|s| s * self.annualization);
        }
        out
    }
}

/// Sample standard deviation (n - 1). `None` below two values.
pub(crate) fn sample_std(values: impl Iterator<Item = f64> + Clone) -> Option<f64> {
    let (count, sum) = values.clone().fold((0usize, 0.0), |(c, s), v| (c + 1, s + v));
    if count < 2 {
        return None;
    }
    let mean = sum / count as f64;
    let ss: f64 = values.map(|v| (v - mean).powi(2)).sum();
    let std = (ss / (count - 1) as f64).sqrt();
    std.is_finite().then_some(std)
}
