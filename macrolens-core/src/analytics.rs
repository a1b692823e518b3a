//! Summary statistics over feature columns.
//!
//! Risk/return per instrument, rolling correlation between two return
//! columns, and the OLS sensitivity of an equity to a factor. These are the
//! numbers behind the dashboard charts, exposed as data.

use crate::features::FeatureTable;
use crate::influence::correlation::{paired, pearson};
use chrono::NaiveDate;
use serde::Serialize;

pub const DEFAULT_CORRELATION_WINDOW: usize = 60;

/// Daily and annualized return statistics for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskReturn {
    pub symbol: String,
    pub mean_daily: f64,
    pub std_daily: Option<f64>,
    pub annualized_return: f64,
    pub annualized_volatility: Option<f64>,
    pub observations: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

/// Risk/return for each symbol over an optional inclusive date range.
///
/// Symbols without any log return in range are skipped, as are symbols not
/// in the table.
pub fn risk_return(
    features: &FeatureTable,
    symbols: &[&str],
    range: Option<(NaiveDate, NaiveDate)>,
    annualization_days: u32,
) -> Vec<RiskReturn> {
    let dates = features.dates();
    let in_range = |d: NaiveDate| range.map_or(true, |(start, end)| d >= start && d <= end);
    let days = f64::from(annualization_days);

    symbols
        .iter()
        .filter_map(|&symbol| {
            let f = features.get(symbol)?;
            let observed: Vec<(NaiveDate, f64)> = dates
                .iter()
                .zip(&f.log_return)
                .filter(|(d, _)| in_range(**d))
                .filter_map(|(d, r)| r.map(|r| (*d, r)))
                .collect();
            let (first_date, _) = *observed.first()?;
            let (last_date, _) = *observed.last()?;

            let n = observed.len();
            let mean = observed.iter().map(|(_, r)| r).sum::<f64>() / n as f64;
            let std = crate::features::volatility::sample_std(observed.iter().map(|(_, r)| *r));

            Some(RiskReturn {
                symbol: symbol.to_string(),
                mean_daily: mean,
                std_daily: std,
                annualized_return: mean * days,
                annualized_volatility: std.map(|s| s * days.sqrt()),
                observations: n,
                first_date,
                last_date,
            })
        })
        .collect()
}

/// Trailing-window Pearson correlation of two aligned return columns.
///
/// Defined at `t` only when every pair in the `window` slots ending at `t`
/// is non-null (and both sides vary).
pub fn rolling_correlation(
    a: &[Option<f64>],
    b: &[Option<f64>],
    window: usize,
) -> Vec<Option<f64>> {
    let n = a.len().min(b.len());
    let mut out = vec![None; n];
    if window < 2 || n < window {
        return out;
    }
    for t in (window - 1)..n {
        let start = t + 1 - window;
        let (x, y) = paired(&a[start..=t], &b[start..=t]);
        if x.len() == window {
            out[t] = pearson(&x, &y);
        }
    }
    out
}

/// OLS fit of `equity = alpha + beta * factor` on daily returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sensitivity {
    pub beta: f64,
    pub alpha: f64,
    pub correlation: Option<f64>,
    pub r_squared: Option<f64>,
    pub observations: usize,
}

/// Fit the sensitivity of an equity's returns to a factor's returns over
/// the dates where both are defined.
pub fn sensitivity(equity: &[Option<f64>], factor: &[Option<f64>]) -> Option<Sensitivity> {
    let (x, y) = paired(factor, equity);
    let n = x.len();
    if n < 2 {
        return None;
    }
    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;
    let (sxx, sxy) = x.iter().zip(&y).fold((0.0, 0.0), |(sxx, sxy), (xi, yi)| {
        let dx = xi - mean_x;
        (sxx + dx * dx, sxy + dx * (yi - mean_y))
    });
    if sxx <= 0.0 {
        return None;
    }
    let beta = sxy / sxx;
    let correlation = pearson(&x, &y);
    Some(Sensitivity {
        beta,
        alpha: mean_y - beta * mean_x,
        correlation,
        r_squared: correlation.map(|r| r * r),
        observations: n,
    })
}
