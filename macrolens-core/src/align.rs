//! Alignment and cleaning: merge per-instrument series onto one calendar.
//!
//! Every instrument is reindexed onto a shared date index with as-of
//! semantics: the value on date `d` is the close of the last observation
//! dated on or before `d`. Markets close on different holidays, so a
//! missing session carries the prior close. Dates before an instrument's
//! first observation stay `None`; forward fill cannot recover history that
//! never existed.

use crate::data::Universe;
use crate::domain::{InstrumentCategory, PricePoint};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Which dates make up the unified index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CalendarPolicy {
    /// Union of every observed date.
    #[default]
    Union,
    /// Union of the dates observed by instruments of one category.
    Category { category: InstrumentCategory },
    /// The trading calendar of a single reference instrument.
    Instrument { symbol: String },
}

impl fmt::Display for CalendarPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarPolicy::Union => write!(f, "union"),
            CalendarPolicy::Category { category } => write!(f, "category:{category}"),
            CalendarPolicy::Instrument { symbol } => write!(f, "instrument:{symbol}"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AlignError {
    #[error("calendar reference instrument '{0}' is not in the universe")]
    UnknownReference(String),

    #[error("column '{symbol}' has {actual} values, expected {expected}")]
    ColumnLength {
        symbol: String,
        expected: usize,
        actual: usize,
    },

    #[error("date index is not strictly increasing at position {0}")]
    UnsortedIndex(usize),

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
}

/// Date-indexed, instrument-columned close prices.
///
/// Every column has exactly one cell per date and the index is strictly
/// increasing. Cells are `None` only for leading gaps or unavailable
/// instruments.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSeries {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
}

impl AlignedSeries {
    /// Build from explicit columns, checking the table invariants.
    pub fn from_columns(
        dates: Vec<NaiveDate>,
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> Result<Self, AlignError> {
        if let Some(pos) = dates.windows(2).position(|w| w[0] >= w[1]) {
            return Err(AlignError::UnsortedIndex(pos + 1));
        }
        let mut seen = BTreeSet::new();
        let mut symbols = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        for (symbol, column) in columns {
            if column.len() != dates.len() {
                return Err(AlignError::ColumnLength {
                    symbol,
                    expected: dates.len(),
                    actual: column.len(),
                });
            }
            if !seen.insert(symbol.clone()) {
                return Err(AlignError::DuplicateColumn(symbol));
            }
            symbols.push(symbol);
            values.push(column);
        }
        Ok(Self {
            dates,
            symbols,
            columns: values,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Column symbols, in universe order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn column(&self, symbol: &str) -> Option<&[Option<f64>]> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.symbols
            .iter()
            .zip(&self.columns)
            .map(|(s, c)| (s.as_str(), c.as_slice()))
    }

    /// Number of dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Number of non-null cells in a column (0 for unknown symbols).
    pub fn observations(&self, symbol: &str) -> usize {
        self.column(symbol)
            .map(|c| c.iter().filter(|v| v.is_some()).count())
            .unwrap_or(0)
    }
}

/// Data conditions found while aligning. None of these are errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlignmentReport {
    /// Leading `None` cells per instrument (only instruments with some data).
    pub leading_gaps: BTreeMap<String, usize>,
    /// Cells carried forward from an earlier observation.
    pub forward_filled: BTreeMap<String, usize>,
    /// Instruments with no observation at all.
    pub empty_columns: Vec<String>,
    /// Set when the configured calendar had no dates and the union was used.
    pub calendar_fallback: bool,
}

/// Align the universe's series onto one calendar.
///
/// Instruments missing from `series` (failed fetches) get an all-`None`
/// column. Series must be sorted by date with unique dates, which is what
/// `data::ingest` guarantees. Points for symbols outside the universe are
/// ignored.
pub fn align(
    series: &BTreeMap<String, Vec<PricePoint>>,
    universe: &Universe,
    policy: &CalendarPolicy,
) -> Result<(AlignedSeries, AlignmentReport), AlignError> {
    let mut report = AlignmentReport::default();
    let mut dates = calendar(series, universe, policy)?;
    if dates.is_empty() && *policy != CalendarPolicy::Union {
        warn!(calendar = %policy, "reference calendar has no dates, using union");
        report.calendar_fallback = true;
        dates = calendar(series, universe, &CalendarPolicy::Union)?;
    }

    let mut symbols = Vec::with_capacity(universe.len());
    let mut columns = Vec::with_capacity(universe.len());
    for inst in universe.instruments() {
        let points = series
            .get(&inst.symbol)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let (column, filled) = as_of_column(&dates, points);

        let leading = column.iter().take_while(|v| v.is_none()).count();
        if leading == column.len() {
            report.empty_columns.push(inst.symbol.clone());
        } else {
            if leading > 0 {
                report.leading_gaps.insert(inst.symbol.clone(), leading);
            }
            if filled > 0 {
                report.forward_filled.insert(inst.symbol.clone(), filled);
            }
        }

        symbols.push(inst.symbol.clone());
        columns.push(column);
    }

    Ok((
        AlignedSeries {
            dates,
            symbols,
            columns,
        },
        report,
    ))
}

fn calendar(
    series: &BTreeMap<String, Vec<PricePoint>>,
    universe: &Universe,
    policy: &CalendarPolicy,
) -> Result<Vec<NaiveDate>, AlignError> {
    let dates = match policy {
        CalendarPolicy::Union => observed_dates(
            series,
            universe.instruments().iter().map(|i| i.symbol.as_str()),
        ),
        CalendarPolicy::Category { category } => observed_dates(
            series,
            universe.by_category(*category).map(|i| i.symbol.as_str()),
        ),
        CalendarPolicy::Instrument { symbol } => {
            if !universe.contains(symbol) {
                return Err(AlignError::UnknownReference(symbol.clone()));
            }
            observed_dates(series, std::iter::once(symbol.as_str()))
        }
    };
    Ok(dates)
}

fn observed_dates<'a>(
    series: &BTreeMap<String, Vec<PricePoint>>,
    symbols: impl Iterator<Item = &'a str>,
) -> Vec<NaiveDate> {
    let mut all = BTreeSet::new();
    for symbol in symbols {
        if let Some(points) = series.get(symbol) {
            all.extend(points.iter().map(|p| p.date));
        }
    }
    all.into_iter().collect()
}

/// Reindex one sorted series onto `dates`, returning the column and the
/// number of cells that were carried forward.
fn as_of_column(dates: &[NaiveDate], points: &[PricePoint]) -> (Vec<Option<f64>>, usize) {
    let mut column = Vec::with_capacity(dates.len());
    let mut filled = 0;
    let mut next = 0;
    let mut last: Option<(NaiveDate, f64)> = None;

    for &date in dates {
        while next < points.len() && points[next].date <= date {
            last = Some((points[next].date, points[next].close));
            next += 1;
        }
        match last {
            Some((observed, close)) => {
                if observed != date {
                    filled += 1;
                }
                column.push(Some(close));
            }
            None => column.push(None),
        }
    }
    (column, filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Instrument;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn series(points: &[(u32, f64)]) -> Vec<PricePoint> {
        points
            .iter()
            .map(|&(day, close)| PricePoint::from_close(d(day), close))
            .collect()
    }

    fn universe() -> Universe {
        Universe::new(vec![
            Instrument::equity("MC.PA", "LVMH"),
            Instrument::equity("TTE.PA", "TotalEnergies"),
            Instrument::macro_factor("BZ=F", "Brent"),
        ])
        .unwrap()
    }

    #[test]
    fn union_calendar_forward_fills_missing_sessions() {
        let mut input = BTreeMap::new();
        input.insert("MC.PA".into(), series(&[(2, 100.0), (3, 101.0), (4, 102.0)]));
        // Brent closed on the 3rd.
        input.insert("BZ=F".into(), series(&[(2, 80.0), (4, 82.0)]));
        input.insert("TTE.PA".into(), series(&[(2, 60.0), (3, 61.0), (4, 62.0)]));

        let (aligned, report) = align(&input, &universe(), &CalendarPolicy::Union).unwrap();

        assert_eq!(aligned.dates(), &[d(2), d(3), d(4)]);
        assert_eq!(
            aligned.column("BZ=F").unwrap(),
            &[Some(80.0), Some(80.0), Some(82.0)]
        );
        assert_eq!(report.forward_filled.get("BZ=F"), Some(&1));
        assert!(report.leading_gaps.is_empty());
    }

    #[test]
    fn leading_gap_stays_null() {
        let mut input = BTreeMap::new();
        input.insert("MC.PA".into(), series(&[(2, 100.0), (3, 101.0), (4, 102.0)]));
        input.insert("TTE.PA".into(), series(&[(4, 62.0)]));
        input.insert("BZ=F".into(), series(&[(2, 80.0), (3, 81.0), (4, 82.0)]));

        let (aligned, report) = align(&input, &universe(), &CalendarPolicy::Union).unwrap();
        assert_eq!(aligned.column("TTE.PA").unwrap(), &[None, None, Some(62.0)]);
        assert_eq!(report.leading_gaps.get("TTE.PA"), Some(&2));
    }

    #[test]
    fn unavailable_instrument_gets_all_null_column() {
        let mut input = BTreeMap::new();
        input.insert("MC.PA".into(), series(&[(2, 100.0), (3, 101.0)]));
        input.insert("BZ=F".into(), series(&[(2, 80.0), (3, 81.0)]));

        let (aligned, report) = align(&input, &universe(), &CalendarPolicy::Union).unwrap();
        assert_eq!(aligned.column("TTE.PA").unwrap(), &[None, None]);
        assert_eq!(report.empty_columns, vec!["TTE.PA".to_string()]);
        assert_eq!(aligned.column("MC.PA").unwrap(), &[Some(100.0), Some(101.0)]);
        assert_eq!(aligned.symbols(), &["MC.PA", "TTE.PA", "BZ=F"]);
    }

    #[test]
    fn category_calendar_absorbs_off_calendar_observations() {
        let mut input = BTreeMap::new();
        input.insert("MC.PA".into(), series(&[(2, 100.0), (4, 102.0)]));
        input.insert("TTE.PA".into(), series(&[(2, 60.0), (4, 62.0)]));
        // Brent trades on the 3rd, which the equity calendar does not have.
        input.insert("BZ=F".into(), series(&[(2, 80.0), (3, 81.0)]));

        let policy = CalendarPolicy::Category {
            category: InstrumentCategory::Equity,
        };
        let (aligned, _) = align(&input, &universe(), &policy).unwrap();
        assert_eq!(aligned.dates(), &[d(2), d(4)]);
        assert_eq!(aligned.column("BZ=F").unwrap(), &[Some(80.0), Some(81.0)]);
    }

    #[test]
    fn instrument_calendar_requires_known_symbol() {
        let input = BTreeMap::new();
        let policy = CalendarPolicy::Instrument {
            symbol: "^FCHI".into(),
        };
        assert_eq!(
            align(&input, &universe(), &policy).unwrap_err(),
            AlignError::UnknownReference("^FCHI".into())
        );
    }

    #[test]
    fn empty_reference_calendar_falls_back_to_union() {
        let mut input = BTreeMap::new();
        input.insert("BZ=F".into(), series(&[(2, 80.0), (3, 81.0)]));
        let policy = CalendarPolicy::Instrument {
            symbol: "MC.PA".into(),
        };
        let (aligned, report) = align(&input, &universe(), &policy).unwrap();
        assert!(report.calendar_fallback);
        assert_eq!(aligned.len(), 2);
    }

    #[test]
    fn nothing_fetched_is_an_empty_table() {
        let (aligned, report) =
            align(&BTreeMap::new(), &universe(), &CalendarPolicy::Union).unwrap();
        assert!(aligned.is_empty());
        assert_eq!(aligned.symbols().len(), 3);
        assert_eq!(report.empty_columns.len(), 3);
    }

    #[test]
    fn from_columns_checks_invariants() {
        assert!(matches!(
            AlignedSeries::from_columns(vec![d(3), d(2)], vec![]),
            Err(AlignError::UnsortedIndex(1))
        ));
        assert!(matches!(
            AlignedSeries::from_columns(vec![d(2)], vec![("A".into(), vec![])]),
            Err(AlignError::ColumnLength { .. })
        ));
        assert!(matches!(
            AlignedSeries::from_columns(
                vec![d(2)],
                vec![("A".into(), vec![None]), ("A".into(), vec![None])]
            ),
            Err(AlignError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn calendar_policy_toml_shape() {
        #[derive(Deserialize)]
        struct Wrapper {
            calendar: CalendarPolicy,
        }
        let w: Wrapper = toml::from_str("[calendar]\ntype = \"category\"\ncategory = \"equity\"\n")
            .unwrap();
        assert_eq!(
            w.calendar,
            CalendarPolicy::Category {
                category: InstrumentCategory::Equity
            }
        );
        assert_eq!(w.calendar.to_string(), "category:equity");
    }
}
