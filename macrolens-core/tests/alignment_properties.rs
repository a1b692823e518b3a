//! Property tests for the alignment engine.
//!
//! Uses proptest to verify, for arbitrary per-instrument calendars:
//! 1. Every column is exactly as long as the date index
//! 2. The index is strictly increasing and is the union of observed dates
//! 3. Each cell is the last observation on or before its date
//! 4. Leading gaps are null and nothing after the first observation is null

use chrono::NaiveDate;
use macrolens_core::align::{align, CalendarPolicy};
use macrolens_core::data::Universe;
use macrolens_core::domain::{Instrument, PricePoint};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const SYMBOLS: [&str; 3] = ["EQ1", "EQ2", "MAC"];

fn universe() -> Universe {
    Universe::new(vec![
        Instrument::equity("EQ1", "Equity one"),
        Instrument::equity("EQ2", "Equity two"),
        Instrument::macro_factor("MAC", "Macro"),
    ])
    .unwrap()
}

fn day(offset: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + chrono::Duration::days(offset as i64)
}

/// Up to 60 distinct day offsets with a positive close each, sorted.
fn arb_series() -> impl Strategy<Value = Vec<PricePoint>> {
    prop::collection::btree_map(0u32..120, 1.0..500.0_f64, 0..60).prop_map(|m| {
        m.into_iter()
            .map(|(offset, close)| PricePoint::from_close(day(offset), close))
            .collect()
    })
}

fn arb_input() -> impl Strategy<Value = BTreeMap<String, Vec<PricePoint>>> {
    (arb_series(), arb_series(), arb_series(), any::<[bool; 3]>()).prop_map(
        |(a, b, c, present)| {
            let mut input = BTreeMap::new();
            for ((symbol, series), keep) in SYMBOLS.iter().zip([a, b, c]).zip(present) {
                // A missing key models a failed fetch.
                if keep {
                    input.insert(symbol.to_string(), series);
                }
            }
            input
        },
    )
}

proptest! {
    #[test]
    fn columns_are_rectangular_and_index_is_strict(input in arb_input()) {
        let (aligned, _) = align(&input, &universe(), &CalendarPolicy::Union).unwrap();

        for w in aligned.dates().windows(2) {
            prop_assert!(w[0] < w[1]);
        }
        prop_assert_eq!(aligned.symbols().len(), 3);
        for (_, column) in aligned.columns() {
            prop_assert_eq!(column.len(), aligned.len());
        }

        let expected: BTreeSet<NaiveDate> =
            input.values().flatten().map(|p| p.date).collect();
        let actual: BTreeSet<NaiveDate> = aligned.dates().iter().copied().collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn cells_hold_last_observation_at_or_before_date(input in arb_input()) {
        let (aligned, report) = align(&input, &universe(), &CalendarPolicy::Union).unwrap();

        for symbol in SYMBOLS {
            let column = aligned.column(symbol).unwrap();
            let points = input.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
            for (date, cell) in aligned.dates().iter().zip(column) {
                let expected = points.iter().rev().find(|p| p.date <= *date).map(|p| p.close);
                prop_assert_eq!(*cell, expected);
            }

            let first_some = column.iter().position(Option::is_some);
            match first_some {
                None => prop_assert!(report.empty_columns.contains(&symbol.to_string())),
                Some(first) => {
                    prop_assert!(column[first..].iter().all(Option::is_some));
                    let gaps = report.leading_gaps.get(symbol).copied().unwrap_or(0);
                    prop_assert_eq!(gaps, first);
                }
            }
        }
    }

    #[test]
    fn category_calendar_is_subset_of_union(input in arb_input()) {
        let (union, _) = align(&input, &universe(), &CalendarPolicy::Union).unwrap();
        let policy = CalendarPolicy::Category {
            category: macrolens_core::domain::InstrumentCategory::Equity,
        };
        let (equity, report) = align(&input, &universe(), &policy).unwrap();
        if !report.calendar_fallback {
            let all: BTreeSet<_> = union.dates().iter().collect();
            prop_assert!(equity.dates().iter().all(|d| all.contains(d)));
        }
    }
}

#[test]
fn disjoint_holidays_carry_prior_close() {
    // Paris closed on the 1st of May, New York closed on the 27th of May.
    let d = |m: u32, day: u32| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
    let paris = vec![
        PricePoint::from_close(d(4, 30), 700.0),
        PricePoint::from_close(d(5, 2), 705.0),
        PricePoint::from_close(d(5, 27), 710.0),
        PricePoint::from_close(d(5, 28), 712.0),
    ];
    let ny = vec![
        PricePoint::from_close(d(4, 30), 80.0),
        PricePoint::from_close(d(5, 1), 81.0),
        PricePoint::from_close(d(5, 2), 82.0),
        PricePoint::from_close(d(5, 28), 83.0),
    ];
    let mut input = BTreeMap::new();
    input.insert("EQ1".to_string(), paris);
    input.insert("MAC".to_string(), ny);

    let (aligned, report) = align(&input, &universe(), &CalendarPolicy::Union).unwrap();
    assert_eq!(
        aligned.dates(),
        &[d(4, 30), d(5, 1), d(5, 2), d(5, 27), d(5, 28)]
    );
    assert_eq!(
        aligned.column("EQ1").unwrap(),
        &[Some(700.0), Some(700.0), Some(705.0), Some(710.0), Some(712.0)]
    );
    assert_eq!(
        aligned.column("MAC").unwrap(),
        &[Some(80.0), Some(81.0), Some(82.0), Some(82.0), Some(83.0)]
    );
    assert_eq!(report.forward_filled.get("EQ1"), Some(&1));
    assert_eq!(report.forward_filled.get("MAC"), Some(&1));
    // EQ2 was never fetched.
    assert_eq!(aligned.column("EQ2").unwrap(), &[None; 5]);
}
