//! Influence mapper scenarios on constructed return series.

use chrono::NaiveDate;
use macrolens_core::align::{align, AlignedSeries, CalendarPolicy};
use macrolens_core::data::Universe;
use macrolens_core::domain::{Instrument, PricePoint};
use macrolens_core::features::{compute_features, FeatureConfig, FeatureTable};
use macrolens_core::influence::{
    InfluenceMapper, MappingConfig, MappingSource, RuleTable, UnmappedReason,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

const DAYS: usize = 100;

fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
    (0..n as i64)
        .map(|i| start + chrono::Duration::days(i))
        .collect()
}

fn noise(rng: &mut StdRng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn centered_unit(v: &[f64]) -> Vec<f64> {
    let mean = v.iter().sum::<f64>() / v.len() as f64;
    let c: Vec<f64> = v.iter().map(|x| x - mean).collect();
    let norm = c.iter().map(|x| x * x).sum::<f64>().sqrt();
    c.iter().map(|x| x / norm).collect()
}

fn remove_component(v: &[f64], u: &[f64]) -> Vec<f64> {
    let dot: f64 = v.iter().zip(u).map(|(a, b)| a * b).sum();
    v.iter().zip(u).map(|(a, b)| a - dot * b).collect()
}

fn combine(a: &[f64], wa: f64, b: &[f64], wb: f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| wa * x + wb * y).collect()
}

fn prices(returns: &[f64]) -> Vec<Option<f64>> {
    let mut p = 50.0;
    let mut out = vec![Some(p)];
    for r in returns {
        p *= (0.01 * r).exp();
        out.push(Some(p));
    }
    out
}

/// Returns for A, M1 and M2 with corr(A, M1) = 0.9 and corr(A, M2) = 0.3,
/// built by Gram-Schmidt on seeded noise.
fn scenario_returns() -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(42);
    let n = DAYS - 1;
    let u = centered_unit(&noise(&mut rng, n));
    let v1 = centered_unit(&remove_component(&noise(&mut rng, n), &u));
    let raw2 = remove_component(&noise(&mut rng, n), &u);
    let v2 = centered_unit(&remove_component(&raw2, &v1));

    let m1 = combine(&u, 0.9, &v1, (1.0f64 - 0.81).sqrt());
    let m2 = combine(&u, 0.3, &v2, (1.0f64 - 0.09).sqrt());
    (u, m1, m2)
}

fn universe() -> Universe {
    Universe::new(vec![
        Instrument::equity("A", "Equity A"),
        Instrument::macro_factor("M1", "Factor one"),
        Instrument::macro_factor("M2", "Factor two"),
    ])
    .unwrap()
}

fn scenario_features() -> FeatureTable {
    let (a, m1, m2) = scenario_returns();
    let aligned = AlignedSeries::from_columns(
        dates(DAYS),
        vec![
            ("A".into(), prices(&a)),
            ("M1".into(), prices(&m1)),
            ("M2".into(), prices(&m2)),
        ],
    )
    .unwrap();
    compute_features(&aligned, &FeatureConfig::default())
}

#[test]
fn scenario_returns_have_the_intended_correlations() {
    let (a, m1, m2) = scenario_returns();
    let corr =
        |x: &[f64], y: &[f64]| macrolens_core::influence::correlation::pearson(x, y).unwrap();
    assert!((corr(&a, &m1) - 0.9).abs() < 1e-9);
    assert!((corr(&a, &m2) - 0.3).abs() < 1e-9);
}

#[test]
fn strongest_correlation_wins_without_rule() {
    let features = scenario_features();
    let mapping = InfluenceMapper::new(RuleTable::default(), MappingConfig::default())
        .map(&universe(), &features);

    let entry = mapping.get("A").unwrap();
    assert_eq!(entry.factor.as_deref(), Some("M1"));
    assert_eq!(entry.source, MappingSource::Correlation);
    assert_eq!(entry.overlap, DAYS - 1);
    // Log returns of the constructed prices are 0.01 * r, so ρ is preserved.
    assert!((entry.correlation.unwrap() - 0.9).abs() < 1e-6);
}

#[test]
fn rule_overrides_statistics() {
    let features = scenario_features();
    let mut rules = RuleTable::default();
    rules.insert("A", "M2");
    let mapping = InfluenceMapper::new(rules, MappingConfig::default()).map(&universe(), &features);

    let entry = mapping.get("A").unwrap();
    assert_eq!(entry.factor.as_deref(), Some("M2"));
    assert_eq!(entry.source, MappingSource::Rule);
    assert!((entry.correlation.unwrap() - 0.3).abs() < 1e-6);
}

#[test]
fn mapping_is_deterministic() {
    let mapper = InfluenceMapper::new(RuleTable::default(), MappingConfig::default());
    let first = mapper.map(&universe(), &scenario_features());
    for _ in 0..5 {
        assert_eq!(mapper.map(&universe(), &scenario_features()), first);
    }
}

#[test]
fn failed_fetch_leaves_equity_unmapped_and_others_intact() {
    let (a, m1, _) = scenario_returns();
    let to_points = |returns: &[f64]| -> Vec<PricePoint> {
        dates(DAYS)
            .into_iter()
            .zip(prices(returns))
            .filter_map(|(d, p)| p.map(|p| PricePoint::from_close(d, p)))
            .collect()
    };

    let universe = Universe::new(vec![
        Instrument::equity("A", "Equity A"),
        Instrument::equity("DEAD", "Delisted"),
        Instrument::macro_factor("M1", "Factor one"),
        Instrument::macro_factor("M2", "Factor two"),
    ])
    .unwrap();

    // DEAD and M2 failed to fetch.
    let mut fetched = BTreeMap::new();
    fetched.insert("A".to_string(), to_points(&a));
    fetched.insert("M1".to_string(), to_points(&m1));

    let (aligned, report) = align(&fetched, &universe, &CalendarPolicy::Union).unwrap();
    assert_eq!(report.empty_columns, vec!["DEAD".to_string(), "M2".to_string()]);
    let features = compute_features(&aligned, &FeatureConfig::default());

    let mut rules = RuleTable::default();
    rules.insert("DEAD", "M1");
    let mapping = InfluenceMapper::new(rules, MappingConfig::default()).map(&universe, &features);

    let dead = mapping.get("DEAD").unwrap();
    assert_eq!(dead.source, MappingSource::Unmapped);
    assert_eq!(dead.reason, Some(UnmappedReason::NoHistory));
    assert_eq!(mapping.factor_of("A"), Some("M1"));
    assert_eq!(mapping.len(), 2);

    // A's features match a run where DEAD and M2 were never in the universe.
    let alone = AlignedSeries::from_columns(dates(DAYS), vec![("A".into(), prices(&a))]).unwrap();
    let alone = compute_features(&alone, &FeatureConfig::default());
    assert_eq!(features.get("A"), alone.get("A"));
}

#[test]
fn short_overlap_is_unmapped() {
    let (a, m1, m2) = scenario_returns();
    // The factors only start trading 80 days in: 19 shared returns.
    let late = |r: &[f64]| -> Vec<Option<f64>> {
        prices(r)
            .into_iter()
            .enumerate()
            .map(|(i, p)| if i < 80 { None } else { p })
            .collect()
    };
    let aligned = AlignedSeries::from_columns(
        dates(DAYS),
        vec![
            ("A".into(), prices(&a)),
            ("M1".into(), late(&m1)),
            ("M2".into(), late(&m2)),
        ],
    )
    .unwrap();
    let features = compute_features(&aligned, &FeatureConfig::default());
    let mapping = InfluenceMapper::new(RuleTable::default(), MappingConfig::default())
        .map(&universe(), &features);
    let entry = mapping.get("A").unwrap();
    assert_eq!(entry.source, MappingSource::Unmapped);
    assert_eq!(entry.reason, Some(UnmappedReason::InsufficientHistory));
}

#[test]
fn overlap_threshold_edge() {
    let (a, m1, m2) = scenario_returns();
    let map_from = |first: usize| {
        let late = |r: &[f64]| -> Vec<Option<f64>> {
            prices(r)
                .into_iter()
                .enumerate()
                .map(|(i, p)| if i < first { None } else { p })
                .collect()
        };
        let aligned = AlignedSeries::from_columns(
            dates(DAYS),
            vec![
                ("A".into(), prices(&a)),
                ("M1".into(), late(&m1)),
                ("M2".into(), late(&m2)),
            ],
        )
        .unwrap();
        let features = compute_features(&aligned, &FeatureConfig::default());
        InfluenceMapper::new(RuleTable::default(), MappingConfig::default())
            .map(&universe(), &features)
    };

    // Factors priced from index 70: 29 shared returns.
    let mapping = map_from(70);
    let entry = mapping.get("A").unwrap();
    assert_eq!(entry.source, MappingSource::Unmapped);
    assert_eq!(entry.reason, Some(UnmappedReason::InsufficientHistory));

    // From index 69: exactly 30.
    let mapping = map_from(69);
    let entry = mapping.get("A").unwrap();
    assert_eq!(entry.source, MappingSource::Correlation);
    assert_eq!(entry.overlap, 30);
    assert!(entry.factor.is_some());
}
