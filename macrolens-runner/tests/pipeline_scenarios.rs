//! End-to-end pipeline scenarios against an in-memory provider.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{Datelike, NaiveDate, Weekday};
use macrolens_core::data::{DataError, DataProvider, DataSource, FetchResult, ParquetCache};
use macrolens_core::domain::PricePoint;
use macrolens_core::influence::{MappingSource, UnmappedReason};
use macrolens_runner::{
    compute, run_pipeline, OutputError, OutputFormat, PipelineConfig, PipelineError, RunOptions,
};

struct MapProvider {
    series: BTreeMap<String, Vec<PricePoint>>,
    failing: BTreeSet<String>,
}

impl DataProvider for MapProvider {
    fn name(&self) -> &str {
        "map"
    }

    fn fetch(
        &self,
        symbol: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        if self.failing.contains(symbol) {
            return Err(DataError::NetworkUnreachable(format!("{symbol}: connection reset")));
        }
        let points = self
            .series
            .get(symbol)
            .cloned()
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })?;
        Ok(FetchResult {
            symbol: symbol.to_string(),
            points,
            source: DataSource::YahooFinance,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn weekdays(n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    while out.len() < n {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(day);
        }
        day = day.succ_opt().unwrap();
    }
    out
}

fn prices(dates: &[NaiveDate], returns: impl Fn(usize) -> f64) -> Vec<PricePoint> {
    let mut price = 100.0;
    dates
        .iter()
        .enumerate()
        .map(|(t, date)| {
            if t > 0 {
                price *= returns(t).exp();
            }
            PricePoint::from_close(*date, price)
        })
        .collect()
}

fn m1(t: usize) -> f64 {
    0.01 * (t as f64 * 0.7).sin()
}

fn m2(t: usize) -> f64 {
    0.01 * (t as f64 * 1.3).cos()
}

fn provider(n: usize) -> MapProvider {
    let dates = weekdays(n);
    let mut series = BTreeMap::new();
    series.insert("M1".to_string(), prices(&dates, m1));
    series.insert("M2".to_string(), prices(&dates, m2));
    series.insert(
        "A".to_string(),
        prices(&dates, |t| m1(t) + 0.002 * (t as f64 * 2.9).sin()),
    );
    MapProvider {
        series,
        failing: ["DEAD".to_string()].into_iter().collect(),
    }
}

const UNIVERSE: &str = r#"
[window]
start = "2024-01-01"
end = "2024-12-31"

[fetch]
workers = 2

[[instrument]]
symbol = "A"
category = "equity"
name = "Alpha"

[[instrument]]
symbol = "DEAD"
category = "equity"
name = "Delisted"

[[instrument]]
symbol = "M1"
category = "macro"
name = "Macro one"

[[instrument]]
symbol = "M2"
category = "macro"
name = "Macro two"
"#;

fn config(out: &Path, extra: &str) -> PipelineConfig {
    let mut cfg = PipelineConfig::from_toml(&format!("{UNIVERSE}\n{extra}")).unwrap();
    cfg.output.dir = out.to_path_buf();
    cfg
}

fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    let header = rdr.headers().unwrap().iter().map(String::from).collect();
    let rows = rdr
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    (header, rows)
}

#[test]
fn failed_fetch_degrades_to_unmapped_and_outputs_are_written() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(tmp.path().join("cache"));
    let cfg = config(&tmp.path().join("out"), "");
    let provider = provider(120);

    let output = run_pipeline(&cfg, &cache, Some(&provider), &RunOptions::default()).unwrap();
    let results = &output.results;

    // DEAD: all-null column, unmapped for lack of history.
    let dead = results.features.get("DEAD").unwrap();
    assert!(!dead.has_history());
    let entry = results.mapping.get("DEAD").unwrap();
    assert_eq!(entry.source, MappingSource::Unmapped);
    assert_eq!(entry.reason, Some(UnmappedReason::NoHistory));

    // A is unaffected and maps to the factor it tracks.
    assert_eq!(results.features.get("A").unwrap().history_len(), 120);
    let a = results.mapping.get("A").unwrap();
    assert_eq!(a.source, MappingSource::Correlation);
    assert_eq!(a.factor.as_deref(), Some("M1"));
    assert!(a.correlation.unwrap() > 0.9);

    // Files and headers.
    let (header, rows) = read_csv(&output.files.enriched);
    assert_eq!(header.len(), 1 + 4 * 4);
    assert_eq!(header[0], "date");
    assert_eq!(rows.len(), 120);

    let (header, rows) = read_csv(&output.files.mapping);
    assert_eq!(
        header,
        ["equity", "equity_name", "factor", "factor_name", "source", "correlation", "overlap"]
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][..5], ["A", "Alpha", "M1", "Macro one", "correlation"]);
    assert_eq!(rows[1][..5], ["DEAD", "Delisted", "", "", "unmapped"]);

    let (_, rows) = read_csv(&output.files.risk_return);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "A");

    let (_, rows) = read_csv(&output.files.sensitivity);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][..3], ["A", "M1", "correlation"]);

    let (header, rows) = read_csv(&output.files.rolling_correlation);
    assert_eq!(header, ["date", "A:M1"]);
    assert_eq!(rows.len(), 120);
    assert_eq!(rows[59][1], "");
    assert!(!rows[60][1].is_empty());

    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output.files.manifest).unwrap()).unwrap();
    assert_eq!(manifest["schema_version"], 1);
    assert_eq!(manifest["rows"], 120);
    assert_eq!(manifest["sources"]["A"], "yahoo_finance");
    assert!(manifest["unavailable"]["DEAD"]
        .as_str()
        .unwrap()
        .contains("connection reset"));
    assert_eq!(manifest["mapping"]["unmapped"], 1);
    assert_eq!(manifest["diagnostics"]["empty_columns"][0], "DEAD");
    assert_eq!(manifest["calendar"]["type"], "union");
}

#[test]
fn second_run_is_served_from_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(tmp.path().join("cache"));
    let cfg = config(&tmp.path().join("out"), "");

    let online = compute(&cfg, &cache, Some(&provider(80)), &RunOptions::default()).unwrap();
    assert!(cache.get_meta("A").is_some());
    assert!(cache.get_meta("DEAD").is_none());

    let offline = compute(
        &cfg,
        &cache,
        None,
        &RunOptions {
            offline: true,
            ..RunOptions::default()
        },
    )
    .unwrap();
    assert_eq!(offline.manifest.sources["A"], DataSource::Cache);
    assert_eq!(online.manifest.dataset_hash, offline.manifest.dataset_hash);
    assert_eq!(online.mapping, offline.mapping);
}

#[test]
fn explicit_rule_overrides_correlation() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(tmp.path().join("cache"));
    let cfg = config(&tmp.path().join("out"), "[rules]\nA = \"M2\"\n");

    let results = compute(&cfg, &cache, Some(&provider(120)), &RunOptions::default()).unwrap();
    let a = results.mapping.get("A").unwrap();
    assert_eq!(a.source, MappingSource::Rule);
    assert_eq!(a.factor.as_deref(), Some("M2"));
    assert_eq!(results.sensitivities[0].factor, "M2");
    assert_eq!(results.sensitivities[0].source, MappingSource::Rule);
}

#[test]
fn disjoint_holidays_are_forward_filled() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(tmp.path().join("cache"));
    let cfg = config(&tmp.path().join("out"), "");

    let mut provider = provider(40);
    let dates = weekdays(40);
    let (a_holiday, m1_holiday) = (dates[10], dates[20]);
    provider
        .series
        .get_mut("A")
        .unwrap()
        .retain(|p| p.date != a_holiday);
    provider
        .series
        .get_mut("M1")
        .unwrap()
        .retain(|p| p.date != m1_holiday);

    let results = compute(&cfg, &cache, Some(&provider), &RunOptions::default()).unwrap();
    assert_eq!(results.features.dates(), dates.as_slice());

    let a = &results.features.get("A").unwrap().close;
    assert_eq!(a[10], a[9]);
    assert!(a[20].is_some());
    let m1 = &results.features.get("M1").unwrap().close;
    assert_eq!(m1[20], m1[19]);
    assert_eq!(results.manifest.diagnostics.forward_filled["A"], 1);
    assert_eq!(results.manifest.diagnostics.forward_filled["M1"], 1);
}

#[test]
fn parquet_format_writes_enriched_parquet() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(tmp.path().join("cache"));
    let mut cfg = config(&tmp.path().join("out"), "");
    cfg.output.format = OutputFormat::Parquet;

    let output = run_pipeline(&cfg, &cache, Some(&provider(40)), &RunOptions::default()).unwrap();
    assert!(output.files.enriched.ends_with("enriched.parquet"));
    assert!(output.files.enriched.exists());
    assert!(!tmp.path().join("out/enriched.csv").exists());
}

#[test]
fn unwritable_output_is_an_output_error() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(tmp.path().join("cache"));
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();
    let cfg = config(&blocker.join("out"), "");

    let err = run_pipeline(&cfg, &cache, Some(&provider(40)), &RunOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Output(OutputError::WriteFailure { .. })
    ));
}

#[test]
fn offline_without_cache_leaves_everything_unmapped() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(tmp.path().join("cache"));
    let cfg = config(&tmp.path().join("out"), "");

    let results = compute(
        &cfg,
        &cache,
        None,
        &RunOptions {
            offline: true,
            ..RunOptions::default()
        },
    )
    .unwrap();
    assert!(results.features.is_empty());
    assert_eq!(results.mapping.count(MappingSource::Unmapped), 2);
    assert_eq!(results.manifest.unavailable.len(), 4);
}
