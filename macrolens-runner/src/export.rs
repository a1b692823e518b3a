//! Output writer: enriched table, mapping table, analytics and run manifest.
//!
//! Every file is written to a temporary sibling and renamed into place, so a
//! reader never sees a half-written file. Write failures are returned as
//! [`OutputError`] and never retried.
//!
//! Files produced in the output directory:
//! - `enriched.csv` / `enriched.parquet`: one row per date, four columns per instrument
//! - `mapping.csv`: equity → factor with provenance
//! - `risk_return.csv`, `sensitivity.csv`, `rolling_correlation.csv`
//! - `manifest.json`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use macrolens_core::align::{AlignmentReport, CalendarPolicy};
use macrolens_core::analytics::RiskReturn;
use macrolens_core::data::{DataSource, Universe};
use macrolens_core::features::FeatureTable;
use macrolens_core::influence::{InfluenceMapping, MappingSource};
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::OutputFormat;
use crate::pipeline::{EquitySensitivity, PipelineResults, RollingCorrelation};

/// Version of the manifest and file layout.
pub const SCHEMA_VERSION: u32 = 1;

pub const ENRICHED_CSV: &str = "enriched.csv";
pub const ENRICHED_PARQUET: &str = "enriched.parquet";
pub const MAPPING_CSV: &str = "mapping.csv";
pub const RISK_RETURN_CSV: &str = "risk_return.csv";
pub const SENSITIVITY_CSV: &str = "sensitivity.csv";
pub const ROLLING_CORRELATION_CSV: &str = "rolling_correlation.csv";
pub const MANIFEST_JSON: &str = "manifest.json";

const FEATURE_SUFFIXES: [&str; 4] = ["close", "log_return", "volatility", "rebased"];

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {path}: {reason}")]
    WriteFailure { path: String, reason: String },
}

impl OutputError {
    fn at(path: &Path, reason: impl ToString) -> Self {
        OutputError::WriteFailure {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Counts of mapping provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MappingSummary {
    pub rule: usize,
    pub correlation: usize,
    pub unmapped: usize,
}

impl MappingSummary {
    pub fn of(mapping: &InfluenceMapping) -> Self {
        Self {
            rule: mapping.count(MappingSource::Rule),
            correlation: mapping.count(MappingSource::Correlation),
            unmapped: mapping.count(MappingSource::Unmapped),
        }
    }
}

/// Provenance and data conditions of one run, written as `manifest.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub calendar: CalendarPolicy,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub rows: usize,
    pub instruments: usize,
    pub sources: BTreeMap<String, DataSource>,
    pub unavailable: BTreeMap<String, String>,
    pub mapping: MappingSummary,
    pub diagnostics: AlignmentReport,
}

/// Paths of the files written by [`write_outputs`].
#[derive(Debug, Clone)]
pub struct OutputFiles {
    pub enriched: PathBuf,
    pub mapping: PathBuf,
    pub risk_return: PathBuf,
    pub sensitivity: PathBuf,
    pub rolling_correlation: PathBuf,
    pub manifest: PathBuf,
}

/// Write every output file into `dir`, creating it if needed.
pub fn write_outputs(
    results: &PipelineResults,
    dir: &Path,
    format: OutputFormat,
) -> Result<OutputFiles, OutputError> {
    fs::create_dir_all(dir).map_err(|e| OutputError::at(dir, e))?;

    let enriched = match format {
        OutputFormat::Csv => {
            let path = dir.join(ENRICHED_CSV);
            write_atomic(&path, &enriched_csv(&results.features, &path)?)?;
            path
        }
        OutputFormat::Parquet => {
            let path = dir.join(ENRICHED_PARQUET);
            write_enriched_parquet(&results.features, &path)?;
            path
        }
    };

    let mapping = dir.join(MAPPING_CSV);
    write_atomic(
        &mapping,
        &mapping_csv(&results.mapping, &results.universe, &mapping)?,
    )?;

    let risk_return = dir.join(RISK_RETURN_CSV);
    write_atomic(&risk_return, &risk_return_csv(&results.risk_return, &risk_return)?)?;

    let sensitivity = dir.join(SENSITIVITY_CSV);
    write_atomic(&sensitivity, &sensitivity_csv(&results.sensitivities, &sensitivity)?)?;

    let rolling_correlation = dir.join(ROLLING_CORRELATION_CSV);
    write_atomic(
        &rolling_correlation,
        &rolling_correlation_csv(
            results.features.dates(),
            &results.rolling_correlations,
            &rolling_correlation,
        )?,
    )?;

    let manifest = dir.join(MANIFEST_JSON);
    let json =
        serde_json::to_vec_pretty(&results.manifest).map_err(|e| OutputError::at(&manifest, e))?;
    write_atomic(&manifest, &json)?;

    Ok(OutputFiles {
        enriched,
        mapping,
        risk_return,
        sensitivity,
        rolling_correlation,
        manifest,
    })
}

// ─── CSV tables ─────────────────────────────────────────────────────

/// `date`, then `{symbol}.{feature}` for every instrument in table order.
pub fn enriched_csv(features: &FeatureTable, path: &Path) -> Result<Vec<u8>, OutputError> {
    let err = |e: csv::Error| OutputError::at(path, e);
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["date".to_string()];
    for symbol in features.symbols() {
        header.extend(FEATURE_SUFFIXES.iter().map(|s| format!("{symbol}.{s}")));
    }
    wtr.write_record(&header).map_err(err)?;

    for (i, date) in features.dates().iter().enumerate() {
        let mut record = Vec::with_capacity(header.len());
        record.push(date.to_string());
        for (_, f) in features.iter() {
            record.push(cell(f.close[i]));
            record.push(cell(f.log_return[i]));
            record.push(cell(f.volatility[i]));
            record.push(cell(f.rebased[i]));
        }
        wtr.write_record(&record).map_err(err)?;
    }

    wtr.into_inner().map_err(|e| OutputError::at(path, e))
}

/// One row per equity, in mapping order.
pub fn mapping_csv(
    mapping: &InfluenceMapping,
    universe: &Universe,
    path: &Path,
) -> Result<Vec<u8>, OutputError> {
    let err = |e: csv::Error| OutputError::at(path, e);
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "equity",
        "equity_name",
        "factor",
        "factor_name",
        "source",
        "correlation",
        "overlap",
    ])
    .map_err(err)?;

    for entry in mapping.iter() {
        let factor = entry.factor.as_deref().unwrap_or("");
        let factor_name = if factor.is_empty() {
            ""
        } else {
            universe.display_name(factor)
        };
        let correlation = cell(entry.correlation);
        let overlap = entry.overlap.to_string();
        wtr.write_record([
            entry.equity.as_str(),
            universe.display_name(&entry.equity),
            factor,
            factor_name,
            entry.source.as_str(),
            correlation.as_str(),
            overlap.as_str(),
        ])
        .map_err(err)?;
    }

    wtr.into_inner().map_err(|e| OutputError::at(path, e))
}

pub fn risk_return_csv(stats: &[RiskReturn], path: &Path) -> Result<Vec<u8>, OutputError> {
    let err = |e: csv::Error| OutputError::at(path, e);
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "mean_daily",
        "std_daily",
        "annualized_return",
        "annualized_volatility",
        "observations",
        "first_date",
        "last_date",
    ])
    .map_err(err)?;

    for s in stats {
        wtr.write_record([
            s.symbol.clone(),
            s.mean_daily.to_string(),
            cell(s.std_daily),
            s.annualized_return.to_string(),
            cell(s.annualized_volatility),
            s.observations.to_string(),
            s.first_date.to_string(),
            s.last_date.to_string(),
        ])
        .map_err(err)?;
    }

    wtr.into_inner().map_err(|e| OutputError::at(path, e))
}

pub fn sensitivity_csv(rows: &[EquitySensitivity], path: &Path) -> Result<Vec<u8>, OutputError> {
    let err = |e: csv::Error| OutputError::at(path, e);
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "equity",
        "factor",
        "source",
        "beta",
        "alpha",
        "correlation",
        "r_squared",
        "observations",
    ])
    .map_err(err)?;

    for row in rows {
        wtr.write_record([
            row.equity.clone(),
            row.factor.clone(),
            row.source.as_str().to_string(),
            row.fit.beta.to_string(),
            row.fit.alpha.to_string(),
            cell(row.fit.correlation),
            cell(row.fit.r_squared),
            row.fit.observations.to_string(),
        ])
        .map_err(err)?;
    }

    wtr.into_inner().map_err(|e| OutputError::at(path, e))
}

/// `date`, then one `{equity}:{factor}` column per mapped equity.
pub fn rolling_correlation_csv(
    dates: &[NaiveDate],
    series: &[RollingCorrelation],
    path: &Path,
) -> Result<Vec<u8>, OutputError> {
    let err = |e: csv::Error| OutputError::at(path, e);
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["date".to_string()];
    header.extend(series.iter().map(|s| format!("{}:{}", s.equity, s.factor)));
    wtr.write_record(&header).map_err(err)?;

    for (i, date) in dates.iter().enumerate() {
        let mut record = vec![date.to_string()];
        record.extend(series.iter().map(|s| cell(s.values.get(i).copied().flatten())));
        wtr.write_record(&record).map_err(err)?;
    }

    wtr.into_inner().map_err(|e| OutputError::at(path, e))
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ─── Parquet ────────────────────────────────────────────────────────

fn enriched_dataframe(features: &FeatureTable) -> PolarsResult<DataFrame> {
    let epoch = NaiveDate::default();
    let days: Vec<i32> = features
        .dates()
        .iter()
        .map(|d| (*d - epoch).num_days() as i32)
        .collect();

    let mut columns = vec![Column::new("date".into(), days).cast(&DataType::Date)?];
    for (symbol, f) in features.iter() {
        for (suffix, values) in FEATURE_SUFFIXES
            .iter()
            .zip([&f.close, &f.log_return, &f.volatility, &f.rebased])
        {
            columns.push(Column::new(
                format!("{symbol}.{suffix}").into(),
                values.to_vec(),
            ));
        }
    }
    DataFrame::new(columns)
}

fn write_enriched_parquet(features: &FeatureTable, path: &Path) -> Result<(), OutputError> {
    let mut df = enriched_dataframe(features).map_err(|e| OutputError::at(path, e))?;
    let tmp = tmp_path(path);
    let file = fs::File::create(&tmp).map_err(|e| OutputError::at(path, e))?;
    ParquetWriter::new(file).finish(&mut df).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        OutputError::at(path, e)
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        OutputError::at(path, e)
    })?;
    debug!(path = %path.display(), rows = df.height(), "wrote parquet");
    Ok(())
}

// ─── Atomic file write ──────────────────────────────────────────────

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), OutputError> {
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).map_err(|e| OutputError::at(path, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        OutputError::at(path, e)
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}
