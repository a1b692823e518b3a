//! Pipeline orchestration: load → align → features → mapping → analytics → export.
//!
//! Stages run in this strict order, each on the complete output of the one
//! before. Only configuration and output failures end a run; a missing
//! instrument flows through as an all-null column and an unmapped equity.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use macrolens_core::analytics::{
    risk_return, rolling_correlation, sensitivity, RiskReturn, Sensitivity,
};
use macrolens_core::data::{DataProvider, LogProgress, ParquetCache, Universe};
use macrolens_core::features::{compute_features, FeatureTable};
use macrolens_core::influence::{InfluenceMapper, InfluenceMapping, MappingSource};

use crate::config::{ConfigError, PipelineConfig};
use crate::data_loader::{load_universe_data, LoadError, LoadOptions};
use crate::export::{
    write_outputs, MappingSummary, OutputError, OutputFiles, RunManifest, SCHEMA_VERSION,
};

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("load error: {0}")]
    Load(#[from] LoadError),
    #[error("output error: {0}")]
    Output(#[from] OutputError),
}

/// Per-run switches that are not part of the persisted config.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub offline: bool,
    pub synthetic: bool,
    pub force: bool,
    /// Resolves an open-ended window; `None` means the local date.
    pub today: Option<NaiveDate>,
}

/// OLS fit of one mapped equity against its factor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquitySensitivity {
    pub equity: String,
    pub factor: String,
    pub source: MappingSource,
    #[serde(flatten)]
    pub fit: Sensitivity,
}

/// Trailing correlation of one mapped equity with its factor, on the table index.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingCorrelation {
    pub equity: String,
    pub factor: String,
    pub values: Vec<Option<f64>>,
}

/// Everything a run computes, ready for export.
#[derive(Debug, Clone)]
pub struct PipelineResults {
    pub universe: Universe,
    pub features: FeatureTable,
    pub mapping: InfluenceMapping,
    pub risk_return: Vec<RiskReturn>,
    pub sensitivities: Vec<EquitySensitivity>,
    pub rolling_correlations: Vec<RollingCorrelation>,
    pub manifest: RunManifest,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub results: PipelineResults,
    pub files: OutputFiles,
}

/// Run the whole pipeline and write its outputs to `config.output.dir`.
pub fn run_pipeline(
    config: &PipelineConfig,
    cache: &ParquetCache,
    provider: Option<&dyn DataProvider>,
    opts: &RunOptions,
) -> Result<PipelineOutput, PipelineError> {
    let results = compute(config, cache, provider, opts)?;

    info!(dir = %config.output.dir.display(), "stage: export");
    let files = write_outputs(&results, &config.output.dir, config.output.format)?;
    info!(manifest = %files.manifest.display(), "pipeline complete");

    Ok(PipelineOutput { results, files })
}

/// Every stage except export.
pub fn compute(
    config: &PipelineConfig,
    cache: &ParquetCache,
    provider: Option<&dyn DataProvider>,
    opts: &RunOptions,
) -> Result<PipelineResults, PipelineError> {
    config.validate()?;
    let universe = config.universe()?;
    let rules = config.rule_table(&universe);
    let today = opts
        .today
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let start = config.window.start;
    let end = config.end_date(today);
    if end < start {
        return Err(
            ConfigError::Invalid(format!("window end {end} is before start {start}")).into(),
        );
    }

    info!(
        instruments = universe.len(),
        %start,
        %end,
        calendar = %config.calendar,
        "stage: load"
    );
    let load_opts = LoadOptions {
        start,
        end,
        offline: opts.offline,
        synthetic: opts.synthetic,
        force: opts.force,
        workers: config.fetch.workers,
        calendar: config.calendar.clone(),
    };
    let loaded = load_universe_data(&universe, cache, provider, &LogProgress, &load_opts)?;
    info!(
        rows = loaded.aligned.len(),
        loaded = loaded.sources.len(),
        unavailable = loaded.unavailable.len(),
        forward_filled = loaded.report.forward_filled.values().sum::<usize>(),
        "stage: align complete"
    );

    info!(
        volatility_window = config.features.volatility_window,
        "stage: features"
    );
    let features = compute_features(&loaded.aligned, &config.features);

    info!(rules = rules.len(), min_overlap = config.mapping.min_overlap, "stage: mapping");
    let mapper = InfluenceMapper::new(rules, config.mapping.clone());
    let mapping = mapper.map(&universe, &features);
    let summary = MappingSummary::of(&mapping);
    info!(
        rule = summary.rule,
        correlation = summary.correlation,
        unmapped = summary.unmapped,
        "mapping complete"
    );

    info!("stage: analytics");
    let equities: Vec<&str> = universe.equities().map(|i| i.symbol.as_str()).collect();
    let risk_return = risk_return(&features, &equities, None, config.features.annualization_days);
    let (sensitivities, rolling_correlations) =
        factor_analytics(&features, &mapping, config.analytics.correlation_window);

    let manifest = RunManifest {
        schema_version: SCHEMA_VERSION,
        generated_at: chrono::Utc::now(),
        window_start: start,
        window_end: end,
        calendar: config.calendar.clone(),
        dataset_hash: loaded.dataset_hash,
        has_synthetic: loaded.has_synthetic,
        rows: features.len(),
        instruments: universe.len(),
        sources: loaded.sources,
        unavailable: loaded.unavailable,
        mapping: summary,
        diagnostics: loaded.report,
    };

    Ok(PipelineResults {
        universe,
        features,
        mapping,
        risk_return,
        sensitivities,
        rolling_correlations,
        manifest,
    })
}

/// Sensitivity and rolling correlation of every mapped equity to its factor.
fn factor_analytics(
    features: &FeatureTable,
    mapping: &InfluenceMapping,
    window: usize,
) -> (Vec<EquitySensitivity>, Vec<RollingCorrelation>) {
    let mut sensitivities = Vec::new();
    let mut rolling = Vec::new();
    for entry in mapping.iter() {
        let Some(factor) = entry.factor.as_deref() else {
            continue;
        };
        let (Some(eq), Some(fac)) = (features.get(&entry.equity), features.get(factor)) else {
            continue;
        };
        if let Some(fit) = sensitivity(&eq.log_return, &fac.log_return) {
            sensitivities.push(EquitySensitivity {
                equity: entry.equity.clone(),
                factor: factor.to_string(),
                source: entry.source,
                fit,
            });
        }
        rolling.push(RollingCorrelation {
            equity: entry.equity.clone(),
            factor: factor.to_string(),
            values: rolling_correlation(&eq.log_return, &fac.log_return, window),
        });
    }
    (sensitivities, rolling)
}
