//! Pipeline configuration loaded from TOML.
//!
//! Every section is optional. A missing `[[instrument]]` list means the
//! built-in CAC 40 universe; a missing `[rules]` table means the built-in
//! rules that apply to the configured universe.

use chrono::NaiveDate;
use macrolens_core::align::CalendarPolicy;
use macrolens_core::analytics::DEFAULT_CORRELATION_WINDOW;
use macrolens_core::data::{Universe, UniverseError};
use macrolens_core::domain::Instrument;
use macrolens_core::features::FeatureConfig;
use macrolens_core::influence::{MappingConfig, RuleTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("parse config TOML: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Universe(#[from] UniverseError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub start: NaiveDate,
    /// Inclusive end date; today when absent.
    pub end: Option<NaiveDate>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2005, 1, 1).unwrap_or_default(),
            end: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSettings {
    pub workers: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            workers: 8,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            format: OutputFormat::Csv,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyticsConfig {
    pub correlation_window: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            correlation_window: DEFAULT_CORRELATION_WINDOW,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub window: WindowConfig,
    pub calendar: CalendarPolicy,
    pub features: FeatureConfig,
    pub mapping: MappingConfig,
    pub analytics: AnalyticsConfig,
    pub fetch: FetchSettings,
    pub output: OutputConfig,
    #[serde(rename = "instrument", skip_serializing_if = "Vec::is_empty")]
    pub instruments: Vec<Instrument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<RuleTable>,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The configured universe, or the built-in one.
    pub fn universe(&self) -> Result<Universe, ConfigError> {
        if self.instruments.is_empty() {
            Ok(Universe::default_cac40())
        } else {
            Ok(Universe::new(self.instruments.clone())?)
        }
    }

    /// The configured rules, or the built-in rules that fit the universe.
    pub fn rule_table(&self, universe: &Universe) -> RuleTable {
        match &self.rules {
            Some(rules) => rules.clone(),
            None => {
                let mut fitting = RuleTable::default();
                for (equity, factor) in RuleTable::default_cac40().iter() {
                    let equity_ok = universe.get(equity).is_some_and(Instrument::is_equity);
                    let factor_ok = universe.get(factor).is_some_and(Instrument::is_macro);
                    if equity_ok && factor_ok {
                        fitting.insert(equity, factor);
                    }
                }
                fitting
            }
        }
    }

    /// End of the window, resolving an open end to `today`.
    pub fn end_date(&self, today: NaiveDate) -> NaiveDate {
        self.window.end.unwrap_or(today)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(end) = self.window.end {
            if end < self.window.start {
                return Err(ConfigError::Invalid(format!(
                    "window end {end} is before start {}",
                    self.window.start
                )));
            }
        }
        if self.fetch.workers == 0 {
            return Err(ConfigError::Invalid("fetch.workers must be >= 1".into()));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Invalid("fetch.timeout_secs must be >= 1".into()));
        }
        if self.features.volatility_window < 3 {
            return Err(ConfigError::Invalid(
                "features.volatility_window must be >= 3".into(),
            ));
        }
        if self.features.annualization_days == 0 {
            return Err(ConfigError::Invalid(
                "features.annualization_days must be >= 1".into(),
            ));
        }
        if self.mapping.min_overlap < 2 {
            return Err(ConfigError::Invalid("mapping.min_overlap must be >= 2".into()));
        }
        if self.analytics.correlation_window < 2 {
            return Err(ConfigError::Invalid(
                "analytics.correlation_window must be >= 2".into(),
            ));
        }

        let universe = self.universe()?;
        self.rule_table(&universe).validate(&universe)?;
        if let CalendarPolicy::Instrument { symbol } = &self.calendar {
            if !universe.contains(symbol) {
                return Err(ConfigError::Invalid(format!(
                    "calendar reference '{symbol}' is not in the universe"
                )));
            }
        }
        Ok(())
    }
}
