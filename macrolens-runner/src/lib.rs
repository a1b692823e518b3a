//! MacroLens Runner: pipeline configuration, data loading, orchestration and
//! output files.
//!
//! This crate builds on `macrolens-core` to provide:
//! - TOML pipeline configuration with validation
//! - Data loading with cache / provider / synthetic fallback
//! - The staged pipeline run
//! - CSV / Parquet output and the JSON run manifest

pub mod config;
pub mod data_loader;
pub mod export;
pub mod pipeline;

pub use config::{
    AnalyticsConfig, ConfigError, FetchSettings, OutputConfig, OutputFormat, PipelineConfig,
    WindowConfig,
};
pub use data_loader::{compute_dataset_hash, load_universe_data, LoadError, LoadOptions, LoadedData};
pub use export::{
    write_outputs, MappingSummary, OutputError, OutputFiles, RunManifest, SCHEMA_VERSION,
};
pub use pipeline::{
    compute, run_pipeline, EquitySensitivity, PipelineError, PipelineOutput, PipelineResults,
    RollingCorrelation, RunOptions,
};
