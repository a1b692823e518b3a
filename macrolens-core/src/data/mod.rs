//! Source connector: providers, ingest, parallel fetch and the Parquet cache.

pub mod cache;
pub mod circuit_breaker;
pub mod connector;
pub mod ingest;
pub mod provider;
pub mod synthetic;
pub mod universe;
pub mod yahoo;

pub use cache::{CacheMeta, CacheStatus, CoverageResult, ParquetCache};
pub use circuit_breaker::CircuitBreaker;
pub use connector::{fetch_universe, FetchConfig, FetchReport};
pub use ingest::{ingest, IngestResult};
pub use provider::{
    DataError, DataProvider, DataSource, DownloadProgress, FetchResult, LogProgress,
    SilentProgress,
};
pub use synthetic::SyntheticProvider;
pub use universe::{Universe, UniverseError};
pub use yahoo::{YahooConfig, YahooProvider};
