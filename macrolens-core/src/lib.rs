//! MacroLens Core: domain types, source connector, alignment, features and
//! influence mapping.
//!
//! This crate contains the data path of the pipeline:
//! - Domain types (instruments, price points)
//! - Source connector (providers, circuit breaker, parallel fetch, Parquet cache)
//! - Alignment onto a unified calendar with as-of forward fill
//! - Per-instrument feature transforms (log return, rolling volatility, rebasing)
//! - Equity → macro factor influence mapping (rule table + correlation fallback)
//! - Risk/return, rolling correlation and sensitivity analytics

pub mod align;
pub mod analytics;
pub mod data;
pub mod domain;
pub mod features;
pub mod influence;
