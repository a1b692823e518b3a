//! Equity → dominant macro factor assignment.
//!
//! Resolution order for each equity of the universe:
//!
//! 1. no price history at all → `unmapped` (no history);
//! 2. a rule exists → the rule's factor, source `rule`;
//! 3. otherwise the macro factor whose log returns correlate most strongly
//!    (in absolute value) with the equity's, over dates where both are
//!    defined. Factors sharing fewer than `min_overlap` observations are not
//!    candidates. Ties go to the factor with the longer price history, then
//!    to the lexicographically smaller symbol;
//! 4. no candidate → `unmapped` (insufficient history).

use super::correlation::{paired, pearson};
use super::rules::RuleTable;
use crate::data::Universe;
use crate::features::{FeatureTable, InstrumentFeatures};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MappingConfig {
    /// Minimum number of shared return observations for a correlation to count.
    pub min_overlap: usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self { min_overlap: 30 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    Rule,
    Correlation,
    Unmapped,
}

impl MappingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingSource::Rule => "rule",
            MappingSource::Correlation => "correlation",
            MappingSource::Unmapped => "unmapped",
        }
    }
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedReason {
    /// The equity has no observation at all (failed fetch).
    NoHistory,
    /// No factor shares enough return observations with the equity.
    InsufficientHistory,
}

/// Mapping decision for one equity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingEntry {
    pub equity: String,
    pub factor: Option<String>,
    pub source: MappingSource,
    /// Return correlation with `factor`, when computable.
    pub correlation: Option<f64>,
    /// Shared non-null return observations with `factor`.
    pub overlap: usize,
    pub reason: Option<UnmappedReason>,
}

impl MappingEntry {
    fn unmapped(equity: &str, reason: UnmappedReason) -> Self {
        Self {
            equity: equity.to_string(),
            factor: None,
            source: MappingSource::Unmapped,
            correlation: None,
            overlap: 0,
            reason: Some(reason),
        }
    }
}

/// Mapping for every equity of the universe, keyed by equity symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InfluenceMapping {
    entries: BTreeMap<String, MappingEntry>,
}

impl InfluenceMapping {
    pub fn get(&self, equity: &str) -> Option<&MappingEntry> {
        self.entries.get(equity)
    }

    pub fn factor_of(&self, equity: &str) -> Option<&str> {
        self.get(equity).and_then(|e| e.factor.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, source: MappingSource) -> usize {
        self.iter().filter(|e| e.source == source).count()
    }
}

struct Candidate<'a> {
    symbol: &'a str,
    correlation: f64,
    overlap: usize,
    history: usize,
}

/// Strongest |ρ| first, then longer factor history, then smaller symbol.
fn rank(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    b.correlation
        .abs()
        .total_cmp(&a.correlation.abs())
        .then_with(|| b.history.cmp(&a.history))
        .then_with(|| a.symbol.cmp(b.symbol))
}

pub struct InfluenceMapper {
    rules: RuleTable,
    config: MappingConfig,
}

impl InfluenceMapper {
    pub fn new(rules: RuleTable, config: MappingConfig) -> Self {
        Self { rules, config }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Map every equity of `universe` using the computed features.
    pub fn map(&self, universe: &Universe, features: &FeatureTable) -> InfluenceMapping {
        let factors: Vec<(&str, &InstrumentFeatures)> = universe
            .macros()
            .filter_map(|m| features.get(&m.symbol).map(|f| (m.symbol.as_str(), f)))
            .collect();

        let mut entries = BTreeMap::new();
        for equity in universe.equities() {
            let entry = match features.get(&equity.symbol) {
                Some(eq) if eq.has_history() => self.map_one(&equity.symbol, eq, &factors),
                _ => MappingEntry::unmapped(&equity.symbol, UnmappedReason::NoHistory),
            };
            debug!(
                equity = %entry.equity,
                factor = entry.factor.as_deref().unwrap_or("-"),
                source = %entry.source,
                "mapped equity"
            );
            entries.insert(equity.symbol.clone(), entry);
        }
        InfluenceMapping { entries }
    }

    fn map_one(
        &self,
        equity: &str,
        eq: &InstrumentFeatures,
        factors: &[(&str, &InstrumentFeatures)],
    ) -> MappingEntry {
        if let Some(factor) = self.rules.get(equity) {
            let (correlation, overlap) = factors
                .iter()
                .find(|(s, _)| *s == factor)
                .map(|(_, f)| {
                    let (x, y) = paired(&eq.log_return, &f.log_return);
                    (pearson(&x, &y), x.len())
                })
                .unwrap_or((None, 0));
            return MappingEntry {
                equity: equity.to_string(),
                factor: Some(factor.to_string()),
                source: MappingSource::Rule,
                correlation,
                overlap,
                reason: None,
            };
        }

        let mut candidates: Vec<Candidate<'_>> = factors
            .iter()
            .filter_map(|(symbol, f)| {
                let (x, y) = paired(&eq.log_return, &f.log_return);
                if x.len() < self.config.min_overlap {
                    return None;
                }
                Some(Candidate {
                    symbol,
                    correlation: pearson(&x, &y)?,
                    overlap: x.len(),
                    history: f.history_len(),
                })
            })
            .collect();
        candidates.sort_by(rank);

        match candidates.first() {
            Some(best) => MappingEntry {
                equity: equity.to_string(),
                factor: Some(best.symbol.to_string()),
                source: MappingSource::Correlation,
                correlation: Some(best.correlation),
                overlap: best.overlap,
                reason: None,
            },
            None => MappingEntry::unmapped(equity, UnmappedReason::InsufficientHistory),
        }
    }
}
