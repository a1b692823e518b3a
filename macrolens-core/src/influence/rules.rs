//! Declarative equity → macro factor rules.
//!
//! The rule table is plain data: an explicit map from equity symbol to the
//! macro symbol judged to drive it. Rules always win over statistics.

use crate::data::{Universe, UniverseError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleTable {
    rules: BTreeMap<String, String>,
}

impl RuleTable {
    pub fn new(rules: BTreeMap<String, String>) -> Self {
        Self { rules }
    }

    /// Rules for the built-in CAC 40 universe.
    ///
    /// Energy and materials follow commodities, exporters follow EUR/USD,
    /// banks and real estate follow long rates, tech follows the Nasdaq.
    pub fn default_cac40() -> Self {
        let pairs = [
            ("TTE.PA", "BZ=F"),
            ("ENGI.PA", "NG=F"),
            ("SGO.PA", "HG=F"),
            ("MT.AS", "HG=F"),
            ("AIR.PA", "BZ=F"),
            ("SAF.PA", "BZ=F"),
            ("MC.PA", "EURUSD=X"),
            ("KER.PA", "EURUSD=X"),
            ("RMS.PA", "EURUSD=X"),
            ("OR.PA", "EURUSD=X"),
            ("BN.PA", "EURUSD=X"),
            ("CA.PA", "EURUSD=X"),
            ("AI.PA", "EURUSD=X"),
            ("ML.PA", "EURUSD=X"),
            ("RNO.PA", "EURUSD=X"),
            ("VIE.PA", "EURUSD=X"),
            ("LR.PA", "EURUSD=X"),
            ("SU.PA", "EURUSD=X"),
            ("TEP.PA", "EURUSD=X"),
            ("EN.PA", "EURUSD=X"),
            ("DG.PA", "EURUSD=X"),
            ("ORA.PA", "EURUSD=X"),
            ("SAN.PA", "EURUSD=X"),
            ("PUB.PA", "EURUSD=X"),
            ("VIV.PA", "EURUSD=X"),
            ("BNP.PA", "^TNX"),
            ("GLE.PA", "^TNX"),
            ("ACA.PA", "^TNX"),
            ("CS.PA", "^TNX"),
            ("URW.PA", "^TNX"),
            ("STMPA.PA", "^NDX"),
            ("CAP.PA", "^NDX"),
            ("DSY.PA", "^NDX"),
            ("WLN.PA", "^NDX"),
            ("HO.PA", "^NDX"),
        ];
        Self {
            rules: pairs
                .iter()
                .map(|(e, m)| (e.to_string(), m.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, equity: &str) -> Option<&str> {
        self.rules.get(equity).map(String::as_str)
    }

    pub fn insert(&mut self, equity: impl Into<String>, factor: impl Into<String>) {
        self.rules.insert(equity.into(), factor.into());
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(e, m)| (e.as_str(), m.as_str()))
    }

    /// Check every rule against the universe: keys must be equities, values
    /// must be macro instruments.
    pub fn validate(&self, universe: &Universe) -> Result<(), UniverseError> {
        for (equity, factor) in &self.rules {
            match universe.get(equity) {
                Some(inst) if inst.is_equity() => {}
                Some(_) => {
                    return Err(UniverseError::InvalidRule {
                        equity: equity.clone(),
                        reason: "rule key is not an equity".into(),
                    })
                }
                None => {
                    return Err(UniverseError::InvalidRule {
                        equity: equity.clone(),
                        reason: "equity is not in the universe".into(),
                    })
                }
            }
            match universe.get(factor) {
                Some(inst) if inst.is_macro() => {}
                _ => {
                    return Err(UniverseError::InvalidRule {
                        equity: equity.clone(),
                        reason: format!("factor '{factor}' is not a macro instrument"),
                    })
                }
            }
        }
        Ok(())
    }
}
