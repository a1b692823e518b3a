//! Universe configuration: the fixed list of equities and macro factors.
//!
//! The universe is plain configuration data. It can be loaded from TOML as a
//! list of `[[instrument]]` tables, or taken from the built-in CAC 40 set
//! (35 equities, 12 macro indicators).

use crate::domain::{Instrument, InstrumentCategory};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("parse universe TOML: {0}")]
    Parse(String),

    #[error("serialize universe: {0}")]
    Serialize(String),

    #[error("universe is empty")]
    Empty,

    #[error("duplicate symbol in universe: {0}")]
    DuplicateSymbol(String),

    #[error("rule for '{equity}' is invalid: {reason}")]
    InvalidRule { equity: String, reason: String },
}

/// The complete instrument universe, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    #[serde(rename = "instrument")]
    instruments: Vec<Instrument>,
}

impl Universe {
    /// Build a universe, rejecting empty lists and duplicate symbols.
    pub fn new(instruments: Vec<Instrument>) -> Result<Self, UniverseError> {
        if instruments.is_empty() {
            return Err(UniverseError::Empty);
        }
        let mut seen = HashSet::new();
        for inst in &instruments {
            if !seen.insert(inst.symbol.as_str()) {
                return Err(UniverseError::DuplicateSymbol(inst.symbol.clone()));
            }
        }
        Ok(Self { instruments })
    }

    /// Load a universe from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path).map_err(|e| UniverseError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse a universe from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        let parsed: Universe =
            toml::from_str(content).map_err(|e| UniverseError::Parse(e.to_string()))?;
        Self::new(parsed.instruments)
    }

    /// Serialize the universe to TOML.
    pub fn to_toml(&self) -> Result<String, UniverseError> {
        toml::to_string_pretty(self).map_err(|e| UniverseError::Serialize(e.to_string()))
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn get(&self, symbol: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.symbol == symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.get(symbol).is_some()
    }

    /// Display name for a symbol, falling back to the symbol itself.
    pub fn display_name<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.get(symbol).map(|i| i.name.as_str()).unwrap_or(symbol)
    }

    pub fn by_category(&self, category: InstrumentCategory) -> impl Iterator<Item = &Instrument> {
        self.instruments
            .iter()
            .filter(move |i| i.category == category)
    }

    pub fn equities(&self) -> impl Iterator<Item = &Instrument> {
        self.by_category(InstrumentCategory::Equity)
    }

    pub fn macros(&self) -> impl Iterator<Item = &Instrument> {
        self.by_category(InstrumentCategory::Macro)
    }

    /// All symbols in declaration order.
    pub fn symbols(&self) -> Vec<&str> {
        self.instruments.iter().map(|i| i.symbol.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// The built-in universe: CAC 40 constituents and the macro indicators
    /// they are compared against.
    pub fn default_cac40() -> Self {
        let equities = [
            ("MC.PA", "LVMH"),
            ("TTE.PA", "TotalEnergies"),
            ("OR.PA", "L'Oréal"),
            ("RMS.PA", "Hermès"),
            ("SAN.PA", "Sanofi"),
            ("AIR.PA", "Airbus"),
            ("SU.PA", "Schneider Electric"),
            ("BNP.PA", "BNP Paribas"),
            ("GLE.PA", "Société Générale"),
            ("ACA.PA", "Crédit Agricole"),
            ("CS.PA", "AXA"),
            ("DG.PA", "Vinci"),
            ("VIE.PA", "Veolia"),
            ("ENGI.PA", "Engie"),
            ("ORA.PA", "Orange"),
            ("CAP.PA", "Capgemini"),
            ("STMPA.PA", "STMicroelectronics"),
            ("SAF.PA", "Safran"),
            ("HO.PA", "Thales"),
            ("MT.AS", "ArcelorMittal"),
            ("RNO.PA", "Renault"),
            ("ML.PA", "Michelin"),
            ("PUB.PA", "Publicis"),
            ("BN.PA", "Danone"),
            ("CA.PA", "Carrefour"),
            ("KER.PA", "Kering"),
            ("LR.PA", "Legrand"),
            ("SGO.PA", "Saint-Gobain"),
            ("AI.PA", "Air Liquide"),
            ("EN.PA", "Bouygues"),
            ("URW.PA", "Unibail-Rodamco-Westfield"),
            ("WLN.PA", "Worldline"),
            ("VIV.PA", "Vivendi"),
            ("TEP.PA", "Teleperformance"),
            ("DSY.PA", "Dassault Systèmes"),
        ];
        let macros = [
            ("BZ=F", "Brent crude oil"),
            ("CL=F", "WTI crude oil"),
            ("NG=F", "Natural gas"),
            ("HG=F", "Copper"),
            ("GC=F", "Gold"),
            ("EURUSD=X", "EUR/USD exchange rate"),
            ("^TNX", "US 10-year Treasury yield"),
            ("^NDX", "Nasdaq 100"),
            ("^GSPC", "S&P 500"),
            ("^FCHI", "CAC 40 index"),
            ("^VIX", "CBOE volatility index"),
            ("BTC-USD", "Bitcoin (BTC/USD)"),
        ];

        let instruments = equities
            .iter()
            .map(|(s, n)| Instrument::equity(*s, *n))
            .chain(macros.iter().map(|(s, n)| Instrument::macro_factor(*s, *n)))
            .collect();

        Self { instruments }
    }
}
