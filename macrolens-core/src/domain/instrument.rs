use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an instrument is a stock to be explained or a macro factor that
/// may explain it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentCategory {
    Equity,
    Macro,
}

impl InstrumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentCategory::Equity => "equity",
            InstrumentCategory::Macro => "macro",
        }
    }
}

impl fmt::Display for InstrumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member of the instrument universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Provider ticker, e.g. `TTE.PA`, `BZ=F`, `^TNX`.
    pub symbol: String,
    pub category: InstrumentCategory,
    /// Human-readable name for legends and tables.
    pub name: String,
}

impl Instrument {
    pub fn equity(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            category: InstrumentCategory::Equity,
            name: name.into(),
        }
    }

    pub fn macro_factor(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            category: InstrumentCategory::Macro,
            name: name.into(),
        }
    }

    pub fn is_equity(&self) -> bool {
        self.category == InstrumentCategory::Equity
    }

    pub fn is_macro(&self) -> bool {
        self.category == InstrumentCategory::Macro
    }
}
