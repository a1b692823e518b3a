//! Domain types for MacroLens

pub mod instrument;
pub mod price;

pub use instrument::{Instrument, InstrumentCategory};
pub use price::PricePoint;
