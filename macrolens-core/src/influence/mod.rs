//! Influence mapper: assign each equity its dominant macro factor.

pub mod correlation;
pub mod mapper;
pub mod rules;

pub use mapper::{
    InfluenceMapper, InfluenceMapping, MappingConfig, MappingEntry, MappingSource, UnmappedReason,
};
pub use rules::RuleTable;
