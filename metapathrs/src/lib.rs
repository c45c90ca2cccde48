pub mod aggregation;
pub mod config;
pub mod conversion;
pub mod data;
pub mod error;
pub mod model;
pub mod registry;
pub mod search;
pub mod units;
pub mod variable;

use std::path::Path;

use crate::error::Result;

/// Load variable metadata definitions (YAML, one file per variable) into a
/// fresh registry.
pub fn load_registry<P: AsRef<Path>>(definitions_dir: P) -> Result<MetadataRegistry> {
    MetadataRegistry::load_from_dir(definitions_dir)
}

pub use crate::aggregation::{AggregationGraph, AggregationTable};
pub use crate::config::MetapathConfig;
pub use crate::conversion::ConversionGraph;
pub use crate::data::{combines, Data, ShrinkPolicy, SimilarityVariant, SimilarityWeights};
pub use crate::error::MetapathError;
pub use crate::model::{Model, SingleUseModel, UnitsRule};
pub use crate::registry::MetadataRegistry;
pub use crate::search::{
    a_star, preprocess_rhs, simulate, PathStep, SearchDiagnostic, SearchOptions, SearchOutcome,
    SetOfSources, SimilarityChoice, SimulationReport, StepMethod,
};
pub use crate::units::{IncludedUnits, UnitSet, UnitSetUnion};
pub use crate::variable::{Variable, VariableSpec};
