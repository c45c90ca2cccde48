//! Best-first search over sets of data sources.

mod driver;
mod path_step;
mod scoring;
mod sources;

pub use driver::{
    a_star, preprocess_rhs, simulate, SearchDiagnostic, SearchOptions, SearchOutcome,
    SimulationReport,
};
pub use path_step::{PathStep, StepMethod};
pub use scoring::{score_state, SimilarityChoice};
pub use sources::SetOfSources;
