//! Coordinator crate
//!
//! Turns a ring snapshot into a coverage plan and the plan into splits for
//! parallel scan workers.

pub mod config;
pub mod coverage;
pub mod error;
pub mod split;
pub mod split_manager;
pub mod split_source;
pub mod topology;

pub use config::Settings;
pub use coverage::{plan_coverage, Assignment, CoverageEntry, CoveragePlan, CoveredPartition};
pub use error::CoordinatorError;
pub use split::{build_splits, CoverageSplit, ResolvedTable, SplitOptions, TableScope};
pub use split_manager::{SplitManager, TableLayout};
pub use split_source::{SplitBatch, SplitSource, SplitSourceState};
pub use topology::{fetch_ring, StaticTopology, TopologyClient};
