use thiserror::Error;

use crate::catalog::SchemaTableName;

/// Unified error type for coverage planning and split construction.
///
/// Every variant aborts planning for the current query. Nothing in the
/// Ringscan crates retries on any of them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Cluster topology unavailable: {0}")]
    TopologyUnavailable(String),
    #[error("No live replica for partition {partition} (ring position {position})")]
    CoverageUnsatisfiable { partition: usize, position: u64 },
    #[error("Table not found: {0}")]
    TableNotFound(SchemaTableName),
    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),
    #[error("Split codec error: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn malformed_ring(detail: impl std::fmt::Display) -> Self {
        Error::TopologyUnavailable(format!("malformed ring snapshot: {}", detail))
    }
}
