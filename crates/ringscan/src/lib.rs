//! Loads cluster inputs from disk and drains split sources for the CLI.

use std::path::Path;
use std::sync::Arc;

use clap::Args;

use ringscan_common::{MemoryCatalog, TupleDomain};
use ringscan_coordinator::{
    CoordinatorError, CoverageSplit, Settings, SplitManager, SplitSource, StaticTopology,
};

pub use ringscan_common as common;
pub use ringscan_coordinator as coordinator;

/// Command-line values that take precedence over the settings file and
/// environment.
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    #[arg(long)]
    pub local_node: Option<String>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn apply_overrides(settings: &mut Settings, overrides: Overrides) {
    if let Some(local_node) = overrides.local_node {
        settings.local_node = Some(local_node);
    }
    if let Some(batch_size) = overrides.batch_size {
        settings.batch_size = batch_size;
    }
    if let Some(seed) = overrides.seed {
        settings.shuffle_seed = Some(seed);
    }
}

/// Builds a split manager over a ring file and a catalog file.
pub fn manager_from_files(
    ring_path: &Path,
    catalog_path: &Path,
    settings: Settings,
) -> Result<SplitManager, CoordinatorError> {
    let topology = StaticTopology::from_json(&std::fs::read_to_string(ring_path)?)?;
    let catalog = MemoryCatalog::from_json(&std::fs::read_to_string(catalog_path)?)?;
    Ok(SplitManager::new(
        Arc::new(catalog),
        Arc::new(topology),
        settings,
    ))
}

/// Reads a predicate document; no path means no constraint.
pub fn predicate_from_file(path: Option<&Path>) -> Result<TupleDomain, CoordinatorError> {
    match path {
        Some(path) => Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        None => Ok(TupleDomain::all()),
    }
}

/// Pulls every split from `source`, `batch_size` at a time, calling
/// `on_batch` for each non-empty batch.
pub fn drain<F>(source: &SplitSource, batch_size: usize, mut on_batch: F) -> usize
where
    F: FnMut(Vec<CoverageSplit>),
{
    let batch_size = batch_size.max(1);
    let mut delivered = 0;
    loop {
        let batch = source.next_batch(batch_size);
        delivered += batch.splits.len();
        if !batch.splits.is_empty() {
            on_batch(batch.splits);
        }
        if batch.no_more_splits {
            return delivered;
        }
    }
}
