//! Coverage planning: assign every ring partition to exactly one live node.
//!
//! Partitions first go to their primary replica when it is reachable. The
//! leftovers are swept in ring order onto the least-loaded live replica and
//! tagged as fallbacks. The result only depends on the snapshot and its
//! liveness vector.

use std::cmp::Reverse;
use std::fmt;

use ringscan_common::{Error, NodeId, NodeIndex, Result, RingSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How a partition ended up on its serving node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Assignment {
    Primary,
    /// The primary (`preferred`) was unreachable.
    Fallback { preferred: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveredPartition {
    pub partition: usize,
    pub assignment: Assignment,
}

impl CoveredPartition {
    pub fn is_fallback(&self) -> bool {
        matches!(self.assignment, Assignment::Fallback { .. })
    }
}

/// One node and the partitions it serves for this query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageEntry {
    pub node: NodeIndex,
    pub node_id: NodeId,
    /// In ring order.
    pub partitions: Vec<CoveredPartition>,
}

impl CoverageEntry {
    pub fn is_degraded(&self) -> bool {
        self.partitions.iter().any(CoveredPartition::is_fallback)
    }

    pub fn partition_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.partitions.iter().map(|p| p.partition)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoveragePlan {
    entries: Vec<CoverageEntry>,
    partition_count: usize,
}

impl CoveragePlan {
    /// Entries ordered by node id.
    pub fn entries(&self) -> &[CoverageEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    pub fn degraded_partitions(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|e| &e.partitions)
            .filter(|p| p.is_fallback())
            .count()
    }

    pub fn entry_for(&self, node_id: &NodeId) -> Option<&CoverageEntry> {
        self.entries.iter().find(|e| &e.node_id == node_id)
    }
}

impl fmt::Display for CoveragePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}:[", entry.node_id)?;
            for (j, p) in entry.partitions.iter().enumerate() {
                if j > 0 {
                    f.write_str(",")?;
                }
                write!(f, "p{}", p.partition)?;
                if p.is_fallback() {
                    f.write_str("*")?;
                }
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

/// Computes the coverage plan for `ring`.
///
/// Fails with `CoverageUnsatisfiable` on the first partition (in ring order)
/// that has no reachable replica. No partial plan is returned.
pub fn plan_coverage(ring: &RingSnapshot) -> Result<CoveragePlan> {
    let partitions = ring.partitions();
    let mut served_by: Vec<Option<(NodeIndex, Assignment)>> = vec![None; partitions.len()];
    let mut load = vec![0usize; ring.nodes().len()];

    for partition in partitions {
        let primary = partition.primary();
        if ring.is_live(primary) {
            served_by[partition.index()] = Some((primary, Assignment::Primary));
            load[primary] += 1;
        }
    }

    for partition in partitions {
        if served_by[partition.index()].is_some() {
            continue;
        }
        let chosen = partition
            .replicas()
            .iter()
            .enumerate()
            .filter(|&(_, &node)| ring.is_live(node))
            .min_by_key(|&(rank, &node)| {
                (load[node], Reverse(ring.node(node).local), rank, &ring.node(node).id)
            })
            .map(|(_, &node)| node);

        let Some(node) = chosen else {
            warn!(
                partition = partition.index(),
                position = partition.position(),
                "no live replica for partition"
            );
            return Err(Error::CoverageUnsatisfiable {
                partition: partition.index(),
                position: partition.position(),
            });
        };
        let preferred = ring.node(partition.primary()).id.clone();
        debug!(
            partition = partition.index(),
            %preferred,
            fallback = %ring.node(node).id,
            "primary unreachable, using fallback replica"
        );
        served_by[partition.index()] = Some((node, Assignment::Fallback { preferred }));
        load[node] += 1;
    }

    let mut per_node: Vec<Vec<CoveredPartition>> = vec![Vec::new(); ring.nodes().len()];
    for (partition, slot) in served_by.into_iter().enumerate() {
        // Every slot is filled: the sweep above either assigns or returns.
        if let Some((node, assignment)) = slot {
            per_node[node].push(CoveredPartition {
                partition,
                assignment,
            });
        }
    }

    let mut entries: Vec<CoverageEntry> = per_node
        .into_iter()
        .enumerate()
        .filter(|(_, covered)| !covered.is_empty())
        .map(|(node, covered)| CoverageEntry {
            node,
            node_id: ring.node(node).id.clone(),
            partitions: covered,
        })
        .collect();
    entries.sort_by(|a, b| a.node_id.cmp(&b.node_id));

    Ok(CoveragePlan {
        entries,
        partition_count: partitions.len(),
    })
}
