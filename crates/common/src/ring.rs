//! Point-in-time view of the consistent-hashing ring.
//!
//! A [`RingSnapshot`] is an arena: nodes and partitions live in two vectors and
//! refer to each other by index. Snapshots are never mutated; liveness or
//! locality changes produce a new snapshot.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Start of a partition's hash range on the 2^64 ring.
pub type Position = u64;

/// Index of a node inside its [`RingSnapshot`].
pub type NodeIndex = usize;

/// Stable node identifier as reported by cluster membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Liveness {
    Reachable,
    Unreachable,
}

impl Liveness {
    /// Parses a membership state string. Empty means reachable.
    pub fn from_state(state: &str) -> Self {
        let state = state.trim();
        if state.eq_ignore_ascii_case("unreachable") || state.eq_ignore_ascii_case("down") {
            Liveness::Unreachable
        } else {
            Liveness::Reachable
        }
    }
}

/// A physical member of the ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    /// `host:port` the scan workers connect to.
    pub address: String,
    pub liveness: Liveness,
    /// Set on the node the planner talks to; biases fallback placement.
    pub local: bool,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            liveness: Liveness::Reachable,
            local: false,
        }
    }

    pub fn unreachable(mut self) -> Self {
        self.liveness = Liveness::Unreachable;
        self
    }

    pub fn is_live(&self) -> bool {
        self.liveness == Liveness::Reachable
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One vnode: a slice of the ring starting at `position`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    index: usize,
    position: Position,
    replicas: Vec<NodeIndex>,
}

impl Partition {
    /// Ring order index of this partition.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Replica node indices, primary first.
    pub fn replicas(&self) -> &[NodeIndex] {
        &self.replicas
    }

    pub fn primary(&self) -> NodeIndex {
        self.replicas[0]
    }
}

/// Clockwise half-open arc `[start, end)` covered by a partition.
///
/// `end` is the next partition's start; the last partition wraps around to the
/// first. `start == end` only happens on a single-partition ring and means the
/// whole ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionRange {
    pub partition: usize,
    pub start: Position,
    pub end: Position,
}

impl PartitionRange {
    pub fn wraps(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, position: Position) -> bool {
        if self.start < self.end {
            position >= self.start && position < self.end
        } else {
            position >= self.start || position < self.end
        }
    }
}

impl fmt::Display for PartitionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}[{:#x}, {:#x})", self.partition, self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingSnapshot {
    nodes: Vec<Node>,
    partitions: Vec<Partition>,
}

impl RingSnapshot {
    /// Builds a validated snapshot.
    ///
    /// Partitions may be given in any order; they are sorted by position.
    /// Fails with `TopologyUnavailable` when the ring is empty, positions
    /// repeat, a partition has no replicas, a replica is listed twice, or a
    /// replica names an unknown node. At most one node may be flagged local.
    pub fn new(nodes: Vec<Node>, partitions: Vec<(Position, Vec<NodeId>)>) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for (idx, node) in nodes.iter().enumerate() {
            if by_id.insert(node.id.clone(), idx).is_some() {
                return Err(Error::malformed_ring(format!("duplicate node id {}", node.id)));
            }
        }
        if nodes.iter().filter(|node| node.local).count() > 1 {
            return Err(Error::malformed_ring("more than one node flagged local"));
        }
        if partitions.is_empty() {
            return Err(Error::malformed_ring("ring has no partitions"));
        }

        let mut partitions = partitions;
        partitions.sort_by_key(|(position, _)| *position);

        let mut arena = Vec::with_capacity(partitions.len());
        let mut previous: Option<Position> = None;
        for (index, (position, replica_ids)) in partitions.into_iter().enumerate() {
            if previous == Some(position) {
                return Err(Error::malformed_ring(format!(
                    "two partitions start at position {:#x}",
                    position
                )));
            }
            previous = Some(position);

            if replica_ids.is_empty() {
                return Err(Error::malformed_ring(format!(
                    "partition at {:#x} has no replicas",
                    position
                )));
            }
            let mut seen = HashSet::with_capacity(replica_ids.len());
            let mut replicas = Vec::with_capacity(replica_ids.len());
            for id in &replica_ids {
                let node = *by_id.get(id).ok_or_else(|| {
                    Error::malformed_ring(format!(
                        "partition at {:#x} names unknown node {}",
                        position, id
                    ))
                })?;
                if !seen.insert(node) {
                    return Err(Error::malformed_ring(format!(
                        "partition at {:#x} lists node {} twice",
                        position, id
                    )));
                }
                replicas.push(node);
            }
            arena.push(Partition {
                index,
                position,
                replicas,
            });
        }

        Ok(Self {
            nodes,
            partitions: arena,
        })
    }

    /// Parses a cluster-state JSON document into a snapshot.
    pub fn from_json(raw: &str) -> Result<Self> {
        let view: RingView = serde_json::from_str(raw)
            .map_err(|e| Error::TopologyUnavailable(format!("parse ring json: {}", e)))?;
        let nodes = view
            .nodes
            .into_iter()
            .map(|node| Node {
                id: NodeId::new(node.id),
                address: node.address,
                liveness: Liveness::from_state(&node.state),
                local: node.local,
            })
            .collect();
        let partitions = view
            .partitions
            .into_iter()
            .map(|p| (p.position, p.replicas.into_iter().map(NodeId::new).collect()))
            .collect();
        Self::new(nodes, partitions)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index]
    }

    pub fn find_node(&self, id: &NodeId) -> Option<NodeIndex> {
        self.nodes.iter().position(|node| &node.id == id)
    }

    pub fn is_live(&self, index: NodeIndex) -> bool {
        self.nodes[index].is_live()
    }

    pub fn local_node(&self) -> Option<NodeIndex> {
        self.nodes.iter().position(|node| node.local)
    }

    /// Full ordered partition sequence.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Replica nodes of `partition`, preferred owner first.
    pub fn replicas_of<'a>(&'a self, partition: &'a Partition) -> impl Iterator<Item = &'a Node> + 'a {
        partition.replicas.iter().map(move |&idx| &self.nodes[idx])
    }

    pub fn range_of(&self, partition: &Partition) -> PartitionRange {
        let next = (partition.index + 1) % self.partitions.len();
        PartitionRange {
            partition: partition.index,
            start: partition.position,
            end: self.partitions[next].position,
        }
    }

    /// Returns a copy with `id` set to `liveness`.
    pub fn with_liveness(&self, id: &NodeId, liveness: Liveness) -> Result<Self> {
        let index = self.require_node(id)?;
        let mut next = self.clone();
        next.nodes[index].liveness = liveness;
        Ok(next)
    }

    /// Returns a copy where `id` is the only node flagged local.
    pub fn with_local(&self, id: &NodeId) -> Result<Self> {
        let index = self.require_node(id)?;
        let mut next = self.clone();
        for (idx, node) in next.nodes.iter_mut().enumerate() {
            node.local = idx == index;
        }
        Ok(next)
    }

    fn require_node(&self, id: &NodeId) -> Result<NodeIndex> {
        self.find_node(id).ok_or_else(|| {
            Error::TopologyUnavailable(format!("node {} is not a member of the ring", id))
        })
    }
}

/// Wire model for ring JSON documents.
#[derive(Debug, Deserialize)]
struct RingView {
    #[serde(default)]
    nodes: Vec<NodeView>,
    #[serde(default)]
    partitions: Vec<PartitionView>,
}

#[derive(Debug, Deserialize)]
struct NodeView {
    id: String,
    address: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    local: bool,
}

#[derive(Debug, Deserialize)]
struct PartitionView {
    position: Position,
    replicas: Vec<String>,
}
