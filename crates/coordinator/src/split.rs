//! Split descriptors and the builder that derives them from a coverage plan.

use std::num::NonZeroUsize;
use std::sync::Arc;

use ringscan_common::{
    ColumnDescriptor, Error, NodeId, PartitionRange, Result, RingSnapshot, SchemaTableName,
    TableCatalog, TableDescriptor, TupleDomain,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::coverage::{CoverageEntry, CoveragePlan, CoveredPartition};

/// Where a split's column and index metadata came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableScope {
    Table,
    /// Sub-table inheriting partitioning and indexes from `parent`.
    SubTable { parent: String },
}

/// A table handle resolved against the catalog.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    /// Name as requested; may be a sub-table.
    pub handle: SchemaTableName,
    pub scope: TableScope,
    /// Metadata of the table owning the data (the parent for sub-tables).
    pub metadata: Arc<TableDescriptor>,
}

impl ResolvedTable {
    /// Looks up `handle`, going through the parent for sub-tables.
    pub fn resolve(catalog: &dyn TableCatalog, handle: &SchemaTableName) -> Result<Self> {
        let parent = handle.parent();
        let metadata = catalog
            .table(&parent)
            .ok_or_else(|| Error::TableNotFound(handle.clone()))?;
        let scope = if handle.is_sub_table() {
            TableScope::SubTable {
                parent: parent.table,
            }
        } else {
            TableScope::Table
        };
        debug!(table = %handle, ?scope, columns = metadata.columns.len(), "resolved table");
        Ok(Self {
            handle: handle.clone(),
            scope,
            metadata,
        })
    }

    pub fn inherits_parent(&self) -> bool {
        matches!(self.scope, TableScope::SubTable { .. })
    }

    pub fn indexed_columns(&self) -> Vec<String> {
        self.metadata.indexed_columns()
    }
}

/// Self-contained unit of scan work bound to one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSplit {
    pub query_id: Uuid,
    pub node_id: NodeId,
    /// `host:port` of the node to scan.
    pub address: String,
    pub table: SchemaTableName,
    pub scope: TableScope,
    pub columns: Vec<ColumnDescriptor>,
    pub indexed_columns: Vec<String>,
    /// Ring order.
    pub partitions: Vec<PartitionRange>,
    pub predicate: TupleDomain,
    /// At least one partition is served by a fallback replica.
    pub degraded: bool,
}

impl CoverageSplit {
    /// Hosts the scheduler should prefer when placing this split.
    pub fn host_affinity(&self) -> Vec<String> {
        vec![self.address.clone()]
    }

    /// Part of the predicate the store can evaluate through its indexes.
    pub fn pushdown(&self) -> TupleDomain {
        self.predicate.restrict_to(&self.indexed_columns)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Codec(e.to_string()))
    }

    /// Compact payload handed to a scan worker.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Codec(e.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SplitOptions {
    /// Chunk coverage entries into splits of at most this many partitions.
    pub max_partitions_per_split: Option<NonZeroUsize>,
}

/// Builds the splits for one query.
///
/// The predicate is validated against the resolved columns first. A predicate
/// that provably matches nothing yields no splits; otherwise every covered
/// partition is scanned and workers re-apply the predicate.
pub fn build_splits(
    query_id: Uuid,
    ring: &RingSnapshot,
    plan: &CoveragePlan,
    table: &ResolvedTable,
    predicate: &TupleDomain,
    options: &SplitOptions,
) -> Result<Vec<CoverageSplit>> {
    predicate.validate(&table.metadata.columns)?;
    if predicate.is_provably_empty() {
        debug!(table = %table.handle, "predicate excludes every row, no splits");
        return Ok(Vec::new());
    }

    let indexed_columns = table.indexed_columns();
    let mut splits = Vec::with_capacity(plan.len());
    for entry in plan.entries() {
        let chunk_size = options
            .max_partitions_per_split
            .map_or(entry.partitions.len(), NonZeroUsize::get);
        for chunk in entry.partitions.chunks(chunk_size.max(1)) {
            splits.push(split_for(
                query_id,
                ring,
                entry,
                chunk,
                table,
                &indexed_columns,
                predicate,
            ));
        }
    }
    Ok(splits)
}

fn split_for(
    query_id: Uuid,
    ring: &RingSnapshot,
    entry: &CoverageEntry,
    chunk: &[CoveredPartition],
    table: &ResolvedTable,
    indexed_columns: &[String],
    predicate: &TupleDomain,
) -> CoverageSplit {
    let partitions = chunk
        .iter()
        .map(|covered| ring.range_of(&ring.partitions()[covered.partition]))
        .collect();
    CoverageSplit {
        query_id,
        node_id: entry.node_id.clone(),
        address: ring.node(entry.node).address.clone(),
        table: table.handle.clone(),
        scope: table.scope.clone(),
        columns: table.metadata.columns.clone(),
        indexed_columns: indexed_columns.to_vec(),
        partitions,
        predicate: predicate.clone(),
        degraded: chunk.iter().any(CoveredPartition::is_fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::plan_coverage;
    use ringscan_common::{DataType, Domain, Liveness, MemoryCatalog, Node, Value};

    fn ring() -> RingSnapshot {
        let step = 1u64 << 62;
        RingSnapshot::new(
            vec![Node::new("A", "10.0.0.1:8087"), Node::new("B", "10.0.0.2:8087")],
            vec![
                (0, vec!["A".into(), "B".into()]),
                (step, vec!["A".into(), "B".into()]),
                (2 * step, vec!["B".into(), "A".into()]),
                (3 * step, vec!["B".into(), "A".into()]),
            ],
        )
        .unwrap()
    }

    fn catalog() -> MemoryCatalog {
        let catalog = MemoryCatalog::new();
        catalog.add_schema("default").unwrap();
        catalog
            .add_table_to_schema(
                "default",
                TableDescriptor::new(
                    "users",
                    vec![
                        ColumnDescriptor::new("id", DataType::Int64).primary_key(),
                        ColumnDescriptor::new("city", DataType::Utf8).indexed(),
                        ColumnDescriptor::new("age", DataType::Int32),
                    ],
                ),
            )
            .unwrap();
        catalog
    }

    fn resolve(table: &str) -> ResolvedTable {
        ResolvedTable::resolve(&catalog(), &SchemaTableName::new("default", table)).unwrap()
    }

    #[test]
    fn test_one_split_per_entry() {
        let ring = ring();
        let plan = plan_coverage(&ring).unwrap();
        let splits = build_splits(
            Uuid::nil(),
            &ring,
            &plan,
            &resolve("users"),
            &TupleDomain::all(),
            &SplitOptions::default(),
        )
        .unwrap();
        assert_eq!(splits.len(), 2);

        let a = &splits[0];
        assert_eq!(a.node_id, NodeId::from("A"));
        assert_eq!(a.address, "10.0.0.1:8087");
        assert_eq!(a.host_affinity(), vec!["10.0.0.1:8087".to_string()]);
        let covered: Vec<_> = a.partitions.iter().map(|r| r.partition).collect();
        assert_eq!(covered, vec![0, 1]);
        assert_eq!(a.partitions[0].end, a.partitions[1].start);
        assert_eq!(a.indexed_columns, vec!["city".to_string()]);
        assert_eq!(a.scope, TableScope::Table);
        assert!(!a.degraded);

        let b = &splits[1];
        assert_eq!(b.node_id, NodeId::from("B"));
        assert!(b.partitions[1].wraps());
    }

    #[test]
    fn test_degraded_flag_follows_fallbacks() {
        let ring = ring().with_liveness(&"A".into(), Liveness::Unreachable).unwrap();
        let plan = plan_coverage(&ring).unwrap();
        let options = SplitOptions {
            max_partitions_per_split: NonZeroUsize::new(2),
        };
        let splits = build_splits(
            Uuid::nil(),
            &ring,
            &plan,
            &resolve("users"),
            &TupleDomain::all(),
            &options,
        )
        .unwrap();
        assert_eq!(splits.len(), 2);
        assert!(splits.iter().all(|s| s.node_id == NodeId::from("B")));
        assert!(splits[0].degraded);
        assert!(!splits[1].degraded);
    }

    #[test]
    fn test_chunking_keeps_every_partition_once() {
        let ring = ring();
        let plan = plan_coverage(&ring).unwrap();
        let options = SplitOptions {
            max_partitions_per_split: NonZeroUsize::new(1),
        };
        let splits = build_splits(
            Uuid::nil(),
            &ring,
            &plan,
            &resolve("users"),
            &TupleDomain::all(),
            &options,
        )
        .unwrap();
        assert_eq!(splits.len(), 4);
        let mut covered: Vec<_> = splits
            .iter()
            .flat_map(|s| s.partitions.iter().map(|r| r.partition))
            .collect();
        covered.sort();
        assert_eq!(covered, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_sub_table_inherits_parent_metadata() {
        let table = resolve("users/visits");
        assert!(table.inherits_parent());
        assert_eq!(
            table.scope,
            TableScope::SubTable {
                parent: "users".to_string()
            }
        );
        assert_eq!(table.metadata.name, "users");

        let ring = ring();
        let plan = plan_coverage(&ring).unwrap();
        let splits = build_splits(
            Uuid::nil(),
            &ring,
            &plan,
            &table,
            &TupleDomain::all(),
            &SplitOptions::default(),
        )
        .unwrap();
        assert!(splits
            .iter()
            .all(|s| s.table.table == "users/visits" && s.columns.len() == 3));
    }

    #[test]
    fn test_missing_table_or_parent() {
        let catalog = catalog();
        for name in ["orders", "orders/lines"] {
            let handle = SchemaTableName::new("default", name);
            let err = ResolvedTable::resolve(&catalog, &handle).unwrap_err();
            assert_eq!(err, Error::TableNotFound(handle));
        }
        let handle = SchemaTableName::new("other", "users");
        assert!(matches!(
            ResolvedTable::resolve(&catalog, &handle),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_unsatisfiable_predicate_prunes_everything() {
        let ring = ring();
        let plan = plan_coverage(&ring).unwrap();
        for predicate in [
            TupleDomain::none(),
            TupleDomain::all().with_column("city", Domain::In(vec![])),
        ] {
            let splits = build_splits(
                Uuid::nil(),
                &ring,
                &plan,
                &resolve("users"),
                &predicate,
                &SplitOptions::default(),
            )
            .unwrap();
            assert!(splits.is_empty());
        }
    }

    #[test]
    fn test_invalid_predicate_is_rejected() {
        let ring = ring();
        let plan = plan_coverage(&ring).unwrap();
        let predicate = TupleDomain::all().with_column("city", Domain::Equal(Value::Int(4)));
        let err = build_splits(
            Uuid::nil(),
            &ring,
            &plan,
            &resolve("users"),
            &predicate,
            &SplitOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPredicate(_)));
    }

    #[test]
    fn test_pushdown_keeps_indexed_columns() {
        let ring = ring();
        let plan = plan_coverage(&ring).unwrap();
        let predicate = TupleDomain::all()
            .with_column("city", Domain::Equal(Value::Text("Oslo".into())))
            .with_column("age", Domain::Equal(Value::Int(30)));
        let splits = build_splits(
            Uuid::nil(),
            &ring,
            &plan,
            &resolve("users"),
            &predicate,
            &SplitOptions::default(),
        )
        .unwrap();
        let pushed = splits[0].pushdown();
        let domains = pushed.domains().unwrap();
        assert_eq!(domains.keys().collect::<Vec<_>>(), vec!["city"]);
        assert_eq!(splits[0].predicate, predicate);
    }

    #[test]
    fn test_split_payload_is_self_contained() {
        let ring = ring();
        let plan = plan_coverage(&ring).unwrap();
        let predicate = TupleDomain::all().with_column("city", Domain::Equal(Value::Text("Oslo".into())));
        let split = build_splits(
            Uuid::new_v4(),
            &ring,
            &plan,
            &resolve("users/visits"),
            &predicate,
            &SplitOptions::default(),
        )
        .unwrap()
        .remove(0);

        let decoded = CoverageSplit::decode(&split.encode().unwrap()).unwrap();
        assert_eq!(decoded, split);

        let json: serde_json::Value = serde_json::from_str(&split.to_json().unwrap()).unwrap();
        assert_eq!(json["address"], "10.0.0.1:8087");
        assert_eq!(json["table"]["table"], "users/visits");
        assert_eq!(json["scope"]["SubTable"]["parent"], "users");

        assert!(matches!(
            CoverageSplit::decode(&[1, 2, 3]),
            Err(Error::Codec(_))
        ));
    }
}
