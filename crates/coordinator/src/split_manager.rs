//! Per-query orchestration: table resolution, ring fetch, coverage planning,
//! split building, and the shuffled split source handed to the engine.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use ringscan_common::{
    Error, NodeId, Result, RingSnapshot, SchemaRef, SchemaTableName, TableCatalog, TupleDomain,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::coverage::plan_coverage;
use crate::split::{build_splits, ResolvedTable};
use crate::split_source::SplitSource;
use crate::topology::{fetch_ring, TopologyClient};

/// Table layout reported back to the engine before split enumeration.
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub table: ResolvedTable,
    /// Arrow schema of the resolved columns.
    pub schema: SchemaRef,
    pub indexed_columns: Vec<String>,
    /// The whole predicate; the connector does not consume any of it.
    pub unenforced_predicate: TupleDomain,
}

pub struct SplitManager {
    catalog: Arc<dyn TableCatalog>,
    topology: Arc<dyn TopologyClient>,
    settings: Settings,
}

impl SplitManager {
    pub fn new(
        catalog: Arc<dyn TableCatalog>,
        topology: Arc<dyn TopologyClient>,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            topology,
            settings,
        }
    }

    /// Resolves `handle` and validates `predicate` against its columns.
    pub fn get_table_layout(
        &self,
        handle: &SchemaTableName,
        predicate: &TupleDomain,
    ) -> Result<TableLayout> {
        let table = ResolvedTable::resolve(self.catalog.as_ref(), handle)?;
        predicate.validate(&table.metadata.columns)?;
        Ok(TableLayout {
            schema: table.metadata.arrow_schema(),
            indexed_columns: table.indexed_columns(),
            table,
            unenforced_predicate: predicate.clone(),
        })
    }

    /// Plans a full scan of `handle` and returns its splits, shuffled.
    pub async fn get_splits(
        &self,
        handle: &SchemaTableName,
        predicate: &TupleDomain,
    ) -> Result<SplitSource> {
        let query_id = Uuid::new_v4();
        let local = self.local_node()?;
        let layout = self.get_table_layout(handle, predicate)?;

        let ring = fetch_ring(self.topology.as_ref(), self.settings.topology_timeout()).await?;
        let ring = mark_local(&ring, &local)?;

        let plan = plan_coverage(&ring)?;
        info!(
            %query_id,
            table = %handle,
            entries = plan.len(),
            partitions = plan.partition_count(),
            degraded = plan.degraded_partitions(),
            "coverage plan {}",
            plan
        );

        let splits = build_splits(
            query_id,
            &ring,
            &plan,
            &layout.table,
            predicate,
            &self.settings.split_options(),
        )?;
        for split in &splits {
            match split.to_json() {
                Ok(json) => debug!(%query_id, node = %split.node_id, split = %json, "built split"),
                Err(e) => warn!(%query_id, node = %split.node_id, error = %e, "failed to render split"),
            }
        }
        info!(%query_id, table = %handle, splits = splits.len(), "table has {} splits", splits.len());

        let mut rng = self.rng();
        Ok(SplitSource::shuffled(splits, &mut rng))
    }

    fn local_node(&self) -> Result<NodeId> {
        self.settings
            .local_node
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .map(NodeId::from)
            .ok_or_else(|| {
                Error::TopologyUnavailable(
                    "no local node configured; coverage planning needs a ring member".to_string(),
                )
            })
    }

    fn rng(&self) -> StdRng {
        match self.settings.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Flags `local` in `ring`; it must be a reachable member.
fn mark_local(ring: &RingSnapshot, local: &NodeId) -> Result<RingSnapshot> {
    let ring = ring.with_local(local)?;
    match ring.find_node(local) {
        Some(idx) if ring.is_live(idx) => Ok(ring),
        _ => Err(Error::TopologyUnavailable(format!(
            "local node {} is unreachable",
            local
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::StaticTopology;
    use ringscan_common::{
        ColumnDescriptor, DataType, Domain, MemoryCatalog, Node, TableDescriptor, Value,
    };

    fn catalog() -> Arc<MemoryCatalog> {
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
                    ],
                ),
            )
            .unwrap();
        Arc::new(catalog)
    }

    fn manager(local_node: Option<&str>) -> SplitManager {
        let step = 1u64 << 62;
        let ring = RingSnapshot::new(
            vec![Node::new("A", "10.0.0.1:8087"), Node::new("B", "10.0.0.2:8087")],
            vec![
                (0, vec!["A".into(), "B".into()]),
                (step, vec!["A".into(), "B".into()]),
                (2 * step, vec!["B".into(), "A".into()]),
                (3 * step, vec!["B".into(), "A".into()]),
            ],
        )
        .unwrap();
        let settings = Settings {
            local_node: local_node.map(str::to_string),
            shuffle_seed: Some(7),
            ..Settings::default()
        };
        SplitManager::new(catalog(), Arc::new(StaticTopology::new(ring)), settings)
    }

    #[test]
    fn test_table_layout_reports_indexes() {
        let layout = manager(Some("A"))
            .get_table_layout(
                &SchemaTableName::new("default", "users"),
                &TupleDomain::all(),
            )
            .unwrap();
        assert_eq!(layout.indexed_columns, vec!["city"]);
        assert_eq!(layout.schema.fields().len(), 2);
        assert_eq!(layout.schema.field(0).name(), "id");
        assert!(!layout.schema.field(0).is_nullable());
        assert!(layout.schema.field(1).is_nullable());
        assert!(!layout.table.inherits_parent());
        assert!(layout.unenforced_predicate.is_all());
    }

    #[test]
    fn test_table_layout_rejects_bad_predicate() {
        let predicate =
            TupleDomain::all().with_column("id", Domain::Equal(Value::Text("x".into())));
        let err = manager(Some("A"))
            .get_table_layout(&SchemaTableName::new("default", "users"), &predicate)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPredicate(_)));
    }

    #[tokio::test]
    async fn test_get_splits_two_nodes() {
        let source = manager(Some("A"))
            .get_splits(&SchemaTableName::new("default", "users"), &TupleDomain::all())
            .await
            .unwrap();
        assert_eq!(source.total(), 2);
        let batch = source.next_batch(10);
        assert!(batch.no_more_splits);
        let mut nodes: Vec<String> = batch
            .splits
            .iter()
            .map(|s| s.node_id.to_string())
            .collect();
        nodes.sort();
        assert_eq!(nodes, vec!["A", "B"]);
        assert!(batch.splits.iter().all(|s| !s.degraded));
    }

    #[tokio::test]
    async fn test_get_splits_without_local_node() {
        for local in [None, Some("  ")] {
            let err = manager(local)
                .get_splits(&SchemaTableName::new("default", "users"), &TupleDomain::all())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::TopologyUnavailable(_)));
        }
    }

    #[test]
    fn test_mark_local_requires_reachable_member() {
        let ring = RingSnapshot::new(
            vec![
                Node::new("A", "10.0.0.1:8087"),
                Node::new("B", "10.0.0.2:8087").unreachable(),
            ],
            vec![(0, vec!["A".into(), "B".into()])],
        )
        .unwrap();

        let marked = mark_local(&ring, &NodeId::from("A")).unwrap();
        assert_eq!(marked.local_node(), Some(0));
        assert!(matches!(
            mark_local(&ring, &NodeId::from("B")),
            Err(Error::TopologyUnavailable(_))
        ));
        assert!(matches!(
            mark_local(&ring, &NodeId::from("C")),
            Err(Error::TopologyUnavailable(_))
        ));
    }
}
