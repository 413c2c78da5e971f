//! Common crate
//!
//! Ring model, table metadata, predicates, and the error type shared by the
//! Ringscan crates.
//!
//! # Example
//! ```rust
//! use ringscan_common::ring::{Node, RingSnapshot};
//!
//! let ring = RingSnapshot::new(
//!     vec![Node::new("a", "10.0.0.1:8087")],
//!     vec![(0, vec!["a".into()])],
//! )
//! .unwrap();
//! assert_eq!(ring.partitions().len(), 1);
//! ```

pub mod catalog;
pub mod error;
pub mod predicate;
pub mod ring;

pub use arrow_schema::{DataType, SchemaRef};
pub use catalog::{ColumnDescriptor, MemoryCatalog, SchemaTableName, TableCatalog, TableDescriptor};
pub use error::{Error, Result};
pub use predicate::{Bound, Domain, TupleDomain, Value};
pub use ring::{Liveness, Node, NodeId, NodeIndex, Partition, PartitionRange, Position, RingSnapshot};
