use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Separates a parent table from its sub-table in a table name (`parent/child`).
pub const SUB_TABLE_SEPARATOR: char = '/';

/// Schema-qualified table name as handed over by the query engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaTableName {
    pub schema: String,
    pub table: String,
}

impl SchemaTableName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn is_sub_table(&self) -> bool {
        self.table.contains(SUB_TABLE_SEPARATOR)
    }

    /// Name of the table that owns the physical data. Sub-tables share the
    /// partitioning and index declarations of their parent.
    pub fn parent(&self) -> SchemaTableName {
        match self.table.split_once(SUB_TABLE_SEPARATOR) {
            Some((parent, _)) => SchemaTableName::new(self.schema.clone(), parent),
            None => self.clone(),
        }
    }

    pub fn sub_table(&self) -> Option<&str> {
        self.table
            .split_once(SUB_TABLE_SEPARATOR)
            .map(|(_, child)| child)
    }
}

impl fmt::Display for SchemaTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub comment: Option<String>,
    /// Column carries a secondary index in the store.
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub pkey: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            comment: None,
            index: false,
            pkey: false,
        }
    }

    pub fn indexed(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.pkey = true;
        self
    }

    pub fn to_field(&self) -> Field {
        Field::new(&self.name, self.data_type.clone(), !self.pkey)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the columns declared with an index, in declaration order.
    pub fn indexed_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.index)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.columns
                .iter()
                .map(ColumnDescriptor::to_field)
                .collect::<Vec<_>>(),
        ))
    }
}

/// Table metadata lookup used during split planning.
pub trait TableCatalog: Send + Sync {
    fn table(&self, name: &SchemaTableName) -> Option<Arc<TableDescriptor>>;
}

#[derive(Debug, Default)]
pub struct CatalogSchema {
    pub tables: DashMap<String, Arc<TableDescriptor>>,
}

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    pub schemas: DashMap<String, Arc<CatalogSchema>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            schemas: DashMap::new(),
        }
    }

    /// Loads `{"schemas": {"<schema>": [<table>, ...]}}`.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let view: CatalogView = serde_json::from_str(raw)?;
        let catalog = Self::new();
        for (schema_name, tables) in view.schemas {
            let schema = Arc::new(CatalogSchema::default());
            for table in tables {
                schema.tables.insert(table.name.clone(), Arc::new(table));
            }
            catalog.schemas.insert(schema_name, schema);
        }
        Ok(catalog)
    }

    pub fn add_schema(&self, name: &str) -> Result<(), String> {
        if self.schemas.contains_key(name) {
            return Err(format!("Schema {} already exists", name));
        }
        let schema = Arc::new(CatalogSchema::default());
        self.schemas.insert(name.to_string(), schema);
        Ok(())
    }

    pub fn add_table_to_schema(&self, schema_name: &str, table: TableDescriptor) -> Result<(), String> {
        match self.schemas.get(schema_name) {
            Some(schema) => {
                if schema.tables.contains_key(&table.name) {
                    return Err(format!(
                        "Table {} already exists in schema {}",
                        table.name, schema_name
                    ));
                }
                schema.tables.insert(table.name.clone(), Arc::new(table));
                Ok(())
            }
            None => Err(format!("Schema {} not found", schema_name)),
        }
    }

    pub fn get_table_from_schema(
        &self,
        schema_name: &str,
        table_name: &str,
    ) -> Option<Arc<TableDescriptor>> {
        self.schemas
            .get(schema_name)
            .and_then(|schema| schema.tables.get(table_name).map(|t| t.value().clone()))
    }
}

impl TableCatalog for MemoryCatalog {
    fn table(&self, name: &SchemaTableName) -> Option<Arc<TableDescriptor>> {
        self.get_table_from_schema(&name.schema, &name.table)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogView {
    #[serde(default)]
    schemas: BTreeMap<String, Vec<TableDescriptor>>,
}
