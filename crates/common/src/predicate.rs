//! Per-column domain constraints pushed down with a scan.
//!
//! A [`TupleDomain`] is either `none` (no row can match) or a map from column
//! name to [`Domain`]; columns that are absent are unconstrained. The planner
//! only uses it to prune provably empty scans and to hand the indexed-column
//! part to workers. Filtering itself stays with the engine.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use arrow_schema::DataType;
use serde::{Deserialize, Serialize};

use crate::catalog::ColumnDescriptor;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Boolean(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    fn fits(&self, data_type: &DataType) -> bool {
        match self {
            Value::Boolean(_) => matches!(data_type, DataType::Boolean),
            Value::Int(_) => data_type.is_integer(),
            Value::Float(_) => data_type.is_floating(),
            Value::Text(_) => matches!(
                data_type,
                DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
            ),
        }
    }

    fn is_nan(&self) -> bool {
        matches!(self, Value::Float(f) if f.is_nan())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Unbounded,
    Included(Value),
    Excluded(Value),
}

impl Bound {
    fn value(&self) -> Option<&Value> {
        match self {
            Bound::Unbounded => None,
            Bound::Included(v) | Bound::Excluded(v) => Some(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Unconstrained.
    All,
    Equal(Value),
    In(Vec<Value>),
    Range { low: Bound, high: Bound },
}

impl Domain {
    pub fn range(low: Bound, high: Bound) -> Self {
        Domain::Range { low, high }
    }

    /// True when no value can satisfy the domain. Only an empty IN list
    /// qualifies; malformed ranges are rejected by validation instead.
    pub fn is_empty(&self) -> bool {
        matches!(self, Domain::In(values) if values.is_empty())
    }

    fn values(&self) -> Vec<&Value> {
        match self {
            Domain::All => Vec::new(),
            Domain::Equal(v) => vec![v],
            Domain::In(values) => values.iter().collect(),
            Domain::Range { low, high } => low.value().into_iter().chain(high.value()).collect(),
        }
    }

    fn validate(&self, column: &ColumnDescriptor) -> Result<()> {
        for value in self.values() {
            if value.is_nan() {
                return Err(Error::InvalidPredicate(format!(
                    "column {}: NaN is not a valid bound",
                    column.name
                )));
            }
            if !value.fits(&column.data_type) {
                return Err(Error::InvalidPredicate(format!(
                    "column {}: value {:?} does not match type {}",
                    column.name, value, column.data_type
                )));
            }
        }

        if let Domain::Range { low, high } = self {
            if let (Some(lo), Some(hi)) = (low.value(), high.value()) {
                let both_inclusive =
                    matches!(low, Bound::Included(_)) && matches!(high, Bound::Included(_));
                match lo.partial_cmp(hi) {
                    Some(Ordering::Less) => {}
                    Some(Ordering::Equal) if both_inclusive => {}
                    _ => {
                        return Err(Error::InvalidPredicate(format!(
                            "column {}: range low bound {:?} is above high bound {:?}",
                            column.name, low, high
                        )))
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleDomain {
    domains: Option<BTreeMap<String, Domain>>,
}

impl Default for TupleDomain {
    fn default() -> Self {
        Self::all()
    }
}

impl TupleDomain {
    /// Matches every row.
    pub fn all() -> Self {
        Self {
            domains: Some(BTreeMap::new()),
        }
    }

    /// Matches no row.
    pub fn none() -> Self {
        Self { domains: None }
    }

    /// Adds or replaces the domain for `column`. A `none` tuple domain stays
    /// `none`.
    pub fn with_column(mut self, column: impl Into<String>, domain: Domain) -> Self {
        if let Some(domains) = self.domains.as_mut() {
            domains.insert(column.into(), domain);
        }
        self
    }

    pub fn is_all(&self) -> bool {
        self.domains
            .as_ref()
            .is_some_and(|d| d.values().all(|domain| *domain == Domain::All))
    }

    pub fn is_none(&self) -> bool {
        self.domains.is_none()
    }

    pub fn domains(&self) -> Option<&BTreeMap<String, Domain>> {
        self.domains.as_ref()
    }

    /// True when the constraints provably exclude every row.
    pub fn is_provably_empty(&self) -> bool {
        match &self.domains {
            None => true,
            Some(domains) => domains.values().any(Domain::is_empty),
        }
    }

    /// Checks every domain against the table's columns.
    pub fn validate(&self, columns: &[ColumnDescriptor]) -> Result<()> {
        let Some(domains) = &self.domains else {
            return Ok(());
        };
        for (name, domain) in domains {
            let column = columns.iter().find(|c| &c.name == name).ok_or_else(|| {
                Error::InvalidPredicate(format!("unknown column {}", name))
            })?;
            domain.validate(column)?;
        }
        Ok(())
    }

    /// Keeps only the domains of `columns`.
    pub fn restrict_to(&self, columns: &[String]) -> TupleDomain {
        match &self.domains {
            None => TupleDomain::none(),
            Some(domains) => TupleDomain {
                domains: Some(
                    domains
                        .iter()
                        .filter(|(name, _)| columns.contains(*name))
                        .map(|(name, domain)| (name.clone(), domain.clone()))
                        .collect(),
                ),
            },
        }
    }
}
