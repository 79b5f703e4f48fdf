use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CollectorError;

/// Token substituted by the current dimension value inside parameter templates.
pub const DIMENSION_PLACEHOLDER: &str = "{dimension}";

pub const LOAD_TIMESTAMP_FIELD: &str = "load_timestamp";
pub const QUERY_NAME_FIELD: &str = "query_name";

static QUERY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static query id pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueryId(String);

impl QueryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueryId {
    type Err = CollectorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !QUERY_ID_RE.is_match(trimmed) || trimmed == "." || trimmed == ".." {
            return Err(CollectorError::InvalidQuery(format!(
                "query name {value:?} must match [A-Za-z0-9_.-]+"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for QueryId {
    type Error = CollectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QueryId> for String {
    fn from(value: QueryId) -> Self {
        value.0
    }
}

/// One value of the expansion dimension, e.g. a warehouse code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DimensionValue(String);

impl DimensionValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DimensionValue {
    type Err = CollectorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.contains(DIMENSION_PLACEHOLDER) {
            return Err(CollectorError::InvalidDimension(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for DimensionValue {
    type Error = CollectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DimensionValue> for String {
    fn from(value: DimensionValue) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryDescriptor {
    pub id: QueryId,
    pub endpoint: String,
    pub orderby: Option<String>,
    pub take: Option<u64>,
    pub params: IndexMap<String, String>,
    pub artifact: String,
    pub expand_by_dimension: bool,
}

impl QueryDescriptor {
    pub fn uses_placeholder(&self) -> bool {
        self.orderby
            .as_deref()
            .is_some_and(|value| value.contains(DIMENSION_PLACEHOLDER))
            || self.params.iter().any(|(key, value)| {
                key.contains(DIMENSION_PLACEHOLDER) || value.contains(DIMENSION_PLACEHOLDER)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkItem {
    Simple {
        descriptor: QueryDescriptor,
    },
    DimensionExpanded {
        descriptor: QueryDescriptor,
        values: Vec<DimensionValue>,
    },
}

impl WorkItem {
    pub fn descriptor(&self) -> &QueryDescriptor {
        match self {
            WorkItem::Simple { descriptor } => descriptor,
            WorkItem::DimensionExpanded { descriptor, .. } => descriptor,
        }
    }

    pub fn units(&self) -> Vec<Unit<'_>> {
        match self {
            WorkItem::Simple { descriptor } => vec![Unit {
                descriptor,
                dimension: None,
            }],
            WorkItem::DimensionExpanded { descriptor, values } => values
                .iter()
                .map(|value| Unit {
                    descriptor,
                    dimension: Some(value),
                })
                .collect(),
        }
    }
}

/// One concrete request: a descriptor plus, when expanded, one dimension value.
#[derive(Debug, Clone, Copy)]
pub struct Unit<'a> {
    pub descriptor: &'a QueryDescriptor,
    pub dimension: Option<&'a DimensionValue>,
}

impl Unit<'_> {
    pub fn label(&self) -> String {
        match self.dimension {
            Some(value) => format!("{}[{}]", self.descriptor.id, value),
            None => self.descriptor.id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    InFlight,
    Success,
    Empty,
    Failed,
    Exhausted,
}

/// An upstream item after enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(mut fields: Map<String, Value>, query_name: &QueryId, load_timestamp: String) -> Self {
        fields.insert(LOAD_TIMESTAMP_FIELD.to_string(), Value::String(load_timestamp));
        fields.insert(
            QUERY_NAME_FIELD.to_string(),
            Value::String(query_name.as_str().to_string()),
        );
        Self(fields)
    }

    pub fn query_name(&self) -> Option<&str> {
        self.0.get(QUERY_NAME_FIELD).and_then(Value::as_str)
    }

    pub fn load_timestamp(&self) -> Option<&str> {
        self.0.get(LOAD_TIMESTAMP_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Upstream fields only, without the injected ones.
    pub fn upstream_fields(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(key, _)| {
                key.as_str() != LOAD_TIMESTAMP_FIELD && key.as_str() != QUERY_NAME_FIELD
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}
