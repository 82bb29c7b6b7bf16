//! Key-value store seam.
//!
//! Items are JSON objects so handlers can pass table rows straight through to
//! responses. [`crate::dynamo::DynamoStore`] is the production implementation.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ServiceResult;

/// A stored record, attribute name to value.
pub type Item = Map<String, Value>;

/// Build a key item from string attributes.
pub fn key(attributes: &[(&str, &str)]) -> Item {
    attributes
        .iter()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect()
}

/// Scan filter on a single attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equals { attribute: String, value: Value },
    /// Substring of a string attribute, or member of a list/set attribute.
    Contains { attribute: String, value: String },
}

impl Filter {
    pub fn equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Evaluate the filter against an item held in memory.
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Filter::Equals { attribute, value } => item.get(attribute) == Some(value),
            Filter::Contains { attribute, value } => match item.get(attribute) {
                Some(Value::String(s)) => s.contains(value.as_str()),
                Some(Value::Array(members)) => members.iter().any(|m| m.as_str() == Some(value.as_str())),
                _ => false,
            },
        }
    }
}

/// Equality key conditions, optionally against a secondary index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub index: Option<String>,
    pub conditions: Vec<(String, Value)>,
}

impl Query {
    pub fn partition(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            index: None,
            conditions: vec![(attribute.into(), value.into())],
        }
    }

    pub fn and(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((attribute.into(), value.into()));
        self
    }

    pub fn on_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn matches(&self, item: &Item) -> bool {
        self.conditions
            .iter()
            .all(|(attribute, value)| item.get(attribute) == Some(value))
    }
}

/// Operations the handlers need from the key-value store.
///
/// `scan` and `query` follow pagination cursors to the end.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, table: &str, key: &Item) -> ServiceResult<Option<Item>>;

    /// Insert or replace the item with the same key.
    async fn put(&self, table: &str, item: Item) -> ServiceResult<()>;

    /// Set the given attributes on the keyed item, creating it if needed.
    async fn update(&self, table: &str, key: &Item, changes: Item) -> ServiceResult<()>;

    async fn delete(&self, table: &str, key: &Item) -> ServiceResult<()>;

    async fn scan(&self, table: &str, filter: Option<&Filter>) -> ServiceResult<Vec<Item>>;

    async fn query(&self, table: &str, query: &Query) -> ServiceResult<Vec<Item>>;
}
