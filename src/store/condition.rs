//! Stored items and the write conditions evaluated against them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::{StoreError, StoreResult};

/// A single stored item: a key, a flat attribute map and an optional expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Primary key within its table.
    pub key: String,
    /// Item attributes, as serialized by the owning record type.
    pub attributes: Map<String, Value>,
    /// Expiry as epoch seconds. The store treats the item as absent afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Item {
    /// Build an item from any record that serializes to a JSON object.
    pub fn from_record<T: Serialize>(
        key: impl Into<String>,
        record: &T,
        expires_at: Option<i64>,
    ) -> StoreResult<Self> {
        let key = key.into();
        match serde_json::to_value(record)? {
            Value::Object(attributes) => Ok(Self {
                key,
                attributes,
                expires_at,
            }),
            other => Err(StoreError::MalformedItem {
                key,
                message: format!("record serialized to non-object value: {other}"),
            }),
        }
    }

    /// Decode the attribute map back into a record.
    pub fn to_record<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_value(Value::Object(self.attributes.clone())).map_err(|e| {
            StoreError::MalformedItem {
                key: self.key.clone(),
                message: e.to_string(),
            }
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Whether the item has passed its expiry at `now_secs`.
    pub fn is_expired(&self, now_secs: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_secs)
    }
}

/// Predicate over the current item, evaluated atomically with a write.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Unconditional write.
    Always,
    /// The item must not exist.
    NotExists,
    /// The item must exist.
    Exists,
    /// The named attribute must equal `value`.
    AttributeEquals { name: String, value: Value },
    /// The named attribute must be an integer strictly less than `value`.
    AttributeLessThan { name: String, value: i64 },
    /// Every nested condition must hold.
    All(Vec<Condition>),
}

impl Condition {
    pub fn equals(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::AttributeEquals {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn less_than(name: impl Into<String>, value: i64) -> Self {
        Condition::AttributeLessThan {
            name: name.into(),
            value,
        }
    }

    /// Evaluate against the current live item (`None` when absent).
    ///
    /// A missing item fails every attribute predicate.
    pub fn matches(&self, current: Option<&Item>) -> bool {
        match self {
            Condition::Always => true,
            Condition::NotExists => current.is_none(),
            Condition::Exists => current.is_some(),
            Condition::AttributeEquals { name, value } => current
                .and_then(|item| item.attribute(name))
                .is_some_and(|actual| actual == value),
            Condition::AttributeLessThan { name, value } => current
                .and_then(|item| item.attribute(name))
                .and_then(Value::as_i64)
                .is_some_and(|actual| actual < *value),
            Condition::All(conditions) => conditions.iter().all(|c| c.matches(current)),
        }
    }
}
