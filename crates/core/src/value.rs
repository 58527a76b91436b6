use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::EntityId;

/// A typed attribute value. `Relation` is an edge to another entity;
/// everything else is a plain fact. `DateTime` is milliseconds since the
/// Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrValue {
    Int(i64),
    Text(String),
    DateTime(i64),
    Relation(EntityId),
}

impl AttrValue {
    /// Discriminator string stored in the `datatype` column.
    pub fn datatype(&self) -> &'static str {
        match self {
            AttrValue::Int(_) => "int",
            AttrValue::Text(_) => "text",
            AttrValue::DateTime(_) => "datetime",
            AttrValue::Relation(_) => "relation",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<i64> {
        match self {
            AttrValue::DateTime(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<EntityId> {
        match self {
            AttrValue::Relation(id) => Some(*id),
            _ => None,
        }
    }

    pub fn expect_int(&self) -> Result<i64, CoreError> {
        self.as_int().ok_or(CoreError::ValueType {
            expected: "int",
            got: self.datatype(),
        })
    }

    pub fn expect_text(&self) -> Result<&str, CoreError> {
        self.as_text().ok_or(CoreError::ValueType {
            expected: "text",
            got: self.datatype(),
        })
    }

    pub fn expect_relation(&self) -> Result<EntityId, CoreError> {
        self.as_relation().ok_or(CoreError::ValueType {
            expected: "relation",
            got: self.datatype(),
        })
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Int(n)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<EntityId> for AttrValue {
    fn from(id: EntityId) -> Self {
        AttrValue::Relation(id)
    }
}
