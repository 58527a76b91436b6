use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, Version};
use crate::value::AttrValue;

/// One live or historical attribute row. `deleted_at_version` is `None`
/// while the attribute is current; a soft delete stamps it instead of
/// removing the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub entity_id: EntityId,
    pub key: String,
    pub subkey: Option<String>,
    pub number: Option<i64>,
    pub value: AttrValue,
    pub version: Version,
    pub deleted_at_version: Option<Version>,
}

/// Subkey predicate. `Any` matches rows with or without a subkey; `None`
/// matches only rows without one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubkeyFilter {
    #[default]
    Any,
    None,
    Is(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NumberFilter {
    #[default]
    Any,
    None,
    Is(i64),
}

/// Predicate set for attribute reads and deletes. An empty filter matches
/// every attribute on the entity.
#[derive(Debug, Clone, Default)]
pub struct AttrFilter {
    pub key: Option<String>,
    pub subkey: SubkeyFilter,
    pub number: NumberFilter,
    pub value: Option<AttrValue>,
}

impl AttrFilter {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn subkey(mut self, subkey: impl Into<String>) -> Self {
        self.subkey = SubkeyFilter::Is(subkey.into());
        self
    }

    pub fn no_subkey(mut self) -> Self {
        self.subkey = SubkeyFilter::None;
        self
    }

    pub fn number(mut self, number: i64) -> Self {
        self.number = NumberFilter::Is(number);
        self
    }

    pub fn no_number(mut self) -> Self {
        self.number = NumberFilter::None;
        self
    }

    pub fn value(mut self, value: impl Into<AttrValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// True when the filter constrains nothing.
    pub fn is_empty(&self) -> bool {
        self.key.is_none()
            && self.subkey == SubkeyFilter::Any
            && self.number == NumberFilter::Any
            && self.value.is_none()
    }

    /// In-memory check, used for post-filtering rows already loaded.
    pub fn matches(&self, attr: &Attribute) -> bool {
        if let Some(key) = &self.key
            && key != &attr.key
        {
            return false;
        }
        match &self.subkey {
            SubkeyFilter::Any => {}
            SubkeyFilter::None => {
                if attr.subkey.is_some() {
                    return false;
                }
            }
            SubkeyFilter::Is(s) => {
                if attr.subkey.as_deref() != Some(s.as_str()) {
                    return false;
                }
            }
        }
        match self.number {
            NumberFilter::Any => {}
            NumberFilter::None => {
                if attr.number.is_some() {
                    return false;
                }
            }
            NumberFilter::Is(n) => {
                if attr.number != Some(n) {
                    return false;
                }
            }
        }
        if let Some(value) = &self.value
            && value != &attr.value
        {
            return false;
        }
        true
    }
}
