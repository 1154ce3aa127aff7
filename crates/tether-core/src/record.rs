//! Records: the unit of state held by a store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Schema-free attribute map of a record.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Identifies a record by type and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordIdentity {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl RecordIdentity {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// A record held by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

impl Record {
    /// Create a record with no attributes.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attributes: Attributes::new(),
        }
    }

    /// Set an attribute (builder style).
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// The identity of this record.
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::new(self.kind.clone(), self.id.clone())
    }

    /// Look up an attribute.
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}
