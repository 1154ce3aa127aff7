//! Queries and the results carried back in fulfilled responses.

use serde::{Deserialize, Serialize};

use crate::record::{Record, RecordIdentity};
use crate::types::TransformId;

/// A read description. Queries are never logged and never mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Query {
    /// Fetch one record; fails if it does not exist.
    FindRecord { record: RecordIdentity },
    /// Fetch all records of a type, ordered by id.
    FindRecords {
        #[serde(rename = "type")]
        kind: String,
    },
}

impl Query {
    pub fn find_record(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Query::FindRecord {
            record: RecordIdentity::new(kind, id),
        }
    }

    pub fn find_records(kind: impl Into<String>) -> Self {
        Query::FindRecords { kind: kind.into() }
    }
}

/// Result of a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryResult {
    Record(Record),
    Records(Vec<Record>),
}

/// Result of applying a transform: the post-state of each operation's
/// record, in operation order (`None` once removed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResult {
    pub transform_id: TransformId,
    pub records: Vec<Option<Record>>,
}

/// The value of a fulfilled response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Reply {
    Query(QueryResult),
    Update(TransformResult),
}

impl Reply {
    pub fn into_query(self) -> Option<QueryResult> {
        match self {
            Reply::Query(result) => Some(result),
            Reply::Update(_) => None,
        }
    }

    pub fn into_update(self) -> Option<TransformResult> {
        match self {
            Reply::Update(result) => Some(result),
            Reply::Query(_) => None,
        }
    }
}
