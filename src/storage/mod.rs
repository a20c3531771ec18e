//! Single-table record storage.
//!
//! Every record is addressed by `(partition_key, sort_key)` and carries a
//! schemaless attribute map. [`RecordStore`] is the only seam between the
//! domain code and a backend:
//!
//! - [`MemoryStore`]: in-process table with DynamoDB-compatible paging
//! - `DynamoStore`: DynamoDB single table (feature `dynamo`)

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::config::{StorageConfig, StorageType};

pub mod memory;

#[cfg(feature = "dynamo")]
pub mod dynamo;

pub use memory::MemoryStore;

#[cfg(feature = "dynamo")]
pub use dynamo::DynamoStore;

/// Attribute map of a record (key attributes excluded).
pub type Attributes = serde_json::Map<String, Value>;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Record already exists: {0}")]
    ConflictExists(RecordKey),

    #[error("Condition failed on {key}: expected {attribute} = {expected}")]
    ConditionFailed {
        key: RecordKey,
        attribute: String,
        expected: Value,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backend refused the request as invalid; resending it fails again.
    #[error("Storage request rejected: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Composite primary key.
///
/// Serializes with the stored attribute names, which is also the shape
/// carried inside pagination tokens.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    #[serde(rename = "PARTITION_KEY")]
    pub partition_key: String,
    #[serde(rename = "SORT_KEY")]
    pub sort_key: String,
}

impl RecordKey {
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }
}

impl From<(String, String)> for RecordKey {
    fn from((partition_key, sort_key): (String, String)) -> Self {
        Self {
            partition_key,
            sort_key,
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.partition_key, self.sort_key)
    }
}

/// A stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: RecordKey,
    pub attributes: Attributes,
}

impl Record {
    pub fn new(key: impl Into<RecordKey>, attributes: Attributes) -> Self {
        Self {
            key: key.into(),
            attributes,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// String attribute, `None` when absent or not a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Flatten into one JSON object with the key attributes included.
    pub fn into_json(self) -> Value {
        let mut object = self.attributes;
        object.insert(
            "PARTITION_KEY".to_string(),
            Value::String(self.key.partition_key),
        );
        object.insert("SORT_KEY".to_string(), Value::String(self.key.sort_key));
        Value::Object(object)
    }
}

/// Key condition on the sort key within one partition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SortCondition {
    #[default]
    All,
    Equals(String),
    BeginsWith(String),
    /// Inclusive on both ends.
    Between(String, String),
}

impl SortCondition {
    pub fn matches(&self, sort_key: &str) -> bool {
        match self {
            SortCondition::All => true,
            SortCondition::Equals(value) => sort_key == value,
            SortCondition::BeginsWith(prefix) => sort_key.starts_with(prefix.as_str()),
            SortCondition::Between(lower, upper) => {
                sort_key >= lower.as_str() && sort_key <= upper.as_str()
            }
        }
    }
}

/// Sort-key order of query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Query over one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    pub partition_key: String,
    pub condition: SortCondition,
    /// Maximum records returned; `None` reads to the end of the partition.
    pub limit: Option<usize>,
    /// Resume after this key (the previous page's continuation).
    pub exclusive_start: Option<RecordKey>,
    pub direction: Direction,
}

impl RangeQuery {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            condition: SortCondition::All,
            limit: None,
            exclusive_start: None,
            direction: Direction::Ascending,
        }
    }

    pub fn with_condition(mut self, condition: SortCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn starting_after(mut self, key: Option<RecordKey>) -> Self {
        self.exclusive_start = key;
        self
    }

    pub fn descending(mut self) -> Self {
        self.direction = Direction::Descending;
        self
    }
}

/// One batch of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub items: Vec<Record>,
    /// Key to resume from; `None` once the range is exhausted.
    pub continuation: Option<RecordKey>,
}

/// Expected attribute value for conditional updates.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedAttribute {
    pub name: String,
    pub value: Value,
}

impl ExpectedAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn holds(&self, attributes: &Attributes) -> bool {
        attributes.get(&self.name) == Some(&self.value)
    }
}

/// Interface for single-table record persistence.
///
/// Implementations:
/// - `MemoryStore`: in-process table
/// - `DynamoStore`: DynamoDB
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one record.
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>>;

    /// Insert or overwrite a record.
    async fn put(&self, record: Record) -> Result<()>;

    /// Insert a record, failing with `ConflictExists` if the key is taken.
    async fn put_if_absent(&self, record: Record) -> Result<()>;

    /// Set attributes on a record, creating it when absent.
    ///
    /// Returns the record as stored after the update.
    async fn update(&self, key: &RecordKey, changes: Attributes) -> Result<Record>;

    /// Set attributes only while `condition` holds on the stored record.
    ///
    /// Fails with `ConditionFailed` when the record is absent or the
    /// attribute differs.
    async fn update_if(
        &self,
        key: &RecordKey,
        changes: Attributes,
        condition: &ExpectedAttribute,
    ) -> Result<Record>;

    /// Delete a record. Deleting an absent key is not an error.
    async fn delete(&self, key: &RecordKey) -> Result<()>;

    /// Atomically delete `old_key` and write `record`. When `old_key` is the
    /// record's own key this is a plain put.
    async fn replace(&self, old_key: &RecordKey, record: Record) -> Result<()>;

    /// Write many records. Not atomic across records.
    async fn put_batch(&self, records: Vec<Record>) -> Result<()>;

    /// Query one partition.
    async fn query(&self, query: RangeQuery) -> Result<QueryPage>;

    /// Count records matching a key condition.
    async fn count(&self, partition_key: &str, condition: SortCondition) -> Result<u64> {
        let mut total = 0u64;
        let mut start = None;
        loop {
            let page = self
                .query(
                    RangeQuery::new(partition_key)
                        .with_condition(condition.clone())
                        .starting_after(start),
                )
                .await?;
            total += page.items.len() as u64;
            match page.continuation {
                Some(next) => start = Some(next),
                None => return Ok(total),
            }
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Arc<dyn RecordStore>, Box<dyn std::error::Error>> {
    info!("Storage: {}", config.storage_type);

    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "dynamo")]
        StorageType::Dynamo => {
            let store = DynamoStore::new(&config.dynamo).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "dynamo"))]
        StorageType::Dynamo => {
            tracing::error!("DynamoDB storage requested but 'dynamo' feature is not enabled");
            Err("DynamoDB feature not enabled".into())
        }
    }
}
