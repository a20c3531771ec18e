//! In-memory RecordStore.
//!
//! Pages like DynamoDB: a query that stops because it reached its limit
//! returns the last key as continuation, even when nothing follows it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    Attributes, Direction, ExpectedAttribute, QueryPage, RangeQuery, Record, RecordKey,
    RecordStore, Result, SortCondition, StorageError,
};

#[cfg(test)]
mod tests;

/// In-memory table keyed by `(partition_key, sort_key)`.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordKey, Attributes>>,
    fail_on_read: RwLock<bool>,
    fail_on_write: RwLock<bool>,
    fail_on_count: RwLock<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read (get, query, count) fail with `BackendUnavailable`.
    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    /// Make every write fail with `BackendUnavailable`.
    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    /// Make only `count` fail, leaving queries intact.
    pub async fn set_fail_on_count(&self, fail: bool) {
        *self.fail_on_count.write().await = fail;
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::BackendUnavailable(
                "memory store reads disabled".to_string(),
            ));
        }
        Ok(())
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::BackendUnavailable(
                "memory store writes disabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Keys of one partition matching `condition`, ascending.
    fn partition_keys<'a>(
        records: &'a BTreeMap<RecordKey, Attributes>,
        partition_key: &'a str,
        condition: &'a SortCondition,
    ) -> impl Iterator<Item = (&'a RecordKey, &'a Attributes)> + 'a {
        records
            .range(RecordKey::new(partition_key, "")..)
            .take_while(move |(k, _)| k.partition_key == partition_key)
            .filter(move |(k, _)| condition.matches(&k.sort_key))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
        self.check_read().await?;
        let records = self.records.read().await;
        Ok(records
            .get(key)
            .map(|attributes| Record::new(key.clone(), attributes.clone())))
    }

    async fn put(&self, record: Record) -> Result<()> {
        self.check_write().await?;
        self.records
            .write()
            .await
            .insert(record.key, record.attributes);
        Ok(())
    }

    async fn put_if_absent(&self, record: Record) -> Result<()> {
        self.check_write().await?;
        let mut records = self.records.write().await;
        if records.contains_key(&record.key) {
            return Err(StorageError::ConflictExists(record.key));
        }
        records.insert(record.key, record.attributes);
        Ok(())
    }

    async fn update(&self, key: &RecordKey, changes: Attributes) -> Result<Record> {
        self.check_write().await?;
        let mut records = self.records.write().await;
        let attributes = records.entry(key.clone()).or_default();
        attributes.extend(changes);
        Ok(Record::new(key.clone(), attributes.clone()))
    }

    async fn update_if(
        &self,
        key: &RecordKey,
        changes: Attributes,
        condition: &ExpectedAttribute,
    ) -> Result<Record> {
        self.check_write().await?;
        let mut records = self.records.write().await;
        match records.get_mut(key) {
            Some(attributes) if condition.holds(attributes) => {
                attributes.extend(changes);
                Ok(Record::new(key.clone(), attributes.clone()))
            }
            _ => Err(StorageError::ConditionFailed {
                key: key.clone(),
                attribute: condition.name.clone(),
                expected: condition.value.clone(),
            }),
        }
    }

    async fn delete(&self, key: &RecordKey) -> Result<()> {
        self.check_write().await?;
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn replace(&self, old_key: &RecordKey, record: Record) -> Result<()> {
        self.check_write().await?;
        let mut records = self.records.write().await;
        records.remove(old_key);
        records.insert(record.key, record.attributes);
        Ok(())
    }

    async fn put_batch(&self, batch: Vec<Record>) -> Result<()> {
        self.check_write().await?;
        let mut records = self.records.write().await;
        debug!(count = batch.len(), "Writing record batch");
        for record in batch {
            records.insert(record.key, record.attributes);
        }
        Ok(())
    }

    async fn query(&self, query: RangeQuery) -> Result<QueryPage> {
        self.check_read().await?;
        let records = self.records.read().await;
        let mut matching: Vec<_> =
            Self::partition_keys(&records, &query.partition_key, &query.condition).collect();
        if query.direction == Direction::Descending {
            matching.reverse();
        }

        let start = query.exclusive_start.as_ref().map(|k| k.sort_key.as_str());
        let after_start = matching.into_iter().filter(|(k, _)| match (start, query.direction) {
            (None, _) => true,
            (Some(s), Direction::Ascending) => k.sort_key.as_str() > s,
            (Some(s), Direction::Descending) => k.sort_key.as_str() < s,
        });

        let limit = query.limit.unwrap_or(usize::MAX);
        let items: Vec<Record> = after_start
            .take(limit)
            .map(|(k, v)| Record::new(k.clone(), v.clone()))
            .collect();

        let continuation = if query.limit.is_some() && items.len() == limit {
            items.last().map(|r| r.key.clone())
        } else {
            None
        };

        Ok(QueryPage {
            items,
            continuation,
        })
    }

    async fn count(&self, partition_key: &str, condition: SortCondition) -> Result<u64> {
        self.check_read().await?;
        if *self.fail_on_count.read().await {
            return Err(StorageError::BackendUnavailable(
                "memory store count disabled".to_string(),
            ));
        }
        let records = self.records.read().await;
        Ok(Self::partition_keys(&records, partition_key, &condition).count() as u64)
    }
}
