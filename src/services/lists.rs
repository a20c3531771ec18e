//! Black/watch/staff-list membership.
//!
//! A member is keyed `{LIST_TYPE}-{channel}-{LEVEL}` / `{hierarchy id}`.
//! Moving a member re-keys it atomically and keeps its attributes.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::keys::{build_list_partition_key, list_sort_key, EntityIds, HierarchyLevel, ListType};
use crate::storage::{Attributes, RangeQuery, Record, RecordKey, RecordStore};
use crate::utils::time::now_rfc3339;

/// One list partition: list type, channel and entity level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListScope {
    pub list_type: ListType,
    pub channel: String,
    pub level: HierarchyLevel,
}

impl ListScope {
    pub fn new(list_type: &str, channel: &str, level: HierarchyLevel) -> Result<Self> {
        let list_type = list_type
            .parse::<ListType>()
            .map_err(|e| Error::invalid(e.to_string()))?;
        if channel.is_empty() {
            return Err(Error::invalid("channel is required"));
        }
        Ok(Self {
            list_type,
            channel: channel.to_lowercase(),
            level,
        })
    }

    pub fn partition_key(&self) -> String {
        build_list_partition_key(self.list_type.as_str(), &self.channel, self.level)
    }

    fn key(&self, ids: &EntityIds) -> Result<RecordKey> {
        Ok(RecordKey::new(self.partition_key(), list_sort_key(self.level, ids)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListMember {
    pub list_type: ListType,
    pub channel: String,
    pub level: HierarchyLevel,
    /// Sort key: the entity id, or the processor-rooted hierarchy join.
    pub member_key: String,
    pub attributes: Attributes,
}

impl ListMember {
    fn from_record(scope: &ListScope, record: Record) -> Self {
        Self {
            list_type: scope.list_type,
            channel: scope.channel.clone(),
            level: scope.level,
            member_key: record.key.sort_key,
            attributes: record.attributes,
        }
    }
}

pub struct ListService {
    store: Arc<dyn RecordStore>,
}

impl ListService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Put an entity on a list. Re-adding refreshes `created_at`.
    pub async fn add_member(&self, scope: &ListScope, ids: &EntityIds) -> Result<ListMember> {
        let key = scope.key(ids)?;
        let mut attributes = Attributes::new();
        attributes.insert("created_at".to_string(), json!(now_rfc3339()));

        let record = Record::new(key, attributes);
        self.store.put(record.clone()).await?;
        info!(
            partition = %record.key.partition_key,
            member = %record.key.sort_key,
            "List member added"
        );
        Ok(ListMember::from_record(scope, record))
    }

    pub async fn get_member(&self, scope: &ListScope, ids: &EntityIds) -> Result<ListMember> {
        let key = scope.key(ids)?;
        match self.store.get(&key).await? {
            Some(record) => Ok(ListMember::from_record(scope, record)),
            None => Err(Error::not_found(format!("list member {}", key))),
        }
    }

    /// Every member of one list partition.
    pub async fn list_members(&self, scope: &ListScope) -> Result<Vec<ListMember>> {
        let mut members = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .store
                .query(RangeQuery::new(scope.partition_key()).starting_after(cursor.take()))
                .await?;
            members.extend(
                page.items
                    .into_iter()
                    .map(|record| ListMember::from_record(scope, record)),
            );
            match page.continuation {
                Some(next) => cursor = Some(next),
                None => return Ok(members),
            }
        }
    }

    /// Take an entity off a list. Removing an absent member is a no-op.
    pub async fn remove_member(&self, scope: &ListScope, ids: &EntityIds) -> Result<()> {
        let key = scope.key(ids)?;
        self.store.delete(&key).await?;
        info!(partition = %key.partition_key, member = %key.sort_key, "List member removed");
        Ok(())
    }

    /// Re-key a member from `current` to `new` ids in one atomic replace.
    ///
    /// Attributes carry over except `updated_at`; `created_at` is kept when
    /// present.
    pub async fn move_member(
        &self,
        scope: &ListScope,
        current: &EntityIds,
        new: &EntityIds,
    ) -> Result<ListMember> {
        let old_key = scope.key(current)?;
        let new_key = scope.key(new)?;

        let existing = self
            .store
            .get(&old_key)
            .await?
            .ok_or_else(|| Error::not_found(format!("list member {}", old_key)))?;
        if old_key == new_key {
            debug!(key = %old_key, "List member already under the requested ids");
            return Ok(ListMember::from_record(scope, existing));
        }

        let mut attributes = existing.attributes;
        attributes.remove("updated_at");
        attributes
            .entry("created_at")
            .or_insert_with(|| json!(now_rfc3339()));

        let moved = Record::new(new_key, attributes);
        self.store.replace(&old_key, moved.clone()).await?;
        info!(from = %old_key, to = %moved.key, "List member moved");
        Ok(ListMember::from_record(scope, moved))
    }
}
