//! Per-entity transaction limits.
//!
//! Limits live in `LIMITS-{channel}-{LEVEL}` partitions. Account limits use
//! the `-` sort key; deeper levels key on the processor-rooted hierarchy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{from_attributes, require, to_attributes};
use crate::error::{Error, Result};
use crate::keys::{limit_key, AggregateLevel, EntityIds, HierarchyLevel};
use crate::storage::{RangeQuery, Record, RecordKey, RecordStore};

/// Threshold attributes every limit must carry.
pub const LIMIT_ATTRIBUTES: [&str; 9] = [
    "AMOUNT",
    "HOURLY_SUM",
    "DAILY_SUM",
    "WEEKLY_SUM",
    "MONTHLY_SUM",
    "HOURLY_COUNT",
    "DAILY_COUNT",
    "WEEKLY_COUNT",
    "MONTHLY_COUNT",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LimitThresholds {
    pub amount: f64,
    pub hourly_sum: f64,
    pub daily_sum: f64,
    pub weekly_sum: f64,
    pub monthly_sum: f64,
    pub hourly_count: u64,
    pub daily_count: u64,
    pub weekly_count: u64,
    pub monthly_count: u64,
}

impl LimitThresholds {
    /// Read thresholds from a request body, naming every missing attribute.
    pub fn from_json(body: &Value) -> Result<Self> {
        let missing: Vec<&str> = LIMIT_ATTRIBUTES
            .iter()
            .copied()
            .filter(|attr| body.get(attr).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(Error::invalid(format!(
                "missing required attributes {}; required: {}",
                missing.join(", "),
                LIMIT_ATTRIBUTES.join(", ")
            )));
        }
        serde_json::from_value(body.clone())
            .map_err(|e| Error::invalid(format!("invalid limit thresholds: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Limit {
    pub channel: String,
    pub level: AggregateLevel,
    /// `-` for account limits, otherwise the hierarchy key.
    pub entity_key: String,
    #[serde(flatten)]
    pub thresholds: LimitThresholds,
}

pub struct LimitService {
    store: Arc<dyn RecordStore>,
}

impl LimitService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Create a limit; an existing limit for the same entity is a conflict.
    pub async fn create_limit(
        &self,
        channel: &str,
        level: AggregateLevel,
        ids: &EntityIds,
        thresholds: LimitThresholds,
    ) -> Result<Limit> {
        let key = limit_record_key(channel, level, ids)?;
        self.store
            .put_if_absent(Record::new(key.clone(), to_attributes(&thresholds)?))
            .await?;

        info!(partition = %key.partition_key, entity = %key.sort_key, "Limit created");
        Ok(to_limit(channel, level, key.sort_key, thresholds))
    }

    /// One limit when `ids` is given, otherwise every limit in the partition.
    pub async fn read_limit(
        &self,
        channel: &str,
        level: AggregateLevel,
        ids: Option<&EntityIds>,
    ) -> Result<Vec<Limit>> {
        let limits = match ids {
            Some(ids) => {
                let key = limit_record_key(channel, level, ids)?;
                match self.store.get(&key).await? {
                    Some(record) => vec![self.decode(channel, level, record)?],
                    None => Vec::new(),
                }
            }
            None => {
                require("channel", channel)?;
                let (partition, _) = limit_key(channel, level, &EntityIds::default());
                let mut limits = Vec::new();
                let mut cursor = None;
                loop {
                    let page = self
                        .store
                        .query(RangeQuery::new(partition.clone()).starting_after(cursor.take()))
                        .await?;
                    for record in page.items {
                        limits.push(self.decode(channel, level, record)?);
                    }
                    match page.continuation {
                        Some(next) => cursor = Some(next),
                        None => break,
                    }
                }
                limits
            }
        };

        if limits.is_empty() {
            return Err(Error::not_found(format!(
                "limit {} {}",
                channel.to_lowercase(),
                level
            )));
        }
        Ok(limits)
    }

    /// Replace the thresholds of an existing limit.
    pub async fn update_limit(
        &self,
        channel: &str,
        level: AggregateLevel,
        ids: &EntityIds,
        thresholds: LimitThresholds,
    ) -> Result<Limit> {
        let key = limit_record_key(channel, level, ids)?;
        if self.store.get(&key).await?.is_none() {
            return Err(Error::not_found(format!("limit {}", key)));
        }
        self.store
            .put(Record::new(key.clone(), to_attributes(&thresholds)?))
            .await?;

        info!(partition = %key.partition_key, entity = %key.sort_key, "Limit updated");
        Ok(to_limit(channel, level, key.sort_key, thresholds))
    }

    pub async fn delete_limit(
        &self,
        channel: &str,
        level: AggregateLevel,
        ids: &EntityIds,
    ) -> Result<()> {
        let key = limit_record_key(channel, level, ids)?;
        self.store.delete(&key).await?;
        info!(partition = %key.partition_key, entity = %key.sort_key, "Limit deleted");
        Ok(())
    }

    fn decode(&self, channel: &str, level: AggregateLevel, record: Record) -> Result<Limit> {
        let thresholds: LimitThresholds = from_attributes(record.attributes)?;
        Ok(to_limit(channel, level, record.key.sort_key, thresholds))
    }
}

fn to_limit(
    channel: &str,
    level: AggregateLevel,
    entity_key: String,
    thresholds: LimitThresholds,
) -> Limit {
    Limit {
        channel: channel.to_lowercase(),
        level,
        entity_key,
        thresholds,
    }
}

/// Key of a limit, requiring every id below the account the level needs.
fn limit_record_key(channel: &str, level: AggregateLevel, ids: &EntityIds) -> Result<RecordKey> {
    require("channel", channel)?;
    if let Some(missing) = [
        HierarchyLevel::Processor,
        HierarchyLevel::Merchant,
        HierarchyLevel::Product,
    ]
    .into_iter()
    .find(|l| level.includes(*l) && ids.get(*l).is_none())
    {
        return Err(Error::invalid(format!(
            "{} id is required for a {} limit",
            missing, level
        )));
    }
    Ok(limit_key(channel, level, ids).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StorageError};
    use serde_json::json;

    fn thresholds() -> LimitThresholds {
        LimitThresholds::from_json(&json!({
            "AMOUNT": 500.0,
            "HOURLY_SUM": 1000.0,
            "DAILY_SUM": 5000.0,
            "WEEKLY_SUM": 20000.0,
            "MONTHLY_SUM": 50000.0,
            "HOURLY_COUNT": 5,
            "DAILY_COUNT": 20,
            "WEEKLY_COUNT": 100,
            "MONTHLY_COUNT": 300
        }))
        .unwrap()
    }

    fn service() -> (Arc<MemoryStore>, LimitService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), LimitService::new(store))
    }

    fn merchant_ids() -> EntityIds {
        EntityIds::account("A1").with_processor("P1").with_merchant("M1")
    }

    #[test]
    fn test_thresholds_name_missing_attributes() {
        let err = LimitThresholds::from_json(&json!({ "AMOUNT": 1, "DAILY_SUM": 2 })).unwrap_err();
        match err {
            Error::InvalidArgument(message) => {
                assert!(message.contains("HOURLY_SUM"));
                assert!(message.contains("MONTHLY_COUNT"));
                assert!(!message.starts_with("missing required attributes AMOUNT"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_account_limit_uses_dash_key() {
        let (store, limits) = service();
        let limit = limits
            .create_limit("WEB", AggregateLevel::Account, &EntityIds::account("A1"), thresholds())
            .await
            .unwrap();
        assert_eq!(limit.entity_key, "-");

        let record = store
            .get(&RecordKey::new("LIMITS-web-ACCOUNT", "-"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.get("HOURLY_COUNT"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let (_, limits) = service();
        limits
            .create_limit("web", AggregateLevel::AccountProcessorMerchant, &merchant_ids(), thresholds())
            .await
            .unwrap();
        let err = limits
            .create_limit("web", AggregateLevel::AccountProcessorMerchant, &merchant_ids(), thresholds())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::ConflictExists(_))));
    }

    #[tokio::test]
    async fn test_create_requires_level_ids() {
        let (_, limits) = service();
        let err = limits
            .create_limit(
                "web",
                AggregateLevel::AccountProcessorMerchantProduct,
                &merchant_ids(),
                thresholds(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_read_single_and_partition() {
        let (_, limits) = service();
        let level = AggregateLevel::AccountProcessorMerchant;
        limits.create_limit("web", level, &merchant_ids(), thresholds()).await.unwrap();
        limits
            .create_limit(
                "web",
                level,
                &EntityIds::account("A1").with_processor("P1").with_merchant("M2"),
                thresholds(),
            )
            .await
            .unwrap();

        let single = limits.read_limit("web", level, Some(&merchant_ids())).await.unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].entity_key, "P1__M1");

        let all = limits.read_limit("web", level, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let err = limits.read_limit("pos", level, None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (_, limits) = service();
        let level = AggregateLevel::AccountProcessor;
        let ids = EntityIds::account("A1").with_processor("P1");

        let err = limits.update_limit("web", level, &ids, thresholds()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        limits.create_limit("web", level, &ids, thresholds()).await.unwrap();
        let raised = LimitThresholds {
            amount: 900.0,
            ..thresholds()
        };
        let updated = limits.update_limit("web", level, &ids, raised).await.unwrap();
        assert_eq!(updated.thresholds.amount, 900.0);

        limits.delete_limit("web", level, &ids).await.unwrap();
        assert!(limits.read_limit("web", level, Some(&ids)).await.is_err());
    }
}
