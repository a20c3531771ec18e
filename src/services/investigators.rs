//! Investigator records under the `INVESTIGATOR` partition.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{from_attributes, require, to_attributes};
use crate::error::{Error, Result};
use crate::keys::{investigator_key, INVESTIGATOR_PARTITION};
use crate::storage::{Attributes, RangeQuery, Record, RecordStore};
use crate::utils::time::now_rfc3339;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investigator {
    #[serde(skip_deserializing)]
    pub investigator_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Investigator {
    fn from_record(record: Record) -> Result<Self> {
        let mut investigator: Investigator = from_attributes(record.attributes)?;
        investigator.investigator_id = record.key.sort_key;
        Ok(investigator)
    }
}

pub struct InvestigatorService {
    store: Arc<dyn RecordStore>,
}

impl InvestigatorService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Register an investigator under a fresh v4 id.
    pub async fn create(&self, name: &str) -> Result<Investigator> {
        require("name", name)?;
        let investigator = Investigator {
            investigator_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Some(now_rfc3339()),
            updated_at: None,
        };

        let mut attributes = to_attributes(&investigator)?;
        attributes.remove("investigator_id");
        self.store
            .put(Record::new(
                investigator_key(&investigator.investigator_id),
                attributes,
            ))
            .await?;

        info!(investigator_id = %investigator.investigator_id, "Investigator created");
        Ok(investigator)
    }

    pub async fn get(&self, investigator_id: &str) -> Result<Investigator> {
        require("investigator_id", investigator_id)?;
        self.store
            .get(&investigator_key(investigator_id).into())
            .await?
            .map(Investigator::from_record)
            .unwrap_or_else(|| Err(Error::not_found(format!("investigator {}", investigator_id))))
    }

    /// Every investigator, draining the whole partition.
    pub async fn list(&self) -> Result<Vec<Investigator>> {
        let mut investigators = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .store
                .query(RangeQuery::new(INVESTIGATOR_PARTITION).starting_after(cursor.take()))
                .await?;
            for record in page.items {
                investigators.push(Investigator::from_record(record)?);
            }
            match page.continuation {
                Some(next) => cursor = Some(next),
                None => return Ok(investigators),
            }
        }
    }

    pub async fn rename(&self, investigator_id: &str, name: &str) -> Result<Investigator> {
        require("name", name)?;
        self.get(investigator_id).await?;

        let mut changes = Attributes::new();
        changes.insert("name".to_string(), json!(name));
        changes.insert("updated_at".to_string(), json!(now_rfc3339()));
        let record = self
            .store
            .update(&investigator_key(investigator_id).into(), changes)
            .await?;
        Investigator::from_record(record)
    }

    /// Remove an investigator. Deleting an unknown id is a no-op.
    pub async fn delete(&self, investigator_id: &str) -> Result<()> {
        require("investigator_id", investigator_id)?;
        self.store
            .delete(&investigator_key(investigator_id).into())
            .await?;
        info!(investigator_id = %investigator_id, "Investigator deleted");
        Ok(())
    }
}
