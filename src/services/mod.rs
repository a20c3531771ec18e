//! Domain services over the single-table store.
//!
//! Each service owns an `Arc<dyn RecordStore>`; paged services also hold a
//! `Paginator` and their `PaginationConfig`. Nothing is cached across calls.

pub mod cases;
pub mod evaluated;
pub mod investigators;
pub mod limits;
pub mod lists;
pub mod merchants;
pub mod summary;

pub use cases::{Case, CaseFilter, CaseReport, CaseService, CaseStatus, NewCase, NewReport, ReportChanges};
pub use evaluated::{
    AggregateEntry, EvaluatedQuery, EvaluatedTransaction, EvaluatedTransactionService,
    MetadataCache, ProcessedTransaction, QueryKind,
};
pub use investigators::{Investigator, InvestigatorService};
pub use limits::{Limit, LimitService, LimitThresholds, LIMIT_ATTRIBUTES};
pub use lists::{ListMember, ListScope, ListService};
pub use merchants::{MerchantProductMeta, MerchantService, MAX_MERCHANT_BATCH};
pub use summary::{Summary, SummaryBucket, SummaryService};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PaginationConfig;
use crate::pagination::PageRequest;
use crate::storage::{Attributes, SortCondition, StorageError};

/// Client-supplied paging parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<usize>,
    pub pagination_token: Option<String>,
}

impl PageParams {
    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.pagination_token = token;
        self
    }

    pub(crate) fn request(
        &self,
        partition_key: impl Into<String>,
        condition: SortCondition,
        config: &PaginationConfig,
        overfetch_factor: usize,
    ) -> PageRequest {
        PageRequest::new(partition_key, condition)
            .with_page(self.page.unwrap_or(1))
            .with_per_page(config.clamp_per_page(self.per_page))
            .with_token(self.pagination_token.clone())
            .with_overfetch_factor(overfetch_factor)
    }
}

/// Serialize `value` into record attributes, dropping nulls.
pub(crate) fn to_attributes<T: Serialize>(value: &T) -> Result<Attributes, StorageError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => Err(StorageError::Serialization(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Deserialize record attributes into `T`.
pub(crate) fn from_attributes<T: serde::de::DeserializeOwned>(
    attributes: Attributes,
) -> Result<T, StorageError> {
    Ok(serde_json::from_value(Value::Object(attributes))?)
}

/// Require a non-empty string argument.
pub(crate) fn require(name: &str, value: &str) -> crate::error::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::error::Error::invalid(format!("{} is required", name)));
    }
    Ok(())
}
