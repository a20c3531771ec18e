//! Evaluated-transaction lookups.
//!
//! Every evaluated transaction is written to the `EVALUATED` partition and to
//! one partition per entity and per list or rule that fired. Queries read one
//! of those partitions over a date range, newest first, and reshape each
//! record for display.

mod reshape;

pub use reshape::{
    group_aggregates, rename_application_keys, AggregateEntry, OriginalTransaction,
    ProcessedTransaction, PROCESSED_TRANSACTION_ATTRIBUTE,
};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::merchants::{lookup_metadata, MerchantProductMeta};
use super::PageParams;
use crate::config::PaginationConfig;
use crate::error::{Error, Result};
use crate::keys::{case_key, time_range_sort_bounds, EntityIds, EvaluatedScope, HierarchyLevel};
use crate::pagination::{format_page, FetchedPage, PageEnvelope, Paginator};
use crate::storage::{RangeQuery, Record, RecordStore, SortCondition};
use crate::utils::time::date_range;

/// Which evaluated transactions to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Every evaluated transaction.
    All,
    /// Transactions with an empty evaluation.
    Normal,
    /// Transactions with at least one evaluation result.
    Affected,
    Account { account_ref: String },
    Processor { processor: String },
    Merchant { processor: String, merchant_id: String },
    Product {
        processor: String,
        merchant_id: String,
        product_id: String,
    },
    /// Hits of one list or rule: `blacklist`, `watchlist`, `stafflist`,
    /// `limit` or any other rule name.
    List(String),
    /// Hits of a list whose transaction carries an id at `level`.
    EntityList { list_type: String, level: HierarchyLevel },
}

/// A date-ranged, paged evaluated-transaction query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedQuery {
    pub kind: QueryKind,
    /// `YYYY-MM-DD`, UTC.
    pub start_date: String,
    /// `YYYY-MM-DD`, UTC, inclusive through 23:59:59.
    pub end_date: String,
    pub channel: Option<String>,
    pub page: PageParams,
}

impl EvaluatedQuery {
    pub fn new(kind: QueryKind, start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            kind,
            start_date: start_date.into(),
            end_date: end_date.into(),
            channel: None,
            page: PageParams::default(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into()).filter(|c| !c.is_empty());
        self
    }

    pub fn with_page(mut self, page: PageParams) -> Self {
        self.page = page;
        self
    }

    fn scope(&self) -> Result<EvaluatedScope> {
        let entity = |level: HierarchyLevel, ids: EntityIds| -> Result<EvaluatedScope> {
            let channel = self
                .channel
                .clone()
                .ok_or_else(|| Error::invalid("channel is required for entity queries"))?;
            Ok(EvaluatedScope::entity(channel, level, ids)?)
        };

        match &self.kind {
            QueryKind::All | QueryKind::Normal | QueryKind::Affected => Ok(EvaluatedScope::All),
            QueryKind::Account { account_ref } => {
                entity(HierarchyLevel::Account, EntityIds::account(account_ref.as_str()))
            }
            QueryKind::Processor { processor } => entity(
                HierarchyLevel::Processor,
                EntityIds::default().with_processor(processor.as_str()),
            ),
            QueryKind::Merchant { processor, merchant_id } => entity(
                HierarchyLevel::Merchant,
                EntityIds::default()
                    .with_processor(processor.as_str())
                    .with_merchant(merchant_id.as_str()),
            ),
            QueryKind::Product {
                processor,
                merchant_id,
                product_id,
            } => entity(
                HierarchyLevel::Product,
                EntityIds::default()
                    .with_processor(processor.as_str())
                    .with_merchant(merchant_id.as_str())
                    .with_product(product_id.as_str()),
            ),
            QueryKind::List(name) | QueryKind::EntityList { list_type: name, .. } => {
                if name.is_empty() {
                    return Err(Error::invalid("list type is required"));
                }
                Ok(EvaluatedScope::list(name))
            }
        }
    }

    /// Post-query criteria, or `None` when every record in range matches.
    fn criteria(&self) -> Option<Criteria> {
        let channel = match self.kind {
            // The entity partitions are already per channel.
            QueryKind::Account { .. }
            | QueryKind::Processor { .. }
            | QueryKind::Merchant { .. }
            | QueryKind::Product { .. } => None,
            _ => self.channel.clone(),
        };
        let outcome = match &self.kind {
            QueryKind::Normal => Outcome::Normal,
            QueryKind::Affected => Outcome::Affected,
            _ => Outcome::Any,
        };
        let entity = match &self.kind {
            QueryKind::EntityList { level, .. } => Some(*level),
            _ => None,
        };

        if channel.is_none() && outcome == Outcome::Any && entity.is_none() {
            return None;
        }
        Some(Criteria {
            channel,
            outcome,
            entity,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Any,
    Normal,
    Affected,
}

#[derive(Debug, Clone)]
struct Criteria {
    channel: Option<String>,
    outcome: Outcome,
    entity: Option<HierarchyLevel>,
}

impl Criteria {
    fn accepts(&self, record: &Record) -> bool {
        let processed = match ProcessedTransaction::from_record(record) {
            Ok(processed) => processed,
            Err(e) => {
                warn!(key = %record.key, error = %e, "Skipping undecodable evaluated record");
                return false;
            }
        };
        let txn = &processed.original_transaction;

        if let Some(channel) = &self.channel {
            if &txn.channel != channel {
                return false;
            }
        }
        if let Some(level) = self.entity {
            if txn.entity_id(level).is_none() {
                return false;
            }
        }
        match self.outcome {
            Outcome::Any => true,
            Outcome::Normal => processed.is_normal(),
            Outcome::Affected => !processed.is_normal(),
        }
    }
}

/// Display form of an evaluated transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedTransaction {
    pub account_ref: String,
    pub processor: String,
    pub merchant_id: String,
    pub product_id: String,
    pub transaction_id: String,
    pub date: Value,
    pub amount: Value,
    pub currency: String,
    pub country: String,
    pub channel: String,
    pub merchant_name: String,
    pub product_name: String,
    pub merchant_product_name: String,
    pub evaluation: Value,
    /// Assignee of the transaction's open case, if any.
    pub assigned_to: Option<Value>,
    pub relevant_aggregates: BTreeMap<String, Vec<AggregateEntry>>,
}

/// Merchant/product names resolved during one page fill.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: HashMap<(String, String), MerchantProductMeta>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(
        &mut self,
        store: &dyn RecordStore,
        merchant_id: &str,
        product_id: &str,
    ) -> MerchantProductMeta {
        let key = (merchant_id.to_string(), product_id.to_string());
        if let Some(hit) = self.entries.get(&key) {
            return hit.clone();
        }
        let meta = lookup_metadata(store, merchant_id, product_id).await;
        self.entries.insert(key, meta.clone());
        meta
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct EvaluatedTransactionService {
    store: Arc<dyn RecordStore>,
    paginator: Paginator,
    pagination: PaginationConfig,
}

impl EvaluatedTransactionService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_pagination(store, PaginationConfig::default())
    }

    pub fn with_pagination(store: Arc<dyn RecordStore>, pagination: PaginationConfig) -> Self {
        Self {
            paginator: Paginator::new(store.clone())
                .with_default_per_page(pagination.default_per_page)
                .with_max_per_page(pagination.max_per_page),
            store,
            pagination,
        }
    }

    /// One page of evaluated transactions for `query`.
    pub async fn query(&self, query: &EvaluatedQuery) -> Result<PageEnvelope<EvaluatedTransaction>> {
        let (start, end) = date_range(&query.start_date, &query.end_date)?;
        let (lower, upper) = time_range_sort_bounds(start, end)?;
        let scope = query.scope()?;

        let overfetch = match query.kind {
            QueryKind::EntityList { .. } => self.pagination.entity_list_overfetch_factor,
            _ => self.pagination.overfetch_factor,
        };
        let request = query.page.request(
            scope.partition_key(),
            SortCondition::Between(lower, upper),
            &self.pagination,
            overfetch,
        );
        debug!(partition = %request.partition_key, kind = ?query.kind, "Evaluated query");

        let page = match query.criteria() {
            Some(criteria) => {
                self.paginator
                    .fetch_page(&request, move |record: &Record| criteria.accepts(record))
                    .await?
            }
            None => self.paginator.fetch_unfiltered(&request).await?,
        };

        let FetchedPage {
            items,
            next_token,
            current_page,
            per_page,
            total_records,
        } = page;
        let data = self.reshape_all(items).await?;
        Ok(format_page(data, current_page, per_page, next_token, total_records))
    }

    /// Evaluated records stored under exactly `transaction_id` in `EVALUATED`.
    pub async fn get_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<PageEnvelope<EvaluatedTransaction>> {
        super::require("transaction_id", transaction_id)?;
        let page = self
            .store
            .query(
                RangeQuery::new(EvaluatedScope::All.partition_key())
                    .with_condition(SortCondition::Equals(transaction_id.to_string())),
            )
            .await?;

        let data = self.reshape_all(page.items).await?;
        let total = data.len() as u64;
        Ok(format_page(
            data,
            1,
            self.pagination.default_per_page,
            None,
            Some(total),
        ))
    }

    async fn reshape_all(&self, records: Vec<Record>) -> Result<Vec<EvaluatedTransaction>> {
        let mut cache = MetadataCache::new();
        let mut reshaped = Vec::with_capacity(records.len());
        for record in records {
            reshaped.push(self.reshape(&record, &mut cache).await?);
        }
        debug!(records = reshaped.len(), merchants = cache.len(), "Reshaped page");
        Ok(reshaped)
    }

    async fn reshape(
        &self,
        record: &Record,
        cache: &mut MetadataCache,
    ) -> Result<EvaluatedTransaction> {
        let processed = ProcessedTransaction::from_record(record)?;
        let txn = &processed.original_transaction;

        let meta = cache
            .resolve(self.store.as_ref(), &txn.merchant_id, &txn.product_id)
            .await;
        let assigned_to = self.assignee(&txn.transaction_id).await;

        Ok(EvaluatedTransaction {
            account_ref: txn.account_id.clone(),
            processor: txn.application_id.clone(),
            merchant_id: txn.merchant_id.clone(),
            product_id: txn.product_id.clone(),
            transaction_id: txn.transaction_id.clone(),
            date: txn.date.clone(),
            amount: txn.amount.clone(),
            currency: txn.currency.clone(),
            country: txn.country.clone(),
            channel: txn.channel.clone(),
            merchant_name: meta.merchant_name,
            product_name: meta.product_name,
            merchant_product_name: meta.merchant_product_name,
            evaluation: rename_application_keys(&processed.evaluation),
            assigned_to,
            relevant_aggregates: group_aggregates(&processed.aggregates, txn),
        })
    }

    /// Assignee on the transaction's open case; lookup failures read as unassigned.
    async fn assignee(&self, transaction_id: &str) -> Option<Value> {
        if transaction_id.is_empty() {
            return None;
        }
        match self.store.get(&case_key(transaction_id).into()).await {
            Ok(record) => record.and_then(|r| r.get("assigned_to").cloned()),
            Err(e) => {
                warn!(transaction_id = %transaction_id, error = %e, "Case lookup failed");
                None
            }
        }
    }
}
