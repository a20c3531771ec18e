//! Cursor paginator over a single partition.
//!
//! Pages are served newest-first (descending sort key). The paginator looks
//! one accepted record past the page so it only hands out a token when a
//! further page really exists, and the token resumes right after the last
//! record served, never after the last record read.

use std::sync::Arc;

use tracing::{debug, warn};

use super::token::{PageToken, TokenError};
use crate::config::{DEFAULT_MAX_PER_PAGE, DEFAULT_OVERFETCH_FACTOR, DEFAULT_PER_PAGE};
use crate::error::Result;
use crate::storage::{RangeQuery, Record, RecordKey, RecordStore, SortCondition};

/// Post-query predicate over raw records.
pub type RecordFilter<'a> = &'a (dyn Fn(&Record) -> bool + Send + Sync);

/// What to page over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub partition_key: String,
    pub condition: SortCondition,
    /// Requested page; superseded by the token's page when a token is given.
    pub page: u32,
    /// Requested page size; superseded by the token's page size.
    pub per_page: usize,
    pub token: Option<String>,
    /// Raw records fetched per store query, as a multiple of `per_page`.
    pub overfetch_factor: usize,
}

impl PageRequest {
    pub fn new(partition_key: impl Into<String>, condition: SortCondition) -> Self {
        Self {
            partition_key: partition_key.into(),
            condition,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            token: None,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_overfetch_factor(mut self, factor: usize) -> Self {
        self.overfetch_factor = factor;
        self
    }
}

/// One page of accepted records plus the state needed to format it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub items: Vec<Record>,
    pub next_token: Option<String>,
    pub current_page: u32,
    pub per_page: usize,
    pub total_records: Option<u64>,
}

/// Where a fetch resumes and which metadata it carries forward.
struct Resume {
    start: Option<RecordKey>,
    page: u32,
    per_page: usize,
    total_records: Option<u64>,
    /// Accepted records to pass over before filling (page > 1 without token).
    skip: usize,
}

pub struct Paginator {
    store: Arc<dyn RecordStore>,
    default_per_page: usize,
    max_per_page: usize,
}

impl Paginator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: DEFAULT_MAX_PER_PAGE,
        }
    }

    /// Page size assumed for tokens that do not carry one.
    pub fn with_default_per_page(mut self, per_page: usize) -> Self {
        self.default_per_page = per_page.max(1);
        self
    }

    /// Largest page size served, whether requested or carried by a token.
    pub fn with_max_per_page(mut self, per_page: usize) -> Self {
        self.max_per_page = per_page.max(1);
        self
    }

    /// Fetch a page keeping only records accepted by `filter`.
    pub async fn fetch_page<F>(&self, request: &PageRequest, filter: F) -> Result<FetchedPage>
    where
        F: Fn(&Record) -> bool + Send + Sync,
    {
        let filter: RecordFilter<'_> = &filter;
        self.fetch(request, Some(filter)).await
    }

    /// Fetch a page of every record in range.
    pub async fn fetch_unfiltered(&self, request: &PageRequest) -> Result<FetchedPage> {
        self.fetch(request, None).await
    }

    async fn fetch(
        &self,
        request: &PageRequest,
        filter: Option<RecordFilter<'_>>,
    ) -> Result<FetchedPage> {
        let resume = self.resume_point(request)?;

        let total_records = if request.token.is_none() && resume.page == 1 {
            self.count_total(request, filter).await
        } else {
            resume.total_records
        };

        let per_page = resume.per_page;
        let batch_size = per_page.saturating_mul(request.overfetch_factor.max(1));
        let mut skip = resume.skip;
        let mut cursor = resume.start;
        let mut accepted: Vec<Record> = Vec::new();

        // Collect one record past the page to learn whether another page exists.
        'fill: loop {
            let batch = self
                .store
                .query(
                    RangeQuery::new(request.partition_key.clone())
                        .with_condition(request.condition.clone())
                        .descending()
                        .with_limit(batch_size)
                        .starting_after(cursor.take()),
                )
                .await?;

            debug!(
                partition = %request.partition_key,
                raw = batch.items.len(),
                accepted = accepted.len(),
                "Fetched raw batch"
            );

            for item in batch.items {
                if !filter.map_or(true, |f| f(&item)) {
                    continue;
                }
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                accepted.push(item);
                if accepted.len() > per_page {
                    break 'fill;
                }
            }

            match batch.continuation {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let has_more = accepted.len() > per_page;
        accepted.truncate(per_page);

        // Page numbers stop at u32::MAX; that page is served as the last one.
        let next_page = resume.page.checked_add(1).filter(|_| has_more);
        let next_token = match (accepted.last(), next_page) {
            (Some(last), Some(next_page)) => Some(
                PageToken {
                    dynamodb_key: last.key.clone(),
                    next_page,
                    total_records,
                    per_page,
                }
                .encode()?,
            ),
            _ => None,
        };

        Ok(FetchedPage {
            items: accepted,
            next_token,
            current_page: resume.page,
            per_page,
            total_records,
        })
    }

    fn resume_point(&self, request: &PageRequest) -> Result<Resume> {
        match &request.token {
            Some(raw) => {
                let token = PageToken::decode(raw, self.default_per_page, self.max_per_page)?;
                if token.dynamodb_key.partition_key != request.partition_key {
                    return Err(TokenError::InvalidToken(format!(
                        "token belongs to partition {}",
                        token.dynamodb_key.partition_key
                    ))
                    .into());
                }
                Ok(Resume {
                    start: Some(token.dynamodb_key),
                    page: token.next_page,
                    per_page: token.per_page,
                    total_records: token.total_records,
                    skip: 0,
                })
            }
            None => {
                let page = request.page.max(1);
                let per_page = request.per_page.clamp(1, self.max_per_page);
                Ok(Resume {
                    start: None,
                    page,
                    per_page,
                    total_records: None,
                    skip: (page as usize - 1).saturating_mul(per_page),
                })
            }
        }
    }

    /// Count accepted records over the full range; `None` if the pass fails.
    async fn count_total(
        &self,
        request: &PageRequest,
        filter: Option<RecordFilter<'_>>,
    ) -> Option<u64> {
        let result = match filter {
            None => {
                self.store
                    .count(&request.partition_key, request.condition.clone())
                    .await
            }
            Some(filter) => self.count_filtered(request, filter).await,
        };

        match result {
            Ok(total) => Some(total),
            Err(e) => {
                warn!(
                    partition = %request.partition_key,
                    error = %e,
                    "Total count failed; reporting unknown total"
                );
                None
            }
        }
    }

    async fn count_filtered(
        &self,
        request: &PageRequest,
        filter: RecordFilter<'_>,
    ) -> crate::storage::Result<u64> {
        let mut total = 0u64;
        let mut cursor = None;
        loop {
            let batch = self
                .store
                .query(
                    RangeQuery::new(request.partition_key.clone())
                        .with_condition(request.condition.clone())
                        .starting_after(cursor.take()),
                )
                .await?;
            total += batch.items.iter().filter(|item| filter(item)).count() as u64;
            match batch.continuation {
                Some(next) => cursor = Some(next),
                None => return Ok(total),
            }
        }
    }
}
