//! Transaction totals per list over a date range.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::evaluated::ProcessedTransaction;
use crate::error::Result;
use crate::keys::{time_range_sort_bounds, EvaluatedScope};
use crate::storage::{RangeQuery, Record, RecordStore, SortCondition};
use crate::utils::time::date_range;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SummaryBucket {
    pub count: u64,
    pub sum: f64,
}

impl SummaryBucket {
    fn add(&mut self, amount: f64) {
        self.count += 1;
        self.sum += amount;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    pub blacklist: SummaryBucket,
    pub watchlist: SummaryBucket,
    pub stafflist: SummaryBucket,
    pub limits: SummaryBucket,
    /// Transactions no list or rule fired on.
    pub normal: SummaryBucket,
}

pub struct SummaryService {
    store: Arc<dyn RecordStore>,
}

impl SummaryService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Count and amount totals from `start_date` through `end_date` (UTC).
    pub async fn summarize(&self, start_date: &str, end_date: &str) -> Result<Summary> {
        let (start, end) = date_range(start_date, end_date)?;
        let (lower, upper) = time_range_sort_bounds(start, end)?;
        let range = SortCondition::Between(lower, upper);

        let mut summary = Summary::default();
        let lists: [(&str, &mut SummaryBucket); 4] = [
            ("blacklist", &mut summary.blacklist),
            ("watchlist", &mut summary.watchlist),
            ("stafflist", &mut summary.stafflist),
            ("limit", &mut summary.limits),
        ];
        for (name, bucket) in lists {
            let partition = EvaluatedScope::list(name).partition_key();
            self.drain(&partition, &range, |processed| {
                bucket.add(processed.original_transaction.amount_value())
            })
            .await?;
        }

        let normal = &mut summary.normal;
        self.drain(&EvaluatedScope::All.partition_key(), &range, |processed| {
            if processed.is_normal() {
                normal.add(processed.original_transaction.amount_value());
            }
        })
        .await?;

        info!(
            start_date = %start_date,
            end_date = %end_date,
            normal = summary.normal.count,
            "Transaction summary computed"
        );
        Ok(summary)
    }

    /// Visit every decodable record of a partition range, page by page.
    async fn drain(
        &self,
        partition: &str,
        range: &SortCondition,
        mut visit: impl FnMut(&ProcessedTransaction),
    ) -> Result<()> {
        let mut cursor = None;
        loop {
            let page = self
                .store
                .query(
                    RangeQuery::new(partition)
                        .with_condition(range.clone())
                        .starting_after(cursor.take()),
                )
                .await?;
            for record in &page.items {
                if let Some(processed) = decode(record) {
                    visit(&processed);
                }
            }
            match page.continuation {
                Some(next) => cursor = Some(next),
                None => return Ok(()),
            }
        }
    }
}

fn decode(record: &Record) -> Option<ProcessedTransaction> {
    ProcessedTransaction::from_record(record)
        .map_err(|e| warn!(key = %record.key, error = %e, "Skipping undecodable evaluated record"))
        .ok()
}
