//! Single-table key codec.
//!
//! Every record lives in one table addressed by `(partition_key, sort_key)`.
//! This module owns the string conventions for those keys:
//!
//! - entity hierarchy joins (`processor__merchant__product`)
//! - list-membership keys (`BLACKLIST-web-MERCHANT` / `P1__M1`)
//! - aggregate time-bucket keys (`AGGREGATION-web-ACCOUNT-A1-DAY-2024-01-15`)
//! - evaluated-transaction time-range keys (`EVALUATED` / `1700000000_<uuid>`)
//! - fixed partitions for cases, investigators, limits and merchants
//!
//! All functions are pure. Malformed input fails with [`KeyError::MalformedKey`],
//! which callers surface as a client error.

mod aggregate;
mod evaluated;
mod hierarchy;
mod list;
mod record;

pub use aggregate::{
    build_aggregate_key, categorize_aggregate_key, parse_aggregate_key, AggregateKey,
    AggregateLevel, Granularity, AGGREGATION_PREFIX,
};
pub use evaluated::{
    evaluated_sort_key, time_range_sort_bounds, EvaluatedScope, EVALUATED_PREFIX,
    TIMESTAMP_WIDTH,
};
pub use hierarchy::{build_hierarchy_key, split_hierarchy_key, EntityIds, HierarchyLevel};
pub use list::{build_list_partition_key, list_sort_key, ListType};
pub use record::{
    case_key, case_report_key, case_report_prefix, closed_case_key, investigator_key,
    limit_key, merchant_info_key, merchant_product_key, CASE_PARTITION, CASE_REPORT_PARTITION,
    CLOSED_CASE_PARTITION, INVESTIGATOR_PARTITION, LIMITS_PREFIX, MERCHANT_INFO_PARTITION,
};

use thiserror::Error;

/// Delimiter joining hierarchy identifiers inside a single key segment.
pub const HIERARCHY_DELIMITER: &str = "__";

/// Errors raised while building or parsing keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Malformed key '{key}': {reason}")]
    MalformedKey { key: String, reason: String },
}

impl KeyError {
    pub(crate) fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        KeyError::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KeyError>;
