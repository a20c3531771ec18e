//! Fixed-partition keys for cases, investigators, limits and merchants.

use super::{AggregateLevel, EntityIds, HierarchyLevel};

pub const CASE_PARTITION: &str = "CASE";
pub const CLOSED_CASE_PARTITION: &str = "CLOSED_CASE";
pub const CASE_REPORT_PARTITION: &str = "CASE_REPORT";
pub const INVESTIGATOR_PARTITION: &str = "INVESTIGATOR";
pub const MERCHANT_INFO_PARTITION: &str = "MERCHANT_INFO";
pub const LIMITS_PREFIX: &str = "LIMITS";

/// Sort key used by account-level limits, which have no hierarchy ids.
const ACCOUNT_LIMIT_SORT_KEY: &str = "-";

/// Key of an open case.
pub fn case_key(transaction_id: &str) -> (String, String) {
    (CASE_PARTITION.to_string(), transaction_id.to_string())
}

/// Key of a closed case.
pub fn closed_case_key(transaction_id: &str) -> (String, String) {
    (CLOSED_CASE_PARTITION.to_string(), transaction_id.to_string())
}

/// Key of a single case report: `CASE_REPORT/{transaction_id}#{report_id}`.
pub fn case_report_key(transaction_id: &str, report_id: &str) -> (String, String) {
    (
        CASE_REPORT_PARTITION.to_string(),
        format!("{}#{}", transaction_id, report_id),
    )
}

/// Sort-key prefix matching every report of one transaction.
pub fn case_report_prefix(transaction_id: &str) -> String {
    format!("{}#", transaction_id)
}

pub fn investigator_key(investigator_id: &str) -> (String, String) {
    (INVESTIGATOR_PARTITION.to_string(), investigator_id.to_string())
}

/// Limit key: `LIMITS-{channel}-{LEVEL}` with `-` or the hierarchy key.
///
/// Account limits are per channel and share the `-` sort key; every deeper
/// level keys on the processor-rooted hierarchy join.
pub fn limit_key(channel: &str, level: AggregateLevel, ids: &EntityIds) -> (String, String) {
    let partition = format!(
        "{}-{}-{}",
        LIMITS_PREFIX,
        channel.to_lowercase(),
        level.key_segment()
    );
    let sort = match level {
        AggregateLevel::Account => ACCOUNT_LIMIT_SORT_KEY.to_string(),
        _ => ids.hierarchy_key(),
    };
    (partition, sort)
}

pub fn merchant_info_key(merchant_id: &str) -> (String, String) {
    (MERCHANT_INFO_PARTITION.to_string(), merchant_id.to_string())
}

/// Key of a merchant product: `MERCHANT_PRODUCT#{m}` / `PRODUCT#{p}`.
pub fn merchant_product_key(merchant_id: &str, product_id: &str) -> (String, String) {
    (
        format!("MERCHANT_PRODUCT#{}", merchant_id),
        format!("{}#{}", HierarchyLevel::Product.as_str(), product_id),
    )
}
