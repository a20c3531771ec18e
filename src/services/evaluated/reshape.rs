//! Decoding and reshaping of evaluated-transaction records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::keys::{parse_aggregate_key, AggregateKey, HierarchyLevel};
use crate::storage::{Record, StorageError};

/// Attribute holding the JSON-encoded evaluation payload.
pub const PROCESSED_TRANSACTION_ATTRIBUTE: &str = "processed_transaction";

/// The `processed_transaction` payload written by the evaluator.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProcessedTransaction {
    pub original_transaction: OriginalTransaction,
    #[serde(default)]
    pub evaluation: Value,
    #[serde(default)]
    pub aggregates: Value,
}

impl ProcessedTransaction {
    /// Decode from a record; the payload may be a JSON string or an object.
    pub fn from_record(record: &Record) -> Result<Self, StorageError> {
        match record.get(PROCESSED_TRANSACTION_ATTRIBUTE) {
            Some(Value::String(raw)) => Ok(serde_json::from_str(raw)?),
            Some(value @ Value::Object(_)) => Ok(serde_json::from_value(value.clone())?),
            _ => Err(StorageError::Serialization(format!(
                "record {} has no {}",
                record.key, PROCESSED_TRANSACTION_ATTRIBUTE
            ))),
        }
    }

    /// No rule or list fired for this transaction.
    pub fn is_normal(&self) -> bool {
        match &self.evaluation {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OriginalTransaction {
    pub account_id: String,
    #[serde(alias = "processor")]
    pub application_id: String,
    pub merchant_id: String,
    pub product_id: String,
    pub transaction_id: String,
    pub date: Value,
    pub amount: Value,
    pub currency: String,
    pub country: String,
    pub channel: String,
}

impl OriginalTransaction {
    /// Id of the transaction's entity at `level`, if non-empty.
    pub fn entity_id(&self, level: HierarchyLevel) -> Option<&str> {
        let id = match level {
            HierarchyLevel::Account => &self.account_id,
            HierarchyLevel::Processor => &self.application_id,
            HierarchyLevel::Merchant => &self.merchant_id,
            HierarchyLevel::Product => &self.product_id,
        };
        (!id.is_empty()).then_some(id.as_str())
    }

    /// Amount as a float; numeric strings are accepted, anything else is 0.
    pub fn amount_value(&self) -> f64 {
        match &self.amount {
            Value::Number(n) => n.as_f64().unwrap_or_default(),
            Value::String(s) => s.trim().parse().unwrap_or_default(),
            _ => 0.0,
        }
    }
}

/// One aggregate counter, flattened with the key fields it was filed under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateEntry {
    #[serde(rename = "COUNT")]
    pub count: Value,
    #[serde(rename = "VERSION")]
    pub version: Value,
    #[serde(rename = "SUM")]
    pub sum: Value,
    pub account_ref: String,
    pub processor: String,
    pub merchant_id: String,
    pub product_id: String,
    pub channel: String,
    pub period: String,
    pub year: String,
    pub month: String,
    pub week: String,
    pub day: String,
    pub hour: String,
}

/// Evaluation with every `application` in its keys renamed to `processor`.
pub fn rename_application_keys(evaluation: &Value) -> Value {
    match evaluation {
        Value::Null => Value::Object(Map::new()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.replace("application", "processor"), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Group aggregate counters by hierarchy level.
///
/// Entity ids come from the transaction and are blanked below the level's
/// depth. Keys that do not parse are logged and skipped.
pub fn group_aggregates(
    aggregates: &Value,
    transaction: &OriginalTransaction,
) -> BTreeMap<String, Vec<AggregateEntry>> {
    let mut grouped: BTreeMap<String, Vec<AggregateEntry>> = BTreeMap::new();
    let Some(aggregates) = aggregates.as_object() else {
        return grouped;
    };

    for (key, counters) in aggregates {
        let parsed = match parse_aggregate_key(key) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    transaction_id = %transaction.transaction_id,
                    error = %e,
                    "Skipping malformed aggregate key"
                );
                continue;
            }
        };
        grouped
            .entry(parsed.level.as_str().to_string())
            .or_default()
            .push(aggregate_entry(&parsed, counters, transaction));
    }
    grouped
}

fn aggregate_entry(
    parsed: &AggregateKey,
    counters: &Value,
    transaction: &OriginalTransaction,
) -> AggregateEntry {
    let counter = |name: &str| counters.get(name).cloned().unwrap_or(Value::Null);
    let id_at = |level: HierarchyLevel| {
        if parsed.level.includes(level) {
            transaction.entity_id(level).unwrap_or_default().to_string()
        } else {
            String::new()
        }
    };
    let two_digits = |part: Option<u32>| part.map(|v| format!("{:02}", v)).unwrap_or_default();

    AggregateEntry {
        count: counter("COUNT"),
        version: counter("VERSION"),
        sum: counter("SUM"),
        account_ref: transaction.account_id.clone(),
        processor: id_at(HierarchyLevel::Processor),
        merchant_id: id_at(HierarchyLevel::Merchant),
        product_id: id_at(HierarchyLevel::Product),
        channel: parsed.channel.clone(),
        period: parsed.period.tag().to_string(),
        year: parsed.year.to_string(),
        month: two_digits(parsed.month),
        week: two_digits(parsed.week),
        day: two_digits(parsed.day),
        hour: two_digits(parsed.hour),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RecordKey;
    use serde_json::json;

    fn transaction() -> OriginalTransaction {
        OriginalTransaction {
            account_id: "A1".to_string(),
            application_id: "P1".to_string(),
            merchant_id: "M1".to_string(),
            product_id: "X1".to_string(),
            transaction_id: "T1".to_string(),
            channel: "web".to_string(),
            amount: json!("12.50"),
            ..Default::default()
        }
    }

    #[test]
    fn test_decodes_string_and_object_payloads() {
        let payload = json!({
            "original_transaction": { "transaction_id": "T1", "amount": 3 },
            "evaluation": {}
        });
        let mut attributes = Map::new();
        attributes.insert(
            PROCESSED_TRANSACTION_ATTRIBUTE.to_string(),
            Value::String(payload.to_string()),
        );
        let as_string = Record::new(RecordKey::new("EVALUATED", "1"), attributes.clone());
        attributes.insert(PROCESSED_TRANSACTION_ATTRIBUTE.to_string(), payload);
        let as_object = Record::new(RecordKey::new("EVALUATED", "1"), attributes);

        let a = ProcessedTransaction::from_record(&as_string).unwrap();
        let b = ProcessedTransaction::from_record(&as_object).unwrap();
        assert_eq!(a, b);
        assert!(a.is_normal());
        assert_eq!(a.original_transaction.amount_value(), 3.0);

        let empty = Record::new(RecordKey::new("EVALUATED", "2"), Map::new());
        assert!(ProcessedTransaction::from_record(&empty).is_err());
    }

    #[test]
    fn test_amount_value() {
        assert_eq!(transaction().amount_value(), 12.5);
        let mut txn = transaction();
        txn.amount = json!(null);
        assert_eq!(txn.amount_value(), 0.0);
    }

    #[test]
    fn test_rename_application_keys() {
        let renamed = rename_application_keys(&json!({
            "application_limit": true,
            "account_blacklist": 1
        }));
        assert_eq!(
            renamed,
            json!({ "processor_limit": true, "account_blacklist": 1 })
        );
        assert_eq!(rename_application_keys(&Value::Null), json!({}));
    }

    #[test]
    fn test_group_aggregates_by_level() {
        let aggregates = json!({
            "AGGREGATION-web-ACCOUNT-A1-DAY-2023-11-14": { "COUNT": 2, "SUM": 40, "VERSION": 1 },
            "AGGREGATION-web-ACCOUNT_APPLICATION-A1__P1-MONTH-2023-11": { "COUNT": 9, "SUM": 100, "VERSION": 4 },
            "AGGREGATION-web-ACCOUNT_APPLICATION_MERCHANT_PRODUCT-A1__P1__M1__X1-HOUR-2023-11-14-09:00:00": { "COUNT": 1, "SUM": 5, "VERSION": 1 },
            "garbage": { "COUNT": 1 }
        });

        let grouped = group_aggregates(&aggregates, &transaction());
        assert_eq!(grouped.len(), 3);

        let account = &grouped["ACCOUNT"][0];
        assert_eq!(account.count, json!(2));
        assert_eq!(account.period, "DAY");
        assert_eq!((account.year.as_str(), account.month.as_str(), account.day.as_str()), ("2023", "11", "14"));
        assert_eq!(account.processor, "");
        assert_eq!(account.week, "");

        let processor = &grouped["ACCOUNT_PROCESSOR"][0];
        assert_eq!(processor.processor, "P1");
        assert_eq!(processor.merchant_id, "");
        assert_eq!(processor.month, "11");

        let product = &grouped["ACCOUNT_PROCESSOR_MERCHANT_PRODUCT"][0];
        assert_eq!(product.product_id, "X1");
        assert_eq!(product.hour, "09");
        assert_eq!(product.version, json!(1));
    }
}
