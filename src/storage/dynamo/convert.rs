//! JSON ↔ `AttributeValue` conversion.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Number, Value};

use crate::storage::{Attributes, Record, RecordKey, Result, StorageError};

pub(super) type Item = HashMap<String, AttributeValue>;

pub(super) fn to_attribute(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(values) => AttributeValue::L(values.into_iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.into_iter()
                .map(|(k, v)| (k, to_attribute(v)))
                .collect(),
        ),
    }
}

fn parse_number(raw: &str) -> Result<Value> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Value::Number(i.into()));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Ok(Value::Number(u.into()));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| StorageError::Serialization(format!("Unparseable number '{}'", raw)))
}

pub(super) fn from_attribute(value: AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::Null(_) => Ok(Value::Null),
        AttributeValue::Bool(b) => Ok(Value::Bool(b)),
        AttributeValue::N(n) => parse_number(&n),
        AttributeValue::S(s) => Ok(Value::String(s)),
        AttributeValue::Ss(values) => Ok(Value::Array(
            values.into_iter().map(Value::String).collect(),
        )),
        AttributeValue::Ns(values) => values
            .iter()
            .map(|n| parse_number(n))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        AttributeValue::L(values) => values
            .into_iter()
            .map(from_attribute)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        AttributeValue::M(map) => map
            .into_iter()
            .map(|(k, v)| from_attribute(v).map(|v| (k, v)))
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(Value::Object),
        other => Err(StorageError::Serialization(format!(
            "Unsupported attribute type: {:?}",
            other
        ))),
    }
}

/// Key attributes for `key` under the configured attribute names.
pub(super) fn key_item(key: &RecordKey, pk_attr: &str, sk_attr: &str) -> Item {
    let mut item = Item::with_capacity(2);
    item.insert(
        pk_attr.to_string(),
        AttributeValue::S(key.partition_key.clone()),
    );
    item.insert(sk_attr.to_string(), AttributeValue::S(key.sort_key.clone()));
    item
}

pub(super) fn to_item(record: Record, pk_attr: &str, sk_attr: &str) -> Item {
    let mut item = key_item(&record.key, pk_attr, sk_attr);
    for (name, value) in record.attributes {
        if name != pk_attr && name != sk_attr {
            item.insert(name, to_attribute(value));
        }
    }
    item
}

pub(super) fn from_item(mut item: Item, pk_attr: &str, sk_attr: &str) -> Result<Record> {
    let key = take_key(&mut item, pk_attr, sk_attr)?;
    let attributes = item
        .into_iter()
        .map(|(k, v)| from_attribute(v).map(|v| (k, v)))
        .collect::<Result<Attributes>>()?;
    Ok(Record::new(key, attributes))
}

/// Remove and return the key attributes of `item`.
pub(super) fn take_key(item: &mut Item, pk_attr: &str, sk_attr: &str) -> Result<RecordKey> {
    let mut string_attr = |name: &str| match item.remove(name) {
        Some(AttributeValue::S(s)) => Ok(s),
        _ => Err(StorageError::Serialization(format!(
            "Item is missing string key attribute '{}'",
            name
        ))),
    };
    let partition_key = string_attr(pk_attr)?;
    let sort_key = string_attr(sk_attr)?;
    Ok(RecordKey::new(partition_key, sort_key))
}
