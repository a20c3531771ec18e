//! Merchant and merchant-product metadata.
//!
//! Merchants are stored under `MERCHANT_INFO/{id}`; products under
//! `MERCHANT_PRODUCT#{merchant}/PRODUCT#{product}`. Evaluated-transaction
//! lookups read both to attach display names.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::keys::{merchant_info_key, merchant_product_key};
use crate::storage::{Attributes, Record, RecordStore};
use crate::utils::time::now_rfc3339;

/// Largest accepted ingest batch.
pub const MAX_MERCHANT_BATCH: usize = 1000;

/// Merchant fields copied from an ingest payload.
const MERCHANT_FIELDS: [&str; 16] = [
    "companyName",
    "code",
    "tradeName",
    "alias",
    "country",
    "tier",
    "typeOfCompany",
    "status",
    "companyLogo",
    "companyRegistrationNumber",
    "vatRegistrationNumber",
    "dateOfIncorporation",
    "dateOfCommencement",
    "taxIdentificationNumber",
    "createdAt",
    "updatedAt",
];

/// Product fields as `(payload field, stored attribute)`.
const PRODUCT_FIELDS: [(&str, &str); 15] = [
    ("merchantProductId", "merchantProductId"),
    ("name", "merchantProductName"),
    ("description", "description"),
    ("productName", "productName"),
    ("productCode", "productCode"),
    ("merchantProductCode", "merchantProductCode"),
    ("merchantName", "merchantName"),
    ("merchantCode", "merchantCode"),
    ("canSettle", "canSettle"),
    ("status", "status"),
    ("alias", "alias"),
    ("serviceCode", "serviceCode"),
    ("configuration", "configuration"),
    ("createdAt", "createdAt"),
    ("updatedAt", "updatedAt"),
];

/// Display names for a merchant/product pair; empty when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MerchantProductMeta {
    pub merchant_name: String,
    pub product_name: String,
    pub merchant_product_name: String,
}

pub struct MerchantService {
    store: Arc<dyn RecordStore>,
}

impl MerchantService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Store a batch of merchant records. Returns how many were written.
    pub async fn ingest_merchants(&self, payload: Vec<Value>) -> Result<usize> {
        check_batch_size(payload.len())?;
        let missing: Vec<usize> = payload
            .iter()
            .enumerate()
            .filter(|(_, rec)| string_field(rec, "id").is_none())
            .map(|(idx, _)| idx)
            .collect();
        if !missing.is_empty() {
            return Err(Error::invalid(format!(
                "missing merchant id at indices {:?}",
                missing
            )));
        }

        let records: Vec<Record> = payload
            .iter()
            .filter_map(|rec| {
                let id = string_field(rec, "id")?;
                let mut attributes = pick(rec, MERCHANT_FIELDS.iter().map(|f| (*f, *f)));
                if let Some(tags) = tag_set(rec) {
                    attributes.insert("tags".to_string(), tags);
                }
                attributes.insert("EntityType".to_string(), json!("Merchant"));
                Some(Record::new(merchant_info_key(&id), attributes))
            })
            .collect();

        let written = records.len();
        self.store.put_batch(records).await?;
        info!(count = written, "Merchant records ingested");
        Ok(written)
    }

    pub async fn get_merchant(&self, merchant_id: &str) -> Result<Record> {
        self.store
            .get(&merchant_info_key(merchant_id).into())
            .await?
            .ok_or_else(|| Error::not_found(format!("merchant {}", merchant_id)))
    }

    /// Store a batch of merchant-product records.
    ///
    /// Each record needs `merchantId` and `productId`; the payload `name`
    /// is stored as `merchantProductName`.
    pub async fn ingest_merchant_products(&self, payload: Vec<Value>) -> Result<usize> {
        check_batch_size(payload.len())?;
        let missing: Vec<usize> = payload
            .iter()
            .enumerate()
            .filter(|(_, rec)| {
                string_field(rec, "merchantId").is_none() || string_field(rec, "productId").is_none()
            })
            .map(|(idx, _)| idx)
            .collect();
        if !missing.is_empty() {
            return Err(Error::invalid(format!(
                "missing merchantId or productId at indices {:?}",
                missing
            )));
        }

        let records: Vec<Record> = payload
            .iter()
            .filter_map(|rec| {
                let merchant_id = string_field(rec, "merchantId")?;
                let product_id = string_field(rec, "productId")?;
                let mut attributes = pick(rec, PRODUCT_FIELDS.iter().copied());
                if let Some(tags) = tag_set(rec) {
                    attributes.insert("tags".to_string(), tags);
                }
                attributes.insert("merchantId".to_string(), json!(merchant_id));
                attributes.insert("productId".to_string(), json!(product_id));
                attributes
                    .entry("updatedAt")
                    .or_insert_with(|| json!(now_rfc3339()));
                Some(Record::new(
                    merchant_product_key(&merchant_id, &product_id),
                    attributes,
                ))
            })
            .collect();

        let written = records.len();
        self.store.put_batch(records).await?;
        info!(count = written, "Merchant product records ingested");
        Ok(written)
    }

    /// Single-record convenience over [`MerchantService::ingest_merchant_products`].
    pub async fn ingest_merchant_product(&self, record: Value) -> Result<()> {
        self.ingest_merchant_products(vec![record]).await.map(|_| ())
    }

    pub async fn get_merchant_product(&self, merchant_id: &str, product_id: &str) -> Result<Record> {
        self.store
            .get(&merchant_product_key(merchant_id, product_id).into())
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("merchant product {}/{}", merchant_id, product_id))
            })
    }

    /// Display names for a merchant/product pair.
    pub async fn merchant_product_metadata(
        &self,
        merchant_id: &str,
        product_id: &str,
    ) -> MerchantProductMeta {
        lookup_metadata(self.store.as_ref(), merchant_id, product_id).await
    }
}

/// Resolve display names, leaving a field empty when its lookup fails.
pub(crate) async fn lookup_metadata(
    store: &dyn RecordStore,
    merchant_id: &str,
    product_id: &str,
) -> MerchantProductMeta {
    let mut meta = MerchantProductMeta::default();

    match store.get(&merchant_info_key(merchant_id).into()).await {
        Ok(Some(record)) => {
            meta.merchant_name = record.get_str("companyName").unwrap_or_default().to_string();
        }
        Ok(None) => {}
        Err(e) => warn!(merchant_id = %merchant_id, error = %e, "Merchant lookup failed"),
    }

    match store
        .get(&merchant_product_key(merchant_id, product_id).into())
        .await
    {
        Ok(Some(record)) => {
            meta.product_name = record.get_str("productName").unwrap_or_default().to_string();
            meta.merchant_product_name = record
                .get_str("merchantProductName")
                .unwrap_or_default()
                .to_string();
        }
        Ok(None) => {}
        Err(e) => warn!(
            merchant_id = %merchant_id,
            product_id = %product_id,
            error = %e,
            "Merchant product lookup failed"
        ),
    }

    meta
}

fn check_batch_size(len: usize) -> Result<()> {
    if len == 0 || len > MAX_MERCHANT_BATCH {
        return Err(Error::invalid(format!(
            "between 1 and {} records allowed per request, got {}",
            MAX_MERCHANT_BATCH, len
        )));
    }
    Ok(())
}

/// A present, non-null field rendered as a string id.
fn string_field(record: &Value, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Copy the listed fields, renaming and dropping nulls.
fn pick<'a>(record: &Value, fields: impl Iterator<Item = (&'a str, &'a str)>) -> Attributes {
    let mut attributes = Map::new();
    for (from, to) in fields {
        match record.get(from) {
            None | Some(Value::Null) => {}
            Some(value) => {
                attributes.insert(to.to_string(), value.clone());
            }
        }
    }
    attributes
}

/// Tags deduplicated and sorted, or `None` when absent or empty.
fn tag_set(record: &Value) -> Option<Value> {
    let tags: BTreeSet<&str> = record
        .get("tags")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    (!tags.is_empty()).then(|| json!(tags))
}
