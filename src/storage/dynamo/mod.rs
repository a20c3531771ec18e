//! DynamoDB RecordStore.
//!
//! Table schema:
//! - partition key: `PARTITION_KEY` (String, name configurable)
//! - sort key: `SORT_KEY` (String, name configurable)
//! - every other attribute is stored as its natural DynamoDB type

mod convert;

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_dynamodb::types::{
    AttributeValue, Delete, Put, PutRequest, ReturnValue, Select, TransactWriteItem, WriteRequest,
};
use aws_sdk_dynamodb::Client;
use tracing::{debug, info, warn};

use self::convert::{from_item, key_item, take_key, to_attribute, to_item, Item};
use crate::config::DynamoConfig;
use crate::storage::{
    Attributes, Direction, ExpectedAttribute, QueryPage, RangeQuery, Record, RecordKey,
    RecordStore, Result, SortCondition, StorageError,
};

/// DynamoDB allows at most 25 requests per `BatchWriteItem`.
const BATCH_WRITE_SIZE: usize = 25;

/// Attempts at resubmitting unprocessed batch items.
const BATCH_RETRIES: u32 = 5;

const BATCH_RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Error codes for requests DynamoDB refuses no matter how often they are sent.
const REJECTED_CODES: &[&str] = &[
    "ValidationException",
    "SerializationException",
    "ResourceNotFoundException",
    "AccessDeniedException",
    "ItemCollectionSizeLimitExceededException",
];

fn backend_error<E>(operation: &str, e: E) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let detail = format!("DynamoDB {} failed: {}", operation, DisplayErrorContext(&e));
    classify(e.code(), e.message(), detail)
}

/// Only codes the service uses for invalid requests are final.
fn classify(code: Option<&str>, message: Option<&str>, detail: String) -> StorageError {
    let rejected = match code {
        // Cancellation reasons are only reported in the message.
        Some("TransactionCanceledException") => {
            message.is_some_and(|m| m.contains("ValidationError"))
        }
        Some(code) => REJECTED_CODES.contains(&code),
        None => false,
    };
    if rejected {
        StorageError::Rejected(detail)
    } else {
        StorageError::BackendUnavailable(detail)
    }
}

/// Backoff before resubmitting after `attempt`; `None` once attempts run out.
fn batch_retry_delay(attempt: u32) -> Option<Duration> {
    (attempt < BATCH_RETRIES).then(|| BATCH_RETRY_BASE_DELAY * 2u32.pow(attempt))
}

fn build_failed(e: impl std::fmt::Display) -> StorageError {
    StorageError::Serialization(format!("DynamoDB request build failed: {}", e))
}

/// DynamoDB implementation of RecordStore.
pub struct DynamoStore {
    client: Client,
    table_name: String,
    pk_attr: String,
    sk_attr: String,
}

impl DynamoStore {
    /// Connect using the default AWS credential chain.
    pub async fn new(config: &DynamoConfig) -> Result<Self> {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let client = if let Some(endpoint) = config.endpoint_url.as_deref() {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&sdk_config)
        };

        info!(table = %config.table_name, "Connected to DynamoDB");

        Ok(Self::with_client(client, config))
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client, config: &DynamoConfig) -> Self {
        Self {
            client,
            table_name: config.table_name.clone(),
            pk_attr: config.partition_key_attribute.clone(),
            sk_attr: config.sort_key_attribute.clone(),
        }
    }

    fn key(&self, key: &RecordKey) -> Item {
        key_item(key, &self.pk_attr, &self.sk_attr)
    }

    fn item(&self, record: Record) -> Item {
        to_item(record, &self.pk_attr, &self.sk_attr)
    }

    fn record(&self, item: Item) -> Result<Record> {
        from_item(item, &self.pk_attr, &self.sk_attr)
    }

    /// `SET #a0 = :v0, ...` over `changes`, skipping key attributes.
    fn set_expression(&self, changes: Attributes) -> (String, Vec<(String, String)>, Item) {
        let mut clauses = Vec::with_capacity(changes.len());
        let mut names = Vec::with_capacity(changes.len());
        let mut values = Item::with_capacity(changes.len());

        let settable = changes
            .into_iter()
            .filter(|(name, _)| *name != self.pk_attr && *name != self.sk_attr);
        for (i, (name, value)) in settable.enumerate() {
            clauses.push(format!("#a{i} = :v{i}"));
            names.push((format!("#a{i}"), name));
            values.insert(format!(":v{i}"), to_attribute(value));
        }

        (format!("SET {}", clauses.join(", ")), names, values)
    }

    /// Key condition expression plus its value bindings.
    fn key_condition(&self, partition_key: &str, condition: &SortCondition) -> (String, Item) {
        let mut values = Item::new();
        values.insert(":pk".to_string(), AttributeValue::S(partition_key.to_string()));

        let expression = match condition {
            SortCondition::All => "#pk = :pk".to_string(),
            SortCondition::Equals(sk) => {
                values.insert(":sk".to_string(), AttributeValue::S(sk.clone()));
                "#pk = :pk AND #sk = :sk".to_string()
            }
            SortCondition::BeginsWith(prefix) => {
                values.insert(":sk".to_string(), AttributeValue::S(prefix.clone()));
                "#pk = :pk AND begins_with(#sk, :sk)".to_string()
            }
            SortCondition::Between(lower, upper) => {
                values.insert(":lo".to_string(), AttributeValue::S(lower.clone()));
                values.insert(":hi".to_string(), AttributeValue::S(upper.clone()));
                "#pk = :pk AND #sk BETWEEN :lo AND :hi".to_string()
            }
        };
        (expression, values)
    }

    async fn write_chunk(&self, mut requests: Vec<WriteRequest>) -> Result<()> {
        for attempt in 0..=BATCH_RETRIES {
            let output = self
                .client
                .batch_write_item()
                .request_items(&self.table_name, requests)
                .send()
                .await
                .map_err(|e| backend_error("batch_write_item", e))?;

            requests = output
                .unprocessed_items
                .and_then(|mut unprocessed| unprocessed.remove(&self.table_name))
                .unwrap_or_default();
            if requests.is_empty() {
                return Ok(());
            }

            warn!(
                table = %self.table_name,
                unprocessed = requests.len(),
                attempt,
                "Resubmitting unprocessed batch items"
            );
            if let Some(delay) = batch_retry_delay(attempt) {
                tokio::time::sleep(delay).await;
            }
        }

        Err(StorageError::BackendUnavailable(format!(
            "DynamoDB batch_write_item left {} items unprocessed",
            requests.len()
        )))
    }
}

#[async_trait]
impl RecordStore for DynamoStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(self.key(key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| backend_error("get_item", e))?;

        output.item.map(|item| self.record(item)).transpose()
    }

    async fn put(&self, record: Record) -> Result<()> {
        let key = record.key.clone();
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(self.item(record)))
            .send()
            .await
            .map_err(|e| backend_error("put_item", e))?;

        debug!(key = %key, "Stored record in DynamoDB");
        Ok(())
    }

    async fn put_if_absent(&self, record: Record) -> Result<()> {
        let key = record.key.clone();
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(self.item(record)))
            .condition_expression("attribute_not_exists(#pk)")
            .expression_attribute_names("#pk", &self.pk_attr)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    Err(StorageError::ConflictExists(key))
                } else {
                    Err(backend_error("put_item", service_error))
                }
            }
        }
    }

    async fn update(&self, key: &RecordKey, changes: Attributes) -> Result<Record> {
        let (expression, names, values) = self.set_expression(changes);
        if values.is_empty() {
            return Ok(self
                .get(key)
                .await?
                .unwrap_or_else(|| Record::new(key.clone(), Attributes::new())));
        }

        let output = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(self.key(key)))
            .update_expression(expression)
            .set_expression_attribute_names(Some(names.into_iter().collect()))
            .set_expression_attribute_values(Some(values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| backend_error("update_item", e))?;

        self.record(output.attributes.unwrap_or_else(|| self.key(key)))
    }

    async fn update_if(
        &self,
        key: &RecordKey,
        changes: Attributes,
        condition: &ExpectedAttribute,
    ) -> Result<Record> {
        let (expression, mut names, mut values) = self.set_expression(changes);
        names.push(("#cond".to_string(), condition.name.clone()));
        values.insert(":cond".to_string(), to_attribute(condition.value.clone()));

        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(self.key(key)))
            .update_expression(expression)
            .condition_expression("#cond = :cond")
            .set_expression_attribute_names(Some(names.into_iter().collect()))
            .set_expression_attribute_values(Some(values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(output) => self.record(output.attributes.unwrap_or_else(|| self.key(key))),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    Err(StorageError::ConditionFailed {
                        key: key.clone(),
                        attribute: condition.name.clone(),
                        expected: condition.value.clone(),
                    })
                } else {
                    Err(backend_error("update_item", service_error))
                }
            }
        }
    }

    async fn delete(&self, key: &RecordKey) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(self.key(key)))
            .send()
            .await
            .map_err(|e| backend_error("delete_item", e))?;
        Ok(())
    }

    async fn replace(&self, old_key: &RecordKey, record: Record) -> Result<()> {
        // A transaction may not touch one item twice.
        if *old_key == record.key {
            return self.put(record).await;
        }

        let delete = Delete::builder()
            .table_name(&self.table_name)
            .set_key(Some(self.key(old_key)))
            .build()
            .map_err(build_failed)?;
        let put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(self.item(record)))
            .build()
            .map_err(build_failed)?;

        self.client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().delete(delete).build())
            .transact_items(TransactWriteItem::builder().put(put).build())
            .send()
            .await
            .map_err(|e| backend_error("transact_write_items", e))?;

        debug!(from = %old_key, "Re-keyed record in DynamoDB");
        Ok(())
    }

    async fn put_batch(&self, records: Vec<Record>) -> Result<()> {
        let requests = records
            .into_iter()
            .map(|record| {
                PutRequest::builder()
                    .set_item(Some(self.item(record)))
                    .build()
                    .map(|put| WriteRequest::builder().put_request(put).build())
                    .map_err(build_failed)
            })
            .collect::<Result<Vec<_>>>()?;

        for chunk in requests.chunks(BATCH_WRITE_SIZE) {
            self.write_chunk(chunk.to_vec()).await?;
        }
        Ok(())
    }

    async fn query(&self, query: RangeQuery) -> Result<QueryPage> {
        let (expression, values) = self.key_condition(&query.partition_key, &query.condition);

        let mut builder = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression(expression)
            .expression_attribute_names("#pk", &self.pk_attr)
            .set_expression_attribute_values(Some(values))
            .scan_index_forward(query.direction == Direction::Ascending)
            .set_exclusive_start_key(query.exclusive_start.as_ref().map(|k| self.key(k)));

        if !matches!(query.condition, SortCondition::All) {
            builder = builder.expression_attribute_names("#sk", &self.sk_attr);
        }
        if let Some(limit) = query.limit {
            builder = builder.limit(i32::try_from(limit).unwrap_or(i32::MAX));
        }

        let output = builder
            .send()
            .await
            .map_err(|e| backend_error("query", e))?;

        let items = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|item| self.record(item))
            .collect::<Result<Vec<_>>>()?;
        let continuation = output
            .last_evaluated_key
            .map(|mut key| take_key(&mut key, &self.pk_attr, &self.sk_attr))
            .transpose()?;

        Ok(QueryPage {
            items,
            continuation,
        })
    }

    async fn count(&self, partition_key: &str, condition: SortCondition) -> Result<u64> {
        let (expression, values) = self.key_condition(partition_key, &condition);
        let mut total = 0u64;
        let mut start: Option<Item> = None;

        loop {
            let mut builder = self
                .client
                .query()
                .table_name(&self.table_name)
                .select(Select::Count)
                .key_condition_expression(expression.clone())
                .expression_attribute_names("#pk", &self.pk_attr)
                .set_expression_attribute_values(Some(values.clone()))
                .set_exclusive_start_key(start.take());
            if !matches!(condition, SortCondition::All) {
                builder = builder.expression_attribute_names("#sk", &self.sk_attr);
            }

            let output = builder
                .send()
                .await
                .map_err(|e| backend_error("query (count)", e))?;

            total += u64::try_from(output.count).unwrap_or_default();
            match output.last_evaluated_key {
                Some(key) => start = Some(key),
                None => return Ok(total),
            }
        }
    }
}
