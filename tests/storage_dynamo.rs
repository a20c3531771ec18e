//! DynamoDB storage integration tests.
//!
//! Run with: cargo test --test storage_dynamo --features dynamo -- --ignored
//!
//! Requires DynamoDB Local and a table keyed on PARTITION_KEY/SORT_KEY:
//!   docker run -d --name dynamodb -p 8000:8000 amazon/dynamodb-local
//!   aws dynamodb create-table --endpoint-url http://localhost:8000 \
//!     --table-name fraud-desk-test \
//!     --attribute-definitions AttributeName=PARTITION_KEY,AttributeType=S AttributeName=SORT_KEY,AttributeType=S \
//!     --key-schema AttributeName=PARTITION_KEY,KeyType=HASH AttributeName=SORT_KEY,KeyType=RANGE \
//!     --billing-mode PAY_PER_REQUEST
//!
//! Environment:
//! - DYNAMO_ENDPOINT: endpoint URL (default: http://localhost:8000)
//! - DYNAMO_TABLE: table name (default: fraud-desk-test)
//!
//! DynamoDB Local accepts any credentials; set AWS_ACCESS_KEY_ID,
//! AWS_SECRET_ACCESS_KEY and AWS_REGION to dummy values if none are configured.

mod storage;

use fraud_desk::config::DynamoConfig;
use fraud_desk::storage::DynamoStore;

fn dynamo_config() -> DynamoConfig {
    DynamoConfig {
        table_name: std::env::var("DYNAMO_TABLE").unwrap_or_else(|_| "fraud-desk-test".to_string()),
        endpoint_url: Some(
            std::env::var("DYNAMO_ENDPOINT").unwrap_or_else(|_| "http://localhost:8000".to_string()),
        ),
        ..DynamoConfig::default()
    }
}

#[tokio::test]
#[ignore = "requires DynamoDB Local"]
async fn test_dynamo_record_store() {
    println!("=== DynamoDB RecordStore Tests ===");
    let config = dynamo_config();
    println!("Connecting to: {:?} table {}", config.endpoint_url, config.table_name);

    let store = DynamoStore::new(&config)
        .await
        .expect("Failed to connect to DynamoDB");

    run_record_store_tests!(&store);

    println!("=== All DynamoDB RecordStore tests PASSED ===");
}
