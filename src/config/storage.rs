//! Storage configuration types.

use serde::Deserialize;

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// In-process table; contents are lost on exit.
    #[default]
    Memory,
    /// DynamoDB single table (requires the `dynamo` feature).
    Dynamo,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::Memory => f.write_str("memory"),
            StorageType::Dynamo => f.write_str("dynamo"),
        }
    }
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// DynamoDB-specific configuration.
    pub dynamo: DynamoConfig,
}

/// DynamoDB-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DynamoConfig {
    /// Table holding every record.
    pub table_name: String,
    /// Endpoint override, e.g. `http://localhost:8000` for DynamoDB Local.
    pub endpoint_url: Option<String>,
    /// Name of the partition key attribute.
    pub partition_key_attribute: String,
    /// Name of the sort key attribute.
    pub sort_key_attribute: String,
}

impl Default for DynamoConfig {
    fn default() -> Self {
        Self {
            table_name: "fraud-desk".to_string(),
            endpoint_url: None,
            partition_key_attribute: "PARTITION_KEY".to_string(),
            sort_key_attribute: "SORT_KEY".to_string(),
        }
    }
}
