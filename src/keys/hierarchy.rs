//! Entity hierarchy: ACCOUNT ⊂ PROCESSOR ⊂ MERCHANT ⊂ PRODUCT.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{KeyError, HIERARCHY_DELIMITER};

/// One level of the entity hierarchy.
///
/// PROCESSOR is called APPLICATION in older records; both spellings parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HierarchyLevel {
    Account,
    #[serde(alias = "APPLICATION")]
    Processor,
    Merchant,
    Product,
}

impl HierarchyLevel {
    pub const ALL: [HierarchyLevel; 4] = [
        HierarchyLevel::Account,
        HierarchyLevel::Processor,
        HierarchyLevel::Merchant,
        HierarchyLevel::Product,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HierarchyLevel::Account => "ACCOUNT",
            HierarchyLevel::Processor => "PROCESSOR",
            HierarchyLevel::Merchant => "MERCHANT",
            HierarchyLevel::Product => "PRODUCT",
        }
    }

    /// Levels whose ids identify an entity at this level.
    ///
    /// Accounts stand alone; every other level is rooted at the processor.
    pub fn key_path(&self) -> &'static [HierarchyLevel] {
        match self {
            HierarchyLevel::Account => &[HierarchyLevel::Account],
            HierarchyLevel::Processor => &[HierarchyLevel::Processor],
            HierarchyLevel::Merchant => &[HierarchyLevel::Processor, HierarchyLevel::Merchant],
            HierarchyLevel::Product => &[
                HierarchyLevel::Processor,
                HierarchyLevel::Merchant,
                HierarchyLevel::Product,
            ],
        }
    }

    /// Marker used inside evaluated-transaction and aggregate keys.
    pub fn key_marker(&self) -> &'static str {
        match self {
            HierarchyLevel::Processor => "APPLICATION",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HierarchyLevel {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACCOUNT" => Ok(HierarchyLevel::Account),
            "PROCESSOR" | "APPLICATION" => Ok(HierarchyLevel::Processor),
            "MERCHANT" => Ok(HierarchyLevel::Merchant),
            "PRODUCT" => Ok(HierarchyLevel::Product),
            _ => Err(KeyError::malformed(
                s,
                "entity level must be ACCOUNT | PROCESSOR | MERCHANT | PRODUCT",
            )),
        }
    }
}

/// Identifiers for each hierarchy level. Any of them may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIds {
    #[serde(default, alias = "account_ref")]
    pub account_id: Option<String>,
    #[serde(default, alias = "application_id")]
    pub processor_id: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
}

impl EntityIds {
    pub fn account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            ..Default::default()
        }
    }

    pub fn with_processor(mut self, processor_id: impl Into<String>) -> Self {
        self.processor_id = Some(processor_id.into());
        self
    }

    pub fn with_merchant(mut self, merchant_id: impl Into<String>) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }

    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    /// Identifier for `level`, treating empty strings as absent.
    pub fn get(&self, level: HierarchyLevel) -> Option<&str> {
        let id = match level {
            HierarchyLevel::Account => &self.account_id,
            HierarchyLevel::Processor => &self.processor_id,
            HierarchyLevel::Merchant => &self.merchant_id,
            HierarchyLevel::Product => &self.product_id,
        };
        id.as_deref().filter(|s| !s.is_empty())
    }

    /// Processor-rooted hierarchy key (the account is never part of it).
    pub fn hierarchy_key(&self) -> String {
        build_hierarchy_key(
            self.get(HierarchyLevel::Processor),
            self.get(HierarchyLevel::Merchant),
            self.get(HierarchyLevel::Product),
        )
    }
}

/// Join present identifiers in hierarchy order with `__`.
///
/// Stops at the first absent or empty identifier, so a gap (processor absent,
/// merchant present) silently drops every deeper level. Returns an empty
/// string when the processor is absent.
pub fn build_hierarchy_key(
    processor_id: Option<&str>,
    merchant_id: Option<&str>,
    product_id: Option<&str>,
) -> String {
    [processor_id, merchant_id, product_id]
        .into_iter()
        .map_while(|id| id.filter(|s| !s.is_empty()))
        .collect::<Vec<_>>()
        .join(HIERARCHY_DELIMITER)
}

/// Inverse of [`build_hierarchy_key`].
pub fn split_hierarchy_key(key: &str) -> Vec<&str> {
    if key.is_empty() {
        return Vec::new();
    }
    key.split(HIERARCHY_DELIMITER).collect()
}
