//! Pagination token codec.
//!
//! A token is base64 (standard alphabet) over JSON:
//!
//! ```json
//! {"dynamodb_key": {"PARTITION_KEY": "...", "SORT_KEY": "..."},
//!  "next_page": 2, "total_records": 40, "per_page": 20}
//! ```
//!
//! Older clients hold tokens that are just the bare key map; those decode as
//! page 2 with an unknown total and the default page size.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::storage::RecordKey;

/// Page number assumed for legacy tokens.
const LEGACY_TOKEN_PAGE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Invalid pagination token: {0}")]
    InvalidToken(String),

    #[error("Failed to encode pagination token: {0}")]
    Encode(String),
}

/// Decoded pagination token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken {
    /// Key of the last record served; the next page starts after it.
    pub dynamodb_key: RecordKey,
    pub next_page: u32,
    pub total_records: Option<u64>,
    pub per_page: usize,
}

/// Wire shape with every metadata field optional.
#[derive(Deserialize)]
struct TokenBody {
    dynamodb_key: RecordKey,
    next_page: Option<u32>,
    total_records: Option<u64>,
    per_page: Option<usize>,
}

impl PageToken {
    pub fn encode(&self) -> Result<String, TokenError> {
        let json = serde_json::to_vec(self).map_err(|e| TokenError::Encode(e.to_string()))?;
        Ok(BASE64_STANDARD.encode(json))
    }

    /// Decode a client-supplied token.
    ///
    /// `default_per_page` fills in the page size for tokens that omit it;
    /// a page size above `max_per_page` is rejected.
    pub fn decode(
        token: &str,
        default_per_page: usize,
        max_per_page: usize,
    ) -> Result<Self, TokenError> {
        let bytes = BASE64_STANDARD
            .decode(token.trim())
            .map_err(|e| TokenError::InvalidToken(format!("not base64: {}", e)))?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| TokenError::InvalidToken(format!("not JSON: {}", e)))?;

        let token = if value.get("dynamodb_key").is_some() {
            let body: TokenBody = serde_json::from_value(value)
                .map_err(|e| TokenError::InvalidToken(e.to_string()))?;
            PageToken {
                dynamodb_key: body.dynamodb_key,
                next_page: body.next_page.unwrap_or(LEGACY_TOKEN_PAGE),
                total_records: body.total_records,
                per_page: body.per_page.unwrap_or(default_per_page),
            }
        } else {
            let key: RecordKey = serde_json::from_value(value)
                .map_err(|e| TokenError::InvalidToken(format!("unrecognized shape: {}", e)))?;
            PageToken {
                dynamodb_key: key,
                next_page: LEGACY_TOKEN_PAGE,
                total_records: None,
                per_page: default_per_page,
            }
        };

        if token.next_page == 0 {
            return Err(TokenError::InvalidToken("next_page must be positive".to_string()));
        }
        if !(1..=max_per_page).contains(&token.per_page) {
            return Err(TokenError::InvalidToken(format!(
                "per_page {} outside 1..={}",
                token.per_page, max_per_page
            )));
        }
        Ok(token)
    }
}
