//! Fraud Desk - case management over a single-table store
//!
//! Key codecs for the single-table layout, a cursor paginator that keeps
//! filtered pages full, and the case, list, limit, merchant and
//! evaluated-transaction services built on them.

pub mod config;
pub mod error;
pub mod keys;
pub mod pagination;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{Error, Result};
