//! Evaluated-transaction keys: scoped partitions and time-range sort keys.
//!
//! Sort keys are `{unix_timestamp}_{suffix}`. Range queries bound a window with
//! `"{start}_"` and `"{end}_z"`; the trailing `z` sorts after every suffix
//! written under the end timestamp.

use super::{EntityIds, HierarchyLevel, KeyError, Result, HIERARCHY_DELIMITER};

/// Partition prefix shared by every evaluated-transaction partition.
pub const EVALUATED_PREFIX: &str = "EVALUATED";

/// Decimal width of timestamps in sort keys.
///
/// Every timestamp from 2001-09-09 until 2286-11-20 already has ten digits;
/// padding keeps older values ordered and wider values are rejected.
pub const TIMESTAMP_WIDTH: usize = 10;

const MAX_TIMESTAMP: i64 = 9_999_999_999;

/// Which evaluated-transaction partition a lookup reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluatedScope {
    /// Every evaluated transaction (`EVALUATED`).
    All,
    /// Transactions of one entity on one channel.
    Entity {
        channel: String,
        level: HierarchyLevel,
        ids: EntityIds,
    },
    /// Transactions that hit a list or rule (`EVALUATED-BLACKLIST`, ...).
    List(String),
}

impl EvaluatedScope {
    /// Scope for a list or rule name; `stafflist` is stored as `STAFF`.
    pub fn list(name: &str) -> Self {
        let upper = name.to_uppercase();
        if upper == "STAFFLIST" {
            EvaluatedScope::List("STAFF".to_string())
        } else {
            EvaluatedScope::List(upper)
        }
    }

    /// Entity scope; every id on the level's key path must be present.
    pub fn entity(channel: impl Into<String>, level: HierarchyLevel, ids: EntityIds) -> Result<Self> {
        let channel = channel.into();
        if channel.is_empty() {
            return Err(KeyError::malformed(
                level.as_str(),
                "channel is required for an entity partition",
            ));
        }
        if let Some(missing) = level.key_path().iter().find(|l| ids.get(**l).is_none()) {
            return Err(KeyError::malformed(
                level.as_str(),
                format!("{} id is required for a {} partition", missing, level),
            ));
        }
        Ok(EvaluatedScope::Entity { channel, level, ids })
    }

    pub fn partition_key(&self) -> String {
        match self {
            EvaluatedScope::All => EVALUATED_PREFIX.to_string(),
            EvaluatedScope::Entity { channel, level, ids } => {
                let id = level
                    .key_path()
                    .iter()
                    .map(|l| ids.get(*l).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(HIERARCHY_DELIMITER);
                format!("{}-{}-{}-{}", EVALUATED_PREFIX, channel, level.key_marker(), id)
            }
            EvaluatedScope::List(name) => format!("{}-{}", EVALUATED_PREFIX, name),
        }
    }
}

fn encode_timestamp(timestamp: i64) -> Result<String> {
    if !(0..=MAX_TIMESTAMP).contains(&timestamp) {
        return Err(KeyError::malformed(
            timestamp.to_string(),
            format!("timestamp must fit in {} decimal digits", TIMESTAMP_WIDTH),
        ));
    }
    Ok(format!("{:0width$}", timestamp, width = TIMESTAMP_WIDTH))
}

/// Sort key for an evaluated transaction written at `timestamp`.
pub fn evaluated_sort_key(timestamp: i64, suffix: &str) -> Result<String> {
    Ok(format!("{}_{}", encode_timestamp(timestamp)?, suffix))
}

/// Inclusive sort-key bounds covering `[start, end]` seconds.
pub fn time_range_sort_bounds(start: i64, end: i64) -> Result<(String, String)> {
    if start > end {
        return Err(KeyError::malformed(
            format!("{}..{}", start, end),
            "range start is after range end",
        ));
    }
    Ok((
        format!("{}_", encode_timestamp(start)?),
        format!("{}_z", encode_timestamp(end)?),
    ))
}
