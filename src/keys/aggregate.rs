//! Aggregate time-bucket keys.
//!
//! Layout: `AGGREGATION-{channel}-{LEVEL}-{ids}-{GRANULARITY}-{timestamp}`
//!
//! | Granularity | Timestamp suffix        | Example                                   |
//! |-------------|-------------------------|-------------------------------------------|
//! | MONTH       | `YYYY-MM`               | `MONTH-2024-01`                           |
//! | WEEK        | `YYYY-WW` (ISO week)    | `WEEK-2024-03`                            |
//! | DAY         | `YYYY-MM-DD`            | `DAY-2024-01-15`                          |
//! | HOUR        | `YYYY-MM-DD-HH:00:00`   | `HOUR-2024-01-15-09:00:00`                |
//!
//! The timestamp is parsed from the right, so identifiers containing `-`
//! still round-trip.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityIds, HierarchyLevel, KeyError, Result, HIERARCHY_DELIMITER};

/// Leading segment of every aggregate key.
pub const AGGREGATION_PREFIX: &str = "AGGREGATION";

/// Time bucket size of an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Month,
        Granularity::Week,
        Granularity::Day,
        Granularity::Hour,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Granularity::Hour => "HOUR",
            Granularity::Day => "DAY",
            Granularity::Week => "WEEK",
            Granularity::Month => "MONTH",
        }
    }

    /// Number of `-` separated timestamp components after the tag.
    fn component_count(&self) -> usize {
        match self {
            Granularity::Month | Granularity::Week => 2,
            Granularity::Day => 3,
            Granularity::Hour => 4,
        }
    }

    /// Format `timestamp` at this granularity (without the tag).
    pub fn format(&self, timestamp: DateTime<Utc>) -> String {
        match self {
            Granularity::Month => timestamp.format("%Y-%m").to_string(),
            Granularity::Day => timestamp.format("%Y-%m-%d").to_string(),
            Granularity::Hour => format!("{}-{:02}:00:00", timestamp.format("%Y-%m-%d"), timestamp.hour()),
            Granularity::Week => {
                let week = timestamp.iso_week();
                format!("{}-{:02}", week.year(), week.week())
            }
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Granularity {
    type Err = KeyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Granularity::ALL
            .into_iter()
            .find(|g| g.tag() == s)
            .ok_or_else(|| KeyError::malformed(s, "granularity must be HOUR | DAY | WEEK | MONTH"))
    }
}

/// Hierarchy depth an aggregate was computed at.
///
/// Produced once from the structured level segment and carried with the
/// parsed key, so nothing re-derives it from substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateLevel {
    Account,
    AccountProcessor,
    AccountProcessorMerchant,
    AccountProcessorMerchantProduct,
}

impl AggregateLevel {
    pub const ALL: [AggregateLevel; 4] = [
        AggregateLevel::Account,
        AggregateLevel::AccountProcessor,
        AggregateLevel::AccountProcessorMerchant,
        AggregateLevel::AccountProcessorMerchantProduct,
    ];

    /// Category name used in API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateLevel::Account => "ACCOUNT",
            AggregateLevel::AccountProcessor => "ACCOUNT_PROCESSOR",
            AggregateLevel::AccountProcessorMerchant => "ACCOUNT_PROCESSOR_MERCHANT",
            AggregateLevel::AccountProcessorMerchantProduct => "ACCOUNT_PROCESSOR_MERCHANT_PRODUCT",
        }
    }

    /// Level segment as written into stored keys (processor spelled APPLICATION).
    pub fn key_segment(&self) -> &'static str {
        match self {
            AggregateLevel::Account => "ACCOUNT",
            AggregateLevel::AccountProcessor => "ACCOUNT_APPLICATION",
            AggregateLevel::AccountProcessorMerchant => "ACCOUNT_APPLICATION_MERCHANT",
            AggregateLevel::AccountProcessorMerchantProduct => {
                "ACCOUNT_APPLICATION_MERCHANT_PRODUCT"
            }
        }
    }

    /// Number of hierarchy levels covered.
    pub fn depth(&self) -> usize {
        match self {
            AggregateLevel::Account => 1,
            AggregateLevel::AccountProcessor => 2,
            AggregateLevel::AccountProcessorMerchant => 3,
            AggregateLevel::AccountProcessorMerchantProduct => 4,
        }
    }

    /// Whether ids at `level` belong to aggregates of this depth.
    pub fn includes(&self, level: HierarchyLevel) -> bool {
        HierarchyLevel::ALL[..self.depth()].contains(&level)
    }

    /// Parse a level segment such as `ACCOUNT_APPLICATION_MERCHANT`.
    pub fn from_segment(segment: &str) -> Result<Self> {
        let tokens: Vec<HierarchyLevel> = segment
            .split('_')
            .map(|t| t.parse::<HierarchyLevel>())
            .collect::<Result<_>>()
            .map_err(|_| KeyError::malformed(segment, "unknown aggregate level"))?;

        if tokens.is_empty() || tokens.len() > 4 || tokens[..] != HierarchyLevel::ALL[..tokens.len()] {
            return Err(KeyError::malformed(
                segment,
                "aggregate level must be an ACCOUNT-rooted hierarchy prefix",
            ));
        }
        Ok(AggregateLevel::ALL[tokens.len() - 1])
    }
}

impl fmt::Display for AggregateLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured form of an aggregate key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateKey {
    pub channel: String,
    pub level: AggregateLevel,
    pub ids: EntityIds,
    pub period: Granularity,
    pub year: i32,
    pub month: Option<u32>,
    pub week: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
}

/// Build an aggregate key for `timestamp` at `granularity`.
///
/// Identifiers are joined account-first up to the level's depth, stopping at
/// the first absent one.
pub fn build_aggregate_key(
    channel: &str,
    level: AggregateLevel,
    ids: &EntityIds,
    granularity: Granularity,
    timestamp: DateTime<Utc>,
) -> String {
    let joined = HierarchyLevel::ALL[..level.depth()]
        .iter()
        .map_while(|l| ids.get(*l))
        .collect::<Vec<_>>()
        .join(HIERARCHY_DELIMITER);

    format!(
        "{}-{}-{}-{}-{}-{}",
        AGGREGATION_PREFIX,
        channel,
        level.key_segment(),
        joined,
        granularity.tag(),
        granularity.format(timestamp)
    )
}

/// Parse an aggregate key back into its fields.
pub fn parse_aggregate_key(key: &str) -> Result<AggregateKey> {
    let parts: Vec<&str> = key.split('-').collect();
    let level = parse_level_segment(key, &parts)?;

    let (granularity, tag_idx) = Granularity::ALL
        .into_iter()
        .find_map(|g| {
            let idx = parts.len().checked_sub(g.component_count() + 1)?;
            (idx >= 3 && parts[idx] == g.tag()).then_some((g, idx))
        })
        .ok_or_else(|| {
            KeyError::malformed(key, "missing or unrecognized granularity segment")
        })?;

    let ids = parse_ids(key, level, &parts[3..tag_idx].join("-"))?;
    let components = &parts[tag_idx + 1..];
    let year: i32 = parse_number(key, components[0], "year")?;

    let mut parsed = AggregateKey {
        channel: parts[1].to_string(),
        level,
        ids,
        period: granularity,
        year,
        month: None,
        week: None,
        day: None,
        hour: None,
    };

    match granularity {
        Granularity::Month => {
            let month = parse_number(key, components[1], "month")?;
            if !(1..=12).contains(&month) {
                return Err(KeyError::malformed(key, "month out of range"));
            }
            parsed.month = Some(month);
        }
        Granularity::Week => {
            let week = parse_number(key, components[1], "week")?;
            if !(1..=53).contains(&week) {
                return Err(KeyError::malformed(key, "ISO week out of range"));
            }
            parsed.week = Some(week);
        }
        Granularity::Day | Granularity::Hour => {
            let month = parse_number(key, components[1], "month")?;
            let day = parse_number(key, components[2], "day")?;
            if NaiveDate::from_ymd_opt(year, month, day).is_none() {
                return Err(KeyError::malformed(key, "invalid calendar date"));
            }
            parsed.month = Some(month);
            parsed.day = Some(day);

            if granularity == Granularity::Hour {
                let clock = components[3].split(':').next().unwrap_or_default();
                let hour = parse_number(key, clock, "hour")?;
                if hour > 23 {
                    return Err(KeyError::malformed(key, "hour out of range"));
                }
                parsed.hour = Some(hour);
            }
        }
    }

    Ok(parsed)
}

/// Hierarchy level of an aggregate key, read from its level segment.
///
/// Identifiers are never inspected, so a merchant id containing the text
/// `PRODUCT` does not change the category.
pub fn categorize_aggregate_key(key: &str) -> Result<AggregateLevel> {
    let parts: Vec<&str> = key.split('-').collect();
    parse_level_segment(key, &parts)
}

fn parse_level_segment(key: &str, parts: &[&str]) -> Result<AggregateLevel> {
    if parts.len() < 3 || parts[0] != AGGREGATION_PREFIX {
        return Err(KeyError::malformed(
            key,
            format!("expected {}-{{channel}}-{{level}}-... prefix", AGGREGATION_PREFIX),
        ));
    }
    AggregateLevel::from_segment(parts[2]).map_err(|_| KeyError::malformed(key, "unknown aggregate level"))
}

fn parse_ids(key: &str, level: AggregateLevel, segment: &str) -> Result<EntityIds> {
    let values: Vec<&str> = if segment.is_empty() {
        Vec::new()
    } else {
        segment.split(HIERARCHY_DELIMITER).collect()
    };
    if values.len() > level.depth() {
        return Err(KeyError::malformed(
            key,
            format!("{} ids given for a {} aggregate", values.len(), level),
        ));
    }

    let mut ids = EntityIds::default();
    for (value, hierarchy_level) in values.into_iter().zip(HierarchyLevel::ALL) {
        let value = Some(value.to_string());
        match hierarchy_level {
            HierarchyLevel::Account => ids.account_id = value,
            HierarchyLevel::Processor => ids.processor_id = value,
            HierarchyLevel::Merchant => ids.merchant_id = value,
            HierarchyLevel::Product => ids.product_id = value,
        }
    }
    Ok(ids)
}

fn parse_number<T: FromStr>(key: &str, raw: &str, field: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| KeyError::malformed(key, format!("{} '{}' is not a number", field, raw)))
}
