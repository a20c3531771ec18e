//! Watch/black/staff-list membership keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{EntityIds, HierarchyLevel, KeyError, Result, HIERARCHY_DELIMITER};

/// Membership lists an entity can be placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListType {
    Blacklist,
    Watchlist,
    Stafflist,
}

impl ListType {
    pub const ALL: [ListType; 3] = [ListType::Blacklist, ListType::Watchlist, ListType::Stafflist];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListType::Blacklist => "BLACKLIST",
            ListType::Watchlist => "WATCHLIST",
            ListType::Stafflist => "STAFFLIST",
        }
    }

    /// Suffix of the `EVALUATED-*` partition holding hits for this list.
    pub fn evaluated_suffix(&self) -> &'static str {
        match self {
            ListType::Stafflist => "STAFF",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for ListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListType {
    type Err = KeyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BLACKLIST" => Ok(ListType::Blacklist),
            "WATCHLIST" => Ok(ListType::Watchlist),
            "STAFFLIST" | "STAFF" => Ok(ListType::Stafflist),
            _ => Err(KeyError::malformed(
                s,
                "list type must be BLACKLIST | WATCHLIST | STAFFLIST",
            )),
        }
    }
}

/// `{LIST_TYPE}-{channel}-{LEVEL}`: list type upper-cased, channel lower-cased.
pub fn build_list_partition_key(list_type: &str, channel: &str, level: HierarchyLevel) -> String {
    format!(
        "{}-{}-{}",
        list_type.to_uppercase(),
        channel.to_lowercase(),
        level.as_str()
    )
}

/// Sort key of a list member at `level`.
///
/// ACCOUNT and PROCESSOR use their own id; MERCHANT and PRODUCT use the
/// processor-rooted hierarchy join. Every id the level needs must be present.
pub fn list_sort_key(level: HierarchyLevel, ids: &EntityIds) -> Result<String> {
    let path = level.key_path();
    if let Some(missing) = path.iter().find(|l| ids.get(**l).is_none()) {
        return Err(KeyError::malformed(
            level.as_str(),
            format!("{} id is required for a {} list entry", missing, level),
        ));
    }

    Ok(path
        .iter()
        .filter_map(|l| ids.get(*l))
        .collect::<Vec<_>>()
        .join(HIERARCHY_DELIMITER))
}
