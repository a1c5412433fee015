use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::{PolicyAction, TagMask};

/// Category a source list belongs to. Earlier variants take precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    /// Names that are never blocked
    Whitelist,
    /// Names that are always blocked
    Blacklist,
    /// Names blocked only when the greylist policy says so
    Greylist,
}

impl ListType {
    /// All categories in precedence order
    pub const ALL: [Self; 3] = [Self::Whitelist, Self::Blacklist, Self::Greylist];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Whitelist => "whitelist",
            Self::Blacklist => "blacklist",
            Self::Greylist => "greylist",
        }
    }
}

impl fmt::Display for ListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whitelist" | "allowlist" => Ok(Self::Whitelist),
            "blacklist" | "denylist" => Ok(Self::Blacklist),
            "greylist" | "graylist" => Ok(Self::Greylist),
            other => Err(CoreError::UnknownListType(other.to_string())),
        }
    }
}

/// Storage format of a source list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Hash map; mutable
    #[default]
    Map,
    /// Compressed trie; immutable, loaded once
    Dawg,
}

impl FromStr for SourceFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "map" => Ok(Self::Map),
            "dawg" | "trie" | "fst" => Ok(Self::Dawg),
            other => Err(CoreError::UnknownFormat(other.to_string())),
        }
    }
}

/// A name held by a source list, with the metadata the source attached to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedName {
    /// Lower-case fully qualified name
    pub name: String,

    /// Tags reported for the name
    #[serde(default)]
    pub tags: TagMask,

    /// Action asserted by the source, if any
    #[serde(default)]
    pub action: PolicyAction,

    /// Source list that holds this entry
    pub source: String,

    /// Unix time the entry was added
    #[serde(default)]
    pub added_at: i64,

    /// Reaper bucket the entry is scheduled for, if it expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
}

impl TaggedName {
    /// A name with no tags, action or expiry
    #[must_use]
    pub fn bare(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: TagMask::EMPTY,
            action: PolicyAction::Unknown,
            source: source.into(),
            added_at: 0,
            expires: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_type_precedence_order() {
        assert!(ListType::Whitelist < ListType::Blacklist);
        assert!(ListType::Blacklist < ListType::Greylist);
    }

    #[test]
    fn test_parse_list_type() {
        assert_eq!("GreyList".parse::<ListType>(), Ok(ListType::Greylist));
        assert_eq!("allowlist".parse::<ListType>(), Ok(ListType::Whitelist));
        assert!("redlist".parse::<ListType>().is_err());
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("dawg".parse::<SourceFormat>(), Ok(SourceFormat::Dawg));
        assert_eq!("map".parse::<SourceFormat>(), Ok(SourceFormat::Map));
    }
}
