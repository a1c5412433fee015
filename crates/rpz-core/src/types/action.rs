use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// CNAME target meaning "answer NXDOMAIN"
pub const TARGET_NXDOMAIN: &str = ".";
/// CNAME target meaning "answer NOERROR with no data"
pub const TARGET_NODATA: &str = "*.";
/// CNAME target meaning "drop the query"
pub const TARGET_DROP: &str = "rpz-drop.";
/// CNAME target meaning "pass through unmodified"
pub const TARGET_PASSTHRU: &str = "rpz-passthru.";

/// What a resolver should do with a name listed in the policy zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyAction {
    /// Not blocked; never emitted into the output zone
    Whitelist,
    /// Pretend the name does not exist
    Nxdomain,
    /// Pretend the name exists but has no records
    Nodata,
    /// Silently drop the query
    Drop,
    /// No action asserted
    #[default]
    Unknown,
}

impl PolicyAction {
    /// Returns true if a name with this action belongs in the output zone
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Nxdomain | Self::Nodata | Self::Drop)
    }

    /// RPZ CNAME target encoding this action
    #[must_use]
    pub const fn rpz_target(self) -> Option<&'static str> {
        match self {
            Self::Nxdomain => Some(TARGET_NXDOMAIN),
            Self::Nodata => Some(TARGET_NODATA),
            Self::Drop => Some(TARGET_DROP),
            Self::Whitelist => Some(TARGET_PASSTHRU),
            Self::Unknown => None,
        }
    }

    /// Decode an RPZ CNAME target back into an action
    #[must_use]
    pub fn from_rpz_target(target: &str) -> Self {
        match target.to_ascii_lowercase().as_str() {
            TARGET_NXDOMAIN => Self::Nxdomain,
            TARGET_NODATA => Self::Nodata,
            TARGET_DROP => Self::Drop,
            TARGET_PASSTHRU => Self::Whitelist,
            _ => Self::Unknown,
        }
    }

    /// Bit used when action flags from several sources are OR-ed together
    #[must_use]
    pub const fn flag(self) -> u8 {
        match self {
            Self::Whitelist => 0x01,
            Self::Nxdomain => 0x02,
            Self::Nodata => 0x04,
            Self::Drop => 0x08,
            Self::Unknown => 0x00,
        }
    }

    /// Canonical upper-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Whitelist => "WHITELIST",
            Self::Nxdomain => "NXDOMAIN",
            Self::Nodata => "NODATA",
            Self::Drop => "DROP",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WHITELIST" | "PASSTHRU" => Ok(Self::Whitelist),
            "NXDOMAIN" => Ok(Self::Nxdomain),
            "NODATA" => Ok(Self::Nodata),
            "DROP" => Ok(Self::Drop),
            "UNKNOWN" | "" => Ok(Self::Unknown),
            other => Err(CoreError::UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpz_targets() {
        assert_eq!(PolicyAction::Nxdomain.rpz_target(), Some("."));
        assert_eq!(PolicyAction::Nodata.rpz_target(), Some("*."));
        assert_eq!(PolicyAction::Drop.rpz_target(), Some("rpz-drop."));
        assert_eq!(PolicyAction::Whitelist.rpz_target(), Some("rpz-passthru."));
        assert_eq!(PolicyAction::Unknown.rpz_target(), None);
    }

    #[test]
    fn test_target_decoding() {
        assert_eq!(PolicyAction::from_rpz_target("."), PolicyAction::Nxdomain);
        assert_eq!(PolicyAction::from_rpz_target("RPZ-DROP."), PolicyAction::Drop);
        assert_eq!(
            PolicyAction::from_rpz_target("walled.garden.example."),
            PolicyAction::Unknown
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!("nxdomain".parse::<PolicyAction>(), Ok(PolicyAction::Nxdomain));
        assert_eq!("PASSTHRU".parse::<PolicyAction>(), Ok(PolicyAction::Whitelist));
        assert!("block".parse::<PolicyAction>().is_err());
    }

    #[test]
    fn test_blocking() {
        assert!(PolicyAction::Drop.is_blocking());
        assert!(!PolicyAction::Whitelist.is_blocking());
        assert!(!PolicyAction::Unknown.is_blocking());
    }

    #[test]
    fn test_serde_uses_upper_case() {
        let json = serde_json::to_string(&PolicyAction::Nodata).unwrap();
        assert_eq!(json, "\"NODATA\"");
    }
}
