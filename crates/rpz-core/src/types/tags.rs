use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use crate::error::CoreError;

/// Tag names in bit order. Position `i` is bit `1 << i`.
pub const TAG_NAMES: [&str; 14] = [
    "newname",
    "highvolume",
    "badip",
    "cdntracker",
    "likelymalware",
    "likelybotnet",
    "likelyphish",
    "likelyspam",
    "spamsource",
    "excessiveclients",
    "adware",
    "cryptomining",
    "flux",
    "nonexistent",
];

/// Observations attached to a name by the intelligence feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagMask(pub u32);

impl TagMask {
    /// No tags
    pub const EMPTY: Self = Self(0);
    /// Name was first seen recently
    pub const NEW_NAME: Self = Self(1 << 0);
    /// Name receives unusually many queries
    pub const HIGH_VOLUME: Self = Self(1 << 1);
    /// Name resolves to a known bad address
    pub const BAD_IP: Self = Self(1 << 2);
    /// Name belongs to a CDN used for tracking
    pub const CDN_TRACKER: Self = Self(1 << 3);
    /// Name is likely used for malware delivery
    pub const LIKELY_MALWARE: Self = Self(1 << 4);
    /// Name is likely a botnet controller
    pub const LIKELY_BOTNET: Self = Self(1 << 5);
    /// Every bit that has a tag name
    pub const ALL: Self = Self((1 << TAG_NAMES.len()) - 1);

    /// Look up the mask for a single tag name (case-insensitive)
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        let lower = name.trim().to_ascii_lowercase();
        TAG_NAMES
            .iter()
            .position(|t| *t == lower)
            .map(|i| Self(1 << i))
            .ok_or_else(|| CoreError::UnknownTag(name.to_string()))
    }

    /// Mask from raw bits. Bits without a tag name are rejected.
    pub fn from_bits(bits: u32) -> Result<Self, CoreError> {
        let unknown = bits & !Self::ALL.0;
        if unknown != 0 {
            return Err(CoreError::UnknownTag(format!("{unknown:#x}")));
        }
        Ok(Self(bits))
    }

    /// Combine a list of tag names into one mask
    pub fn from_names<I, S>(names: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .try_fold(Self::EMPTY, |acc, n| Ok(acc | Self::from_name(n.as_ref())?))
    }

    /// Number of tags set
    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if any bit of `other` is also set here
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Names of the tags set, in bit order
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        TAG_NAMES
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0 & (1 << i) != 0)
            .map(|(_, n)| *n)
            .collect()
    }
}

impl BitOr for TagMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TagMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TagMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for TagMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join("|"))
    }
}
