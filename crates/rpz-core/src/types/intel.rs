use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{ListType, TagMask};

/// One verified update from the threat-intelligence feed
///
/// Signature checks happen before a batch reaches the server; a batch is
/// trusted as-is but still validated for shape before it is applied.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntelBatch {
    /// Source list the batch applies to
    #[serde(rename = "src")]
    pub source: String,

    /// Category of that list
    #[serde(rename = "listtype")]
    pub list_type: Option<ListType>,

    /// Names added or re-tagged
    #[serde(default)]
    pub added: Vec<IntelAddition>,

    /// Names withdrawn
    #[serde(default)]
    pub removed: Vec<IntelRemoval>,
}

/// A name added by the feed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntelAddition {
    pub name: String,

    /// Tag names; combined with `tagmask`
    #[serde(default)]
    pub tags: Vec<String>,

    /// Numeric tag bits
    #[serde(default)]
    pub tagmask: u32,

    /// Seconds until the name should be reaped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl IntelAddition {
    /// Effective tag mask from both the names and the numeric mask
    pub fn tag_mask(&self) -> Result<TagMask, CoreError> {
        Ok(TagMask::from_names(&self.tags)? | TagMask::from_bits(self.tagmask)?)
    }
}

/// A name withdrawn by the feed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntelRemoval {
    pub name: String,
}

impl IntelBatch {
    /// True if the batch carries no changes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Every name the batch touches, additions first
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .map(|a| a.name.as_str())
            .chain(self.removed.iter().map(|r| r.name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_feed_batch() {
        let json = r#"{
            "src": "dns-tapir",
            "listtype": "greylist",
            "added": [{"name": "bad.example.", "tags": ["newname"], "tagmask": 4, "ttl": 3600}],
            "removed": [{"name": "old.example."}]
        }"#;
        let batch: IntelBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.source, "dns-tapir");
        assert_eq!(batch.list_type, Some(ListType::Greylist));
        assert_eq!(
            batch.added[0].tag_mask().unwrap(),
            TagMask::NEW_NAME | TagMask::BAD_IP
        );
        assert_eq!(batch.added[0].ttl, Some(3600));
        assert_eq!(
            batch.names().collect::<Vec<_>>(),
            vec!["bad.example.", "old.example."]
        );
    }

    #[test]
    fn test_unknown_tag_in_addition() {
        let add = IntelAddition {
            name: "x.example.".into(),
            tags: vec!["nope".into()],
            ..Default::default()
        };
        assert!(add.tag_mask().is_err());
    }

    #[test]
    fn test_unnamed_tag_bits_in_addition() {
        let add = IntelAddition {
            name: "x.example.".into(),
            tagmask: u32::MAX,
            ..Default::default()
        };
        assert!(add.tag_mask().is_err());
    }
}
