use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::{ListType, PolicyAction};

/// Control-plane commands understood by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Force the zone serial forward and notify downstreams
    #[serde(rename = "BUMP")]
    Bump,
    /// Add a name to a greylist source
    #[serde(rename = "RPZ-ADD")]
    RpzAdd,
    /// Report which lists hold a name and what the policy makes of it
    #[serde(rename = "RPZ-LOOKUP")]
    RpzLookup,
    /// Remove a name from a greylist source
    #[serde(rename = "RPZ-REMOVE")]
    RpzRemove,
    /// Report every configured source list
    #[serde(rename = "RPZ-LIST-SOURCES")]
    RpzListSources,
}

impl Command {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bump => "BUMP",
            Self::RpzAdd => "RPZ-ADD",
            Self::RpzLookup => "RPZ-LOOKUP",
            Self::RpzRemove => "RPZ-REMOVE",
            Self::RpzListSources => "RPZ-LIST-SOURCES",
        }
    }

    /// True for commands that may change zone content
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        matches!(self, Self::Bump | Self::RpzAdd | Self::RpzRemove)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('_', "-").as_str() {
            "BUMP" => Ok(Self::Bump),
            "RPZ-ADD" => Ok(Self::RpzAdd),
            "RPZ-LOOKUP" => Ok(Self::RpzLookup),
            "RPZ-REMOVE" => Ok(Self::RpzRemove),
            "RPZ-LIST-SOURCES" => Ok(Self::RpzListSources),
            other => Err(CoreError::UnknownCommand(other.to_string())),
        }
    }
}

/// A control-plane request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: Command,

    /// Zone the command targets (the output zone)
    #[serde(default)]
    pub zone: String,

    /// Domain name for add/remove/lookup
    #[serde(default)]
    pub domain: String,

    /// Category of the source list for add/remove
    #[serde(default, rename = "listtype")]
    pub list_type: Option<ListType>,

    /// Source list for add/remove
    #[serde(default)]
    pub source: String,

    /// Action to record with an added name
    #[serde(default)]
    pub policy: Option<PolicyAction>,
}

impl CommandRequest {
    /// A request with only the command and zone set
    #[must_use]
    pub fn new(command: Command, zone: impl Into<String>) -> Self {
        Self {
            command,
            zone: zone.into(),
            domain: String::new(),
            list_type: None,
            source: String::new(),
            policy: None,
        }
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    #[must_use]
    pub fn with_source(mut self, list_type: ListType, source: impl Into<String>) -> Self {
        self.list_type = Some(list_type);
        self.source = source.into();
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: PolicyAction) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Check that the fields this command needs are present
    pub fn validate(&self) -> Result<(), CoreError> {
        let missing = |field| CoreError::MissingField {
            command: self.command.to_string(),
            field,
        };
        if self.zone.trim().is_empty() {
            return Err(missing("zone"));
        }
        match self.command {
            Command::Bump | Command::RpzListSources => Ok(()),
            Command::RpzLookup => {
                if self.domain.trim().is_empty() {
                    return Err(missing("domain"));
                }
                Ok(())
            }
            Command::RpzAdd | Command::RpzRemove => {
                if self.domain.trim().is_empty() {
                    return Err(missing("domain"));
                }
                if self.source.trim().is_empty() {
                    return Err(missing("source"));
                }
                Ok(())
            }
        }
    }
}

/// Reply to a control-plane request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(rename = "msg")]
    pub message: String,

    pub error: bool,

    #[serde(default, rename = "errormsg")]
    pub error_message: String,

    #[serde(rename = "oldserial")]
    pub old_serial: u32,

    #[serde(rename = "newserial")]
    pub new_serial: u32,
}

impl CommandResponse {
    /// Successful reply
    #[must_use]
    pub fn ok(message: impl Into<String>, old_serial: u32, new_serial: u32) -> Self {
        Self {
            message: message.into(),
            error: false,
            error_message: String::new(),
            old_serial,
            new_serial,
        }
    }

    /// Error reply; serials are reported unchanged
    #[must_use]
    pub fn failure(error: impl fmt::Display, serial: u32) -> Self {
        Self {
            message: String::new(),
            error: true,
            error_message: error.to_string(),
            old_serial: serial,
            new_serial: serial,
        }
    }
}
