use thiserror::Error;

/// Result type alias for core parsing operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while interpreting policy, feed or command input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Policy action string is not one of the known actions
    #[error("unknown policy action: {0}")]
    UnknownAction(String),

    /// List category string is not whitelist, blacklist or greylist
    #[error("unknown list type: {0}")]
    UnknownListType(String),

    /// Source format string is not map or dawg
    #[error("unknown source format: {0}")]
    UnknownFormat(String),

    /// Tag name has no assigned bit
    #[error("unknown tag: {0}")]
    UnknownTag(String),

    /// Control command string is not recognised
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A required request field was empty
    #[error("missing field '{field}' for {command}")]
    MissingField {
        /// Command that required the field
        command: String,
        /// Name of the missing field
        field: &'static str,
    },
}
