use std::path::PathBuf;
use thiserror::Error;

/// Problems with the static configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot deserialize settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid regex pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{name} must be between 0 and 100, got {value}")]
    ThresholdOutOfRange { name: &'static str, value: u8 },

    #[error("Empty entry in {list}")]
    EmptyEntry { list: &'static str },

    #[error("Poll interval must be at least one second")]
    ZeroPollInterval,

    #[error("Category name {0:?} is not usable as a mailbox keyword")]
    InvalidCategoryName(String),

    #[error("Duplicate category {0:?}")]
    DuplicateCategory(String),
}

/// A single mailbox read or write failed.
#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("Cannot fetch unread messages: {0}")]
    Fetch(String),

    #[error("Cannot parse message {message_id}: {reason}")]
    Parse { message_id: String, reason: String },

    #[error("Cannot tag message {message_id}: {reason}")]
    Store { message_id: String, reason: String },

    #[error("Connection to the mailbox was lost: {0}")]
    Disconnected(String),
}

impl MailboxError {
    /// A lost connection cannot be recovered by the next poll.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MailboxError::Disconnected(_))
    }
}

/// The mailbox could not be opened. Fatal to the current monitoring run.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Cannot connect to {server}:{port}: {reason}")]
    Connect {
        server: String,
        port: u16,
        reason: String,
    },

    #[error("Login failed for {username}: {reason}")]
    Login { username: String, reason: String },

    #[error("Cannot load credentials: {0}")]
    Credentials(String),

    #[error("Unable to find mailbox {0}")]
    MailboxNotFound(String),

    #[error("No IMAP account configured")]
    NotConfigured,

    #[error(transparent)]
    Lost(#[from] MailboxError),
}
