//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The connection to the store failed or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// An operation was issued against a key holding another data type.
    #[error("WRONGTYPE operation against key '{key}' holding the wrong kind of value")]
    WrongType {
        /// The offending key.
        key: String,
    },

    /// A key that must exist was missing (e.g. the source of a rename).
    #[error("no such key: {key}")]
    NoSuchKey {
        /// The missing key.
        key: String,
    },

    /// The store answered with a reply the caller cannot interpret.
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply {
        /// Name of the command that was sent.
        command: &'static str,
        /// Debug rendering of the reply.
        reply: String,
    },

    /// An argument was rejected by the store.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The adapter has been closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a wrong-type error for `key`.
    pub fn wrong_type(key: impl Into<String>) -> Self {
        Self::WrongType { key: key.into() }
    }

    /// Creates an unexpected-reply error.
    pub fn unexpected_reply(command: &'static str, reply: impl std::fmt::Debug) -> Self {
        Self::UnexpectedReply {
            command,
            reply: format!("{reply:?}"),
        }
    }
}
