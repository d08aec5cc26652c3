//! Storage-level errors shared by every repository trait.

use thiserror::Error;

/// Error raised by a repository or unit of work.
///
/// Uniqueness conflicts that callers must branch on (duplicate fills,
/// deduplicated replay requests) are reported as data, never as this error.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The backing store rejected or failed the operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// A persisted row could not be mapped back into a domain type.
    #[error("corrupt row in {table}: {message}")]
    CorruptRow {
        /// Table the row came from.
        table: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// A row expected to exist inside the unit of work was missing.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A payload failed to serialize or deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A stored or received code did not name any known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} code: {value}")]
pub struct ParseCodeError {
    /// Enum being parsed.
    pub kind: &'static str,
    /// Offending input.
    pub value: String,
}

impl ParseCodeError {
    /// Construct a parse error for `kind`.
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl From<ParseCodeError> for RepositoryError {
    fn from(err: ParseCodeError) -> Self {
        Self::CorruptRow {
            table: err.kind,
            message: err.to_string(),
        }
    }
}

impl RepositoryError {
    /// Construct a corrupt-row error.
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::CorruptRow {
            table,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
