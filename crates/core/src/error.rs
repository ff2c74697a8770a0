//! Error types for partition lifecycle operations.
//!
//! Errors fall into two groups:
//! - **precondition** errors are detected while gathering facts, before any
//!   statement is generated, so nothing has changed in the database;
//! - **runtime** errors come back from the catalog or from the database
//!   rejecting a generated statement.

use thiserror::Error;

/// Errors that can occur while planning or applying a lifecycle transition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PartitionError {
    /// Wrong combination or number of arguments
    #[error("Usage: {0}")]
    Usage(String),

    /// A table required by the command does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// A table the command would create already exists
    #[error("Table already exists: {0}")]
    TableExists(String),

    /// The partitioning column is not part of the table
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Unrecognised period keyword
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// Unrecognised cast keyword
    #[error("Invalid cast: {0}")]
    InvalidCast(String),

    /// No partition metadata could be recovered for the table
    #[error("No settings found: {table}{}", .hint.as_deref().map(|h| format!("\n{}", h)).unwrap_or_default())]
    NoSettings {
        /// Table that was inspected
        table: String,
        /// Optional operator hint
        hint: Option<String>,
    },

    /// The destination of a fill has no primary key
    #[error("No primary key")]
    NoPrimaryKey,

    /// The destination primary key cannot drive a numeric cursor
    #[error("{0}")]
    UnsupportedPrimaryKey(String),

    /// A stored metadata comment could not be parsed
    #[error("Invalid partition metadata: {0}")]
    InvalidMetadata(String),

    /// The schema catalog failed to answer a query
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// The database rejected a generated statement
    #[error("Execution error: {message}")]
    Execution {
        /// Statement that failed, if known
        statement: Option<String>,
        /// Database error class and message
        message: String,
    },
}

impl PartitionError {
    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create a catalog error
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }

    /// Create an execution error for a statement
    pub fn execution(statement: Option<&str>, message: impl Into<String>) -> Self {
        Self::Execution {
            statement: statement.map(str::to_string),
            message: message.into(),
        }
    }

    /// Whether the error was raised before any statement was generated.
    pub fn is_precondition(&self) -> bool {
        !matches!(self, Self::Catalog(_) | Self::Execution { .. })
    }
}

/// Result type for partition lifecycle operations.
pub type PartitionResult<T> = Result<T, PartitionError>;
