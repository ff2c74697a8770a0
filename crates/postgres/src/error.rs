//! Mapping of driver errors onto partition errors.

use partwise_core::PartitionError;

/// Text of a driver error, preferring the server's own message.
pub(crate) fn describe(error: &sqlx::Error) -> String {
    match error {
        sqlx::Error::Database(db) => match db.code() {
            Some(code) => format!("{} (SQLSTATE {})", db.message(), code),
            None => db.message().to_string(),
        },
        other => other.to_string(),
    }
}

/// A catalog query failed.
pub(crate) fn query_failed(query: &str, error: sqlx::Error) -> PartitionError {
    PartitionError::catalog(format!("{} failed: {}", query.trim(), describe(&error)))
}

/// The server rejected a generated statement.
pub(crate) fn statement_failed(statement: Option<&str>, error: sqlx::Error) -> PartitionError {
    PartitionError::execution(statement, describe(&error))
}
