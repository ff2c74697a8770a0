//! Seams to the external collaborators: the schema catalog that answers
//! questions about existing tables, the executor that applies statements, and
//! the sink that shows the operator what is being run.

use crate::error::PartitionResult;
use crate::table::TableRef;
use async_trait::async_trait;

/// A primary key column and its SQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    /// Column name
    pub name: String,
    /// Type as rendered by `format_type`
    pub data_type: String,
}

impl KeyColumn {
    /// Create a key column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        KeyColumn {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// Whether `MAX`/`MIN` over the column yields a usable integer cursor.
    pub fn is_numeric(&self) -> bool {
        let base = self.data_type.split('(').next().unwrap_or("").trim();
        matches!(
            base,
            "smallint" | "integer" | "bigint" | "numeric" | "decimal" | "int" | "int2" | "int4" | "int8"
        )
    }
}

/// A sequence owned by one of a table's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedSequence {
    /// Schema of the sequence
    pub schema: String,
    /// Sequence name
    pub name: String,
    /// Column the sequence is owned by
    pub column: String,
}

/// Server version as reported by `server_version_num`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion(pub u32);

impl ServerVersion {
    /// Major version (`90600` is 9, `140005` is 14).
    pub fn major(&self) -> u32 {
        self.0 / 10_000
    }

    /// `lock_timeout` arrived in 9.3.
    pub fn supports_lock_timeout(&self) -> bool {
        self.0 >= 90_300
    }

    /// Indexes on a partitioned parent propagate to its partitions from 11 on.
    pub fn propagates_partition_indexes(&self) -> bool {
        self.0 >= 110_000
    }
}

/// Read-only questions about the current schema.
///
/// Implementations only run catalog queries; nothing here mutates state.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Schema unqualified table names resolve to.
    async fn current_schema(&self) -> PartitionResult<String>;

    /// Version of the connected server.
    async fn server_version(&self) -> PartitionResult<ServerVersion>;

    /// Whether the table exists.
    async fn table_exists(&self, table: &TableRef) -> PartitionResult<bool>;

    /// Column names in ordinal order.
    async fn columns(&self, table: &TableRef) -> PartitionResult<Vec<String>>;

    /// `information_schema` data type of a column, if the column exists.
    async fn column_data_type(&self, table: &TableRef, column: &str)
        -> PartitionResult<Option<String>>;

    /// Primary key columns, empty when there is none.
    async fn primary_key(&self, table: &TableRef) -> PartitionResult<Vec<KeyColumn>>;

    /// Foreign key constraint definitions (`pg_get_constraintdef`).
    async fn foreign_keys(&self, table: &TableRef) -> PartitionResult<Vec<String>>;

    /// Definitions of every index except the primary key (`pg_get_indexdef`).
    async fn index_definitions(&self, table: &TableRef) -> PartitionResult<Vec<String>>;

    /// Sequences owned by the table's columns.
    async fn sequences(&self, table: &TableRef) -> PartitionResult<Vec<OwnedSequence>>;

    /// Direct inheritance children of the table.
    async fn child_tables(&self, table: &TableRef) -> PartitionResult<Vec<TableRef>>;

    /// Comment on the table.
    async fn table_comment(&self, table: &TableRef) -> PartitionResult<Option<String>>;

    /// Comment on a trigger of the table.
    async fn trigger_comment(&self, table: &TableRef, trigger: &str)
        -> PartitionResult<Option<String>>;

    /// Source of a function (`pg_get_functiondef`), looked up by name.
    async fn function_definition(&self, function: &str) -> PartitionResult<Option<String>>;

    /// `MAX(column)` with optional SQL conditions, 0 for an empty result.
    async fn max_id(&self, table: &TableRef, column: &str, conditions: &[String])
        -> PartitionResult<i64>;

    /// `MIN(column)` with optional SQL conditions.
    async fn min_id(&self, table: &TableRef, column: &str, conditions: &[String])
        -> PartitionResult<Option<i64>>;
}

/// Applies generated statements.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Run every statement inside one transaction; any failure rolls all of
    /// them back.
    async fn execute_in_transaction(&self, statements: &[String]) -> PartitionResult<()>;

    /// Run each statement on its own, committing as it goes.
    async fn execute_each(&self, statements: &[String]) -> PartitionResult<()>;
}

/// Where generated SQL is shown to the operator.
pub trait OutputSink: Send + Sync {
    /// A statement (or SQL comment) about to run, or that would run in a dry run.
    fn statement(&self, sql: &str);

    /// A backfill batch has been applied.
    fn batch_finished(&self, _batch: u64, _total: u64) {}
}
