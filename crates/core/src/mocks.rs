//! In-memory collaborators for testing.
//!
//! `MockCatalog` is a fact table each test populates; it does not react to
//! executed statements. `RecordingExecutor` and `MemorySink` capture what was
//! run and shown.

use crate::error::{PartitionError, PartitionResult};
use crate::table::TableRef;
use crate::traits::{Catalog, KeyColumn, OutputSink, OwnedSequence, ServerVersion, StatementExecutor};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
struct MockTable {
    columns: Vec<(String, String)>,
    primary_key: Vec<KeyColumn>,
    foreign_keys: Vec<String>,
    indexes: Vec<String>,
    sequences: Vec<OwnedSequence>,
    comment: Option<String>,
    trigger_comments: HashMap<String, String>,
    children: Vec<TableRef>,
    ids: Vec<i64>,
}

#[derive(Debug)]
struct CatalogState {
    current_schema: String,
    server_version: ServerVersion,
    tables: HashMap<TableRef, MockTable>,
    functions: HashMap<String, String>,
}

/// Mock schema catalog for testing.
#[derive(Clone)]
pub struct MockCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl MockCatalog {
    /// Create an empty catalog on schema `public`, server version 14.
    pub fn new() -> Self {
        MockCatalog {
            state: Arc::new(Mutex::new(CatalogState {
                current_schema: "public".to_string(),
                server_version: ServerVersion(140_000),
                tables: HashMap::new(),
                functions: HashMap::new(),
            })),
        }
    }

    /// Set the schema unqualified names resolve to.
    pub fn with_current_schema(self, schema: &str) -> Self {
        self.state.lock().unwrap().current_schema = schema.to_string();
        self
    }

    /// Set the reported server version number.
    pub fn with_server_version(self, version_num: u32) -> Self {
        self.state.lock().unwrap().server_version = ServerVersion(version_num);
        self
    }

    fn with_table<R>(&self, table: &TableRef, f: impl FnOnce(&mut MockTable) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(state.tables.entry(table.clone()).or_default())
    }

    /// Register a table with `text` columns.
    pub fn add_table(&self, table: &TableRef, columns: &[&str]) {
        self.with_table(table, |t| {
            t.columns = columns
                .iter()
                .map(|c| (c.to_string(), "text".to_string()))
                .collect();
        });
    }

    /// Drop a table from the catalog.
    pub fn remove_table(&self, table: &TableRef) {
        self.state.lock().unwrap().tables.remove(table);
    }

    /// Set the data type of a column.
    pub fn set_column_type(&self, table: &TableRef, column: &str, data_type: &str) {
        self.with_table(table, |t| {
            match t.columns.iter_mut().find(|(name, _)| name == column) {
                Some(entry) => entry.1 = data_type.to_string(),
                None => t.columns.push((column.to_string(), data_type.to_string())),
            }
        });
    }

    /// Set the primary key as `(column, type)` pairs.
    pub fn set_primary_key(&self, table: &TableRef, key: &[(&str, &str)]) {
        self.with_table(table, |t| {
            t.primary_key = key.iter().map(|(n, ty)| KeyColumn::new(*n, *ty)).collect();
        });
    }

    /// Add a foreign key definition.
    pub fn add_foreign_key(&self, table: &TableRef, definition: &str) {
        self.with_table(table, |t| t.foreign_keys.push(definition.to_string()));
    }

    /// Add a non-primary index definition.
    pub fn add_index(&self, table: &TableRef, definition: &str) {
        self.with_table(table, |t| t.indexes.push(definition.to_string()));
    }

    /// Add a sequence owned by `column`.
    pub fn add_sequence(&self, table: &TableRef, sequence: &str, column: &str) {
        self.with_table(table, |t| {
            t.sequences.push(OwnedSequence {
                schema: table.schema.clone(),
                name: sequence.to_string(),
                column: column.to_string(),
            })
        });
    }

    /// Set the table comment.
    pub fn set_table_comment(&self, table: &TableRef, comment: &str) {
        self.with_table(table, |t| t.comment = Some(comment.to_string()));
    }

    /// Set the comment of a trigger on the table.
    pub fn set_trigger_comment(&self, table: &TableRef, trigger: &str, comment: &str) {
        self.with_table(table, |t| {
            t.trigger_comments
                .insert(trigger.to_string(), comment.to_string());
        });
    }

    /// Register a function body.
    pub fn set_function(&self, name: &str, definition: &str) {
        self.state
            .lock()
            .unwrap()
            .functions
            .insert(name.to_string(), definition.to_string());
    }

    /// Register `child` as an existing inheritance child of `parent`.
    pub fn add_child(&self, parent: &TableRef, child: &TableRef) {
        self.with_table(child, |_| {});
        self.with_table(parent, |t| t.children.push(child.clone()));
    }

    /// Set the primary key values present in a table.
    pub fn set_ids(&self, table: &TableRef, ids: &[i64]) {
        self.with_table(table, |t| t.ids = ids.to_vec());
    }

    fn read<R>(&self, table: &TableRef, f: impl FnOnce(&MockTable) -> R) -> Option<R> {
        self.state.lock().unwrap().tables.get(table).map(f)
    }

    /// Apply the `"<key>" <= N` conditions the cursor generates; other
    /// conditions are not evaluated.
    fn filter_ids(ids: &[i64], column: &str, conditions: &[String]) -> Vec<i64> {
        let prefix = format!("\"{}\" <= ", column);
        let ceiling = conditions
            .iter()
            .filter_map(|c| c.strip_prefix(&prefix))
            .filter_map(|n| n.trim().parse::<i64>().ok())
            .min();
        ids.iter()
            .copied()
            .filter(|id| ceiling.map_or(true, |max| *id <= max))
            .collect()
    }
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn current_schema(&self) -> PartitionResult<String> {
        Ok(self.state.lock().unwrap().current_schema.clone())
    }

    async fn server_version(&self) -> PartitionResult<ServerVersion> {
        Ok(self.state.lock().unwrap().server_version)
    }

    async fn table_exists(&self, table: &TableRef) -> PartitionResult<bool> {
        Ok(self.state.lock().unwrap().tables.contains_key(table))
    }

    async fn columns(&self, table: &TableRef) -> PartitionResult<Vec<String>> {
        Ok(self
            .read(table, |t| t.columns.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default())
    }

    async fn column_data_type(
        &self,
        table: &TableRef,
        column: &str,
    ) -> PartitionResult<Option<String>> {
        Ok(self
            .read(table, |t| {
                t.columns
                    .iter()
                    .find(|(n, _)| n == column)
                    .map(|(_, ty)| ty.clone())
            })
            .flatten())
    }

    async fn primary_key(&self, table: &TableRef) -> PartitionResult<Vec<KeyColumn>> {
        Ok(self.read(table, |t| t.primary_key.clone()).unwrap_or_default())
    }

    async fn foreign_keys(&self, table: &TableRef) -> PartitionResult<Vec<String>> {
        Ok(self.read(table, |t| t.foreign_keys.clone()).unwrap_or_default())
    }

    async fn index_definitions(&self, table: &TableRef) -> PartitionResult<Vec<String>> {
        Ok(self.read(table, |t| t.indexes.clone()).unwrap_or_default())
    }

    async fn sequences(&self, table: &TableRef) -> PartitionResult<Vec<OwnedSequence>> {
        Ok(self.read(table, |t| t.sequences.clone()).unwrap_or_default())
    }

    async fn child_tables(&self, table: &TableRef) -> PartitionResult<Vec<TableRef>> {
        Ok(self.read(table, |t| t.children.clone()).unwrap_or_default())
    }

    async fn table_comment(&self, table: &TableRef) -> PartitionResult<Option<String>> {
        Ok(self.read(table, |t| t.comment.clone()).flatten())
    }

    async fn trigger_comment(
        &self,
        table: &TableRef,
        trigger: &str,
    ) -> PartitionResult<Option<String>> {
        Ok(self
            .read(table, |t| t.trigger_comments.get(trigger).cloned())
            .flatten())
    }

    async fn function_definition(&self, function: &str) -> PartitionResult<Option<String>> {
        Ok(self.state.lock().unwrap().functions.get(function).cloned())
    }

    async fn max_id(
        &self,
        table: &TableRef,
        column: &str,
        conditions: &[String],
    ) -> PartitionResult<i64> {
        let ids = self.read(table, |t| t.ids.clone()).unwrap_or_default();
        Ok(Self::filter_ids(&ids, column, conditions)
            .into_iter()
            .max()
            .unwrap_or(0))
    }

    async fn min_id(
        &self,
        table: &TableRef,
        column: &str,
        conditions: &[String],
    ) -> PartitionResult<Option<i64>> {
        let ids = self.read(table, |t| t.ids.clone()).unwrap_or_default();
        Ok(Self::filter_ids(&ids, column, conditions).into_iter().min())
    }
}

/// A group of statements handed to the executor in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCall {
    /// Whether the statements ran inside one transaction
    pub transactional: bool,
    /// Statements in order
    pub statements: Vec<String>,
}

/// Executor that records calls instead of running them.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<ExecutedCall>>>,
    fail_on: Arc<Mutex<Option<String>>>,
}

impl RecordingExecutor {
    /// Create an executor that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any call containing a statement with `needle` in it.
    ///
    /// A rejected transactional call records nothing, like a rollback; a
    /// rejected `execute_each` call keeps the statements before the failing one.
    pub fn fail_on(&self, needle: &str) {
        *self.fail_on.lock().unwrap() = Some(needle.to_string());
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<ExecutedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Every statement that took effect, flattened.
    pub fn applied(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .flat_map(|c| c.statements)
            .collect()
    }

    fn failing_index(&self, statements: &[String]) -> Option<usize> {
        let needle = self.fail_on.lock().unwrap().clone()?;
        statements.iter().position(|s| s.contains(&needle))
    }
}

#[async_trait]
impl StatementExecutor for RecordingExecutor {
    async fn execute_in_transaction(&self, statements: &[String]) -> PartitionResult<()> {
        if let Some(index) = self.failing_index(statements) {
            return Err(PartitionError::execution(
                Some(&statements[index]),
                "mock failure",
            ));
        }
        self.calls.lock().unwrap().push(ExecutedCall {
            transactional: true,
            statements: statements.to_vec(),
        });
        Ok(())
    }

    async fn execute_each(&self, statements: &[String]) -> PartitionResult<()> {
        let failing = self.failing_index(statements);
        let applied = failing.unwrap_or(statements.len());
        if applied > 0 {
            self.calls.lock().unwrap().push(ExecutedCall {
                transactional: false,
                statements: statements[..applied].to_vec(),
            });
        }
        match failing {
            Some(index) => Err(PartitionError::execution(
                Some(&statements[index]),
                "mock failure",
            )),
            None => Ok(()),
        }
    }
}

/// Sink that keeps everything it is shown.
#[derive(Clone, Default)]
pub struct MemorySink {
    statements: Arc<Mutex<Vec<String>>>,
    batches: Arc<Mutex<Vec<(u64, u64)>>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements shown so far.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    /// `(batch, total)` progress notifications so far.
    pub fn batches(&self) -> Vec<(u64, u64)> {
        self.batches.lock().unwrap().clone()
    }
}

impl OutputSink for MemorySink {
    fn statement(&self, sql: &str) {
        self.statements.lock().unwrap().push(sql.to_string());
    }

    fn batch_finished(&self, batch: u64, total: u64) {
        self.batches.lock().unwrap().push((batch, total));
    }
}
