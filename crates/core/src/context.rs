//! Execution context shared by every command.
//!
//! Bundles the catalog, the statement executor and the output sink, and
//! decides how statement lists reach the executor. Dry runs go through the
//! same path and only skip the executor call.

use crate::error::PartitionResult;
use crate::introspect::Introspector;
use crate::traits::{Catalog, OutputSink, StatementExecutor};
use chrono::{NaiveDate, Utc};
use partwise_observability::record_statement_failure;
use tracing::debug;

/// Collaborators and switches for one invocation.
pub struct ExecutionContext<'a> {
    catalog: &'a dyn Catalog,
    executor: &'a dyn StatementExecutor,
    output: &'a dyn OutputSink,
    dry_run: bool,
    today: NaiveDate,
}

impl<'a> ExecutionContext<'a> {
    /// Create a live context dated today (UTC).
    pub fn new(
        catalog: &'a dyn Catalog,
        executor: &'a dyn StatementExecutor,
        output: &'a dyn OutputSink,
    ) -> Self {
        ExecutionContext {
            catalog,
            executor,
            output,
            dry_run: false,
            today: Utc::now().date_naive(),
        }
    }

    /// Print statements without executing them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override the date partition windows are computed from.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// The schema catalog.
    pub fn catalog(&self) -> &'a dyn Catalog {
        self.catalog
    }

    /// Typed view over the catalog.
    pub fn introspector(&self) -> Introspector<'a> {
        Introspector::new(self.catalog)
    }

    /// The output sink.
    pub fn output(&self) -> &'a dyn OutputSink {
        self.output
    }

    /// Whether execution is suppressed.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Date partition windows are computed from.
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Show a SQL comment without running anything.
    pub fn note(&self, sql: &str) {
        self.output.statement(sql);
    }

    /// Run statements atomically: all apply or none do.
    pub async fn run_transaction(&self, command: &str, statements: &[String]) -> PartitionResult<()> {
        self.show(statements);
        if self.dry_run {
            return Ok(());
        }
        debug!(command, statements = statements.len(), "executing in transaction");
        self.executor
            .execute_in_transaction(statements)
            .await
            .map_err(|e| {
                record_statement_failure(command, &e.to_string());
                e
            })
    }

    /// Run statements one by one, each committing on its own.
    pub async fn run_each(&self, command: &str, statements: &[String]) -> PartitionResult<()> {
        self.show(statements);
        if self.dry_run {
            return Ok(());
        }
        debug!(command, statements = statements.len(), "executing without transaction");
        self.executor.execute_each(statements).await.map_err(|e| {
            record_statement_failure(command, &e.to_string());
            e
        })
    }

    fn show(&self, statements: &[String]) {
        for statement in statements {
            self.output.statement(statement);
        }
    }
}
