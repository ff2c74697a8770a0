//! Applies generated statements to the database.

use crate::error::statement_failed;
use async_trait::async_trait;
use partwise_core::{PartitionResult, StatementExecutor};
use sqlx::postgres::PgPool;
use sqlx::Executor;
use tracing::debug;

/// Runs statements over the simple query protocol, so DDL and function
/// bodies are sent as written.
#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    /// Create an executor over a connection pool.
    pub fn new(pool: PgPool) -> Self {
        PgExecutor { pool }
    }
}

#[async_trait]
impl StatementExecutor for PgExecutor {
    async fn execute_in_transaction(&self, statements: &[String]) -> PartitionResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| statement_failed(None, e))?;

        for statement in statements {
            debug!(statement = %statement, "executing");
            // dropping the transaction on error rolls it back
            (&mut *tx)
                .execute(sqlx::raw_sql(statement))
                .await
                .map_err(|e| statement_failed(Some(statement), e))?;
        }

        tx.commit().await.map_err(|e| statement_failed(None, e))
    }

    async fn execute_each(&self, statements: &[String]) -> PartitionResult<()> {
        for statement in statements {
            debug!(statement = %statement, "executing");
            let result = sqlx::raw_sql(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| statement_failed(Some(statement), e))?;
            debug!(rows = result.rows_affected(), "statement applied");
        }
        Ok(())
    }
}
