//! Schema catalog backed by the PostgreSQL system catalogs.

use crate::error::query_failed;
use async_trait::async_trait;
use partwise_core::{
    quote_ident, Catalog, KeyColumn, OwnedSequence, PartitionError, PartitionResult,
    ServerVersion, TableRef,
};
use sqlx::postgres::PgPool;
use sqlx::Row;

/// Answers schema questions with catalog queries.
///
/// Lookups that take a `regclass` expect the table to exist; callers check
/// with [`Catalog::table_exists`] first.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    /// Create a catalog over a connection pool.
    pub fn new(pool: PgPool) -> Self {
        PgCatalog { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn aggregate_id(
        &self,
        function: &str,
        table: &TableRef,
        column: &str,
        conditions: &[String],
    ) -> PartitionResult<Option<i64>> {
        let mut query = format!(
            "SELECT {}({})::bigint FROM {}",
            function,
            quote_ident(column),
            table.quoted()
        );
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }

        let row = sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_failed(&query, e))?;
        row.try_get::<Option<i64>, _>(0)
            .map_err(|e| query_failed(&query, e))
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn current_schema(&self) -> PartitionResult<String> {
        let schema: Option<String> = sqlx::query_scalar("SELECT current_schema()::text")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_failed("current_schema", e))?;
        schema.ok_or_else(|| PartitionError::catalog("No schema is selected in search_path"))
    }

    async fn server_version(&self) -> PartitionResult<ServerVersion> {
        let version: String = sqlx::query_scalar("SHOW server_version_num")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_failed("server_version_num", e))?;
        version
            .trim()
            .parse()
            .map(ServerVersion)
            .map_err(|_| PartitionError::catalog(format!("Unexpected server version: {}", version)))
    }

    async fn table_exists(&self, table: &TableRef) -> PartitionResult<bool> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM pg_catalog.pg_class c
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p')
            )
            "#,
        )
        .bind(&table.schema)
        .bind(&table.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_failed("table_exists", e))
    }

    async fn columns(&self, table: &TableRef) -> PartitionResult<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT column_name::text FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(&table.schema)
        .bind(&table.name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("columns", e))
    }

    async fn column_data_type(
        &self,
        table: &TableRef,
        column: &str,
    ) -> PartitionResult<Option<String>> {
        sqlx::query_scalar(
            r#"
            SELECT data_type::text FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2 AND column_name = $3
            "#,
        )
        .bind(&table.schema)
        .bind(&table.name)
        .bind(column)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("column_data_type", e))
    }

    async fn primary_key(&self, table: &TableRef) -> PartitionResult<Vec<KeyColumn>> {
        let rows = sqlx::query(
            r#"
            SELECT a.attname::text AS name, format_type(a.atttypid, a.atttypmod) AS data_type
            FROM pg_catalog.pg_index i
            JOIN pg_catalog.pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
            WHERE i.indrelid = $1::regclass AND i.indisprimary
            ORDER BY a.attnum
            "#,
        )
        .bind(table.quoted())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("primary_key", e))?;

        rows.iter()
            .map(|row| -> PartitionResult<KeyColumn> {
                Ok(KeyColumn::new(
                    row.try_get::<String, _>("name")
                        .map_err(|e| query_failed("primary_key", e))?,
                    row.try_get::<String, _>("data_type")
                        .map_err(|e| query_failed("primary_key", e))?,
                ))
            })
            .collect()
    }

    async fn foreign_keys(&self, table: &TableRef) -> PartitionResult<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT pg_get_constraintdef(oid) FROM pg_catalog.pg_constraint
            WHERE conrelid = $1::regclass AND contype = 'f'
            ORDER BY conname
            "#,
        )
        .bind(table.quoted())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("foreign_keys", e))
    }

    async fn index_definitions(&self, table: &TableRef) -> PartitionResult<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT pg_get_indexdef(indexrelid) FROM pg_catalog.pg_index
            WHERE indrelid = $1::regclass AND indisprimary = 'f'
            ORDER BY indexrelid
            "#,
        )
        .bind(table.quoted())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("index_definitions", e))
    }

    async fn sequences(&self, table: &TableRef) -> PartitionResult<Vec<OwnedSequence>> {
        let rows = sqlx::query(
            r#"
            SELECT
                a.attname::text AS related_column,
                n.nspname::text AS sequence_schema,
                s.relname::text AS sequence_name
            FROM pg_catalog.pg_class s
            JOIN pg_catalog.pg_depend d ON d.objid = s.oid
            JOIN pg_catalog.pg_class t ON d.refobjid = t.oid
            JOIN pg_catalog.pg_attribute a ON a.attrelid = d.refobjid AND a.attnum = d.refobjsubid
            JOIN pg_catalog.pg_namespace n ON n.oid = s.relnamespace
            JOIN pg_catalog.pg_namespace nt ON nt.oid = t.relnamespace
            WHERE s.relkind = 'S' AND nt.nspname = $1 AND t.relname = $2
            ORDER BY s.relname
            "#,
        )
        .bind(&table.schema)
        .bind(&table.name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("sequences", e))?;

        rows.iter()
            .map(|row| -> PartitionResult<OwnedSequence> {
                let get = |column: &str| {
                    row.try_get::<String, _>(column)
                        .map_err(|e| query_failed("sequences", e))
                };
                Ok(OwnedSequence {
                    schema: get("sequence_schema")?,
                    name: get("sequence_name")?,
                    column: get("related_column")?,
                })
            })
            .collect()
    }

    async fn child_tables(&self, table: &TableRef) -> PartitionResult<Vec<TableRef>> {
        let rows = sqlx::query(
            r#"
            SELECT n.nspname::text AS schema, c.relname::text AS name
            FROM pg_catalog.pg_inherits i
            JOIN pg_catalog.pg_class c ON c.oid = i.inhrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE i.inhparent = $1::regclass
            ORDER BY c.relname
            "#,
        )
        .bind(table.quoted())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("child_tables", e))?;

        rows.iter()
            .map(|row| -> PartitionResult<TableRef> {
                let schema: String = row
                    .try_get("schema")
                    .map_err(|e| query_failed("child_tables", e))?;
                let name: String = row
                    .try_get("name")
                    .map_err(|e| query_failed("child_tables", e))?;
                Ok(TableRef::new(schema, name))
            })
            .collect()
    }

    async fn table_comment(&self, table: &TableRef) -> PartitionResult<Option<String>> {
        sqlx::query_scalar("SELECT obj_description($1::regclass, 'pg_class')")
            .bind(table.quoted())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_failed("table_comment", e))
    }

    async fn trigger_comment(
        &self,
        table: &TableRef,
        trigger: &str,
    ) -> PartitionResult<Option<String>> {
        let comment: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT obj_description(oid, 'pg_trigger') FROM pg_catalog.pg_trigger
            WHERE tgname = $1 AND tgrelid = $2::regclass
            "#,
        )
        .bind(trigger)
        .bind(table.quoted())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("trigger_comment", e))?;
        Ok(comment.flatten())
    }

    async fn function_definition(&self, function: &str) -> PartitionResult<Option<String>> {
        sqlx::query_scalar(
            "SELECT pg_get_functiondef(oid) FROM pg_catalog.pg_proc WHERE proname = $1 ORDER BY oid LIMIT 1",
        )
        .bind(function)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("function_definition", e))
    }

    async fn max_id(
        &self,
        table: &TableRef,
        column: &str,
        conditions: &[String],
    ) -> PartitionResult<i64> {
        Ok(self
            .aggregate_id("MAX", table, column, conditions)
            .await?
            .unwrap_or(0))
    }

    async fn min_id(
        &self,
        table: &TableRef,
        column: &str,
        conditions: &[String],
    ) -> PartitionResult<Option<i64>> {
        self.aggregate_id("MIN", table, column, conditions).await
    }
}
