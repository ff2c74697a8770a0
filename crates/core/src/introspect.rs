//! Typed answers about the current schema, built on top of a [`Catalog`].

use crate::error::{PartitionError, PartitionResult};
use crate::metadata::{MetadataSources, RecoveredMetadata};
use crate::period::{Cast, Period};
use crate::table::TableRef;
use crate::traits::Catalog;
use chrono::NaiveDate;
use tracing::{debug, warn};

/// A child table covering `[start, end)` of the partitioning column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// The child table
    pub table: TableRef,
    /// Inclusive lower bound
    pub start: NaiveDate,
    /// Exclusive upper bound
    pub end: NaiveDate,
}

impl Partition {
    /// The partition of `original` that starts at `start`, if its end is a
    /// representable date.
    pub fn for_period(original: &TableRef, period: Period, start: NaiveDate) -> Option<Self> {
        Some(Partition {
            table: original.partition(&period.name_suffix(start)),
            start,
            end: period.advance(start, 1)?,
        })
    }
}

/// Wraps catalog queries into the facts lifecycle commands need.
pub struct Introspector<'a> {
    catalog: &'a dyn Catalog,
}

impl<'a> Introspector<'a> {
    /// Create an introspector over a catalog.
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Introspector { catalog }
    }

    /// The underlying catalog.
    pub fn catalog(&self) -> &'a dyn Catalog {
        self.catalog
    }

    /// Normalize an operator-supplied name to a schema-qualified reference.
    pub async fn resolve(&self, input: &str) -> PartitionResult<TableRef> {
        if input.contains('.') {
            return Ok(TableRef::parse(input, ""));
        }
        let schema = self.catalog.current_schema().await?;
        Ok(TableRef::parse(input, &schema))
    }

    /// Fail unless the table exists.
    pub async fn require_table(&self, table: &TableRef) -> PartitionResult<()> {
        if self.catalog.table_exists(table).await? {
            Ok(())
        } else {
            Err(PartitionError::TableNotFound(table.to_string()))
        }
    }

    /// Fail if the table exists.
    pub async fn require_no_table(&self, table: &TableRef) -> PartitionResult<()> {
        if self.catalog.table_exists(table).await? {
            Err(PartitionError::TableExists(table.to_string()))
        } else {
            Ok(())
        }
    }

    /// Cast for boundary literals of `column`, or `None` if the column is missing.
    pub async fn column_cast(&self, table: &TableRef, column: &str) -> PartitionResult<Option<Cast>> {
        Ok(self
            .catalog
            .column_data_type(table, column)
            .await?
            .map(|data_type| Cast::from_data_type(&data_type)))
    }

    /// Recover the partition settings stored for `original`, looking on
    /// `candidate` (the intermediate or the live table).
    pub async fn partition_metadata(
        &self,
        original: &TableRef,
        candidate: &TableRef,
    ) -> PartitionResult<Option<RecoveredMetadata>> {
        let trigger_name = original.trigger_name();
        let sources = MetadataSources {
            trigger_comment: self.catalog.trigger_comment(candidate, &trigger_name).await?,
            table_comment: self.catalog.table_comment(candidate).await?,
            function_definition: self.catalog.function_definition(&trigger_name).await?,
        };
        let recovered = sources.recover()?;
        if let Some(recovered) = &recovered {
            debug!(
                table = %candidate,
                strategy = %recovered.metadata.strategy,
                needs_comment = recovered.needs_comment,
                "recovered partition settings"
            );
        }
        Ok(recovered)
    }

    /// Existing partitions of `parent` named after `original`, ordered by start.
    ///
    /// Children whose name does not carry a period suffix are skipped.
    pub async fn partitions(
        &self,
        parent: &TableRef,
        original: &TableRef,
        period: Period,
    ) -> PartitionResult<Vec<Partition>> {
        let prefix = format!("{}_", original.name);
        let mut partitions = Vec::new();
        for child in self.catalog.child_tables(parent).await? {
            let bounds = child
                .name
                .strip_prefix(&prefix)
                .and_then(|suffix| period.parse_suffix(suffix))
                .and_then(|start| Some((start, period.advance(start, 1)?)));
            match bounds {
                Some((start, end)) => partitions.push(Partition {
                    table: child,
                    start,
                    end,
                }),
                None => warn!(table = %child, "ignoring child table without a {} suffix", period),
            }
        }
        partitions.sort_by(|a, b| a.start.cmp(&b.start));
        Ok(partitions)
    }
}
