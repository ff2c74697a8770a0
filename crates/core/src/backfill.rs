//! Batched, resumable copying of historical rows by primary key.
//!
//! The cursor walks `(start, start + batch_size]` windows of a numeric,
//! monotonically assigned primary key. Each window is one independent
//! statement, so an interrupted run keeps the batches it finished, and the
//! next run restarts from the destination's actual maximum id.
//!
//! Keys that are reused or assigned out of order are not supported: rows
//! whose id lands below the destination's maximum after a batch commits are
//! never revisited.

use crate::error::PartitionResult;
use crate::period::Cast;
use crate::table::{quote_ident, TableRef};
use crate::traits::Catalog;
use chrono::NaiveDate;

/// Restricts copied rows to the range covered by existing partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodWindow {
    /// Partitioning column
    pub column: String,
    /// Cast for boundary literals
    pub cast: Cast,
    /// Start of the oldest partition
    pub start: NaiveDate,
    /// End of the newest partition (exclusive)
    pub end: NaiveDate,
}

impl PeriodWindow {
    fn lower_bound(&self) -> String {
        format!(
            "{} >= {}",
            quote_ident(&self.column),
            self.cast.literal(self.start, true)
        )
    }

    fn conditions(&self) -> Vec<String> {
        vec![
            self.lower_bound(),
            format!(
                "{} < {}",
                quote_ident(&self.column),
                self.cast.literal(self.end, true)
            ),
        ]
    }
}

/// One `(lower, upper]` window of primary key values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    /// 1-based position
    pub number: u64,
    /// Exclusive lower bound
    pub lower: i64,
    /// Inclusive upper bound
    pub upper: i64,
}

/// Source, destination and bounds of a backfill.
#[derive(Debug, Clone)]
pub struct BackfillCursor {
    /// Table rows are read from
    pub source: TableRef,
    /// Table rows are inserted into
    pub destination: TableRef,
    /// Numeric primary key column
    pub primary_key: String,
    /// Columns copied, in source order
    pub columns: Vec<String>,
    /// Highest id already present at the destination
    pub starting_id: i64,
    /// Highest id at the source
    pub max_source_id: i64,
    /// Ids per batch
    pub batch_size: i64,
    /// Optional period restriction
    pub window: Option<PeriodWindow>,
    /// Optional operator-supplied SQL predicate
    pub filter: Option<String>,
}

impl BackfillCursor {
    /// Number of batches between the starting id and the source maximum.
    pub fn batch_count(&self) -> u64 {
        // widened so extreme starts and batch sizes cannot overflow
        let remaining = self.max_source_id as i128 - self.starting_id as i128;
        if remaining <= 0 || self.batch_size <= 0 {
            return 0;
        }
        (remaining as u128).div_ceil(self.batch_size as u128) as u64
    }

    /// Every batch in order; the last one is capped at the source maximum.
    pub fn batches(&self) -> Vec<Batch> {
        let count = self.batch_count();
        (0..count)
            .map(|i| {
                let lower = self.starting_id as i128 + i as i128 * self.batch_size as i128;
                let upper = (lower + self.batch_size as i128).min(self.max_source_id as i128);
                // both bounds lie in [starting_id, max_source_id]
                Batch {
                    number: i + 1,
                    lower: lower as i64,
                    upper: upper as i64,
                }
            })
            .collect()
    }

    /// `INSERT ... SELECT` copying one batch.
    pub fn statement(&self, batch: &Batch) -> String {
        let fields = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let key = quote_ident(&self.primary_key);

        let mut conditions = vec![
            format!("{} > {}", key, batch.lower),
            format!("{} <= {}", key, batch.upper),
        ];
        if let Some(window) = &self.window {
            conditions.extend(window.conditions());
        }
        if let Some(filter) = &self.filter {
            conditions.push(format!("({})", filter));
        }

        format!(
            "/* {} of {} */\nINSERT INTO {} ({fields})\n    SELECT {fields} FROM {}\n    WHERE {}",
            batch.number,
            self.batch_count(),
            self.destination.quoted(),
            self.source.quoted(),
            conditions.join(" AND "),
        )
    }
}

/// Inputs to the starting id computation.
#[derive(Debug, Clone)]
pub struct StartingPoint<'a> {
    /// Table rows are read from
    pub source: &'a TableRef,
    /// Table rows are inserted into
    pub destination: &'a TableRef,
    /// Numeric primary key column
    pub primary_key: &'a str,
    /// Explicit override
    pub start: Option<i64>,
    /// Backfilling the retired table into the swapped-in one
    pub swapped: bool,
    /// Highest id at the source
    pub max_source_id: i64,
    /// Optional period restriction
    pub window: Option<&'a PeriodWindow>,
    /// Optional operator-supplied SQL predicate
    pub filter: Option<&'a str>,
}

/// Work out the id the first batch starts after.
///
/// An explicit start wins. Otherwise the destination's maximum id is used;
/// after a swap the live table also receives fresh rows, so only ids at or
/// below the source maximum count. An empty destination (before a swap)
/// starts just below the smallest source id inside the period window.
pub async fn starting_id(catalog: &dyn Catalog, point: &StartingPoint<'_>) -> PartitionResult<i64> {
    if let Some(start) = point.start {
        return Ok(start);
    }

    let key = quote_ident(point.primary_key);
    let mut conditions = Vec::new();
    if point.swapped {
        conditions.push(format!("{} <= {}", key, point.max_source_id));
    }
    if let Some(filter) = point.filter {
        conditions.push(format!("({})", filter));
    }
    let max_dest_id = catalog
        .max_id(point.destination, point.primary_key, &conditions)
        .await?;

    if max_dest_id != 0 || point.swapped {
        return Ok(max_dest_id);
    }

    let mut conditions = Vec::new();
    if let Some(window) = point.window {
        conditions.push(window.lower_bound());
    }
    if let Some(filter) = point.filter {
        conditions.push(format!("({})", filter));
    }
    let min_source_id = catalog
        .min_id(point.source, point.primary_key, &conditions)
        .await?
        .unwrap_or(1);
    Ok(min_source_id.saturating_sub(1))
}
