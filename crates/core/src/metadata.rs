//! Partition metadata persisted out-of-band as an object comment.
//!
//! The database has no slot for "this table is partitioned by day on
//! `created_at`" before native partitioning exists, so the settings are kept
//! in a comment of the form `column:<col>,period:<day|month>,cast:<cast>`.
//! Declarative setups comment the partitioned table, trigger-based setups
//! comment the routing trigger. Installations made before comments existed are
//! recovered by reading the routing function body instead.

use crate::error::{PartitionError, PartitionResult};
use crate::period::{Cast, Period};
use std::fmt;

/// How child partitions are attached and rows routed to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Native `PARTITION BY RANGE`
    Declarative,
    /// Inheritance, per-child `CHECK` constraints and an insert routing trigger
    TriggerBased,
}

impl Strategy {
    /// Pick the strategy for a new setup.
    ///
    /// Declarative partitioning needs server version 10; callers can force the
    /// trigger-based approach on newer servers.
    pub fn select(server_major_version: u32, force_trigger_based: bool) -> Strategy {
        if server_major_version >= 10 && !force_trigger_based {
            Strategy::Declarative
        } else {
            Strategy::TriggerBased
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Declarative => f.write_str("declarative"),
            Strategy::TriggerBased => f.write_str("trigger-based"),
        }
    }
}

/// Settings recorded at `prep` time and read back by every later command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMetadata {
    /// Partitioning column
    pub column: String,
    /// Partition granularity
    pub period: Period,
    /// Type the column's boundary literals are cast to
    pub cast: Cast,
    /// Strategy the table was prepared with
    pub strategy: Strategy,
}

impl PartitionMetadata {
    /// Serialize into the comment format.
    pub fn to_comment(&self) -> String {
        format!(
            "column:{},period:{},cast:{}",
            self.column, self.period, self.cast
        )
    }
}

/// Metadata read back from the catalog, plus whether the stored comment is
/// stale and should be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredMetadata {
    /// The recovered settings
    pub metadata: PartitionMetadata,
    /// Set when the settings came from a legacy function body or lacked a cast
    pub needs_comment: bool,
}

/// Raw catalog text that partition metadata can be recovered from.
#[derive(Debug, Clone, Default)]
pub struct MetadataSources {
    /// Comment on the routing trigger of the candidate table
    pub trigger_comment: Option<String>,
    /// Comment on the candidate table itself
    pub table_comment: Option<String>,
    /// Definition of the routing function, if one exists
    pub function_definition: Option<String>,
}

impl MetadataSources {
    /// Recover the settings, trying the trigger comment, then the table
    /// comment, then the legacy function body.
    ///
    /// Returns `Ok(None)` when nothing describes a partitioned table.
    pub fn recover(&self) -> PartitionResult<Option<RecoveredMetadata>> {
        let commented = [
            (self.trigger_comment.as_deref(), Strategy::TriggerBased),
            (self.table_comment.as_deref(), Strategy::Declarative),
        ];
        for (comment, strategy) in commented {
            if let Some(comment) = comment {
                if let Some(recovered) = parse_comment(comment, strategy)? {
                    return Ok(Some(recovered));
                }
            }
        }

        Ok(self
            .function_definition
            .as_deref()
            .and_then(parse_function_definition))
    }
}

/// Parse a metadata comment.
///
/// Comments without both a column and a period are not ours and yield
/// `Ok(None)`; ours with an unknown period or cast are an error.
fn parse_comment(comment: &str, strategy: Strategy) -> PartitionResult<Option<RecoveredMetadata>> {
    let mut column = None;
    let mut period = None;
    let mut cast = None;

    for pair in comment.trim().split(',') {
        if let Some((key, value)) = pair.split_once(':') {
            match key.trim() {
                "column" => column = Some(value.trim()),
                "period" => period = Some(value.trim()),
                "cast" => cast = Some(value.trim()),
                _ => {}
            }
        }
    }

    let (column, period) = match (column, period) {
        (Some(column), Some(period)) if !column.is_empty() => (column, period),
        _ => return Ok(None),
    };

    let period: Period = period
        .parse()
        .map_err(|_| PartitionError::InvalidMetadata(comment.to_string()))?;
    let (cast, needs_comment) = match cast {
        Some(cast) => (
            cast.parse()
                .map_err(|_| PartitionError::InvalidMetadata(comment.to_string()))?,
            false,
        ),
        None => (Cast::Date, true),
    };

    Ok(Some(RecoveredMetadata {
        metadata: PartitionMetadata {
            column: column.to_string(),
            period,
            cast,
            strategy,
        },
        needs_comment,
    }))
}

/// Recover settings from a routing function written before comments existed.
///
/// Those functions compute the target partition with
/// `to_char(NEW.<column>, '<format>')`.
fn parse_function_definition(definition: &str) -> Option<RecoveredMetadata> {
    let period = Period::ALL
        .into_iter()
        .find(|p| definition.contains(&format!("'{}'", p.sql_format())))?;

    let marker = "to_char(NEW.";
    let start = definition.find(marker)? + marker.len();
    let rest = &definition[start..];
    let end = rest.find(',')?;
    let column = rest[..end].trim().trim_matches('"');
    if column.is_empty() {
        return None;
    }

    Some(RecoveredMetadata {
        metadata: PartitionMetadata {
            column: column.to_string(),
            period,
            cast: Cast::Date,
            strategy: Strategy::TriggerBased,
        },
        needs_comment: true,
    })
}
