//! Insert routing function for trigger-based partitioning.

use crate::introspect::Partition;
use crate::period::Cast;
use crate::table::{quote_ident, TableRef};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Builds the routing function that sends each inserted row to its partition.
pub struct RoutingFunctionBuilder<'a> {
    function_name: &'a str,
    column: &'a str,
    cast: Cast,
}

impl<'a> RoutingFunctionBuilder<'a> {
    /// Create a builder for the function named `function_name` routing on `column`.
    pub fn new(function_name: &'a str, column: &'a str, cast: Cast) -> Self {
        RoutingFunctionBuilder {
            function_name,
            column,
            cast,
        }
    }

    /// Function installed by `prep`, which rejects every insert until
    /// partitions exist.
    pub fn placeholder(&self) -> String {
        format!(
            "CREATE FUNCTION {}()\n    RETURNS trigger AS $$\n    BEGIN\n        RAISE EXCEPTION 'Create partitions first.';\n    END;\n    $$ LANGUAGE plpgsql;",
            quote_ident(self.function_name)
        )
    }

    /// `CREATE OR REPLACE` statement routing over the complete partition set,
    /// or `None` when there are no partitions to route to.
    ///
    /// Branches are ordered current period first, then future periods
    /// ascending, then past periods descending.
    pub fn build(&self, partitions: &[Partition], today: NaiveDate) -> Option<String> {
        let branches = self.ordered_branches(partitions, today);
        if branches.is_empty() {
            return None;
        }

        Some(format!(
            "CREATE OR REPLACE FUNCTION {}()\n    RETURNS trigger AS $$\n    BEGIN\n        IF {}\n        ELSE\n            RAISE EXCEPTION 'Date out of range. Ensure partitions are created.';\n        END IF;\n        RETURN NULL;\n    END;\n    $$ LANGUAGE plpgsql;",
            quote_ident(self.function_name),
            branches.join("\n        ELSIF ")
        ))
    }

    fn ordered_branches(&self, partitions: &[Partition], today: NaiveDate) -> Vec<String> {
        // one branch per period start, in date order
        let unique: BTreeMap<NaiveDate, &Partition> =
            partitions.iter().map(|p| (p.start, p)).collect();

        let mut current = Vec::new();
        let mut future = Vec::new();
        let mut past = Vec::new();
        for partition in unique.values() {
            let branch = self.branch(&partition.table, partition.start, partition.end);
            if partition.end <= today {
                past.push(branch);
            } else if partition.start <= today {
                current.push(branch);
            } else {
                future.push(branch);
            }
        }

        past.reverse();
        current.into_iter().chain(future).chain(past).collect()
    }

    fn branch(&self, table: &TableRef, start: NaiveDate, end: NaiveDate) -> String {
        let column = quote_ident(self.column);
        format!(
            "(NEW.{column} >= {} AND NEW.{column} < {}) THEN\n            INSERT INTO {} VALUES (NEW.*);",
            self.cast.literal(start, true),
            self.cast.literal(end, true),
            table.quoted(),
        )
    }
}
