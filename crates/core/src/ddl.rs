//! Statement generation for each lifecycle transition.
//!
//! Functions here are pure: they take facts already gathered from the catalog
//! and return the ordered statements to run. Precondition checks happen
//! before these are called, so a plan is never partially generated.

use crate::error::{PartitionError, PartitionResult};
use crate::introspect::Partition;
use crate::metadata::{PartitionMetadata, Strategy};
use crate::period::Period;
use crate::table::{quote_ident, quote_literal, TableRef};
use crate::traits::{OwnedSequence, ServerVersion};
use crate::trigger::RoutingFunctionBuilder;
use chrono::NaiveDate;

/// Facts needed to prepare the intermediate table.
#[derive(Debug, Clone)]
pub struct PrepInput {
    /// The live table being partitioned
    pub table: TableRef,
    /// Settings to record, or `None` to stage a plain copy without partitioning
    pub partitioning: Option<PartitionMetadata>,
    /// Connected server version
    pub server_version: ServerVersion,
    /// Non-primary index definitions of the live table
    pub index_definitions: Vec<String>,
    /// Foreign key definitions of the live table
    pub foreign_keys: Vec<String>,
}

/// Statements that create the intermediate table.
pub fn prep_statements(input: &PrepInput) -> Vec<String> {
    let table = &input.table;
    let intermediate = table.intermediate();
    let mut statements = Vec::new();

    match &input.partitioning {
        Some(metadata) if metadata.strategy == Strategy::Declarative => {
            statements.push(format!(
                "CREATE TABLE {} (LIKE {} INCLUDING DEFAULTS INCLUDING CONSTRAINTS INCLUDING STORAGE INCLUDING COMMENTS) PARTITION BY RANGE ({});",
                intermediate.quoted(),
                table.quoted(),
                quote_ident(&metadata.column)
            ));
            // older servers cannot index a partitioned parent; add_partitions
            // indexes each partition instead
            if input.server_version.propagates_partition_indexes() {
                statements.extend(
                    input
                        .index_definitions
                        .iter()
                        .map(|def| make_index_def(def, &intermediate)),
                );
            }
            statements.push(table_comment_statement(&intermediate, metadata));
        }
        partitioning => {
            statements.push(format!(
                "CREATE TABLE {} (LIKE {} INCLUDING ALL);",
                intermediate.quoted(),
                table.quoted()
            ));
            statements.extend(
                input
                    .foreign_keys
                    .iter()
                    .map(|def| make_fk_def(def, &intermediate)),
            );

            if let Some(metadata) = partitioning {
                let trigger_name = table.trigger_name();
                let builder =
                    RoutingFunctionBuilder::new(&trigger_name, &metadata.column, metadata.cast);
                statements.push(builder.placeholder());
                statements.push(format!(
                    "CREATE TRIGGER {trigger}\n    BEFORE INSERT ON {}\n    FOR EACH ROW EXECUTE PROCEDURE {trigger}();",
                    intermediate.quoted(),
                    trigger = quote_ident(&trigger_name),
                ));
                statements.push(trigger_comment_statement(table, &intermediate, metadata));
            }
        }
    }

    statements
}

/// Facts needed to add partitions to a prepared table.
#[derive(Debug, Clone)]
pub struct AddPartitionsInput {
    /// The original (live name) table partitions are named after
    pub original: TableRef,
    /// Table partitions attach to: the intermediate or the swapped-in live table
    pub parent: TableRef,
    /// Recovered settings
    pub metadata: PartitionMetadata,
    /// Rewrite the settings comment before adding partitions
    pub needs_comment: bool,
    /// Current UTC date, not yet rounded
    pub today: NaiveDate,
    /// Periods before the current one to cover
    pub past: u32,
    /// Periods after the current one to cover
    pub future: u32,
    /// Partitions that already exist
    pub existing: Vec<Partition>,
    /// Primary key columns new partitions receive
    pub primary_key: Vec<String>,
    /// Index definitions copied onto each new partition
    pub index_definitions: Vec<String>,
    /// Foreign keys copied onto each new partition
    pub foreign_keys: Vec<String>,
}

/// Statements that add partitions, and the partitions they create.
#[derive(Debug, Clone, Default)]
pub struct AddPartitionsPlan {
    /// Ordered statements
    pub statements: Vec<String>,
    /// Partitions created by the statements
    pub added: Vec<Partition>,
}

/// Plan the partitions covering `[today - past, today + future]` periods.
///
/// Partitions that already exist are skipped. Under the trigger-based strategy
/// the routing function is rebuilt from existing and new partitions together.
pub fn add_partitions_plan(input: &AddPartitionsInput) -> PartitionResult<AddPartitionsPlan> {
    let metadata = &input.metadata;
    let period = metadata.period;
    let today = period.round(input.today);
    let mut plan = AddPartitionsPlan::default();

    if input.needs_comment {
        plan.statements.push(match metadata.strategy {
            Strategy::Declarative => table_comment_statement(&input.parent, metadata),
            Strategy::TriggerBased => {
                trigger_comment_statement(&input.original, &input.parent, metadata)
            }
        });
    }

    for start in window_starts(period, today, input.past, input.future)? {
        let partition = Partition::for_period(&input.original, period, start)
            .ok_or_else(|| window_out_of_range(period, input.past, input.future))?;
        if input.existing.iter().any(|p| p.table == partition.table) {
            continue;
        }

        plan.statements.push(create_partition_statement(&partition, &input.parent, metadata));
        if !input.primary_key.is_empty() {
            let columns: Vec<String> = input.primary_key.iter().map(|c| quote_ident(c)).collect();
            plan.statements.push(format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({});",
                partition.table.quoted(),
                columns.join(", ")
            ));
        }
        plan.statements.extend(
            input
                .index_definitions
                .iter()
                .map(|def| make_index_def(def, &partition.table)),
        );
        plan.statements.extend(
            input
                .foreign_keys
                .iter()
                .map(|def| make_fk_def(def, &partition.table)),
        );
        plan.added.push(partition);
    }

    if metadata.strategy == Strategy::TriggerBased {
        let mut all = input.existing.clone();
        all.extend(plan.added.iter().cloned());
        let trigger_name = input.original.trigger_name();
        let builder = RoutingFunctionBuilder::new(&trigger_name, &metadata.column, metadata.cast);
        if let Some(function) = builder.build(&all, today) {
            plan.statements.push(function);
        }
    }

    Ok(plan)
}

fn create_partition_statement(
    partition: &Partition,
    parent: &TableRef,
    metadata: &PartitionMetadata,
) -> String {
    let cast = metadata.cast;
    match metadata.strategy {
        Strategy::Declarative => format!(
            "CREATE TABLE {} PARTITION OF {} FOR VALUES FROM ({}) TO ({});",
            partition.table.quoted(),
            parent.quoted(),
            cast.literal(partition.start, false),
            cast.literal(partition.end, false)
        ),
        Strategy::TriggerBased => {
            let column = quote_ident(&metadata.column);
            format!(
                "CREATE TABLE {}\n    (CHECK ({column} >= {} AND {column} < {}))\n    INHERITS ({});",
                partition.table.quoted(),
                cast.literal(partition.start, true),
                cast.literal(partition.end, true),
                parent.quoted(),
            )
        }
    }
}

/// Statements that put the intermediate table in place of the live one.
///
/// `lock_timeout` is only emitted when the server supports it.
pub fn swap_statements(
    table: &TableRef,
    sequences: &[OwnedSequence],
    lock_timeout: Option<&str>,
    server_version: ServerVersion,
) -> Vec<String> {
    let mut statements = Vec::new();
    if let Some(timeout) = lock_timeout {
        if server_version.supports_lock_timeout() {
            statements.push(format!("SET LOCAL lock_timeout = {};", quote_literal(timeout)));
        }
    }
    statements.push(rename_statement(table, &table.retired()));
    statements.push(rename_statement(&table.intermediate(), table));
    statements.extend(sequence_ownership_statements(table, sequences));
    statements
}

/// Statements that undo a swap, putting the retired table back.
pub fn unswap_statements(table: &TableRef, sequences: &[OwnedSequence]) -> Vec<String> {
    let mut statements = vec![
        rename_statement(table, &table.intermediate()),
        rename_statement(&table.retired(), table),
    ];
    statements.extend(sequence_ownership_statements(table, sequences));
    statements
}

/// Statements that drop the intermediate table and its routing function.
pub fn unprep_statements(table: &TableRef) -> Vec<String> {
    vec![
        format!("DROP TABLE {} CASCADE;", table.intermediate().quoted()),
        format!("DROP FUNCTION IF EXISTS {}();", quote_ident(&table.trigger_name())),
    ]
}

/// `ANALYZE VERBOSE` for every partition, then the parent.
pub fn analyze_statements(partitions: &[TableRef], parent: &TableRef) -> Vec<String> {
    partitions
        .iter()
        .chain(std::iter::once(parent))
        .map(|t| format!("ANALYZE VERBOSE {};", t.quoted()))
        .collect()
}

fn rename_statement(from: &TableRef, to: &TableRef) -> String {
    format!("ALTER TABLE {} RENAME TO {};", from.quoted(), to.quoted_name())
}

fn sequence_ownership_statements(table: &TableRef, sequences: &[OwnedSequence]) -> Vec<String> {
    sequences
        .iter()
        .map(|seq| {
            format!(
                "ALTER SEQUENCE {}.{} OWNED BY {}.{};",
                quote_ident(&seq.schema),
                quote_ident(&seq.name),
                table.quoted(),
                quote_ident(&seq.column)
            )
        })
        .collect()
}

fn table_comment_statement(table: &TableRef, metadata: &PartitionMetadata) -> String {
    format!(
        "COMMENT ON TABLE {} IS {};",
        table.quoted(),
        quote_literal(&metadata.to_comment())
    )
}

fn trigger_comment_statement(
    original: &TableRef,
    on: &TableRef,
    metadata: &PartitionMetadata,
) -> String {
    format!(
        "COMMENT ON TRIGGER {} ON {} IS {};",
        quote_ident(&original.trigger_name()),
        on.quoted(),
        quote_literal(&metadata.to_comment())
    )
}

/// Retarget an index definition at another table, dropping the index name
/// so the server picks a fresh one.
pub fn make_index_def(definition: &str, table: &TableRef) -> String {
    let retargeted = match (definition.find(" INDEX "), definition.find(" USING ")) {
        (Some(index_at), Some(using_at)) if index_at < using_at => {
            let head = &definition[..index_at];
            let tail = &definition[using_at..];
            let on_clause = &definition[index_at..using_at];
            if on_clause.contains(" ON ") {
                format!("{} INDEX ON {}{}", head, table.quoted(), tail)
            } else {
                definition.to_string()
            }
        }
        _ => definition.to_string(),
    };
    format!("{};", retargeted.trim_end_matches(';'))
}

/// Attach a foreign key definition to another table.
pub fn make_fk_def(definition: &str, table: &TableRef) -> String {
    format!("ALTER TABLE {} ADD {};", table.quoted(), definition)
}

/// Period starts from `past` periods before `today` to `future` periods after.
///
/// Fails with a usage error when any start falls outside the calendar.
pub fn window_starts(
    period: Period,
    today: NaiveDate,
    past: u32,
    future: u32,
) -> PartitionResult<Vec<NaiveDate>> {
    let today = period.round(today);
    (-(past as i64)..=(future as i64))
        .map(|n| {
            period
                .advance(today, n)
                .ok_or_else(|| window_out_of_range(period, past, future))
        })
        .collect()
}

fn window_out_of_range(period: Period, past: u32, future: u32) -> PartitionError {
    PartitionError::usage(format!(
        "--past {} --future {} reaches beyond the supported {} range",
        past, future, period
    ))
}
