//! Lifecycle commands and their handlers.
//!
//! Each handler gathers facts through the introspector, checks preconditions,
//! generates the full statement list and only then hands it to the execution
//! context. `fill` is the exception to the single-transaction rule: every
//! batch commits on its own so progress survives interruption.

use crate::backfill::{self, BackfillCursor, PeriodWindow, StartingPoint};
use crate::context::ExecutionContext;
use crate::ddl::{self, AddPartitionsInput, PrepInput};
use crate::error::{PartitionError, PartitionResult};
use crate::metadata::{PartitionMetadata, Strategy};
use crate::period::Period;
use crate::table::TableRef;
use partwise_observability::{record_batch_latency, record_command_latency};
use std::time::{Duration, Instant};
use tracing::info;

/// Default ids copied per fill batch.
pub const DEFAULT_BATCH_SIZE: i64 = 10_000;

/// Default `lock_timeout` applied to swaps.
pub const DEFAULT_LOCK_TIMEOUT: &str = "5s";

/// What `prep` should build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepTarget {
    /// Partition by `column` per `period`
    Partitioned {
        /// Partitioning column
        column: String,
        /// Partition granularity
        period: Period,
        /// Use inheritance and a routing trigger even on servers with native partitioning
        trigger_based: bool,
    },
    /// Stage a plain copy of the table without partitioning
    Unpartitioned,
}

/// Arguments of `prep`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepOptions {
    /// Table to prepare
    pub table: String,
    /// What to build
    pub target: PrepTarget,
}

impl PrepOptions {
    /// Validate positional arguments (`<table> [<column> <period>]`) and flags.
    pub fn from_args(
        args: &[String],
        no_partition: bool,
        trigger_based: bool,
    ) -> PartitionResult<Self> {
        if no_partition {
            if trigger_based {
                return Err(PartitionError::usage(
                    "Can't use --trigger-based and --no-partition",
                ));
            }
            return match args {
                [table] => Ok(PrepOptions {
                    table: table.clone(),
                    target: PrepTarget::Unpartitioned,
                }),
                _ => Err(PartitionError::usage("prep <table> --no-partition")),
            };
        }

        match args {
            [table, column, period] => Ok(PrepOptions {
                table: table.clone(),
                target: PrepTarget::Partitioned {
                    column: column.clone(),
                    period: period.parse()?,
                    trigger_based,
                },
            }),
            _ => Err(PartitionError::usage("prep <table> <column> <period>")),
        }
    }
}

/// Arguments of `add_partitions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddPartitionsOptions {
    /// Original table name
    pub table: String,
    /// Attach to the intermediate table instead of the live one
    pub intermediate: bool,
    /// Periods before the current one
    pub past: u32,
    /// Periods after the current one
    pub future: u32,
}

/// Arguments of `fill`.
#[derive(Debug, Clone, PartialEq)]
pub struct FillOptions {
    /// Original table name
    pub table: String,
    /// Copy from the retired table into the live one
    pub swapped: bool,
    /// Override the source table
    pub source_table: Option<String>,
    /// Override the destination table
    pub dest_table: Option<String>,
    /// Start after this id instead of the computed one
    pub start: Option<i64>,
    /// Extra SQL predicate on copied rows
    pub filter: Option<String>,
    /// Ids per batch
    pub batch_size: i64,
    /// Pause between batches
    pub sleep: Option<Duration>,
}

impl FillOptions {
    /// Options with defaults for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        FillOptions {
            table: table.into(),
            swapped: false,
            source_table: None,
            dest_table: None,
            start: None,
            filter: None,
            batch_size: DEFAULT_BATCH_SIZE,
            sleep: None,
        }
    }
}

/// Arguments of `swap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOptions {
    /// Original table name
    pub table: String,
    /// `lock_timeout` for the renames
    pub lock_timeout: String,
}

/// Arguments of `analyze`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeOptions {
    /// Original table name
    pub table: String,
    /// Analyze the live (swapped-in) table rather than the intermediate one
    pub swapped: bool,
}

/// A validated lifecycle command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create the intermediate table
    Prep(PrepOptions),
    /// Create partitions for a window of periods
    AddPartitions(AddPartitionsOptions),
    /// Backfill rows in batches
    Fill(FillOptions),
    /// Put the intermediate table in place of the live one
    Swap(SwapOptions),
    /// Undo a swap
    Unswap {
        /// Original table name
        table: String,
    },
    /// Drop the intermediate table
    Unprep {
        /// Original table name
        table: String,
    },
    /// Refresh planner statistics
    Analyze(AnalyzeOptions),
}

impl Command {
    /// Name used in logs and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Prep(_) => "prep",
            Command::AddPartitions(_) => "add_partitions",
            Command::Fill(_) => "fill",
            Command::Swap(_) => "swap",
            Command::Unswap { .. } => "unswap",
            Command::Unprep { .. } => "unprep",
            Command::Analyze(_) => "analyze",
        }
    }

    fn table(&self) -> &str {
        match self {
            Command::Prep(o) => &o.table,
            Command::AddPartitions(o) => &o.table,
            Command::Fill(o) => &o.table,
            Command::Swap(o) => &o.table,
            Command::Unswap { table } | Command::Unprep { table } => table,
            Command::Analyze(o) => &o.table,
        }
    }
}

/// Summary of what a command did (or would do in a dry run).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Statements generated
    pub statements: usize,
    /// Partitions created by `add_partitions`
    pub partitions_added: Vec<TableRef>,
    /// Batches applied by `fill`
    pub batches: u64,
}

/// Run a command to completion.
pub async fn execute(ctx: &ExecutionContext<'_>, command: &Command) -> PartitionResult<CommandOutcome> {
    let started = Instant::now();
    let outcome = match command {
        Command::Prep(options) => prep(ctx, options).await?,
        Command::AddPartitions(options) => add_partitions(ctx, options).await?,
        Command::Fill(options) => fill(ctx, options).await?,
        Command::Swap(options) => swap(ctx, options).await?,
        Command::Unswap { table } => unswap(ctx, table).await?,
        Command::Unprep { table } => unprep(ctx, table).await?,
        Command::Analyze(options) => analyze(ctx, options).await?,
    };
    record_command_latency(
        command.name(),
        command.table(),
        started.elapsed(),
        outcome.statements,
    );
    Ok(outcome)
}

/// Create the intermediate table, choosing the partitioning strategy.
pub async fn prep(ctx: &ExecutionContext<'_>, options: &PrepOptions) -> PartitionResult<CommandOutcome> {
    let introspector = ctx.introspector();
    let catalog = ctx.catalog();
    let table = introspector.resolve(&options.table).await?;
    introspector.require_table(&table).await?;
    introspector.require_no_table(&table.intermediate()).await?;

    let server_version = catalog.server_version().await?;
    let partitioning = match &options.target {
        PrepTarget::Partitioned {
            column,
            period,
            trigger_based,
        } => {
            let cast = introspector
                .column_cast(&table, column)
                .await?
                .ok_or_else(|| PartitionError::ColumnNotFound(column.clone()))?;
            Some(PartitionMetadata {
                column: column.clone(),
                period: *period,
                cast,
                strategy: Strategy::select(server_version.major(), *trigger_based),
            })
        }
        PrepTarget::Unpartitioned => None,
    };

    let input = PrepInput {
        table: table.clone(),
        partitioning,
        server_version,
        index_definitions: catalog.index_definitions(&table).await?,
        foreign_keys: catalog.foreign_keys(&table).await?,
    };
    if let Some(metadata) = &input.partitioning {
        info!(table = %table, strategy = %metadata.strategy, "preparing intermediate table");
    }
    let statements = ddl::prep_statements(&input);
    ctx.run_transaction("prep", &statements).await?;

    Ok(CommandOutcome {
        statements: statements.len(),
        ..Default::default()
    })
}

/// Create any missing partitions in the requested window.
pub async fn add_partitions(
    ctx: &ExecutionContext<'_>,
    options: &AddPartitionsOptions,
) -> PartitionResult<CommandOutcome> {
    let introspector = ctx.introspector();
    let catalog = ctx.catalog();
    let original = introspector.resolve(&options.table).await?;
    let parent = if options.intermediate {
        original.intermediate()
    } else {
        original.clone()
    };
    introspector.require_table(&parent).await?;

    let recovered = introspector
        .partition_metadata(&original, &parent)
        .await?
        .ok_or_else(|| PartitionError::NoSettings {
            table: parent.to_string(),
            hint: (!options.intermediate)
                .then(|| "Did you mean to use --intermediate?".to_string()),
        })?;
    let metadata = recovered.metadata;
    let existing = introspector
        .partitions(&parent, &original, metadata.period)
        .await?;
    let server_version = catalog.server_version().await?;

    // new partitions copy keys and indexes from this table
    let schema_table = match metadata.strategy {
        Strategy::TriggerBased => parent.clone(),
        Strategy::Declarative if options.intermediate => original.clone(),
        Strategy::Declarative => existing
            .last()
            .map(|p| p.table.clone())
            .unwrap_or_else(|| parent.clone()),
    };
    let index_definitions = if metadata.strategy == Strategy::TriggerBased
        || !server_version.propagates_partition_indexes()
    {
        catalog.index_definitions(&schema_table).await?
    } else {
        Vec::new()
    };
    let primary_key = catalog
        .primary_key(&schema_table)
        .await?
        .into_iter()
        .map(|k| k.name)
        .collect();

    let input = AddPartitionsInput {
        original,
        parent,
        metadata,
        needs_comment: recovered.needs_comment,
        today: ctx.today(),
        past: options.past,
        future: options.future,
        existing,
        primary_key,
        index_definitions,
        foreign_keys: catalog.foreign_keys(&schema_table).await?,
    };
    let plan = ddl::add_partitions_plan(&input)?;
    if !plan.statements.is_empty() {
        ctx.run_transaction("add_partitions", &plan.statements).await?;
    }

    Ok(CommandOutcome {
        statements: plan.statements.len(),
        partitions_added: plan.added.into_iter().map(|p| p.table).collect(),
        batches: 0,
    })
}

/// Copy rows into the destination in primary key batches.
pub async fn fill(ctx: &ExecutionContext<'_>, options: &FillOptions) -> PartitionResult<CommandOutcome> {
    if options.batch_size <= 0 {
        return Err(PartitionError::usage("--batch-size must be positive"));
    }

    let introspector = ctx.introspector();
    let catalog = ctx.catalog();
    let table = introspector.resolve(&options.table).await?;

    let source = match &options.source_table {
        Some(name) => introspector.resolve(name).await?,
        None if options.swapped => table.retired(),
        None => table.clone(),
    };
    let destination = match &options.dest_table {
        Some(name) => introspector.resolve(name).await?,
        None if options.swapped => table.clone(),
        None => table.intermediate(),
    };
    introspector.require_table(&source).await?;
    introspector.require_table(&destination).await?;

    let recovered = introspector.partition_metadata(&table, &destination).await?;
    let mut partitions = Vec::new();
    let mut window = None;
    if let Some(recovered) = &recovered {
        let metadata = &recovered.metadata;
        partitions = introspector
            .partitions(&destination, &table, metadata.period)
            .await?;
        if let (Some(first), Some(last)) = (partitions.first(), partitions.last()) {
            window = Some(PeriodWindow {
                column: metadata.column.clone(),
                cast: metadata.cast,
                start: first.start,
                end: last.end,
            });
        }
    }

    let mut key = catalog.primary_key(&destination).await?;
    let declarative = recovered
        .as_ref()
        .map_or(false, |r| r.metadata.strategy == Strategy::Declarative);
    if key.is_empty() && declarative {
        // partitioned parents on older servers carry no primary key
        if let Some(last) = partitions.last() {
            key = catalog.primary_key(&last.table).await?;
        }
    }
    let primary_key = match key.as_slice() {
        [] => return Err(PartitionError::NoPrimaryKey),
        [column] if column.is_numeric() => column.name.clone(),
        [_] => {
            return Err(PartitionError::UnsupportedPrimaryKey(
                "Only numeric primary keys are supported".to_string(),
            ))
        }
        _ => {
            return Err(PartitionError::UnsupportedPrimaryKey(
                "Composite primary keys are not supported".to_string(),
            ))
        }
    };

    let max_source_id = catalog.max_id(&source, &primary_key, &[]).await?;
    let starting_id = backfill::starting_id(
        catalog,
        &StartingPoint {
            source: &source,
            destination: &destination,
            primary_key: &primary_key,
            start: options.start,
            swapped: options.swapped,
            max_source_id,
            window: window.as_ref(),
            filter: options.filter.as_deref(),
        },
    )
    .await?;

    let columns = catalog.columns(&source).await?;
    let cursor = BackfillCursor {
        source,
        destination,
        primary_key,
        columns,
        starting_id,
        max_source_id,
        batch_size: options.batch_size,
        window,
        filter: options.filter.clone(),
    };

    let batches = cursor.batches();
    let total = batches.len() as u64;
    if batches.is_empty() {
        ctx.note("/* nothing to fill */");
        return Ok(CommandOutcome::default());
    }
    info!(
        source = %cursor.source,
        destination = %cursor.destination,
        starting_id,
        max_source_id,
        batches = total,
        "starting fill"
    );

    let label = cursor.destination.to_string();
    for batch in &batches {
        let statement = cursor.statement(batch);
        let started = Instant::now();
        ctx.run_each("fill", std::slice::from_ref(&statement)).await?;
        ctx.output().batch_finished(batch.number, total);
        if ctx.is_dry_run() {
            continue;
        }

        record_batch_latency(&label, batch.number, total, started.elapsed());
        if let Some(pause) = options.sleep {
            if batch.number < total {
                tokio::time::sleep(pause).await;
            }
        }
    }

    Ok(CommandOutcome {
        statements: batches.len(),
        partitions_added: Vec::new(),
        batches: total,
    })
}

/// Rename the live table out of the way and the intermediate one into place.
pub async fn swap(ctx: &ExecutionContext<'_>, options: &SwapOptions) -> PartitionResult<CommandOutcome> {
    let introspector = ctx.introspector();
    let catalog = ctx.catalog();
    let table = introspector.resolve(&options.table).await?;
    introspector.require_table(&table).await?;
    introspector.require_table(&table.intermediate()).await?;
    introspector.require_no_table(&table.retired()).await?;

    let sequences = catalog.sequences(&table).await?;
    let server_version = catalog.server_version().await?;
    let statements = ddl::swap_statements(
        &table,
        &sequences,
        Some(options.lock_timeout.as_str()),
        server_version,
    );
    ctx.run_transaction("swap", &statements).await?;

    Ok(CommandOutcome {
        statements: statements.len(),
        ..Default::default()
    })
}

/// Put the retired table back and the partitioned one back to intermediate.
pub async fn unswap(ctx: &ExecutionContext<'_>, table: &str) -> PartitionResult<CommandOutcome> {
    let introspector = ctx.introspector();
    let table = introspector.resolve(table).await?;
    introspector.require_table(&table).await?;
    introspector.require_table(&table.retired()).await?;
    introspector.require_no_table(&table.intermediate()).await?;

    let sequences = ctx.catalog().sequences(&table).await?;
    let statements = ddl::unswap_statements(&table, &sequences);
    ctx.run_transaction("unswap", &statements).await?;

    Ok(CommandOutcome {
        statements: statements.len(),
        ..Default::default()
    })
}

/// Drop the intermediate table and the routing function.
pub async fn unprep(ctx: &ExecutionContext<'_>, table: &str) -> PartitionResult<CommandOutcome> {
    let introspector = ctx.introspector();
    let table = introspector.resolve(table).await?;
    introspector.require_table(&table.intermediate()).await?;

    let statements = ddl::unprep_statements(&table);
    ctx.run_transaction("unprep", &statements).await?;

    Ok(CommandOutcome {
        statements: statements.len(),
        ..Default::default()
    })
}

/// Analyze every partition and the parent, outside a transaction.
pub async fn analyze(
    ctx: &ExecutionContext<'_>,
    options: &AnalyzeOptions,
) -> PartitionResult<CommandOutcome> {
    let introspector = ctx.introspector();
    let table = introspector.resolve(&options.table).await?;
    let parent = if options.swapped {
        table.clone()
    } else {
        table.intermediate()
    };
    introspector.require_table(&parent).await?;

    let partitions: Vec<TableRef> = match introspector.partition_metadata(&table, &parent).await? {
        Some(recovered) => introspector
            .partitions(&parent, &table, recovered.metadata.period)
            .await?
            .into_iter()
            .map(|p| p.table)
            .collect(),
        None => Vec::new(),
    };
    let statements = ddl::analyze_statements(&partitions, &parent);
    ctx.run_each("analyze", &statements).await?;

    Ok(CommandOutcome {
        statements: statements.len(),
        ..Default::default()
    })
}
