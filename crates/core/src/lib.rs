//! partwise-core
//!
//! Planning and orchestration for converting a Postgres table into a
//! time-partitioned one: prepare an intermediate table, add partitions,
//! backfill rows, swap it into place and, if needed, roll back.

#![warn(missing_docs)]

mod backfill;
mod commands;
mod context;
mod ddl;
mod error;
mod introspect;
mod metadata;
mod period;
mod table;
mod traits;
mod trigger;

pub mod mocks;

pub use backfill::{starting_id, BackfillCursor, Batch, PeriodWindow, StartingPoint};
pub use commands::{
    add_partitions, analyze, execute, fill, prep, swap, unprep, unswap, AddPartitionsOptions,
    AnalyzeOptions, Command, CommandOutcome, FillOptions, PrepOptions, PrepTarget, SwapOptions,
    DEFAULT_BATCH_SIZE, DEFAULT_LOCK_TIMEOUT,
};
pub use context::ExecutionContext;
pub use ddl::{
    add_partitions_plan, analyze_statements, make_fk_def, make_index_def, prep_statements,
    swap_statements, unprep_statements, unswap_statements, window_starts, AddPartitionsInput,
    AddPartitionsPlan, PrepInput,
};
pub use error::{PartitionError, PartitionResult};
pub use introspect::{Introspector, Partition};
pub use metadata::{MetadataSources, PartitionMetadata, RecoveredMetadata, Strategy};
pub use period::{Cast, Period};
pub use table::{quote_ident, quote_literal, TableRef};
pub use traits::{Catalog, KeyColumn, OutputSink, OwnedSequence, ServerVersion, StatementExecutor};
pub use trigger::RoutingFunctionBuilder;
