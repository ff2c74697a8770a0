//! Command line interface definitions.

use clap::{Args, Parser, Subcommand};
use partwise_core::{
    AddPartitionsOptions, AnalyzeOptions, Command, FillOptions, PartitionError, PartitionResult,
    PrepOptions, SwapOptions, DEFAULT_BATCH_SIZE, DEFAULT_LOCK_TIMEOUT,
};
use std::time::Duration;

/// Postgres partitioning without downtime.
#[derive(Parser, Debug)]
#[command(name = "partwise", version, about = "Postgres partitioning without downtime")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database connection URL
    #[arg(long, env = "PARTWISE_URL", global = true, hide_env_values = true)]
    pub url: Option<String>,

    /// Print the SQL without executing it
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an intermediate table for partitioning
    Prep(PrepArgs),
    /// Add partitions
    #[command(name = "add_partitions", alias = "add-partitions")]
    AddPartitions(AddPartitionsArgs),
    /// Fill the partitions in batches
    Fill(FillArgs),
    /// Swap the intermediate table with the original table
    Swap(SwapArgs),
    /// Undo swap
    Unswap(TableArgs),
    /// Undo prep
    Unprep(TableArgs),
    /// Analyze tables
    Analyze(AnalyzeArgs),
}

/// Arguments for `prep`.
#[derive(Args, Debug)]
pub struct PrepArgs {
    /// Table, then the partitioning column and period (day or month)
    #[arg(value_name = "TABLE [COLUMN PERIOD]", required = true, num_args = 1..)]
    pub args: Vec<String>,

    /// Stage a copy of the table without partitioning
    #[arg(long)]
    pub no_partition: bool,

    /// Use inheritance and an insert trigger instead of declarative partitioning
    #[arg(long)]
    pub trigger_based: bool,
}

/// Arguments for `add_partitions`.
#[derive(Args, Debug)]
pub struct AddPartitionsArgs {
    pub table: String,

    /// Add to the intermediate table
    #[arg(long)]
    pub intermediate: bool,

    /// Number of past partitions to add
    #[arg(long, default_value_t = 0)]
    pub past: u32,

    /// Number of future partitions to add
    #[arg(long, default_value_t = 0)]
    pub future: u32,
}

/// Arguments for `fill`.
#[derive(Args, Debug)]
pub struct FillArgs {
    pub table: String,

    /// Fill the live table from the retired one
    #[arg(long)]
    pub swapped: bool,

    /// Table to copy from
    #[arg(long)]
    pub source_table: Option<String>,

    /// Table to copy into
    #[arg(long)]
    pub dest_table: Option<String>,

    /// Primary key to start after
    #[arg(long)]
    pub start: Option<i64>,

    /// Condition rows must satisfy
    #[arg(long = "where", value_name = "EXPR")]
    pub filter: Option<String>,

    /// Rows per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: i64,

    /// Seconds to sleep between batches
    #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
    pub sleep: Option<f64>,
}

/// Arguments for `swap`.
#[derive(Args, Debug)]
pub struct SwapArgs {
    pub table: String,

    /// Lock timeout for the renames
    #[arg(long, default_value = DEFAULT_LOCK_TIMEOUT)]
    pub lock_timeout: String,
}

/// A lone table argument.
#[derive(Args, Debug)]
pub struct TableArgs {
    pub table: String,
}

/// Arguments for `analyze`.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    pub table: String,

    /// Analyze the swapped-in table
    #[arg(long)]
    pub swapped: bool,
}

impl Commands {
    /// Validate the arguments into a lifecycle command.
    pub fn into_command(self) -> PartitionResult<Command> {
        Ok(match self {
            Commands::Prep(args) => Command::Prep(PrepOptions::from_args(
                &args.args,
                args.no_partition,
                args.trigger_based,
            )?),
            Commands::AddPartitions(args) => Command::AddPartitions(AddPartitionsOptions {
                table: args.table,
                intermediate: args.intermediate,
                past: args.past,
                future: args.future,
            }),
            Commands::Fill(args) => {
                let sleep = args
                    .sleep
                    .map(|secs| {
                        Duration::try_from_secs_f64(secs).map_err(|_| {
                            PartitionError::usage("--sleep must be a non-negative number of seconds")
                        })
                    })
                    .transpose()?;
                Command::Fill(FillOptions {
                    table: args.table,
                    swapped: args.swapped,
                    source_table: args.source_table,
                    dest_table: args.dest_table,
                    start: args.start,
                    filter: args.filter,
                    batch_size: args.batch_size,
                    sleep,
                })
            }
            Commands::Swap(args) => Command::Swap(SwapOptions {
                table: args.table,
                lock_timeout: args.lock_timeout,
            }),
            Commands::Unswap(args) => Command::Unswap { table: args.table },
            Commands::Unprep(args) => Command::Unprep { table: args.table },
            Commands::Analyze(args) => Command::Analyze(AnalyzeOptions {
                table: args.table,
                swapped: args.swapped,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partwise_core::{Period, PrepTarget};

    fn parse(args: &[&str]) -> PartitionResult<Command> {
        let mut argv = vec!["partwise"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command.into_command()
    }

    #[test]
    fn test_prep_arguments() {
        let command = parse(&["prep", "events", "created_at", "month"]).unwrap();
        assert_eq!(
            command,
            Command::Prep(PrepOptions {
                table: "events".to_string(),
                target: PrepTarget::Partitioned {
                    column: "created_at".to_string(),
                    period: Period::Month,
                    trigger_based: false,
                },
            })
        );

        let err = parse(&["prep", "events", "--no-partition", "--trigger-based"]).unwrap_err();
        assert!(matches!(err, PartitionError::Usage(_)));
        let err = parse(&["prep", "events", "created_at"]).unwrap_err();
        assert!(matches!(err, PartitionError::Usage(_)));
    }

    #[test]
    fn test_defaults() {
        match parse(&["add_partitions", "events", "--intermediate"]).unwrap() {
            Command::AddPartitions(options) => {
                assert!(options.intermediate);
                assert_eq!((options.past, options.future), (0, 0));
            }
            other => panic!("unexpected command {:?}", other),
        }

        match parse(&["fill", "events"]).unwrap() {
            Command::Fill(options) => assert_eq!(options, FillOptions::new("events")),
            other => panic!("unexpected command {:?}", other),
        }

        match parse(&["swap", "events"]).unwrap() {
            Command::Swap(options) => assert_eq!(options.lock_timeout, "5s"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_fill_flags() {
        let command = parse(&[
            "fill",
            "events",
            "--swapped",
            "--where",
            "tenant_id = 7",
            "--batch-size",
            "500",
            "--sleep",
            "0.5",
            "--start",
            "42",
        ])
        .unwrap();
        match command {
            Command::Fill(options) => {
                assert!(options.swapped);
                assert_eq!(options.filter.as_deref(), Some("tenant_id = 7"));
                assert_eq!(options.batch_size, 500);
                assert_eq!(options.sleep, Some(Duration::from_millis(500)));
                assert_eq!(options.start, Some(42));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let err = parse(&["fill", "events", "--sleep", "-1"]).unwrap_err();
        assert!(matches!(err, PartitionError::Usage(_)));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "partwise",
            "unprep",
            "events",
            "--dry-run",
            "--url",
            "postgres://localhost/app",
        ])
        .unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.url.as_deref(), Some("postgres://localhost/app"));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["partwise", "reshard", "events"]).is_err());
    }
}
