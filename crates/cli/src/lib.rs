//! partwise command line front end.

pub mod cli;
mod output;

use anyhow::Result;
use partwise_core::{execute, CommandOutcome, ExecutionContext};
use partwise_postgres::{ConnectionConfig, PgCatalog, PgExecutor};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use cli::{Cli, Commands};
pub use output::ConsoleSink;

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Executes one command end-to-end against the configured database.
pub async fn run(cli: Cli) -> Result<CommandOutcome> {
    let command = cli.command.into_command()?;
    let config = ConnectionConfig::new(cli.url.unwrap_or_default());
    let pool = config.connect().await?;

    let catalog = PgCatalog::new(pool.clone());
    let executor = PgExecutor::new(pool.clone());
    let sink = ConsoleSink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink).with_dry_run(cli.dry_run);

    let result = execute(&ctx, &command).await;
    pool.close().await;
    let outcome = result?;

    info!(
        command = command.name(),
        statements = outcome.statements,
        partitions_added = outcome.partitions_added.len(),
        batches = outcome.batches,
        dry_run = cli.dry_run,
        "command finished"
    );
    Ok(outcome)
}
