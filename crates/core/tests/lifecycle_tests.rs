//! Lifecycle tests driving every command through in-memory collaborators.
//!
//! The mock catalog does not apply executed statements, so each test updates
//! it by hand between steps to mirror what the database would have done.

use chrono::NaiveDate;
use partwise_core::mocks::{MemorySink, MockCatalog, RecordingExecutor};
use partwise_core::{
    execute, AddPartitionsOptions, AnalyzeOptions, Command, ExecutionContext, FillOptions,
    PartitionError, PrepOptions, PrepTarget, Period, SwapOptions, TableRef,
};
use std::time::Duration;

fn events() -> TableRef {
    TableRef::new("public", "events")
}

fn march_15() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

/// Live table with a bigint key and a timestamp column.
fn live_table(catalog: &MockCatalog) {
    let table = events();
    catalog.add_table(&table, &["id", "created_at", "payload"]);
    catalog.set_column_type(&table, "created_at", "timestamp without time zone");
    catalog.set_primary_key(&table, &[("id", "bigint")]);
}

fn prep_command(column: &str, period: Period, trigger_based: bool) -> Command {
    Command::Prep(PrepOptions {
        table: "events".to_string(),
        target: PrepTarget::Partitioned {
            column: column.to_string(),
            period,
            trigger_based,
        },
    })
}

fn add_partitions_command(intermediate: bool, past: u32, future: u32) -> Command {
    Command::AddPartitions(AddPartitionsOptions {
        table: "events".to_string(),
        intermediate,
        past,
        future,
    })
}

#[tokio::test]
async fn test_prep_declarative_day() {
    let catalog = MockCatalog::new();
    live_table(&catalog);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    let outcome = execute(&ctx, &prep_command("created_at", Period::Day, false))
        .await
        .unwrap();

    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].transactional);
    assert_eq!(
        calls[0].statements,
        vec![
            "CREATE TABLE \"public\".\"events_intermediate\" (LIKE \"public\".\"events\" INCLUDING DEFAULTS INCLUDING CONSTRAINTS INCLUDING STORAGE INCLUDING COMMENTS) PARTITION BY RANGE (\"created_at\");".to_string(),
            "COMMENT ON TABLE \"public\".\"events_intermediate\" IS 'column:created_at,period:day,cast:timestamp';".to_string(),
        ]
    );
    assert_eq!(outcome.statements, 2);
    assert_eq!(sink.statements(), calls[0].statements);
}

#[tokio::test]
async fn test_prep_trigger_based_on_old_server() {
    let catalog = MockCatalog::new().with_server_version(90_600);
    live_table(&catalog);
    catalog.add_foreign_key(&events(), "FOREIGN KEY (account_id) REFERENCES accounts(id)");
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    execute(&ctx, &prep_command("created_at", Period::Month, false))
        .await
        .unwrap();

    let applied = executor.applied();
    assert_eq!(applied.len(), 5);
    assert!(applied[0].ends_with("(LIKE \"public\".\"events\" INCLUDING ALL);"));
    assert_eq!(
        applied[1],
        "ALTER TABLE \"public\".\"events_intermediate\" ADD FOREIGN KEY (account_id) REFERENCES accounts(id);"
    );
    assert!(applied[2].contains("RAISE EXCEPTION 'Create partitions first.';"));
    assert!(applied[3].starts_with("CREATE TRIGGER \"events_insert_trigger\""));
    assert_eq!(
        applied[4],
        "COMMENT ON TRIGGER \"events_insert_trigger\" ON \"public\".\"events_intermediate\" IS 'column:created_at,period:month,cast:timestamp';"
    );
}

#[tokio::test]
async fn test_prep_preconditions() {
    let catalog = MockCatalog::new();
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    let err = execute(&ctx, &prep_command("created_at", Period::Day, false))
        .await
        .unwrap_err();
    assert_eq!(err, PartitionError::TableNotFound("public.events".to_string()));

    live_table(&catalog);
    let err = execute(&ctx, &prep_command("missing", Period::Day, false))
        .await
        .unwrap_err();
    assert_eq!(err, PartitionError::ColumnNotFound("missing".to_string()));

    catalog.add_table(&events().intermediate(), &["id"]);
    let err = execute(&ctx, &prep_command("created_at", Period::Day, false))
        .await
        .unwrap_err();
    assert!(matches!(err, PartitionError::TableExists(_)));
    assert!(err.is_precondition());

    assert!(executor.calls().is_empty());
    assert!(sink.statements().is_empty());
}

#[test]
fn test_prep_argument_validation() {
    let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    let options = PrepOptions::from_args(&args(&["events", "created_at", "day"]), false, false)
        .unwrap();
    assert_eq!(
        options.target,
        PrepTarget::Partitioned {
            column: "created_at".to_string(),
            period: Period::Day,
            trigger_based: false,
        }
    );

    let options = PrepOptions::from_args(&args(&["events"]), true, false).unwrap();
    assert_eq!(options.target, PrepTarget::Unpartitioned);

    let err = PrepOptions::from_args(&args(&["events"]), true, true).unwrap_err();
    assert!(matches!(err, PartitionError::Usage(_)));
    let err = PrepOptions::from_args(&args(&["events", "created_at"]), false, false).unwrap_err();
    assert!(matches!(err, PartitionError::Usage(_)));
    let err = PrepOptions::from_args(&args(&["events", "created_at", "week"]), false, false)
        .unwrap_err();
    assert_eq!(err, PartitionError::InvalidPeriod("week".to_string()));
}

#[tokio::test]
async fn test_add_partitions_is_idempotent() {
    let catalog = MockCatalog::new();
    live_table(&catalog);
    let intermediate = events().intermediate();
    catalog.add_table(&intermediate, &["id", "created_at", "payload"]);
    catalog.set_table_comment(&intermediate, "column:created_at,period:month,cast:date");
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink).with_today(march_15());

    let outcome = execute(&ctx, &add_partitions_command(true, 1, 1))
        .await
        .unwrap();

    let names: Vec<String> = outcome.partitions_added.iter().map(|t| t.name.clone()).collect();
    assert_eq!(names, vec!["events_202402", "events_202403", "events_202404"]);
    let applied = executor.applied();
    assert_eq!(
        applied[0],
        "CREATE TABLE \"public\".\"events_202402\" PARTITION OF \"public\".\"events_intermediate\" FOR VALUES FROM ('2024-02-01') TO ('2024-03-01');"
    );
    assert_eq!(
        applied[1],
        "ALTER TABLE \"public\".\"events_202402\" ADD PRIMARY KEY (\"id\");"
    );
    assert_eq!(applied.len(), 6);

    for table in &outcome.partitions_added {
        catalog.add_child(&intermediate, table);
    }

    let again = execute(&ctx, &add_partitions_command(true, 1, 1))
        .await
        .unwrap();
    assert!(again.partitions_added.is_empty());
    assert_eq!(again.statements, 0);
    assert_eq!(executor.calls().len(), 1);
}

#[tokio::test]
async fn test_add_partitions_trigger_based_rebuilds_routing() {
    let catalog = MockCatalog::new();
    live_table(&catalog);
    let intermediate = events().intermediate();
    catalog.add_table(&intermediate, &["id", "created_at", "payload"]);
    catalog.set_trigger_comment(
        &intermediate,
        "events_insert_trigger",
        "column:created_at,period:day,cast:timestamptz",
    );
    catalog.set_primary_key(&intermediate, &[("id", "bigint")]);
    catalog.add_index(
        &intermediate,
        "CREATE INDEX events_intermediate_created_at_idx ON public.events_intermediate USING btree (created_at)",
    );
    let existing = events().partition("20240314");
    catalog.add_child(&intermediate, &existing);

    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink).with_today(march_15());

    let outcome = execute(&ctx, &add_partitions_command(true, 1, 1))
        .await
        .unwrap();

    let names: Vec<String> = outcome.partitions_added.iter().map(|t| t.name.clone()).collect();
    assert_eq!(names, vec!["events_20240315", "events_20240316"]);

    let applied = executor.applied();
    assert!(applied[0].contains("INHERITS (\"public\".\"events_intermediate\")"));
    assert!(applied[0].contains(
        "CHECK (\"created_at\" >= '2024-03-15 00:00:00 UTC'::timestamptz AND \"created_at\" < '2024-03-16 00:00:00 UTC'::timestamptz)"
    ));
    assert_eq!(
        applied[2],
        "CREATE INDEX ON \"public\".\"events_20240315\" USING btree (created_at);"
    );

    let function = applied.last().unwrap();
    assert!(function.starts_with("CREATE OR REPLACE FUNCTION \"events_insert_trigger\"()"));
    // current day first, then future, then the existing past partition
    let current = function.find("\"events_20240315\"").unwrap();
    let future = function.find("\"events_20240316\"").unwrap();
    let past = function.find("\"events_20240314\"").unwrap();
    assert!(current < future && future < past);
}

#[tokio::test]
async fn test_add_partitions_hints_at_intermediate() {
    let catalog = MockCatalog::new();
    live_table(&catalog);
    catalog.add_table(&events().intermediate(), &["id"]);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    let err = execute(&ctx, &add_partitions_command(false, 0, 0))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "No settings found: public.events\nDid you mean to use --intermediate?"
    );
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_add_partitions_rewrites_legacy_settings() {
    let catalog = MockCatalog::new();
    live_table(&catalog);
    let intermediate = events().intermediate();
    catalog.add_table(&intermediate, &["id", "created_at"]);
    catalog.set_trigger_comment(
        &intermediate,
        "events_insert_trigger",
        "column:created_at,period:month",
    );
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink).with_today(march_15());

    execute(&ctx, &add_partitions_command(true, 0, 0))
        .await
        .unwrap();

    assert_eq!(
        executor.applied()[0],
        "COMMENT ON TRIGGER \"events_insert_trigger\" ON \"public\".\"events_intermediate\" IS 'column:created_at,period:month,cast:date';"
    );
}

#[tokio::test]
async fn test_add_partitions_trigger_based_twice_keeps_routing() {
    let catalog = MockCatalog::new();
    live_table(&catalog);
    let intermediate = events().intermediate();
    catalog.add_table(&intermediate, &["id", "created_at", "payload"]);
    catalog.set_trigger_comment(
        &intermediate,
        "events_insert_trigger",
        "column:created_at,period:day,cast:timestamp",
    );
    catalog.set_primary_key(&intermediate, &[("id", "bigint")]);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink).with_today(march_15());

    let first = execute(&ctx, &add_partitions_command(true, 1, 1))
        .await
        .unwrap();
    assert_eq!(first.partitions_added.len(), 3);
    for table in &first.partitions_added {
        catalog.add_child(&intermediate, table);
    }

    let second = execute(&ctx, &add_partitions_command(true, 1, 1))
        .await
        .unwrap();
    assert!(second.partitions_added.is_empty());

    let calls = executor.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1]
        .statements
        .iter()
        .all(|s| !s.starts_with("CREATE TABLE")));
    let routing = |statements: &[String]| {
        statements
            .iter()
            .find(|s| s.starts_with("CREATE OR REPLACE FUNCTION"))
            .cloned()
            .unwrap()
    };
    assert_eq!(routing(&calls[0].statements), routing(&calls[1].statements));
}

#[tokio::test]
async fn test_add_partitions_rejects_window_beyond_calendar() {
    let catalog = MockCatalog::new();
    live_table(&catalog);
    let intermediate = events().intermediate();
    catalog.add_table(&intermediate, &["id", "created_at"]);
    catalog.set_table_comment(&intermediate, "column:created_at,period:day,cast:date");
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink).with_today(march_15());

    let err = execute(&ctx, &add_partitions_command(true, 200_000_000, 0))
        .await
        .unwrap_err();

    assert!(matches!(err, PartitionError::Usage(_)));
    assert!(executor.calls().is_empty());
    assert!(sink.statements().is_empty());
}

fn fill_fixture(catalog: &MockCatalog) {
    live_table(catalog);
    let intermediate = events().intermediate();
    catalog.add_table(&intermediate, &["id", "created_at", "payload"]);
    catalog.set_primary_key(&intermediate, &[("id", "bigint")]);
    catalog.set_ids(&events(), &[1, 25_000]);
}

fn fill_command(batch_size: i64) -> Command {
    let mut options = FillOptions::new("events");
    options.batch_size = batch_size;
    Command::Fill(options)
}

#[tokio::test]
async fn test_fill_copies_in_batches() {
    let catalog = MockCatalog::new();
    fill_fixture(&catalog);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    let outcome = execute(&ctx, &fill_command(10_000)).await.unwrap();

    assert_eq!(outcome.batches, 3);
    let calls = executor.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| !c.transactional));
    assert!(calls[0].statements[0].starts_with("/* 1 of 3 */"));
    assert!(calls[2].statements[0].contains("\"id\" > 20000 AND \"id\" <= 25000"));
    assert_eq!(sink.batches(), vec![(1, 3), (2, 3), (3, 3)]);
}

#[tokio::test]
async fn test_fill_resumes_from_destination() {
    let catalog = MockCatalog::new();
    fill_fixture(&catalog);
    catalog.set_ids(&events().intermediate(), &[1, 12_000]);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    let outcome = execute(&ctx, &fill_command(10_000)).await.unwrap();

    assert_eq!(outcome.batches, 2);
    let applied = executor.applied();
    assert!(applied[0].contains("\"id\" > 12000 AND \"id\" <= 22000"));
    assert!(applied[1].contains("\"id\" > 22000 AND \"id\" <= 25000"));
}

#[tokio::test]
async fn test_fill_failure_keeps_earlier_batches() {
    let catalog = MockCatalog::new();
    fill_fixture(&catalog);
    let executor = RecordingExecutor::new();
    executor.fail_on("/* 2 of 3 */");
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    let err = execute(&ctx, &fill_command(10_000)).await.unwrap_err();

    assert!(matches!(err, PartitionError::Execution { .. }));
    assert!(!err.is_precondition());
    let applied = executor.applied();
    assert_eq!(applied.len(), 1);
    assert!(applied[0].starts_with("/* 1 of 3 */"));
    assert_eq!(sink.batches(), vec![(1, 3)]);
}

#[tokio::test]
async fn test_fill_nothing_to_do() {
    let catalog = MockCatalog::new();
    fill_fixture(&catalog);
    catalog.set_ids(&events().intermediate(), &[25_000]);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    let outcome = execute(&ctx, &fill_command(10_000)).await.unwrap();

    assert_eq!(outcome.batches, 0);
    assert!(executor.calls().is_empty());
    assert_eq!(sink.statements(), vec!["/* nothing to fill */".to_string()]);
}

#[tokio::test]
async fn test_fill_restricts_to_partition_window() {
    let catalog = MockCatalog::new();
    fill_fixture(&catalog);
    let intermediate = events().intermediate();
    // partitioned parents carry no key of their own on older servers
    catalog.set_primary_key(&intermediate, &[]);
    catalog.set_table_comment(&intermediate, "column:created_at,period:month,cast:date");
    let march = events().partition("202403");
    let april = events().partition("202404");
    catalog.add_child(&intermediate, &march);
    catalog.add_child(&intermediate, &april);
    catalog.set_primary_key(&april, &[("id", "bigint")]);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    execute(&ctx, &fill_command(50_000)).await.unwrap();

    let applied = executor.applied();
    assert_eq!(applied.len(), 1);
    assert!(applied[0].ends_with(
        "\"created_at\" >= '2024-03-01'::date AND \"created_at\" < '2024-05-01'::date"
    ));
}

#[tokio::test]
async fn test_fill_rejects_unusable_keys() {
    let catalog = MockCatalog::new();
    fill_fixture(&catalog);
    let intermediate = events().intermediate();
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    catalog.set_primary_key(&intermediate, &[("id", "uuid")]);
    let err = execute(&ctx, &fill_command(10_000)).await.unwrap_err();
    assert_eq!(
        err,
        PartitionError::UnsupportedPrimaryKey("Only numeric primary keys are supported".to_string())
    );

    catalog.set_primary_key(&intermediate, &[]);
    let err = execute(&ctx, &fill_command(10_000)).await.unwrap_err();
    assert_eq!(err, PartitionError::NoPrimaryKey);
    assert!(executor.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fill_dry_run_skips_execution_and_sleep() {
    let catalog = MockCatalog::new();
    fill_fixture(&catalog);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink).with_dry_run(true);

    let mut options = FillOptions::new("events");
    options.sleep = Some(Duration::from_secs(3600));
    let started = tokio::time::Instant::now();
    let outcome = execute(&ctx, &Command::Fill(options)).await.unwrap();

    assert_eq!(outcome.batches, 3);
    assert!(executor.calls().is_empty());
    assert_eq!(sink.statements().len(), 3);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_fill_with_huge_batch_size() {
    let catalog = MockCatalog::new();
    fill_fixture(&catalog);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    let outcome = execute(&ctx, &fill_command(i64::MAX)).await.unwrap();

    assert_eq!(outcome.batches, 1);
    let applied = executor.applied();
    assert_eq!(applied.len(), 1);
    assert!(applied[0].starts_with("/* 1 of 1 */"));
    assert!(applied[0].contains("\"id\" > 0 AND \"id\" <= 25000"));
}

#[tokio::test(start_paused = true)]
async fn test_fill_sleeps_between_batches_only() {
    let catalog = MockCatalog::new();
    fill_fixture(&catalog);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    let mut options = FillOptions::new("events");
    options.sleep = Some(Duration::from_secs(60));
    let started = tokio::time::Instant::now();
    let outcome = execute(&ctx, &Command::Fill(options)).await.unwrap();

    assert_eq!(outcome.batches, 3);
    assert_eq!(executor.calls().len(), 3);
    // two pauses for three batches
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(120));
    assert!(elapsed < Duration::from_secs(180));
}

#[tokio::test]
async fn test_fill_swapped_copies_retired_rows_into_live_table() {
    let catalog = MockCatalog::new();
    let table = events();
    catalog.add_table(&table, &["id", "created_at", "payload"]);
    catalog.set_primary_key(&table, &[("id", "bigint")]);
    catalog.set_table_comment(&table, "column:created_at,period:month,cast:date");
    catalog.add_child(&table, &table.partition("202403"));
    catalog.add_child(&table, &table.partition("202404"));
    // rows written after the swap sit above the retired maximum
    catalog.set_ids(&table, &[300, 501, 502]);
    let retired = table.retired();
    catalog.add_table(&retired, &["id", "created_at", "payload"]);
    catalog.set_ids(&retired, &[1, 500]);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    let mut options = FillOptions::new("events");
    options.swapped = true;
    options.batch_size = 100;
    let outcome = execute(&ctx, &Command::Fill(options)).await.unwrap();

    assert_eq!(outcome.batches, 2);
    let applied = executor.applied();
    assert_eq!(
        applied[0],
        "/* 1 of 2 */\nINSERT INTO \"public\".\"events\" (\"id\", \"created_at\", \"payload\")\n    SELECT \"id\", \"created_at\", \"payload\" FROM \"public\".\"events_retired\"\n    WHERE \"id\" > 300 AND \"id\" <= 400 AND \"created_at\" >= '2024-03-01'::date AND \"created_at\" < '2024-05-01'::date"
    );
    assert!(applied[1].contains("\"id\" > 400 AND \"id\" <= 500"));
}

#[tokio::test]
async fn test_fill_with_table_overrides() {
    let catalog = MockCatalog::new();
    live_table(&catalog);
    let source = TableRef::new("archive", "events_old");
    let destination = TableRef::new("public", "events_copy");
    catalog.add_table(&source, &["id", "created_at"]);
    catalog.set_ids(&source, &[1, 150]);
    catalog.add_table(&destination, &["id", "created_at"]);
    catalog.set_primary_key(&destination, &[("id", "integer")]);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    let mut options = FillOptions::new("events");
    options.source_table = Some("archive.events_old".to_string());
    options.dest_table = Some("events_copy".to_string());
    options.batch_size = 100;
    execute(&ctx, &Command::Fill(options)).await.unwrap();

    let applied = executor.applied();
    assert_eq!(applied.len(), 2);
    assert!(applied[0].contains(
        "INSERT INTO \"public\".\"events_copy\" (\"id\", \"created_at\")\n    SELECT \"id\", \"created_at\" FROM \"archive\".\"events_old\""
    ));
    assert!(applied[0].ends_with("WHERE \"id\" > 0 AND \"id\" <= 100"));
    assert!(applied[1].ends_with("WHERE \"id\" > 100 AND \"id\" <= 150"));
}

#[tokio::test]
async fn test_swap_then_unswap() {
    let catalog = MockCatalog::new();
    live_table(&catalog);
    let table = events();
    catalog.add_table(&table.intermediate(), &["id"]);
    catalog.add_sequence(&table, "events_id_seq", "id");
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    execute(
        &ctx,
        &Command::Swap(SwapOptions {
            table: "events".to_string(),
            lock_timeout: "5s".to_string(),
        }),
    )
    .await
    .unwrap();

    let sequence =
        "ALTER SEQUENCE \"public\".\"events_id_seq\" OWNED BY \"public\".\"events\".\"id\";";
    assert_eq!(
        executor.calls()[0].statements,
        vec![
            "SET LOCAL lock_timeout = '5s';",
            "ALTER TABLE \"public\".\"events\" RENAME TO \"events_retired\";",
            "ALTER TABLE \"public\".\"events_intermediate\" RENAME TO \"events\";",
            sequence,
        ]
    );

    catalog.add_table(&table.retired(), &["id"]);
    catalog.remove_table(&table.intermediate());

    execute(&ctx, &Command::Unswap { table: "events".to_string() })
        .await
        .unwrap();

    assert_eq!(
        executor.calls()[1].statements,
        vec![
            "ALTER TABLE \"public\".\"events\" RENAME TO \"events_intermediate\";",
            "ALTER TABLE \"public\".\"events_retired\" RENAME TO \"events\";",
            sequence,
        ]
    );
}

#[tokio::test]
async fn test_swap_refuses_existing_retired_table() {
    let catalog = MockCatalog::new();
    live_table(&catalog);
    catalog.add_table(&events().intermediate(), &["id"]);
    catalog.add_table(&events().retired(), &["id"]);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    let err = execute(
        &ctx,
        &Command::Swap(SwapOptions {
            table: "events".to_string(),
            lock_timeout: "5s".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err, PartitionError::TableExists("public.events_retired".to_string()));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_unprep_drops_table_and_function() {
    let catalog = MockCatalog::new();
    live_table(&catalog);
    catalog.add_table(&events().intermediate(), &["id"]);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    execute(&ctx, &Command::Unprep { table: "events".to_string() })
        .await
        .unwrap();

    assert_eq!(
        executor.applied(),
        vec![
            "DROP TABLE \"public\".\"events_intermediate\" CASCADE;",
            "DROP FUNCTION IF EXISTS \"events_insert_trigger\"();",
        ]
    );
}

#[tokio::test]
async fn test_analyze_partitions_then_parent() {
    let catalog = MockCatalog::new();
    live_table(&catalog);
    let intermediate = events().intermediate();
    catalog.add_table(&intermediate, &["id"]);
    catalog.set_table_comment(&intermediate, "column:created_at,period:month,cast:date");
    catalog.add_child(&intermediate, &events().partition("202404"));
    catalog.add_child(&intermediate, &events().partition("202403"));
    catalog.add_child(&intermediate, &events().partition("legacy"));
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    execute(
        &ctx,
        &Command::Analyze(AnalyzeOptions {
            table: "events".to_string(),
            swapped: false,
        }),
    )
    .await
    .unwrap();

    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].transactional);
    assert_eq!(
        calls[0].statements,
        vec![
            "ANALYZE VERBOSE \"public\".\"events_202403\";",
            "ANALYZE VERBOSE \"public\".\"events_202404\";",
            "ANALYZE VERBOSE \"public\".\"events_intermediate\";",
        ]
    );
}

#[tokio::test]
async fn test_analyze_swapped_targets_live_table() {
    let catalog = MockCatalog::new();
    let table = events();
    catalog.add_table(&table, &["id", "created_at"]);
    catalog.set_trigger_comment(
        &table,
        "events_insert_trigger",
        "column:created_at,period:day,cast:date",
    );
    catalog.add_child(&table, &table.partition("20240315"));
    catalog.add_child(&table, &table.partition("20240314"));
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    execute(
        &ctx,
        &Command::Analyze(AnalyzeOptions {
            table: "events".to_string(),
            swapped: true,
        }),
    )
    .await
    .unwrap();

    assert_eq!(
        executor.applied(),
        vec![
            "ANALYZE VERBOSE \"public\".\"events_20240314\";",
            "ANALYZE VERBOSE \"public\".\"events_20240315\";",
            "ANALYZE VERBOSE \"public\".\"events\";",
        ]
    );
}

#[tokio::test]
async fn test_schema_qualified_names() {
    let catalog = MockCatalog::new().with_current_schema("app");
    let table = TableRef::new("audit", "events");
    catalog.add_table(&table, &["id"]);
    catalog.add_table(&table.intermediate(), &["id"]);
    let executor = RecordingExecutor::new();
    let sink = MemorySink::new();
    let ctx = ExecutionContext::new(&catalog, &executor, &sink);

    execute(&ctx, &Command::Unprep { table: "audit.events".to_string() })
        .await
        .unwrap();
    assert_eq!(
        executor.applied()[0],
        "DROP TABLE \"audit\".\"events_intermediate\" CASCADE;"
    );

    let err = execute(&ctx, &Command::Unprep { table: "events".to_string() })
        .await
        .unwrap_err();
    assert_eq!(err, PartitionError::TableNotFound("app.events_intermediate".to_string()));
}
