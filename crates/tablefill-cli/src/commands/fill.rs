use std::sync::Arc;

use anyhow::{bail, Context, Result};
use comfy_table::{Cell, Table as ComfyTable};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tablefill_core::config::TablefillConfig;
use tablefill_core::fill::{FillOptions, FillReport, Filler, SchemaReport, UnsupportedPolicy};
use tablefill_core::output::copy::PgCopyLoader;
use tablefill_core::output::csv::{session_dir_name, CsvDirLoader};
use tablefill_core::output::BulkLoader;
use tablefill_core::schema::postgres::PostgresInspector;
use tablefill_core::schema::types::TableRef;

use crate::args::FillArgs;
use crate::commands::{load_config, open_pool, resolve_schema};

pub async fn run(args: &FillArgs) -> Result<()> {
    let config = load_config()?;
    let options = merge_options(args, &config)?;
    let schema = resolve_schema(args.schema.as_deref(), &config);

    let pool = open_pool(args.db.as_deref(), &config, options.max_in_flight).await?;
    let inspector = PostgresInspector::new(pool.clone());

    // Ctrl-C stops generation; loads already dispatched still finish.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for in-flight batches to finish");
            signal_token.cancel();
        }
    });

    let outcome = match &args.output_dir {
        Some(dir) => {
            let session = dir.join(session_dir_name(
                chrono::Local::now().naive_local(),
                &mut rand::rng(),
            ));
            let loader = Arc::new(CsvDirLoader::new(&session));
            let outcome = execute(args, &schema, inspector, loader, options, cancel).await?;
            println!("Batches written to {}", session.display());
            outcome
        }
        None => {
            let loader = Arc::new(PgCopyLoader::new(pool.clone()));
            execute(args, &schema, inspector, loader, options, cancel).await?
        }
    };

    pool.close().await;

    print_summary(&outcome);
    if !outcome.is_success() {
        bail!(
            "{} tables failed, {} tables not attempted, {} batches failed to load",
            outcome.failed.len(),
            outcome.skipped.len(),
            outcome.load_failures()
        );
    }
    Ok(())
}

/// CLI flags over `tablefill.toml` over built-in defaults.
fn merge_options(args: &FillArgs, config: &TablefillConfig) -> Result<FillOptions> {
    let mut options = FillOptions::from_config(config);
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }
    if let Some(max_in_flight) = args.max_in_flight {
        options.max_in_flight = max_in_flight;
    }
    if !args.sample.is_empty() {
        options.samples = args.sample.clone();
    }
    if args.seed.is_some() {
        options.seed = args.seed;
    }
    if args.skip_unsupported {
        options.unsupported = UnsupportedPolicy::Skip;
    }
    options.order_by_dependencies |= args.order_by_dependencies;
    options.keep_going |= args.keep_going;

    if options.batch_size == 0 {
        bail!("--batch-size must be greater than 0");
    }
    if options.max_in_flight == 0 {
        bail!("--max-in-flight must be greater than 0");
    }
    Ok(options)
}

async fn execute<L: BulkLoader>(
    args: &FillArgs,
    schema: &str,
    inspector: PostgresInspector,
    loader: Arc<L>,
    options: FillOptions,
    cancel: CancellationToken,
) -> Result<SchemaReport> {
    let pb = ProgressBar::new(args.count as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:30}] {pos}/{len} rows")
            .context("Invalid progress template")?,
    );
    let bar = pb.clone();
    let filler = Filler::new(inspector, loader, options)
        .with_cancellation(cancel)
        .with_progress(Arc::new(
            move |table: &TableRef, generated: usize, count: usize| {
                bar.set_message(table.to_string());
                bar.set_length(count as u64);
                bar.set_position(generated as u64);
            },
        ));

    let report = if args.all_tables() {
        filler.fill_schema(schema, args.count).await?
    } else {
        let table = TableRef::new(schema, &args.table);
        let count = filler.options().count_for(&table, args.count);
        let mut report = SchemaReport::default();
        match filler.fill_table(&table, count).await {
            Ok(fill) => report.reports.push(fill),
            Err(e) => report.failed.push((table, e)),
        }
        report
    };
    pb.finish_and_clear();

    info!(
        "{} rows generated across {} tables",
        report.rows_generated(),
        report.reports.len()
    );
    Ok(report)
}

fn print_summary(report: &SchemaReport) {
    if !report.reports.is_empty() {
        let mut t = ComfyTable::new();
        t.set_header(vec![
            "Table", "Rows", "Batches", "Loaded", "Failed", "Seconds", "Rows/s",
        ]);
        for fill in &report.reports {
            t.add_row(summary_row(fill));
        }
        println!("{}", t);
    }

    for fill in &report.reports {
        for failure in &fill.failures {
            println!(
                "  ✗ {} batch {} (rows {}..{}): {}",
                failure.table,
                failure.batch_index,
                failure.first_row,
                failure.first_row + failure.row_count,
                failure.message
            );
        }
        if !fill.skipped_columns.is_empty() {
            println!(
                "  {} left to defaults: {}",
                fill.table,
                fill.skipped_columns.join(", ")
            );
        }
    }

    for (table, err) in &report.failed {
        println!("  ✗ {}: {}", table, err);
    }
    for table in &report.skipped {
        println!("  - {}: not attempted", table);
    }
}

fn summary_row(fill: &FillReport) -> Vec<Cell> {
    vec![
        Cell::new(fill.table.to_string()),
        Cell::new(fill.rows_generated),
        Cell::new(fill.batches),
        Cell::new(fill.rows_loaded),
        Cell::new(fill.failures.len()),
        Cell::new(format!("{:.2}", fill.elapsed.as_secs_f64())),
        Cell::new(format!("{:.0}", fill.throughput)),
    ]
}
