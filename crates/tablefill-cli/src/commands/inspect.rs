use anyhow::{bail, Result};
use comfy_table::{Cell, Table as ComfyTable};
use serde::Serialize;

use tablefill_core::config::TablefillConfig;
use tablefill_core::fill::{plan_table, FillOptions};
use tablefill_core::generate::plan::TablePlan;
use tablefill_core::schema::inspect::SchemaInspector;
use tablefill_core::schema::postgres::PostgresInspector;
use tablefill_core::schema::types::{ColumnDescriptor, ForeignKeyEdge, TableRef};
use tablefill_core::FillError;

use crate::args::{InspectArgs, InspectFormat};
use crate::commands::{load_config, open_pool, resolve_schema};

#[derive(Serialize)]
struct InspectReport {
    table: TableRef,
    columns: Vec<ColumnReport>,
    foreign_keys: Vec<ForeignKeyEdge>,
    /// Why the table cannot be filled right now, if it can't.
    blocked: Option<String>,
}

#[derive(Serialize)]
struct ColumnReport {
    name: String,
    declared_type: String,
    family: String,
    strategy: Option<String>,
    supported: bool,
    /// Existing values the column would draw from.
    samples: Vec<String>,
}

pub async fn run(args: &InspectArgs) -> Result<()> {
    let config = load_config()?;
    let schema = resolve_schema(args.schema.as_deref(), &config);
    let pool = open_pool(args.db.as_deref(), &config, 0).await?;
    let inspector = PostgresInspector::new(pool.clone());
    let table = TableRef::new(schema, &args.table);

    if !inspector.table_exists(&table).await? {
        bail!(FillError::NotFound {
            table: table.to_string()
        });
    }
    let columns = inspector.get_columns(&table).await?;
    let foreign_keys = inspector.get_foreign_keys(&table).await?;

    let samples = requested_samples(args, &config, &table);
    let (plan, blocked) = match plan_table(&inspector, &table, &samples).await {
        Ok(plan) => (Some(plan), None),
        Err(e @ FillError::UnsatisfiedDependency { .. }) => (None, Some(e.to_string())),
        Err(e) => return Err(e.into()),
    };
    pool.close().await;

    let report = build_report(table, &columns, foreign_keys, plan.as_ref(), blocked);
    match args.format {
        InspectFormat::Json => {
            let json = serde_json::to_string_pretty(&report)?;
            println!("{}", json);
        }
        InspectFormat::Table => print_report(&report),
    }
    Ok(())
}

/// The sample columns `fill` would use for this table: `--sample` over
/// `[fill] samples`, plus the table's own `[tables.<name>] samples`.
fn requested_samples(args: &InspectArgs, config: &TablefillConfig, table: &TableRef) -> Vec<String> {
    let mut options = FillOptions::from_config(config);
    if !args.sample.is_empty() {
        options.samples = args.sample.clone();
    }
    options.samples_for(table)
}

fn build_report(
    table: TableRef,
    columns: &[ColumnDescriptor],
    foreign_keys: Vec<ForeignKeyEdge>,
    plan: Option<&TablePlan>,
    blocked: Option<String>,
) -> InspectReport {
    let columns = columns
        .iter()
        .map(|column| {
            let planned = plan.and_then(|p| p.columns.iter().find(|c| c.column_name == column.name));
            let family = column.family();
            ColumnReport {
                name: column.name.clone(),
                declared_type: column.declared_type.clone(),
                supported: planned
                    .map(|c| !c.is_unsupported())
                    .unwrap_or_else(|| family.is_supported()),
                family: family.to_string(),
                strategy: planned.map(|c| c.strategy()),
                samples: planned
                    .and_then(|c| c.sample_pool.as_ref())
                    .map(|pool| pool.values().to_vec())
                    .unwrap_or_default(),
            }
        })
        .collect();

    InspectReport {
        table,
        columns,
        foreign_keys,
        blocked,
    }
}

fn print_report(report: &InspectReport) {
    println!("━━━ {} ━━━", report.table);

    let mut t = ComfyTable::new();
    t.set_header(vec!["Column", "Type", "Family", "FK", "Fill", "Samples"]);
    for column in &report.columns {
        let fk_target = report
            .foreign_keys
            .iter()
            .find(|fk| fk.column == column.name)
            .map(|fk| format!("→ {}.{}", fk.referenced_table, fk.referenced_column));
        let fill = match (&column.strategy, column.supported) {
            (_, false) => "unsupported".to_string(),
            (Some(strategy), true) => strategy.clone(),
            (None, true) => String::new(),
        };
        t.add_row(vec![
            Cell::new(&column.name),
            Cell::new(&column.declared_type),
            Cell::new(&column.family),
            Cell::new(fk_target.as_deref().unwrap_or("")),
            Cell::new(fill),
            Cell::new(column.samples.join(", ")),
        ]);
    }
    println!("{}", t);

    if let Some(reason) = &report.blocked {
        println!();
        println!("Cannot be filled yet: {}", reason);
    }
}
