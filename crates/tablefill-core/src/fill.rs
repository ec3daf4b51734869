//! # Table Fill Orchestration
//!
//! `Filler` drives one table at a time through
//! `Validating → Planning → Generating → Draining → Done | Failed`:
//!
//! 1. **Validating**: the table must exist and every table it references must
//!    already hold rows.
//! 2. **Planning**: columns and sample pools are combined into an immutable
//!    `TablePlan`. Columns without a generation policy either fail the table
//!    or are left to their store default.
//! 3. **Generating**: exactly `count` rows are produced, one after another,
//!    from a single RNG and fed to the `BatchPipeline`.
//! 4. **Draining**: the fill waits for every dispatched load.
//!
//! All-tables mode runs the same sequence for every base table of a schema,
//! strictly one table after another.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{TablefillConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_IN_FLIGHT};
use crate::error::{FillError, Result};
use crate::generate::engine::generate_row;
use crate::generate::plan::TablePlan;
use crate::graph::dag::DependencyGraph;
use crate::graph::topo::dependency_order;
use crate::output::{BulkLoader, LoadTarget};
use crate::pipeline::{BatchPipeline, LoadFailure};
use crate::resolve::resolve_dependencies;
use crate::sample::collect_samples;
use crate::schema::inspect::SchemaInspector;
use crate::schema::types::TableRef;

/// Rows generated between two progress callbacks.
pub const PROGRESS_INTERVAL: usize = 100;

/// Called with the table, rows generated so far and the target count.
pub type ProgressFn = Arc<dyn Fn(&TableRef, usize, usize) + Send + Sync>;

/// What to do with columns whose type has no generation policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnsupportedPolicy {
    /// Refuse the table with `UnsupportedType`.
    #[default]
    Fail,
    /// Leave the column out of the load so the store default applies.
    Skip,
}

/// Per-table overrides, keyed by `schema.table` or bare table name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOptions {
    pub count: Option<usize>,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillOptions {
    pub batch_size: usize,
    pub max_in_flight: usize,
    /// Columns sampled from existing data in every table that has them.
    pub samples: Vec<String>,
    pub per_table: BTreeMap<String, TableOptions>,
    pub unsupported: UnsupportedPolicy,
    pub seed: Option<u64>,
    /// Reorder all-tables mode parents-first.
    pub order_by_dependencies: bool,
    /// Keep filling remaining tables after a table fails.
    pub keep_going: bool,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            samples: Vec::new(),
            per_table: BTreeMap::new(),
            unsupported: UnsupportedPolicy::Fail,
            seed: None,
            order_by_dependencies: false,
            keep_going: false,
        }
    }
}

impl FillOptions {
    /// Options seeded from the `[fill]` and `[tables]` sections of a config.
    pub fn from_config(config: &TablefillConfig) -> Self {
        let fill = &config.fill;
        let defaults = Self::default();
        Self {
            batch_size: fill.batch_size.unwrap_or(defaults.batch_size),
            max_in_flight: fill.max_in_flight.unwrap_or(defaults.max_in_flight),
            samples: fill.samples.clone(),
            per_table: config
                .tables
                .iter()
                .map(|(name, table)| {
                    (
                        name.clone(),
                        TableOptions {
                            count: table.count,
                            samples: table.samples.clone(),
                        },
                    )
                })
                .collect(),
            unsupported: if fill.skip_unsupported.unwrap_or(false) {
                UnsupportedPolicy::Skip
            } else {
                UnsupportedPolicy::Fail
            },
            seed: fill.seed,
            order_by_dependencies: fill.order_by_dependencies.unwrap_or(false),
            keep_going: fill.keep_going.unwrap_or(false),
        }
    }

    fn table_options(&self, table: &TableRef) -> Option<&TableOptions> {
        self.per_table
            .get(&table.to_string())
            .or_else(|| self.per_table.get(&table.name))
    }

    /// Global sample columns followed by the table's own, without repeats.
    pub fn samples_for(&self, table: &TableRef) -> Vec<String> {
        let mut samples = self.samples.clone();
        if let Some(opts) = self.table_options(table) {
            for name in &opts.samples {
                if !samples.contains(name) {
                    samples.push(name.clone());
                }
            }
        }
        samples
    }

    /// The table's configured row count, or `default`.
    pub fn count_for(&self, table: &TableRef, default: usize) -> usize {
        self.table_options(table)
            .and_then(|opts| opts.count)
            .unwrap_or(default)
    }
}

/// Lifecycle of a single table fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    Validating,
    Planning,
    Generating,
    Draining,
    Done,
    Failed,
}

impl fmt::Display for FillState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FillState::Validating => "validating",
            FillState::Planning => "planning",
            FillState::Generating => "generating",
            FillState::Draining => "draining",
            FillState::Done => "done",
            FillState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one table fill that reached `Done`.
#[derive(Debug, Clone)]
pub struct FillReport {
    pub table: TableRef,
    pub rows_generated: usize,
    pub batches: usize,
    pub rows_loaded: u64,
    pub failures: Vec<LoadFailure>,
    /// Columns left out of the load under `UnsupportedPolicy::Skip`.
    pub skipped_columns: Vec<String>,
    /// Wall time of this table's fill, validation included.
    pub elapsed: Duration,
    /// Rows per second since the `Filler` was created.
    pub throughput: f64,
}

impl FillReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of an all-tables run.
#[derive(Debug, Default)]
pub struct SchemaReport {
    /// Tables that reached `Done`, in fill order.
    pub reports: Vec<FillReport>,
    /// Tables that failed validation, planning or were cancelled.
    pub failed: Vec<(TableRef, FillError)>,
    /// Tables never attempted because an earlier table stopped the run.
    pub skipped: Vec<TableRef>,
}

impl SchemaReport {
    /// No table failed and no batch failed to load.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
            && self.skipped.is_empty()
            && self.reports.iter().all(FillReport::is_success)
    }

    pub fn rows_generated(&self) -> usize {
        self.reports.iter().map(|r| r.rows_generated).sum()
    }

    pub fn load_failures(&self) -> usize {
        self.reports.iter().map(|r| r.failures.len()).sum()
    }
}

/// Fills tables through an injected inspector and loader.
pub struct Filler<I: SchemaInspector, L: BulkLoader> {
    inspector: I,
    loader: Arc<L>,
    options: FillOptions,
    started: Instant,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl<I: SchemaInspector, L: BulkLoader> Filler<I, L> {
    pub fn new(inspector: I, loader: Arc<L>, options: FillOptions) -> Self {
        Self {
            inspector,
            loader,
            options,
            started: Instant::now(),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Stop generation when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(&self) -> &FillOptions {
        &self.options
    }

    /// Run the validating and planning steps without generating anything.
    ///
    /// Unsupported columns are left in the plan regardless of policy.
    pub async fn plan_table(&self, table: &TableRef) -> Result<TablePlan> {
        plan_table(&self.inspector, table, &self.options.samples_for(table)).await
    }

    /// Fill one table with `count` rows.
    ///
    /// Batch load failures are returned in the report, not as an error. Any
    /// error returned means no further rows will be generated for the table.
    pub async fn fill_table(&self, table: &TableRef, count: usize) -> Result<FillReport> {
        match self.run_table(table, count).await {
            Ok(report) => Ok(report),
            Err(e) => {
                transition(table, FillState::Failed);
                error!("{}", e);
                Err(e)
            }
        }
    }

    /// Fill every base table of `schema`, one after another.
    ///
    /// `count` applies to tables without a configured count. The first table
    /// that fails stops the run unless `keep_going` is set; cancellation
    /// always stops it. Only a failure to list the tables is returned as an
    /// error.
    pub async fn fill_schema(&self, schema: &str, count: usize) -> Result<SchemaReport> {
        let tables = self.inspector.list_tables(schema).await?;
        let tables = if self.options.order_by_dependencies {
            self.dependency_sorted(tables).await?
        } else {
            tables
        };
        info!("Filling {} tables in schema {}", tables.len(), schema);

        let mut report = SchemaReport::default();
        let mut remaining = tables.into_iter();
        while let Some(table) = remaining.next() {
            let table_count = self.options.count_for(&table, count);
            match self.fill_table(&table, table_count).await {
                Ok(fill) => report.reports.push(fill),
                Err(e) => {
                    let stop = matches!(e, FillError::Cancelled { .. }) || !self.options.keep_going;
                    report.failed.push((table, e));
                    if stop {
                        report.skipped.extend(remaining.by_ref());
                        break;
                    }
                }
            }
        }

        if !report.skipped.is_empty() {
            warn!(
                "{} tables were not filled: {}",
                report.skipped.len(),
                report
                    .skipped
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(report)
    }

    async fn run_table(&self, table: &TableRef, count: usize) -> Result<FillReport> {
        let table_started = Instant::now();
        let plan = self.plan_table(table).await?;

        let skipped_columns = self.check_unsupported(&plan)?;
        let target = LoadTarget::new(table.clone(), plan.load_columns());
        info!("{} is ready to be filled", table);

        transition(table, FillState::Generating);
        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut pipeline = BatchPipeline::new(
            Arc::clone(&self.loader),
            target,
            self.options.batch_size,
            self.options.max_in_flight,
        );

        let mut generated = 0;
        let mut cancelled = false;
        while generated < count {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            pipeline.push(generate_row(&plan, &mut rng)).await;
            generated += 1;
            if generated % PROGRESS_INTERVAL == 0 {
                self.report_progress(table, generated, count);
            }
        }

        if cancelled {
            warn!(
                "{}: cancelled after {} of {} rows, waiting for in-flight loads",
                table, generated, count
            );
            transition(table, FillState::Draining);
            let drained = pipeline.drain().await;
            info!(
                "{}: {} rows loaded before cancellation",
                table, drained.rows_loaded
            );
            return Err(FillError::Cancelled {
                table: table.to_string(),
                rows_generated: generated,
            });
        }

        pipeline.finish().await;
        self.report_progress(table, generated, count);

        transition(table, FillState::Draining);
        let drained = pipeline.drain().await;

        let elapsed = table_started.elapsed();
        let seconds = elapsed.as_secs_f64();
        let since_start = self.started.elapsed().as_secs_f64();
        let throughput = if since_start > 0.0 {
            generated as f64 / since_start
        } else {
            0.0
        };

        transition(table, FillState::Done);
        info!(
            "Table filled with {} rows into {} after {:.3} seconds",
            generated, table, seconds
        );
        info!("Throughput: {:.0} rows/second", throughput);
        if !drained.failures.is_empty() {
            warn!(
                "{}: {} of {} batches failed to load",
                table,
                drained.failures.len(),
                drained.batches_dispatched
            );
        }

        Ok(FillReport {
            table: table.clone(),
            rows_generated: generated,
            batches: drained.batches_dispatched,
            rows_loaded: drained.rows_loaded,
            failures: drained.failures,
            skipped_columns,
            elapsed,
            throughput,
        })
    }

    /// Apply the unsupported-type policy, returning the skipped column names.
    fn check_unsupported(&self, plan: &TablePlan) -> Result<Vec<String>> {
        let unsupported = plan.unsupported_columns();
        let Some(first) = unsupported.first() else {
            return Ok(Vec::new());
        };

        let refuse = || FillError::UnsupportedType {
            table: plan.table.to_string(),
            column: first.column_name.clone(),
            declared_type: first.declared_type.clone(),
        };
        if self.options.unsupported == UnsupportedPolicy::Fail {
            return Err(refuse());
        }
        // Nothing left to write.
        if unsupported.len() == plan.column_count() {
            return Err(refuse());
        }

        for column in &unsupported {
            warn!(
                "{}.{}: skipping column of unsupported type '{}'",
                plan.table, column.column_name, column.declared_type
            );
        }
        Ok(unsupported.iter().map(|c| c.column_name.clone()).collect())
    }

    /// Parents-first order of `tables`, or the given order on a cycle.
    async fn dependency_sorted(&self, tables: Vec<TableRef>) -> Result<Vec<TableRef>> {
        let mut edges = IndexMap::new();
        for table in &tables {
            edges.insert(table.clone(), self.inspector.get_foreign_keys(table).await?);
        }
        let graph = DependencyGraph::from_edges(&tables, &edges);
        match dependency_order(&graph) {
            Ok(order) => {
                debug!(
                    "Ordered {} tables over {} foreign keys",
                    graph.table_count(),
                    graph.edge_count()
                );
                Ok(order)
            }
            Err(e) => {
                warn!("{}. Keeping catalog order", e);
                Ok(tables)
            }
        }
    }

    fn report_progress(&self, table: &TableRef, generated: usize, count: usize) {
        if let Some(progress) = &self.progress {
            progress(table, generated, count);
        }
    }
}

/// Validate a table and build its generation plan.
///
/// Covers the validating and planning steps of a fill: existence, dependency
/// resolution, columns and sample collection. Nothing is generated.
pub async fn plan_table<I: SchemaInspector>(
    inspector: &I,
    table: &TableRef,
    samples: &[String],
) -> Result<TablePlan> {
    transition(table, FillState::Validating);
    let exists = match inspector.table_exists(table).await {
        Ok(exists) => exists,
        Err(e) => {
            error!("Could not check whether {} exists", table);
            return Err(e);
        }
    };
    if !exists {
        return Err(FillError::NotFound {
            table: table.to_string(),
        });
    }
    let edges = inspector.get_foreign_keys(table).await?;
    let dependencies = resolve_dependencies(inspector, table, &edges).await?;

    transition(table, FillState::Planning);
    let columns = inspector.get_columns(table).await?;
    let sampled = collect_samples(inspector, table, &columns, &dependencies, samples).await?;
    let plan = TablePlan::build(table, &columns, &dependencies, &sampled);
    debug!(
        "{}: {} columns planned, {} foreign keys, {} sampled",
        table,
        plan.column_count(),
        plan.foreign_key_count(),
        plan.sampled_count()
    );
    Ok(plan)
}

fn transition(table: &TableRef, state: FillState) {
    info!("{}: {}", table, state);
}
