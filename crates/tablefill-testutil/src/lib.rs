//! In-memory stand-ins for the database, shared by the core crate's
//! integration tests and benches.
//!
//! `InMemoryCatalog` answers every `SchemaInspector` query from tables
//! declared in code. `RecordingLoader` keeps every batch it is handed and can
//! be told to fail, slow down or write rows back into a catalog.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use indexmap::IndexMap;

use tablefill_core::error::{FillError, Result};
use tablefill_core::generate::engine::GeneratedRow;
use tablefill_core::output::{BulkLoader, LoadTarget};
use tablefill_core::pipeline::Batch;
use tablefill_core::schema::inspect::SchemaInspector;
use tablefill_core::schema::types::{ColumnDescriptor, ForeignKeyEdge, TableRef};

/// One stored row, column name to text value.
pub type StoredRow = IndexMap<String, String>;

#[derive(Debug, Clone, Default)]
struct CatalogTable {
    columns: Vec<ColumnDescriptor>,
    foreign_keys: Vec<ForeignKeyEdge>,
    rows: Vec<StoredRow>,
}

#[derive(Debug, Default)]
struct CatalogState {
    tables: IndexMap<TableRef, CatalogTable>,
}

/// A catalog held in memory. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Declare a table with `(name, declared_type)` columns.
    pub fn with_table(self, table: &TableRef, columns: &[(&str, &str)]) -> Self {
        let columns = columns
            .iter()
            .map(|(name, ty)| ColumnDescriptor::new(*name, *ty))
            .collect();
        self.state().tables.insert(
            table.clone(),
            CatalogTable {
                columns,
                ..Default::default()
            },
        );
        self
    }

    pub fn with_foreign_key(
        self,
        table: &TableRef,
        column: &str,
        referenced_table: &TableRef,
        referenced_column: &str,
    ) -> Self {
        if let Some(entry) = self.state().tables.get_mut(table) {
            entry.foreign_keys.push(ForeignKeyEdge::new(
                column,
                referenced_table.clone(),
                referenced_column,
            ));
        }
        self
    }

    /// Declare one constraint over several `(column, referenced_column)`
    /// pairs.
    pub fn with_composite_foreign_key(
        self,
        table: &TableRef,
        constraint: &str,
        pairs: &[(&str, &str)],
        referenced_table: &TableRef,
    ) -> Self {
        if let Some(entry) = self.state().tables.get_mut(table) {
            for (column, referenced_column) in pairs {
                entry.foreign_keys.push(
                    ForeignKeyEdge::new(*column, referenced_table.clone(), *referenced_column)
                        .in_constraint(constraint),
                );
            }
        }
        self
    }

    /// Add rows given as `(column, value)` pairs.
    pub fn with_rows(self, table: &TableRef, rows: &[&[(&str, &str)]]) -> Self {
        for row in rows {
            let row = row
                .iter()
                .map(|(c, v)| (c.to_string(), v.to_string()))
                .collect();
            self.insert_row(table, row);
        }
        self
    }

    pub fn insert_row(&self, table: &TableRef, row: StoredRow) {
        if let Some(entry) = self.state().tables.get_mut(table) {
            entry.rows.push(row);
        }
    }

    pub fn row_count(&self, table: &TableRef) -> usize {
        self.state()
            .tables
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    /// Make every later query fail as if the connection had dropped.
    pub fn fail_queries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// First `limit` distinct tuples of `columns`, in insertion order, from
    /// rows where every column is present.
    fn distinct_rows(&self, table: &TableRef, columns: &[String], limit: usize) -> Vec<Vec<String>> {
        let state = self.state();
        let mut tuples: Vec<Vec<String>> = Vec::new();
        if let Some(entry) = state.tables.get(table) {
            for row in &entry.rows {
                if tuples.len() >= limit {
                    break;
                }
                let tuple: Option<Vec<String>> =
                    columns.iter().map(|c| row.get(c).cloned()).collect();
                if let Some(tuple) = tuple {
                    if !tuples.contains(&tuple) {
                        tuples.push(tuple);
                    }
                }
            }
        }
        tuples
    }

    fn begin_query(&self, query: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FillError::Introspection {
                query: query.to_string(),
                source: sqlx::Error::PoolTimedOut,
            });
        }
        Ok(())
    }
}

impl SchemaInspector for InMemoryCatalog {
    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        self.begin_query("table_exists")?;
        Ok(self.state().tables.contains_key(table))
    }

    async fn get_columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>> {
        self.begin_query("get_columns")?;
        Ok(self
            .state()
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn get_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyEdge>> {
        self.begin_query("get_foreign_keys")?;
        Ok(self
            .state()
            .tables
            .get(table)
            .map(|t| t.foreign_keys.clone())
            .unwrap_or_default())
    }

    async fn is_empty(&self, table: &TableRef) -> Result<bool> {
        self.begin_query("is_empty")?;
        Ok(self.row_count(table) == 0)
    }

    /// Sorted by name, like the Postgres catalog query.
    async fn list_tables(&self, schema: &str) -> Result<Vec<TableRef>> {
        self.begin_query("list_tables")?;
        let mut tables: Vec<TableRef> = self
            .state()
            .tables
            .keys()
            .filter(|t| t.schema == schema)
            .cloned()
            .collect();
        tables.sort();
        Ok(tables)
    }

    async fn sample_distinct(
        &self,
        table: &TableRef,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        self.begin_query("sample_distinct")?;
        Ok(self
            .distinct_rows(table, &[column.to_string()], limit)
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    async fn sample_distinct_rows(
        &self,
        table: &TableRef,
        columns: &[String],
        limit: usize,
    ) -> Result<Vec<Vec<String>>> {
        self.begin_query("sample_distinct_rows")?;
        Ok(self.distinct_rows(table, columns, limit))
    }
}

/// A batch as the loader received it.
#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub index: usize,
    pub first_row: usize,
    pub rows: Vec<GeneratedRow>,
}

/// A `BulkLoader` that records batches instead of writing them anywhere.
#[derive(Debug, Default)]
pub struct RecordingLoader {
    batches: Mutex<Vec<RecordedBatch>>,
    failing_batches: HashSet<usize>,
    delay: Option<Duration>,
    write_back: Option<InMemoryCatalog>,
    active: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicUsize,
}

impl RecordingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the batches with these indices, in every table.
    pub fn failing_on(mut self, indices: &[usize]) -> Self {
        self.failing_batches = indices.iter().copied().collect();
        self
    }

    /// Sleep this long inside every load.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Insert every successfully loaded row into `catalog`.
    pub fn writing_to(mut self, catalog: InMemoryCatalog) -> Self {
        self.write_back = Some(catalog);
        self
    }

    /// Recorded batches in the order their loads ran.
    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// One table's batches, sorted by batch index.
    pub fn batches_for(&self, table: &TableRef) -> Vec<RecordedBatch> {
        let mut batches: Vec<RecordedBatch> = self
            .batches()
            .into_iter()
            .filter(|b| &b.table == table)
            .collect();
        batches.sort_by_key(|b| b.index);
        batches
    }

    /// Tables in the order their first batch arrived.
    pub fn tables_loaded(&self) -> Vec<TableRef> {
        let batches = self
            .batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut tables: Vec<TableRef> = Vec::new();
        for batch in batches.iter() {
            if !tables.contains(&batch.table) {
                tables.push(batch.table.clone());
            }
        }
        tables
    }

    pub fn rows_received(&self) -> usize {
        self.batches().iter().map(|b| b.rows.len()).sum()
    }

    /// Loads that returned, successfully or not.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Highest number of loads running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl BulkLoader for RecordingLoader {
    async fn load(&self, target: &LoadTarget, batch: &Batch) -> Result<u64> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedBatch {
                table: target.table.clone(),
                columns: target.columns.clone(),
                index: batch.index,
                first_row: batch.first_row,
                rows: batch.rows.clone(),
            });

        let result = if self.failing_batches.contains(&batch.index) {
            Err(FillError::Config {
                message: format!("batch {} rejected by test loader", batch.index),
            })
        } else {
            if let Some(catalog) = &self.write_back {
                for row in &batch.rows {
                    let stored = target
                        .columns
                        .iter()
                        .filter_map(|c| row.get(c).map(|v| (c.clone(), v.to_csv_string())))
                        .collect();
                    catalog.insert_row(&target.table, stored);
                }
            }
            Ok(batch.rows.len() as u64)
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

pub fn users() -> TableRef {
    TableRef::new("public", "users")
}

pub fn orders() -> TableRef {
    TableRef::new("public", "orders")
}

pub fn warehouses() -> TableRef {
    TableRef::new("public", "warehouses")
}

pub fn shipments() -> TableRef {
    TableRef::new("public", "shipments")
}

pub fn events() -> TableRef {
    TableRef::new("public", "events")
}

/// A small shop:
///
/// - `users` with three rows
/// - `orders` referencing `users.id`, two rows
/// - `warehouses`, empty
/// - `shipments` referencing `orders.id` and the empty `warehouses.id`
/// - `events` with an `interval` column
pub fn shop_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_table(
            &users(),
            &[
                ("id", "integer"),
                ("email", "character varying"),
                ("created_at", "timestamp with time zone"),
                ("active", "boolean"),
            ],
        )
        .with_rows(
            &users(),
            &[
                &[("id", "1"), ("email", "ada@example.com")],
                &[("id", "2"), ("email", "bob@example.com")],
                &[("id", "3"), ("email", "cy@example.com")],
            ],
        )
        .with_table(
            &orders(),
            &[
                ("id", "bigint"),
                ("user_id", "integer"),
                ("status", "text"),
                ("placed_on", "date"),
                ("details", "jsonb"),
            ],
        )
        .with_foreign_key(&orders(), "user_id", &users(), "id")
        .with_rows(
            &orders(),
            &[
                &[("id", "10"), ("user_id", "1"), ("status", "paid")],
                &[("id", "11"), ("user_id", "2"), ("status", "open")],
            ],
        )
        .with_table(&warehouses(), &[("id", "integer"), ("name", "text")])
        .with_table(
            &shipments(),
            &[
                ("id", "integer"),
                ("order_id", "bigint"),
                ("warehouse_id", "integer"),
            ],
        )
        .with_foreign_key(&shipments(), "order_id", &orders(), "id")
        .with_foreign_key(&shipments(), "warehouse_id", &warehouses(), "id")
        .with_table(
            &events(),
            &[("id", "uuid"), ("span", "interval"), ("label", "text")],
        )
}
