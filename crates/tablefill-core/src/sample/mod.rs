//! # Sample Collection
//!
//! Pulls a small pool of distinct, already-stored values for the columns that
//! should reuse real data instead of random values. Foreign-key columns are
//! always sampled, from the referenced columns, so every drawn value satisfies
//! the constraint. A composite key is sampled as whole tuples and its columns
//! share one draw per row. Other columns are sampled from the target table
//! itself, and only when the caller asked for them by name.
//!
//! A column that yields no values is a soft failure: it is logged and the
//! column falls back to random generation.

use indexmap::IndexMap;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{FillError, Result};
use crate::resolve::{Dependency, DependencyMap};
use crate::schema::inspect::SchemaInspector;
use crate::schema::types::{ColumnDescriptor, TableRef};

/// Maximum number of distinct values (or tuples) kept per column.
pub const SAMPLE_LIMIT: usize = 5;

/// Distinct observed values for one column, read-only once collected.
///
/// Never empty. Pools of the same composite key carry the same `link` and
/// hold their tuple members at matching positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePool {
    values: Vec<String>,
    link: Option<String>,
}

impl SamplePool {
    /// Build a pool, truncating to `SAMPLE_LIMIT` values. `None` when there
    /// is nothing to draw from.
    pub fn new(mut values: Vec<String>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        values.truncate(SAMPLE_LIMIT);
        Some(Self { values, link: None })
    }

    /// Tie this pool to the other columns of `constraint`.
    pub fn linked(mut self, constraint: impl Into<String>) -> Self {
        self.link = Some(constraint.into());
        self
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    /// Pick a position uniformly.
    pub fn pick(&self, rng: &mut impl Rng) -> usize {
        rng.random_range(0..self.values.len())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Collected pools keyed by column name of the target table.
pub type SampleSet = IndexMap<String, SamplePool>;

/// Collect sample pools for a table's foreign-key columns and for every
/// column named in `requested`.
///
/// Each foreign-key constraint is sampled with one tuple query against the
/// referenced table. Requested names that are not columns of the table are
/// logged and ignored. Query failures are fatal; empty results are not.
pub async fn collect_samples<I: SchemaInspector>(
    inspector: &I,
    table: &TableRef,
    columns: &[ColumnDescriptor],
    dependencies: &DependencyMap,
    requested: &[String],
) -> Result<SampleSet> {
    for name in requested {
        if !columns.iter().any(|c| &c.name == name) {
            warn!(
                "{}: sample column '{}' does not exist, ignoring it",
                table, name
            );
        }
    }

    let mut samples = SampleSet::new();

    for (constraint, members) in by_constraint(dependencies) {
        let source_table = &members[0].1.referenced_table;
        let source_columns: Vec<String> = members
            .iter()
            .map(|(_, dep)| dep.referenced_column.clone())
            .collect();

        let tuples = inspector
            .sample_distinct_rows(source_table, &source_columns, SAMPLE_LIMIT)
            .await?;

        for (position, (column, _)) in members.iter().enumerate() {
            let values = tuples
                .iter()
                .filter_map(|tuple| tuple.get(position).cloned())
                .collect();
            let Some(pool) = SamplePool::new(values) else {
                shortfall(table, column);
                continue;
            };
            debug!(
                "{}.{}: sampled {} values from {}.{}",
                table,
                column,
                pool.len(),
                source_table,
                source_columns[position]
            );
            let pool = if members.len() > 1 {
                pool.linked(constraint)
            } else {
                pool
            };
            samples.insert(column.to_string(), pool);
        }
    }

    for column in columns {
        if dependencies.contains_key(&column.name)
            || !requested.iter().any(|r| r == &column.name)
        {
            continue;
        }

        let values = inspector
            .sample_distinct(table, &column.name, SAMPLE_LIMIT)
            .await?;
        match SamplePool::new(values) {
            Some(pool) => {
                debug!("{}.{}: sampled {} values", table, column.name, pool.len());
                samples.insert(column.name.clone(), pool);
            }
            None => shortfall(table, &column.name),
        }
    }

    Ok(samples)
}

/// Foreign-key columns grouped by constraint, in edge order.
fn by_constraint(dependencies: &DependencyMap) -> IndexMap<&str, Vec<(&str, &Dependency)>> {
    let mut groups: IndexMap<&str, Vec<(&str, &Dependency)>> = IndexMap::new();
    for (column, dep) in dependencies {
        groups
            .entry(dep.constraint.as_str())
            .or_default()
            .push((column.as_str(), dep));
    }
    groups
}

fn shortfall(table: &TableRef, column: &str) {
    let shortfall = FillError::SamplingShortfall {
        table: table.to_string(),
        column: column.to_string(),
    };
    warn!("{}", shortfall);
}
