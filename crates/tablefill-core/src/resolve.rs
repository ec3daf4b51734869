//! # Dependency Resolution
//!
//! Turns a table's foreign-key edges into the column → referenced column map
//! used for planning. Every referenced table must already hold rows; if any
//! is empty the whole table is refused, naming all empty tables at once.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{FillError, Result};
use crate::schema::inspect::SchemaInspector;
use crate::schema::types::{ForeignKeyEdge, TableRef};

/// Where a foreign-key column takes its values from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Constraint the column belongs to. Columns sharing it are drawn as one
    /// tuple.
    pub constraint: String,
    pub referenced_table: TableRef,
    pub referenced_column: String,
}

/// Foreign-key columns of the target table, in edge order.
pub type DependencyMap = IndexMap<String, Dependency>;

/// Check every referenced table for rows and build the dependency map.
///
/// Each referenced table is probed once even when several edges point at it.
/// Fails with `UnsatisfiedDependency` listing every empty table.
pub async fn resolve_dependencies<I: SchemaInspector>(
    inspector: &I,
    table: &TableRef,
    edges: &[ForeignKeyEdge],
) -> Result<DependencyMap> {
    let mut emptiness: HashMap<&TableRef, bool> = HashMap::new();
    let mut empty_tables: Vec<String> = Vec::new();
    let mut dependencies = DependencyMap::new();

    for edge in edges {
        let is_empty = match emptiness.get(&edge.referenced_table) {
            Some(&known) => known,
            None => {
                let probed = inspector.is_empty(&edge.referenced_table).await?;
                emptiness.insert(&edge.referenced_table, probed);
                if probed {
                    empty_tables.push(edge.referenced_table.to_string());
                }
                probed
            }
        };

        if !is_empty {
            dependencies.insert(
                edge.column.clone(),
                Dependency {
                    constraint: edge.constraint.clone(),
                    referenced_table: edge.referenced_table.clone(),
                    referenced_column: edge.referenced_column.clone(),
                },
            );
        }
    }

    if !empty_tables.is_empty() {
        return Err(FillError::UnsatisfiedDependency {
            table: table.to_string(),
            empty_tables,
        });
    }

    debug!("{}: {} foreign-key columns resolved", table, dependencies.len());
    Ok(dependencies)
}
