use petgraph::algo::toposort;

use crate::error::{FillError, Result};
use crate::graph::dag::DependencyGraph;
use crate::schema::types::TableRef;

/// Order tables so every referenced table comes before the tables that
/// reference it.
///
/// Fails with `CircularDependency` when the graph has a cycle.
pub fn dependency_order(graph: &DependencyGraph) -> Result<Vec<TableRef>> {
    match toposort(&graph.graph, None) {
        // Edges run child → parent, so toposort lists children first.
        Ok(sorted) => Ok(sorted
            .iter()
            .rev()
            .map(|&idx| graph.table(idx).clone())
            .collect()),
        Err(cycle) => Err(FillError::CircularDependency {
            tables: graph.table(cycle.node_id()).to_string(),
        }),
    }
}
