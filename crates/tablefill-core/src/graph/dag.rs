use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::schema::types::{ForeignKeyEdge, TableRef};

/// A directed graph of table dependencies via foreign keys.
/// Edges point from dependent table to referenced table (child → parent),
/// at most one per table pair however many constraints link them.
pub struct DependencyGraph {
    pub graph: DiGraph<TableRef, ()>,
    pub node_indices: HashMap<TableRef, NodeIndex>,
}

impl DependencyGraph {
    /// Build a graph over `tables`.
    ///
    /// Self-references are dropped (a table cannot be ordered before itself),
    /// as are edges into tables outside the set, which are assumed filled.
    pub fn from_edges(
        tables: &[TableRef],
        edges: &IndexMap<TableRef, Vec<ForeignKeyEdge>>,
    ) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for table in tables {
            let idx = graph.add_node(table.clone());
            node_indices.insert(table.clone(), idx);
        }

        for (table, table_edges) in edges {
            for edge in table_edges {
                if &edge.referenced_table == table {
                    continue;
                }
                if let (Some(&from_idx), Some(&to_idx)) = (
                    node_indices.get(table),
                    node_indices.get(&edge.referenced_table),
                ) {
                    graph.update_edge(from_idx, to_idx, ());
                }
            }
        }

        Self {
            graph,
            node_indices,
        }
    }

    pub fn table(&self, idx: NodeIndex) -> &TableRef {
        &self.graph[idx]
    }

    pub fn table_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
