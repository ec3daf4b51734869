pub mod config;
pub mod error;
pub mod fill;
pub mod generate;
pub mod graph;
pub mod output;
pub mod pipeline;
pub mod resolve;
pub mod sample;
pub mod schema;

// Re-export key types for convenience
pub use error::{FillError, Result};
pub use fill::{FillOptions, FillReport, Filler, SchemaReport};
pub use output::BulkLoader;
pub use schema::inspect::SchemaInspector;
pub use schema::types::{ColumnDescriptor, ForeignKeyEdge, TableRef, TypeFamily};
