//! # Bulk Loading
//!
//! The `BulkLoader` capability commits one batch of generated rows to the
//! store. The pipeline calls it from many tasks at once, so implementations
//! must be shareable across threads and each call must be self-contained:
//! a failed batch can be replayed on its own.
//!
//! - `copy::PgCopyLoader` streams the batch over `COPY ... FROM STDIN`.
//! - `csv::CsvDirLoader` writes one delimited artifact per batch for a native
//!   loader to pick up later.

use std::future::Future;

use crate::error::Result;
use crate::pipeline::Batch;
use crate::schema::types::TableRef;

pub mod copy;
pub mod csv;

/// What a batch is loaded into: the table and the ordered columns written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTarget {
    pub table: TableRef,
    pub columns: Vec<String>,
}

impl LoadTarget {
    pub fn new(table: TableRef, columns: Vec<String>) -> Self {
        Self { table, columns }
    }
}

/// Commits batches of rows to the store.
pub trait BulkLoader: Send + Sync + 'static {
    /// Load every row of `batch` into `target`, returning the rows committed.
    fn load(
        &self,
        target: &LoadTarget,
        batch: &Batch,
    ) -> impl Future<Output = Result<u64>> + Send;
}
