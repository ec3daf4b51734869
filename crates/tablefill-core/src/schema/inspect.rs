use std::future::Future;

use crate::error::Result;
use crate::schema::types::{ColumnDescriptor, ForeignKeyEdge, TableRef};

/// Read-only access to catalog metadata and existing rows.
///
/// Every method is side-effect free against the store. Implementations must
/// hold a pooled connection only for the duration of a single query and give
/// it back on every exit path, errors included.
pub trait SchemaInspector: Send + Sync {
    /// Whether the table exists as a base table.
    fn table_exists(&self, table: &TableRef) -> impl Future<Output = Result<bool>> + Send;

    /// Columns in the order the catalog reports them.
    fn get_columns(
        &self,
        table: &TableRef,
    ) -> impl Future<Output = Result<Vec<ColumnDescriptor>>> + Send;

    /// Foreign-key edges owned by the table, one per column pair, grouped by
    /// constraint.
    fn get_foreign_keys(
        &self,
        table: &TableRef,
    ) -> impl Future<Output = Result<Vec<ForeignKeyEdge>>> + Send;

    /// True when a bounded existence probe finds no rows.
    fn is_empty(&self, table: &TableRef) -> impl Future<Output = Result<bool>> + Send;

    /// Base tables in a schema, in catalog order.
    fn list_tables(&self, schema: &str) -> impl Future<Output = Result<Vec<TableRef>>> + Send;

    /// Up to `limit` distinct non-null values of a column, as text.
    fn sample_distinct(
        &self,
        table: &TableRef,
        column: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Up to `limit` distinct combinations of `columns` in which every value
    /// is non-null. Each inner vector follows the order of `columns`.
    fn sample_distinct_rows(
        &self,
        table: &TableRef,
        columns: &[String],
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Vec<String>>>> + Send;
}
