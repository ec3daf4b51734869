//! # Error Types
//!
//! Defines `FillError`, the unified error enum for every failure mode of a
//! table fill. Each variant carries the table (and where relevant the column
//! or batch) it concerns, so a log line is enough to act on without digging
//! further.

use thiserror::Error;

/// All errors that can occur while filling tables.
#[derive(Error, Debug)]
pub enum FillError {
    #[error("Database connection failed: {message}\n  Connection: {connection_hint}\n  Cause: {source}")]
    Connection {
        message: String,
        connection_hint: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Schema introspection failed on query '{query}': {source}")]
    Introspection {
        query: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("No database connection configured. tablefill looks for one in this order:\n  1. --db flag\n  2. DATABASE_URL environment variable\n  3. .env file with DATABASE_URL\n  4. tablefill.toml [database] section (url, or host/port/user/password/database)")]
    NoDatabase,

    #[error("Table {table} does not exist")]
    NotFound { table: String },

    #[error("{table} has foreign keys into {}, which have no rows. Fill those tables first", .empty_tables.join(", "))]
    UnsatisfiedDependency {
        table: String,
        empty_tables: Vec<String>,
    },

    #[error("No sample values found for {table}.{column}. Will generate random data based on its type")]
    SamplingShortfall { table: String, column: String },

    #[error("Column {table}.{column} has type '{declared_type}', which tablefill cannot generate\n  Use --skip-unsupported to leave the column to its default")]
    UnsupportedType {
        table: String,
        column: String,
        declared_type: String,
    },

    #[error("Circular foreign-key dependency involving: {tables}")]
    CircularDependency { tables: String },

    #[error("COPY into {table} failed: {source}\n  Statement: {statement}")]
    Copy {
        table: String,
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Batch {batch_index} of {table} ({row_count} rows from row {first_row}) failed to load: {message}")]
    LoadFailed {
        table: String,
        batch_index: usize,
        first_row: usize,
        row_count: usize,
        message: String,
    },

    #[error("Fill of {table} cancelled after {rows_generated} rows")]
    Cancelled { table: String, rows_generated: usize },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Output error: {message}: {source}")]
    Output {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, FillError>;
