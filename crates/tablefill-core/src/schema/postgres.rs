use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::error::{FillError, Result};
use crate::schema::inspect::SchemaInspector;
use crate::schema::types::*;

/// Open a bounded connection pool from config (or an explicit URL).
///
/// The pool holds at least one connection more than `max_in_flight`, so
/// every concurrent load gets a connection without waiting on the pool and
/// catalog queries still have one left. Every connection carries the
/// configured statement timeout, so a runaway catalog or sampling query is
/// cut off server-side.
pub async fn connect(
    config: &DatabaseConfig,
    url: Option<&str>,
    max_in_flight: usize,
) -> Result<PgPool> {
    let options = config.connect_options(url)?;
    let size = config.pool_size(max_in_flight);
    debug!("Opening a pool of {} connections", size);
    PgPoolOptions::new()
        .max_connections(size)
        .connect_with(options)
        .await
        .map_err(|e| FillError::Connection {
            message: "Failed to connect to PostgreSQL".to_string(),
            connection_hint: config.connection_hint(url),
            source: e,
        })
}

/// Catalog access backed by a PostgreSQL pool.
///
/// Each query runs directly against `&PgPool`, which checks a connection out
/// for that query alone and returns it when the query future completes or is
/// dropped.
#[derive(Clone)]
pub struct PostgresInspector {
    pool: PgPool,
}

impl PostgresInspector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SchemaInspector for PostgresInspector {
    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let query = "SELECT EXISTS (SELECT 1 FROM pg_tables WHERE schemaname = $1 AND tablename = $2)";
        sqlx::query_scalar::<_, bool>(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| FillError::Introspection {
                query: format!("table exists {}", table),
                source: e,
            })
    }

    async fn get_columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>> {
        let query = r#"
            SELECT
                c.column_name::text AS column_name,
                c.data_type::text AS data_type
            FROM information_schema.columns c
            WHERE c.table_schema = $1
                AND c.table_name = $2
            ORDER BY c.ordinal_position
        "#;

        let rows = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FillError::Introspection {
                query: format!("fetch columns of {}", table),
                source: e,
            })?;

        let columns = rows
            .iter()
            .map(|row| {
                ColumnDescriptor::new(
                    row.get::<String, _>("column_name"),
                    row.get::<String, _>("data_type"),
                )
            })
            .collect::<Vec<_>>();
        debug!("{}: {} columns", table, columns.len());
        Ok(columns)
    }

    async fn get_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyEdge>> {
        // pg_constraint keeps the column pairs of composite keys aligned
        // (conkey[i] references confkey[i]), which information_schema's
        // constraint_column_usage does not.
        let query = r#"
            SELECT
                con.conname::text AS constraint_name,
                a.attname::text AS column_name,
                rn.nspname::text AS referenced_schema,
                rc.relname::text AS referenced_table,
                ra.attname::text AS referenced_column
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_class rc ON rc.oid = con.confrelid
            JOIN pg_namespace rn ON rn.oid = rc.relnamespace
            CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
                WITH ORDINALITY AS k(attnum, refattnum, ord)
            JOIN pg_attribute a
                ON a.attrelid = con.conrelid AND a.attnum = k.attnum
            JOIN pg_attribute ra
                ON ra.attrelid = con.confrelid AND ra.attnum = k.refattnum
            WHERE con.contype = 'f'
                AND n.nspname = $1
                AND c.relname = $2
            ORDER BY con.conname, k.ord
        "#;

        let rows = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FillError::Introspection {
                query: format!("fetch foreign keys of {}", table),
                source: e,
            })?;

        Ok(rows
            .iter()
            .map(|row| {
                ForeignKeyEdge::new(
                    row.get::<String, _>("column_name"),
                    TableRef::new(
                        row.get::<String, _>("referenced_schema"),
                        row.get::<String, _>("referenced_table"),
                    ),
                    row.get::<String, _>("referenced_column"),
                )
                .in_constraint(row.get::<String, _>("constraint_name"))
            })
            .collect())
    }

    async fn is_empty(&self, table: &TableRef) -> Result<bool> {
        let query = format!("SELECT 1 FROM {} LIMIT 1", table.quoted());
        let row = sqlx::query(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| FillError::Introspection {
                query: query.clone(),
                source: e,
            })?;
        Ok(row.is_none())
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableRef>> {
        let query = "SELECT table_name::text AS table_name FROM information_schema.tables WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name";
        let rows = sqlx::query(query)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FillError::Introspection {
                query: format!("list tables in {}", schema),
                source: e,
            })?;

        Ok(rows
            .iter()
            .map(|row| TableRef::new(schema, row.get::<String, _>("table_name")))
            .collect())
    }

    async fn sample_distinct(
        &self,
        table: &TableRef,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let rows = self
            .sample_distinct_rows(table, &[column.to_string()], limit)
            .await?;
        Ok(rows.into_iter().filter_map(|row| row.into_iter().next()).collect())
    }

    async fn sample_distinct_rows(
        &self,
        table: &TableRef,
        columns: &[String],
        limit: usize,
    ) -> Result<Vec<Vec<String>>> {
        let query = distinct_rows_query(table, columns, limit);
        let introspection_err = |source: sqlx::Error| FillError::Introspection {
            query: query.clone(),
            source,
        };

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(introspection_err)?;

        rows.iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| row.try_get::<String, _>(i))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(introspection_err)
            })
            .collect()
    }
}

/// `SELECT DISTINCT` of columns cast to text, skipping rows with a NULL in
/// any of them.
pub fn distinct_rows_query(table: &TableRef, columns: &[String], limit: usize) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let selected: Vec<String> = quoted
        .iter()
        .enumerate()
        .map(|(i, col)| format!("CAST({} AS TEXT) AS v{}", col, i))
        .collect();
    let not_null: Vec<String> = quoted
        .iter()
        .map(|col| format!("{} IS NOT NULL", col))
        .collect();
    format!(
        "SELECT DISTINCT {} FROM {} WHERE {} LIMIT {}",
        selected.join(", "),
        table.quoted(),
        not_null.join(" AND "),
        limit
    )
}
