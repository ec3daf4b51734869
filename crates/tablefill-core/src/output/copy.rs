use sqlx::postgres::PgPool;
use tracing::debug;

use crate::error::{FillError, Result};
use crate::output::csv::{encode_batch, DELIMITER};
use crate::output::{BulkLoader, LoadTarget};
use crate::pipeline::Batch;
use crate::schema::types::quote_ident;

/// Loads batches with `COPY ... FROM STDIN` over a pooled connection.
///
/// Each batch checks out its own connection, so concurrent loads proceed in
/// parallel up to the pool size. A batch runs in its own transaction: it
/// either lands completely or not at all, which keeps replay safe. The
/// connection-level statement timeout is lifted for that transaction only,
/// since a large batch can legitimately outlast it.
#[derive(Clone)]
pub struct PgCopyLoader {
    pool: PgPool,
}

/// Clears the statement timeout until the batch transaction ends.
pub const LIFT_STATEMENT_TIMEOUT: &str = "SET LOCAL statement_timeout = 0";

impl PgCopyLoader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `COPY "schema"."table" ("a", "b") FROM STDIN WITH (...)` for a target.
pub fn copy_statement(target: &LoadTarget) -> String {
    let columns: Vec<String> = target.columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, DELIMITER '{}', HEADER true)",
        target.table.quoted(),
        columns.join(", "),
        DELIMITER
    )
}

impl BulkLoader for PgCopyLoader {
    async fn load(&self, target: &LoadTarget, batch: &Batch) -> Result<u64> {
        let statement = copy_statement(target);
        let copy_err = |source: sqlx::Error| FillError::Copy {
            table: target.table.to_string(),
            statement: statement.clone(),
            source,
        };

        let payload = encode_batch(target, batch);
        let mut tx = self.pool.begin().await.map_err(copy_err)?;
        sqlx::query(LIFT_STATEMENT_TIMEOUT)
            .execute(&mut *tx)
            .await
            .map_err(copy_err)?;

        let mut copy = tx.copy_in_raw(&statement).await.map_err(copy_err)?;
        let sent = copy.send(payload.into_bytes()).await.map(|_| ());
        if let Err(e) = sent {
            let _ = copy.abort(e.to_string()).await;
            return Err(copy_err(e));
        }
        let rows = copy.finish().await.map_err(copy_err)?;

        // Dropping the transaction on any earlier return rolls it back.
        tx.commit().await.map_err(copy_err)?;
        debug!(
            "{}: batch {} committed {} rows",
            target.table, batch.index, rows
        );
        Ok(rows)
    }
}
