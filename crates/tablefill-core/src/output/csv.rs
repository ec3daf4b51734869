use std::path::PathBuf;

use rand::Rng;

use crate::error::{FillError, Result};
use crate::output::{BulkLoader, LoadTarget};
use crate::pipeline::Batch;

/// Field delimiter for every encoded batch.
pub const DELIMITER: char = '|';

/// Encode a batch as delimited text with a header line.
///
/// Only the target's columns are written, in the target's order. The output
/// matches `COPY ... WITH (FORMAT csv, DELIMITER '|', HEADER true)`.
pub fn encode_batch(target: &LoadTarget, batch: &Batch) -> String {
    let mut out = String::with_capacity(batch.rows.len() * 16 * target.columns.len().max(1));

    let header: Vec<String> = target.columns.iter().map(|c| csv_escape(c)).collect();
    out.push_str(&header.join(&DELIMITER.to_string()));
    out.push('\n');

    for row in &batch.rows {
        for (i, col) in target.columns.iter().enumerate() {
            if i > 0 {
                out.push(DELIMITER);
            }
            if let Some(value) = row.get(col) {
                out.push_str(&csv_escape(&value.to_csv_string()));
            }
        }
        out.push('\n');
    }

    out
}

/// Quote a field if it contains the delimiter, a quote or a line break.
///
/// Empty strings are quoted too; an unquoted empty field reads back as NULL.
fn csv_escape(s: &str) -> String {
    if s.is_empty()
        || s.contains(DELIMITER)
        || s.contains('"')
        || s.contains('\n')
        || s.contains('\r')
    {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Name of a per-run artifact directory: `YYYY-MM-DD-HH.MM.SS#xxxxxx`.
pub fn session_dir_name(now: chrono::NaiveDateTime, rng: &mut impl Rng) -> String {
    format!(
        "{}#{:06x}",
        now.format("%Y-%m-%d-%H.%M.%S"),
        rng.random_range(0..0x100_0000u32)
    )
}

/// Writes each batch to `<root>/<schema>.<table>/<batch index>.csv`.
///
/// The files carry a header and use `|` as delimiter, ready for
/// `\COPY ... FROM '<file>' DELIMITER '|' CSV HEADER`.
#[derive(Debug, Clone)]
pub struct CsvDirLoader {
    root: PathBuf,
}

impl CsvDirLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path the given batch is written to.
    pub fn batch_path(&self, target: &LoadTarget, batch: &Batch) -> PathBuf {
        self.root
            .join(target.table.to_string())
            .join(format!("{}.csv", batch.index))
    }
}

impl BulkLoader for CsvDirLoader {
    async fn load(&self, target: &LoadTarget, batch: &Batch) -> Result<u64> {
        let path = self.batch_path(target, batch);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| FillError::Output {
                    message: format!("creating {}", dir.display()),
                    source: e,
                })?;
        }

        let payload = encode_batch(target, batch);
        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| FillError::Output {
                message: format!("writing {}", path.display()),
                source: e,
            })?;

        Ok(batch.rows.len() as u64)
    }
}
