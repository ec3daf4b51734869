//! # Batch Pipeline
//!
//! Accumulates generated rows into fixed-size batches and hands each sealed
//! batch to the `BulkLoader` as its own tokio task. Generation keeps running
//! while earlier batches load; a semaphore caps how many loads are in flight,
//! so a slow store pushes back on generation instead of piling up batches in
//! memory.
//!
//! Every dispatched task is tracked in a `JoinSet`. `drain` is the barrier:
//! it returns only after every load has finished, successfully or not.
//! `abandon` is the explicit alternative that aborts whatever is still
//! running. Dropping a pipeline without either aborts its tasks too (that is
//! how `JoinSet` behaves), but callers are expected to pick one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{error, info, warn};

use crate::error::FillError;
use crate::generate::engine::GeneratedRow;
use crate::output::{BulkLoader, LoadTarget};

/// A sealed run of rows handed to the loader as one unit of work.
#[derive(Debug, Clone)]
pub struct Batch {
    /// 0-based sequence number within one table fill.
    pub index: usize,
    /// Row index (within the fill) of the first row in the batch.
    pub first_row: usize,
    pub rows: Vec<GeneratedRow>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A batch that did not commit, with enough context to replay it by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub table: String,
    pub batch_index: usize,
    pub first_row: usize,
    pub row_count: usize,
    pub message: String,
}

impl LoadFailure {
    pub fn to_error(&self) -> FillError {
        FillError::LoadFailed {
            table: self.table.clone(),
            batch_index: self.batch_index,
            first_row: self.first_row,
            row_count: self.row_count,
            message: self.message.clone(),
        }
    }
}

/// Outcome of all batches dispatched by one pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub batches_dispatched: usize,
    pub rows_dispatched: usize,
    pub rows_loaded: u64,
    pub failures: Vec<LoadFailure>,
    /// Batches aborted by `abandon` before they finished.
    pub abandoned: usize,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.abandoned == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct BatchMeta {
    index: usize,
    first_row: usize,
    row_count: usize,
}

/// Batching, dispatch and completion tracking for one table fill.
pub struct BatchPipeline<L: BulkLoader> {
    loader: Arc<L>,
    target: Arc<LoadTarget>,
    batch_size: usize,
    permits: Arc<Semaphore>,
    tasks: JoinSet<crate::error::Result<u64>>,
    in_flight: HashMap<Id, BatchMeta>,
    buffer: Vec<GeneratedRow>,
    next_index: usize,
    rows_seen: usize,
    report: PipelineReport,
}

impl<L: BulkLoader> BatchPipeline<L> {
    /// `batch_size` and `max_in_flight` are clamped to at least 1.
    pub fn new(loader: Arc<L>, target: LoadTarget, batch_size: usize, max_in_flight: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            loader,
            target: Arc::new(target),
            batch_size,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tasks: JoinSet::new(),
            in_flight: HashMap::new(),
            buffer: Vec::with_capacity(batch_size),
            next_index: 0,
            rows_seen: 0,
            report: PipelineReport::default(),
        }
    }

    pub fn target(&self) -> &LoadTarget {
        &self.target
    }

    /// Rows accepted so far, dispatched or still buffered.
    pub fn rows_seen(&self) -> usize {
        self.rows_seen
    }

    /// Loads dispatched and not yet collected by `drain`/`abandon`.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Append a row, dispatching a batch when the buffer reaches batch size.
    ///
    /// Waits for a free load slot when `max_in_flight` loads are running.
    pub async fn push(&mut self, row: GeneratedRow) {
        self.buffer.push(row);
        self.rows_seen += 1;
        if self.buffer.len() >= self.batch_size {
            self.dispatch().await;
        }
    }

    /// Seal and dispatch any partial remainder.
    pub async fn finish(&mut self) {
        if !self.buffer.is_empty() {
            self.dispatch().await;
        }
    }

    /// Wait for every dispatched load and report the outcome.
    ///
    /// Rows still buffered (not sealed by `finish`) are discarded.
    pub async fn drain(mut self) -> PipelineReport {
        if !self.buffer.is_empty() {
            warn!(
                "{}: discarding {} buffered rows that were never dispatched",
                self.target.table,
                self.buffer.len()
            );
        }
        while let Some(joined) = self.tasks.join_next_with_id().await {
            self.collect(joined);
        }
        self.report
    }

    /// Abort every load still running, wait for the aborts to land and
    /// report them as abandoned.
    pub async fn abandon(mut self) -> PipelineReport {
        let running = self.tasks.len();
        if running > 0 {
            warn!(
                "{}: abandoning {} in-flight batch loads",
                self.target.table, running
            );
        }
        self.tasks.abort_all();
        while let Some(joined) = self.tasks.join_next_with_id().await {
            self.collect(joined);
        }
        self.report
    }

    async fn dispatch(&mut self) {
        let rows = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let batch = Batch {
            index: self.next_index,
            first_row: self.rows_seen - rows.len(),
            rows,
        };
        self.next_index += 1;

        // The semaphore is never closed, so this only ever waits.
        let permit = Arc::clone(&self.permits).acquire_owned().await.ok();

        // Collect loads that finished while we waited, keeping memory flat.
        while let Some(joined) = self.tasks.try_join_next_with_id() {
            self.collect(joined);
        }

        let meta = BatchMeta {
            index: batch.index,
            first_row: batch.first_row,
            row_count: batch.len(),
        };
        info!(
            "Inserting {} rows into {} (batch {})",
            meta.row_count, self.target.table, meta.index
        );

        let loader = Arc::clone(&self.loader);
        let target = Arc::clone(&self.target);
        let handle = self.tasks.spawn(async move {
            let _permit = permit;
            loader.load(&target, &batch).await
        });

        self.in_flight.insert(handle.id(), meta);
        self.report.batches_dispatched += 1;
        self.report.rows_dispatched += meta.row_count;
    }

    fn collect(
        &mut self,
        joined: std::result::Result<(Id, crate::error::Result<u64>), tokio::task::JoinError>,
    ) {
        let (id, outcome) = match joined {
            Ok((id, Ok(rows))) => (id, Ok(rows)),
            Ok((id, Err(e))) => (id, Err(e.to_string())),
            Err(join_err) if join_err.is_cancelled() => {
                self.in_flight.remove(&join_err.id());
                self.report.abandoned += 1;
                return;
            }
            Err(join_err) => (join_err.id(), Err(format!("load task panicked: {}", join_err))),
        };

        let Some(meta) = self.in_flight.remove(&id) else {
            return;
        };

        match outcome {
            Ok(rows) => self.report.rows_loaded += rows,
            Err(message) => {
                let failure = LoadFailure {
                    table: self.target.table.to_string(),
                    batch_index: meta.index,
                    first_row: meta.first_row,
                    row_count: meta.row_count,
                    message,
                };
                error!("{}", failure.to_error());
                self.report.failures.push(failure);
            }
        }
    }
}
