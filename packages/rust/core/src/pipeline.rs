//! Streaming drivers: `correlate`, `update` and the generating `search`.
//!
//! Records are processed one at a time: read a row, make one backend call,
//! write and flush that row's output, then move on. The first error aborts the
//! run; rows already written stay written.

use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, error, info, instrument, warn};

use esbridge_search::{SearchBackend, SearchRequest};
use esbridge_shared::{EffectiveConfig, Record, Result};

use crate::merge::{hit_fields, merge};
use crate::query::{base_query, build_query};
use crate::rows::{RowReader, RowWriter};
use crate::update::update_record;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Input records consumed.
    pub records_in: usize,
    /// Rows written.
    pub records_out: usize,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after a record's output has been written.
    fn record_processed(&self, ordinal: usize, rows_out: usize);
    /// Called when the pipeline completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn record_processed(&self, _ordinal: usize, _rows_out: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Correlate
// ---------------------------------------------------------------------------

/// Search for the documents matching one record and merge them into output rows.
#[instrument(skip_all, fields(record = ordinal))]
pub async fn correlate_record<B: SearchBackend>(
    backend: &B,
    config: &EffectiveConfig,
    record: &Record,
    ordinal: usize,
) -> Result<Vec<Record>> {
    let query = build_query(config, record, ordinal)?;
    let request = SearchRequest::from_config(config, query);
    let hits = backend.search(&request).await?;
    debug!(hits = hits.len(), "search returned");
    merge(config, record, &hits)
}

/// Correlate every record on `reader`, writing merged rows to `writer`.
#[instrument(skip_all, fields(fields = ?config.correlate_fields, return_mv = config.return_mv))]
pub async fn run_correlate<B, R, W>(
    backend: &B,
    config: &EffectiveConfig,
    reader: &mut RowReader<R>,
    writer: &mut RowWriter<W>,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary>
where
    B: SearchBackend,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let start = Instant::now();
    if config.correlate_fields.is_empty() {
        warn!("no correlation fields configured, every record matches the whole window");
    }
    info!(hosts = ?config.hosts, index = ?config.index, "starting correlate pipeline");
    progress.phase("Correlating records");

    let mut records_in = 0;
    while let Some((ordinal, record)) = reader.next_record().await? {
        records_in += 1;
        let rows = correlate_record(backend, config, &record, ordinal)
            .await
            .inspect_err(|e| error!(record = ordinal, error = %e, "correlation failed"))?;

        for row in &rows {
            writer.write(row).await?;
        }
        writer.flush().await?;
        progress.record_processed(ordinal, rows.len());
    }

    finish(records_in, writer.written(), start, progress)
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Apply a partial update for every record on `reader`, writing the updated
/// documents to `writer`.
#[instrument(skip_all, fields(index = ?config.index, refresh = config.force_refresh))]
pub async fn run_update<B, R, W>(
    backend: &B,
    config: &EffectiveConfig,
    reader: &mut RowReader<R>,
    writer: &mut RowWriter<W>,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary>
where
    B: SearchBackend,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let start = Instant::now();
    info!(hosts = ?config.hosts, "starting update pipeline");
    progress.phase("Updating documents");

    let mut records_in = 0;
    while let Some((ordinal, record)) = reader.next_record().await? {
        records_in += 1;
        let row = update_record(backend, config, &record, ordinal)
            .await
            .inspect_err(|e| error!(record = ordinal, error = %e, "update failed"))?;

        writer.write(&row).await?;
        writer.flush().await?;
        progress.record_processed(ordinal, 1);
    }

    finish(records_in, writer.written(), start, progress)
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Run the configured query once, without input rows, and write one row per hit.
#[instrument(skip_all, fields(query = %config.query, index = ?config.index))]
pub async fn run_search<B, W>(
    backend: &B,
    config: &EffectiveConfig,
    writer: &mut RowWriter<W>,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary>
where
    B: SearchBackend,
    W: AsyncWrite + Unpin,
{
    let start = Instant::now();
    info!(hosts = ?config.hosts, "starting search");
    progress.phase("Searching");

    let request = SearchRequest::from_config(config, base_query(config));
    let hits = backend.search(&request).await?;

    for hit in &hits {
        writer.write(&hit_fields(config, hit, hit.raw.as_ref())?).await?;
    }
    writer.flush().await?;

    finish(0, writer.written(), start, progress)
}

fn finish(
    records_in: usize,
    records_out: usize,
    start: Instant,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let summary = RunSummary {
        records_in,
        records_out,
        elapsed: start.elapsed(),
    };
    info!(
        records_in,
        records_out,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "pipeline complete"
    );
    progress.done(&summary);
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
