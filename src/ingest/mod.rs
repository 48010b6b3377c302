//! Offline ingestion: sources → normalized rows → hour batches → store

use crate::aggregation::{HourRun, RunState, WindowAggregator};
use crate::error::Result;
use crate::row::{Normalizer, RowOutcome, TrafficRow};
use crate::source::Source;
use crate::store::BatchStore;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Summary of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Sources read and parsed
    pub sources_processed: usize,
    /// Sources that failed as a whole
    pub sources_failed: usize,
    /// Rows kept after normalization
    pub rows_kept: usize,
    /// Dropped rows by reason
    pub rows_dropped: BTreeMap<String, usize>,
    /// Batches written to the store
    pub batches_written: usize,
    /// Keys written, in write order
    pub keys: Vec<String>,
}

impl IngestReport {
    /// Total dropped rows
    pub fn total_dropped(&self) -> usize {
        self.rows_dropped.values().sum()
    }
}

/// Drives sorted sources through normalization, windowing and storage
pub struct IngestPipeline {
    normalizer: Normalizer,
    aggregator: WindowAggregator,
    store: BatchStore,
}

impl IngestPipeline {
    /// Create a pipeline writing into `store`
    pub fn new(normalizer: Normalizer, aggregator: WindowAggregator, store: BatchStore) -> Self {
        Self {
            normalizer,
            aggregator,
            store,
        }
    }

    /// Ingest sources, which must already be sorted by timestamp
    pub async fn run(&self, sources: &[Source]) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut state = RunState::default();

        for source in sources {
            let slot = self.aggregator.assign(&state, source.timestamp);
            let rows = match source.load().await {
                Ok(records) => {
                    report.sources_processed += 1;
                    self.keep_rows(self.normalizer.normalize_all(&records, &slot), &mut report)
                }
                Err(e) => {
                    report.sources_failed += 1;
                    warn!("Error processing {}: {}", source.path.display(), e);
                    Vec::new()
                }
            };

            let (next, flushed) = self.aggregator.absorb(state, &slot, rows);
            state = next;
            if let Some(run) = flushed {
                self.flush(run, &mut report).await?;
            }
        }

        if let Some(run) = self.aggregator.finish(state) {
            self.flush(run, &mut report).await?;
        }

        info!(
            sources = report.sources_processed,
            failed = report.sources_failed,
            kept = report.rows_kept,
            dropped = report.total_dropped(),
            batches = report.batches_written,
            "ingestion finished"
        );
        Ok(report)
    }

    fn keep_rows(&self, outcomes: Vec<RowOutcome>, report: &mut IngestReport) -> Vec<TrafficRow> {
        outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                RowOutcome::Kept(row) => {
                    report.rows_kept += 1;
                    Some(row)
                }
                RowOutcome::Dropped(reason) => {
                    *report.rows_dropped.entry(reason.kind().to_string()).or_default() += 1;
                    None
                }
            })
            .collect()
    }

    async fn flush(&self, run: HourRun, report: &mut IngestReport) -> Result<()> {
        for batch in run.into_batches() {
            let key = self.store.put(&batch).await?;
            info!("{} ({} rows)", key, batch.len());
            report.batches_written += 1;
            report.keys.push(key.to_string());
        }
        Ok(())
    }
}
