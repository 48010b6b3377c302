//! Read side: corpus reconstruction and the statistics exposed to clients
//!
//! Every query scans all keys. Keys are read concurrently and concatenated in
//! key order; there is no cross-key snapshot, so a query running during an
//! ingest may see some hours from the newer run and some from the older one.

use crate::anomaly::{AnomalyDetector, AnomalyRecord};
use crate::error::{Result, TrafficError};
use crate::row::timestamp::opt_key_format;
use crate::row::TrafficRow;
use crate::store::{AbsentReason, BatchStore, KeyRead};
use chrono::NaiveDateTime;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Client-facing renderings of stored rows
pub mod view;

pub use view::{AnomalyView, RowView};

/// Default number of keys read concurrently
pub const DEFAULT_SCAN_CONCURRENCY: usize = 16;

/// Rows reconstituted from the store
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    /// Rows in key order, then batch order
    pub rows: Vec<TrafficRow>,
    /// Keys listed
    pub keys_scanned: usize,
    /// Keys that yielded no batch
    pub keys_skipped: usize,
}

/// First and last hour window in the corpus
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Earliest hour window start
    #[serde(with = "opt_key_format")]
    pub start: Option<NaiveDateTime>,
    /// Latest hour window start
    #[serde(with = "opt_key_format")]
    pub end: Option<NaiveDateTime>,
}

/// Aggregate statistics over the stored history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Distinct subscribers
    pub total_subscribers: usize,
    /// Stored rows
    pub total_records: usize,
    /// Mean upload per row
    pub avg_upload: f64,
    /// Mean download per row
    pub avg_download: f64,
    /// Rows flagged by the anomaly detector
    pub anomalies_count: usize,
    /// Span of hour windows
    pub time_range: TimeRange,
}

impl Statistics {
    /// Statistics of a corpus
    pub fn compute(rows: &[TrafficRow], detector: &AnomalyDetector) -> Self {
        if rows.is_empty() {
            return Self::default();
        }

        let n = rows.len() as f64;
        let subscribers: HashSet<u64> = rows.iter().map(|r| r.subscriber_id).collect();
        let (up, down) = rows
            .iter()
            .fold((0.0, 0.0), |(up, down), r| (up + r.up_bytes, down + r.down_bytes));

        Self {
            total_subscribers: subscribers.len(),
            total_records: rows.len(),
            avg_upload: up / n,
            avg_download: down / n,
            anomalies_count: detector.count(rows),
            time_range: TimeRange {
                start: rows.iter().map(|r| r.hour_window_start).min(),
                end: rows.iter().map(|r| r.hour_window_start).max(),
            },
        }
    }
}

/// Stateless query operations over a batch store
#[derive(Clone)]
pub struct QueryService {
    store: BatchStore,
    detector: AnomalyDetector,
    scan_concurrency: usize,
}

impl QueryService {
    /// Create a query service
    pub fn new(store: BatchStore, detector: AnomalyDetector) -> Self {
        Self {
            store,
            detector,
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
        }
    }

    /// Bound the number of keys read at once
    pub fn with_scan_concurrency(mut self, scan_concurrency: usize) -> Self {
        self.scan_concurrency = scan_concurrency.max(1);
        self
    }

    /// Detector used for scoring
    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    /// Rows of every subscriber that exceed their own baseline
    pub async fn list_anomalies(&self) -> Result<Vec<AnomalyRecord>> {
        let corpus = self.load_corpus(|_| true).await?;
        Ok(self.detector.detect(&corpus.rows))
    }

    /// Raw history of one subscriber
    pub async fn get_subscriber(&self, subscriber_id: u64) -> Result<Vec<TrafficRow>> {
        let corpus = self
            .load_corpus(|row| row.subscriber_id == subscriber_id)
            .await?;
        Ok(corpus.rows)
    }

    /// Aggregate statistics over all stored rows
    pub async fn get_statistics(&self) -> Result<Statistics> {
        let corpus = self.load_corpus(|_| true).await?;
        Ok(Statistics::compute(&corpus.rows, &self.detector))
    }

    /// Scan every key and keep the rows accepted by `filter`.
    ///
    /// Unreadable keys are skipped. A failed key listing is an error, and so
    /// is a scan where no key was readable and at least one read failed at
    /// the store level.
    pub async fn load_corpus<F>(&self, filter: F) -> Result<Corpus>
    where
        F: Fn(&TrafficRow) -> bool,
    {
        let keys = self.store.list_keys().await?;
        let reads: Vec<(String, KeyRead)> = stream::iter(keys)
            .map(|key| {
                let store = self.store.clone();
                async move {
                    let read = store.get(&key).await;
                    (key, read)
                }
            })
            .buffered(self.scan_concurrency)
            .collect()
            .await;

        let mut corpus = Corpus {
            keys_scanned: reads.len(),
            ..Corpus::default()
        };
        let mut readable = 0;
        let mut unavailable = 0;
        let mut last_failure = None;

        for (key, read) in reads {
            match read {
                KeyRead::Batch(rows) => {
                    readable += 1;
                    corpus.rows.extend(rows.into_iter().filter(|r| filter(r)));
                }
                KeyRead::Absent(reason) => {
                    corpus.keys_skipped += 1;
                    if let AbsentReason::Unavailable(msg) = &reason {
                        unavailable += 1;
                        last_failure = Some(msg.clone());
                    }
                    debug!(key = %key, reason = %reason, "key skipped");
                }
            }
        }

        if readable == 0 && unavailable > 0 {
            return Err(TrafficError::StoreUnavailable(
                last_failure.unwrap_or_else(|| "no key could be read".to_string()),
            ));
        }
        if corpus.keys_skipped > 0 {
            warn!(
                skipped = corpus.keys_skipped,
                scanned = corpus.keys_scanned,
                "some stored windows were unreadable"
            );
        }
        Ok(corpus)
    }
}
