//! Per-subscriber baseline scoring
//!
//! Every subscriber is compared against its own history: a row is anomalous
//! when its upload or download exceeds that subscriber's `mean + k·std`.
//! Baselines are recomputed from the whole corpus handed in, so a query costs
//! O(stored history).

use crate::row::TrafficRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default threshold multiplier `k`
pub const DEFAULT_THRESHOLD: f64 = 3.0;

/// Standard deviation estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deviation {
    /// Sample deviation, `n - 1` denominator
    #[default]
    Sample,
    /// Population deviation, `n` denominator
    Population,
}

impl Deviation {
    fn denominator(self, n: usize) -> usize {
        match self {
            Deviation::Sample => n.saturating_sub(1),
            Deviation::Population => n,
        }
    }
}

/// Traffic baseline of one subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberBaseline {
    /// Subscriber identifier
    pub subscriber_id: u64,
    /// Mean upload
    pub mean_up: f64,
    /// Upload standard deviation, 0 for a single sample
    pub std_up: f64,
    /// Mean download
    pub mean_down: f64,
    /// Download standard deviation, 0 for a single sample
    pub std_down: f64,
    /// Rows the baseline was computed from
    pub samples: usize,
}

impl SubscriberBaseline {
    /// Upload level above which a row is anomalous
    pub fn up_threshold(&self, k: f64) -> f64 {
        self.mean_up + k * self.std_up
    }

    /// Download level above which a row is anomalous
    pub fn down_threshold(&self, k: f64) -> f64 {
        self.mean_down + k * self.std_down
    }
}

/// A row together with the baseline it was scored against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// The scored row
    #[serde(flatten)]
    pub row: TrafficRow,
    /// Subscriber mean upload
    #[serde(rename = "UpTx_mean")]
    pub mean_up: f64,
    /// Subscriber mean download
    #[serde(rename = "DownTx_mean")]
    pub mean_down: f64,
    /// Subscriber upload deviation
    #[serde(rename = "UpTx_std")]
    pub std_up: f64,
    /// Subscriber download deviation
    #[serde(rename = "DownTx_std")]
    pub std_down: f64,
    /// Whether the row exceeds its subscriber's threshold
    pub is_anomaly: bool,
}

/// Threshold scorer over per-subscriber baselines
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyDetector {
    threshold: f64,
    deviation: Deviation,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            deviation: Deviation::default(),
        }
    }
}

#[derive(Default)]
struct Moments {
    n: usize,
    sum_up: f64,
    sum_down: f64,
    sq_up: f64,
    sq_down: f64,
}

impl AnomalyDetector {
    /// Create a detector with multiplier `k`
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Use a different deviation estimator
    pub fn with_deviation(mut self, deviation: Deviation) -> Self {
        self.deviation = deviation;
        self
    }

    /// Multiplier `k`
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Deviation estimator
    pub fn deviation(&self) -> Deviation {
        self.deviation
    }

    /// Baseline of every subscriber present in `rows`
    pub fn baselines(&self, rows: &[TrafficRow]) -> BTreeMap<u64, SubscriberBaseline> {
        let mut moments: BTreeMap<u64, Moments> = BTreeMap::new();
        for row in rows {
            let m = moments.entry(row.subscriber_id).or_default();
            m.n += 1;
            m.sum_up += row.up_bytes;
            m.sum_down += row.down_bytes;
        }

        // second pass keeps the variance stable for large byte counts
        for row in rows {
            if let Some(m) = moments.get_mut(&row.subscriber_id) {
                let n = m.n as f64;
                m.sq_up += (row.up_bytes - m.sum_up / n).powi(2);
                m.sq_down += (row.down_bytes - m.sum_down / n).powi(2);
            }
        }

        moments
            .into_iter()
            .map(|(subscriber_id, m)| {
                let n = m.n as f64;
                let denominator = self.deviation.denominator(m.n);
                let std = |sq: f64| {
                    if denominator == 0 {
                        0.0
                    } else {
                        (sq / denominator as f64).sqrt()
                    }
                };
                (
                    subscriber_id,
                    SubscriberBaseline {
                        subscriber_id,
                        mean_up: m.sum_up / n,
                        std_up: std(m.sq_up),
                        mean_down: m.sum_down / n,
                        std_down: std(m.sq_down),
                        samples: m.n,
                    },
                )
            })
            .collect()
    }

    /// Score every row, in input order
    pub fn score(&self, rows: &[TrafficRow]) -> Vec<AnomalyRecord> {
        let baselines = self.baselines(rows);
        rows.iter()
            .filter_map(|row| {
                baselines
                    .get(&row.subscriber_id)
                    .map(|baseline| self.score_row(row, baseline))
            })
            .collect()
    }

    /// Only the anomalous rows, in input order
    pub fn detect(&self, rows: &[TrafficRow]) -> Vec<AnomalyRecord> {
        self.score(rows)
            .into_iter()
            .filter(|record| record.is_anomaly)
            .collect()
    }

    /// Number of anomalous rows
    pub fn count(&self, rows: &[TrafficRow]) -> usize {
        let baselines = self.baselines(rows);
        rows.iter()
            .filter(|row| {
                baselines
                    .get(&row.subscriber_id)
                    .is_some_and(|b| self.exceeds(row, b))
            })
            .count()
    }

    fn exceeds(&self, row: &TrafficRow, baseline: &SubscriberBaseline) -> bool {
        row.up_bytes > baseline.up_threshold(self.threshold)
            || row.down_bytes > baseline.down_threshold(self.threshold)
    }

    fn score_row(&self, row: &TrafficRow, baseline: &SubscriberBaseline) -> AnomalyRecord {
        AnomalyRecord {
            row: row.clone(),
            mean_up: baseline.mean_up,
            mean_down: baseline.mean_down,
            std_up: baseline.std_up,
            std_down: baseline.std_down,
            is_anomaly: self.exceeds(row, baseline),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(subscriber_id: u64, up: f64, down: f64) -> TrafficRow {
        let hour = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        TrafficRow {
            subscriber_id,
            up_bytes: up,
            down_bytes: down,
            hour_window_start: hour,
            sub_window_start: hour,
            node_id: 7,
        }
    }

    #[test]
    fn test_empty_corpus() {
        let detector = AnomalyDetector::default();
        assert!(detector.detect(&[]).is_empty());
        assert!(detector.baselines(&[]).is_empty());
        assert_eq!(detector.count(&[]), 0);
    }

    #[test]
    fn test_singleton_has_zero_deviation() {
        for deviation in [Deviation::Sample, Deviation::Population] {
            let detector = AnomalyDetector::default().with_deviation(deviation);
            let rows = vec![row(1, 5_000.0, 9_000.0)];
            let baseline = &detector.baselines(&rows)[&1];
            assert_eq!(baseline.std_up, 0.0);
            assert_eq!(baseline.std_down, 0.0);
            assert_eq!(baseline.samples, 1);
            assert!(detector.detect(&rows).is_empty());
        }
    }

    #[test]
    fn test_baseline_statistics() {
        let rows: Vec<TrafficRow> = [100.0, 100.0, 100.0, 100.0, 100.0, 900.0]
            .iter()
            .map(|&up| row(42, up, 50.0))
            .collect();

        let sample = &AnomalyDetector::default().baselines(&rows)[&42];
        assert!((sample.mean_up - 233.333).abs() < 0.01);
        assert!((sample.std_up - 326.599).abs() < 0.01);
        assert_eq!(sample.std_down, 0.0);

        let population = &AnomalyDetector::default()
            .with_deviation(Deviation::Population)
            .baselines(&rows)[&42];
        assert!((population.std_up - 298.142).abs() < 0.01);
    }

    #[test]
    fn test_threshold_multiplier() {
        let rows: Vec<TrafficRow> = [100.0, 100.0, 100.0, 100.0, 100.0, 900.0]
            .iter()
            .map(|&up| row(42, up, 50.0))
            .collect();

        assert!(AnomalyDetector::new(3.0).detect(&rows).is_empty());

        let flagged = AnomalyDetector::new(1.0).detect(&rows);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].row.up_bytes, 900.0);
        assert!(flagged[0].is_anomaly);
    }

    #[test]
    fn test_baselines_are_per_subscriber() {
        // subscriber 2 is a heavy but steady user; only 1's spike counts
        let mut rows: Vec<TrafficRow> = (0..19).map(|_| row(1, 100.0, 100.0)).collect();
        rows.push(row(1, 10_000.0, 100.0));
        rows.extend((0..20).map(|_| row(2, 10_000.0, 20_000.0)));

        let flagged = AnomalyDetector::default().detect(&rows);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].row.subscriber_id, 1);
        assert_eq!(flagged[0].row.up_bytes, 10_000.0);
    }

    #[test]
    fn test_download_spike_flags_row() {
        let mut rows: Vec<TrafficRow> = (0..19).map(|_| row(5, 10.0, 100.0)).collect();
        rows.push(row(5, 10.0, 50_000.0));
        let scored = AnomalyDetector::default().score(&rows);
        assert_eq!(scored.len(), 20);
        assert_eq!(scored.iter().filter(|r| r.is_anomaly).count(), 1);
        assert!(scored[19].is_anomaly);
        assert_eq!(AnomalyDetector::default().count(&rows), 1);
    }

    #[test]
    fn test_record_wire_format() {
        let record = AnomalyDetector::default().score(&[row(3, 1.0, 2.0)]).remove(0);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["IdSubscriber"], 3);
        assert_eq!(json["UpTx_mean"], 1.0);
        assert_eq!(json["DownTx_std"], 0.0);
        assert_eq!(json["is_anomaly"], false);
    }
}
