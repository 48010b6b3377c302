use crate::anomaly::AnomalyRecord;
use crate::row::timestamp::{epoch_millis, flexible_id, iso_datetime};
use crate::row::TrafficRow;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A traffic row as query responses render it.
///
/// Same field names as the persisted row; the hour window is an ISO 8601
/// string while the sub-window stays in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowView {
    /// Subscriber identifier
    #[serde(rename = "IdSubscriber", deserialize_with = "flexible_id::deserialize")]
    pub subscriber_id: u64,
    /// Uploaded bytes
    #[serde(rename = "UpTx")]
    pub up_bytes: f64,
    /// Downloaded bytes
    #[serde(rename = "DownTx")]
    pub down_bytes: f64,
    /// Start of the hour window
    #[serde(rename = "Start1hPeriod", with = "iso_datetime")]
    pub hour_window_start: NaiveDateTime,
    /// Start of the sub-window
    #[serde(rename = "Start10mPeriod", with = "epoch_millis")]
    pub sub_window_start: NaiveDateTime,
    /// Node (PSX) identifier
    #[serde(rename = "IdPSX", deserialize_with = "flexible_id::deserialize")]
    pub node_id: u64,
}

impl From<TrafficRow> for RowView {
    fn from(row: TrafficRow) -> Self {
        Self {
            subscriber_id: row.subscriber_id,
            up_bytes: row.up_bytes,
            down_bytes: row.down_bytes,
            hour_window_start: row.hour_window_start,
            sub_window_start: row.sub_window_start,
            node_id: row.node_id,
        }
    }
}

/// An anomalous row with its subscriber baseline, as responses render it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyView {
    /// The scored row
    #[serde(flatten)]
    pub row: RowView,
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

impl From<AnomalyRecord> for AnomalyView {
    fn from(record: AnomalyRecord) -> Self {
        Self {
            row: record.row.into(),
            mean_up: record.mean_up,
            mean_down: record.mean_down,
            std_up: record.std_up,
            std_down: record.std_down,
            is_anomaly: record.is_anomaly,
        }
    }
}
