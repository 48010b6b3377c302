//! Canonical traffic rows and the raw records they are normalized from

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Raw-record to canonical-row conversion
pub mod normalize;
/// Timestamp parsing and wire encodings
pub mod timestamp;

pub use normalize::{DropReason, Normalizer, RetentionPolicy, RowOutcome};

/// One normalized measurement: a subscriber's traffic on one node during one
/// 10-minute sub-window.
///
/// Field names on the wire match the persisted batch format
/// (`IdSubscriber, UpTx, DownTx, Start1hPeriod, Start10mPeriod, IdPSX`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficRow {
    /// Subscriber identifier
    #[serde(rename = "IdSubscriber", deserialize_with = "timestamp::flexible_id::deserialize")]
    pub subscriber_id: u64,
    /// Uploaded bytes, always > 0
    #[serde(rename = "UpTx")]
    pub up_bytes: f64,
    /// Downloaded bytes, always > 0
    #[serde(rename = "DownTx")]
    pub down_bytes: f64,
    /// Start of the hour window this row belongs to
    #[serde(rename = "Start1hPeriod", with = "timestamp::epoch_millis")]
    pub hour_window_start: NaiveDateTime,
    /// Start of the 10-minute sub-window this row belongs to
    #[serde(rename = "Start10mPeriod", with = "timestamp::epoch_millis")]
    pub sub_window_start: NaiveDateTime,
    /// Node (PSX) identifier
    #[serde(rename = "IdPSX", deserialize_with = "timestamp::flexible_id::deserialize")]
    pub node_id: u64,
}

impl TrafficRow {
    /// Whether the sub-window lies inside its hour window
    pub fn window_consistent(&self) -> bool {
        self.sub_window_start >= self.hour_window_start
            && self.sub_window_start < self.hour_window_start + chrono::Duration::hours(1)
    }
}

/// Logical fields of a measurement record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Session identifier
    SessionId,
    /// Node (PSX) identifier
    NodeId,
    /// Subscriber identifier
    SubscriberId,
    /// Session start time
    StartSession,
    /// Session end time, empty while the session is open
    EndSession,
    /// Session duration
    Duration,
    /// Uploaded bytes
    UpBytes,
    /// Downloaded bytes
    DownBytes,
}

impl Field {
    /// All fields, in the order measurement files usually carry them
    pub const ALL: [Field; 8] = [
        Field::SessionId,
        Field::NodeId,
        Field::SubscriberId,
        Field::StartSession,
        Field::EndSession,
        Field::Duration,
        Field::UpBytes,
        Field::DownBytes,
    ];

    /// Fields a record must carry to be normalized
    pub const REQUIRED: [Field; 6] = [
        Field::NodeId,
        Field::SubscriberId,
        Field::StartSession,
        Field::EndSession,
        Field::UpBytes,
        Field::DownBytes,
    ];

    /// Map a header column name to a field
    pub fn from_column(name: &str) -> Option<Field> {
        match name.trim() {
            "IdSession" => Some(Field::SessionId),
            "IdPSX" => Some(Field::NodeId),
            "IdSubscriber" => Some(Field::SubscriberId),
            "StartSession" => Some(Field::StartSession),
            "EndSession" => Some(Field::EndSession),
            // the historical exports misspell this column
            "Duartion" | "Duration" => Some(Field::Duration),
            "UpTx" => Some(Field::UpBytes),
            "DownTx" => Some(Field::DownBytes),
            _ => None,
        }
    }

    /// Canonical column name
    pub fn column(&self) -> &'static str {
        match self {
            Field::SessionId => "IdSession",
            Field::NodeId => "IdPSX",
            Field::SubscriberId => "IdSubscriber",
            Field::StartSession => "StartSession",
            Field::EndSession => "EndSession",
            Field::Duration => "Duration",
            Field::UpBytes => "UpTx",
            Field::DownBytes => "DownTx",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// A record as read from a measurement file, before any typing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    values: Vec<(Field, String)>,
}

impl RawRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Set a field value, replacing any previous one
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        match self.values.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = value,
            None => self.values.push((field, value)),
        }
    }

    /// Get a field value if the record carries it
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }
}
