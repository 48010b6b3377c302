use super::timestamp::{is_null_marker, parse_id, parse_timestamp};
use super::{Field, RawRecord, TrafficRow};
use crate::aggregation::SlotAssignment;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Which raw records are kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Sessions must start strictly after this instant
    pub cutoff: NaiveDateTime,
    /// Keep only sessions without an end-of-session marker
    pub open_sessions_only: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            cutoff: default_cutoff(),
            open_sessions_only: true,
        }
    }
}

/// Default retention cutoff, `2023-12-25 00:00:00`
pub fn default_cutoff() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2023, 12, 25)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Why a raw record did not become a row
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DropReason {
    /// A required field is absent from the record
    #[error("missing field {0}")]
    MissingField(Field),

    /// A field could not be parsed
    #[error("malformed {field}: {value:?}")]
    Malformed {
        /// Offending field
        field: Field,
        /// Raw value
        value: String,
    },

    /// Session started at or before the retention cutoff
    #[error("session started {start} (not after cutoff)")]
    BeforeCutoff {
        /// Parsed session start
        start: NaiveDateTime,
    },

    /// Session carries an end-of-session marker
    #[error("session closed at {end}")]
    SessionClosed {
        /// Parsed session end
        end: NaiveDateTime,
    },

    /// Upload or download count is not positive
    #[error("non-positive traffic (up={up}, down={down})")]
    NonPositiveTraffic {
        /// Uploaded bytes
        up: f64,
        /// Downloaded bytes
        down: f64,
    },
}

impl DropReason {
    /// Short, stable label used for counting drops
    pub fn kind(&self) -> &'static str {
        match self {
            DropReason::MissingField(_) => "missing_field",
            DropReason::Malformed { .. } => "malformed",
            DropReason::BeforeCutoff { .. } => "before_cutoff",
            DropReason::SessionClosed { .. } => "session_closed",
            DropReason::NonPositiveTraffic { .. } => "non_positive_traffic",
        }
    }
}

/// Outcome of normalizing one raw record
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// The record became a canonical row
    Kept(TrafficRow),
    /// The record was dropped
    Dropped(DropReason),
}

impl RowOutcome {
    /// The kept row, if any
    pub fn row(self) -> Option<TrafficRow> {
        match self {
            RowOutcome::Kept(row) => Some(row),
            RowOutcome::Dropped(_) => None,
        }
    }
}

/// Converts raw records into canonical rows under a retention policy
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    policy: RetentionPolicy,
}

impl Normalizer {
    /// Create a normalizer with the given policy
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    /// Retention policy in use
    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Normalize one record into the slot assigned to its source
    pub fn normalize(&self, record: &RawRecord, slot: &SlotAssignment) -> RowOutcome {
        match self.try_normalize(record, slot) {
            Ok(row) => RowOutcome::Kept(row),
            Err(reason) => {
                debug!(reason = %reason, "dropping record");
                RowOutcome::Dropped(reason)
            }
        }
    }

    /// Normalize every record, keeping the per-record outcome
    pub fn normalize_all<'a, I>(&self, records: I, slot: &SlotAssignment) -> Vec<RowOutcome>
    where
        I: IntoIterator<Item = &'a RawRecord>,
    {
        records
            .into_iter()
            .map(|record| self.normalize(record, slot))
            .collect()
    }

    fn try_normalize(
        &self,
        record: &RawRecord,
        slot: &SlotAssignment,
    ) -> Result<TrafficRow, DropReason> {
        for field in Field::REQUIRED {
            if record.get(field).is_none() {
                return Err(DropReason::MissingField(field));
            }
        }

        let subscriber_id = id_field(record, Field::SubscriberId)?;
        let node_id = id_field(record, Field::NodeId)?;
        let up = bytes_field(record, Field::UpBytes)?;
        let down = bytes_field(record, Field::DownBytes)?;
        let start = time_field(record, Field::StartSession)?
            .ok_or_else(|| malformed(record, Field::StartSession))?;
        let end = time_field(record, Field::EndSession)?;

        if start <= self.policy.cutoff {
            return Err(DropReason::BeforeCutoff { start });
        }
        if self.policy.open_sessions_only {
            if let Some(end) = end {
                return Err(DropReason::SessionClosed { end });
            }
        }
        // NaN fails both comparisons and is dropped here too
        if !(up > 0.0 && down > 0.0) {
            return Err(DropReason::NonPositiveTraffic { up, down });
        }

        Ok(TrafficRow {
            subscriber_id,
            up_bytes: up,
            down_bytes: down,
            hour_window_start: slot.hour_window_start,
            sub_window_start: slot.sub_window_start,
            node_id,
        })
    }
}

fn malformed(record: &RawRecord, field: Field) -> DropReason {
    DropReason::Malformed {
        field,
        value: record.get(field).unwrap_or_default().to_string(),
    }
}

fn id_field(record: &RawRecord, field: Field) -> Result<u64, DropReason> {
    record
        .get(field)
        .and_then(parse_id)
        .ok_or_else(|| malformed(record, field))
}

fn bytes_field(record: &RawRecord, field: Field) -> Result<f64, DropReason> {
    let raw = record.get(field).unwrap_or_default().trim();
    if raw.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    match raw.parse::<f64>() {
        Ok(v) if !v.is_infinite() => Ok(v),
        _ => Err(malformed(record, field)),
    }
}

/// `Ok(None)` for an empty/null marker, `Err` for text that is not a time
fn time_field(record: &RawRecord, field: Field) -> Result<Option<NaiveDateTime>, DropReason> {
    let raw = record.get(field).unwrap_or_default();
    if is_null_marker(raw) {
        return Ok(None);
    }
    parse_timestamp(raw)
        .map(Some)
        .ok_or_else(|| malformed(record, field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn slot() -> SlotAssignment {
        let hour = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        SlotAssignment {
            position: 2,
            hour_window_start: hour,
            sub_window_start: hour + chrono::Duration::minutes(20),
        }
    }

    fn record(up: &str, down: &str) -> RawRecord {
        RawRecord::new()
            .with(Field::SessionId, "1")
            .with(Field::NodeId, "7")
            .with(Field::SubscriberId, "42")
            .with(Field::StartSession, "31.12.2023 23:55:00")
            .with(Field::EndSession, "")
            .with(Field::Duration, "300")
            .with(Field::UpBytes, up)
            .with(Field::DownBytes, down)
    }

    #[test]
    fn test_keeps_open_session() {
        let outcome = Normalizer::default().normalize(&record("100", "200.5"), &slot());
        let row = outcome.row().expect("row should be kept");
        assert_eq!(row.subscriber_id, 42);
        assert_eq!(row.node_id, 7);
        assert_eq!(row.up_bytes, 100.0);
        assert_eq!(row.down_bytes, 200.5);
        assert_eq!(row.sub_window_start, slot().sub_window_start);
        assert_eq!(row.hour_window_start, slot().hour_window_start);
    }

    #[rstest]
    #[case("0", "10")]
    #[case("10", "0")]
    #[case("-5", "10")]
    #[case("10", "-1")]
    #[case("NaN", "10")]
    fn test_drops_non_positive_traffic(#[case] up: &str, #[case] down: &str) {
        let outcome = Normalizer::default().normalize(&record(up, down), &slot());
        assert!(matches!(
            outcome,
            RowOutcome::Dropped(DropReason::NonPositiveTraffic { .. })
        ));
    }

    #[test]
    fn test_drops_closed_session() {
        let rec = record("1", "1").with(Field::EndSession, "01.01.2024 00:05:00");
        let outcome = Normalizer::default().normalize(&rec, &slot());
        assert!(matches!(
            outcome,
            RowOutcome::Dropped(DropReason::SessionClosed { .. })
        ));
    }

    #[test]
    fn test_null_end_marker_counts_as_open() {
        let rec = record("1", "1").with(Field::EndSession, "NaT");
        assert!(Normalizer::default().normalize(&rec, &slot()).row().is_some());
    }

    #[test]
    fn test_drops_sessions_not_after_cutoff() {
        let at_cutoff = record("1", "1").with(Field::StartSession, "25.12.2023 00:00:00");
        let before = record("1", "1").with(Field::StartSession, "20.12.2023 12:00:00");
        let normalizer = Normalizer::default();
        for rec in [at_cutoff, before] {
            assert!(matches!(
                normalizer.normalize(&rec, &slot()),
                RowOutcome::Dropped(DropReason::BeforeCutoff { .. })
            ));
        }
    }

    #[test]
    fn test_drops_malformed_fields() {
        let normalizer = Normalizer::default();

        let bad_id = record("1", "1").with(Field::SubscriberId, "abc");
        assert_eq!(
            normalizer.normalize(&bad_id, &slot()),
            RowOutcome::Dropped(DropReason::Malformed {
                field: Field::SubscriberId,
                value: "abc".to_string(),
            })
        );

        let bad_start = record("1", "1").with(Field::StartSession, "soon");
        assert!(matches!(
            normalizer.normalize(&bad_start, &slot()),
            RowOutcome::Dropped(DropReason::Malformed { field: Field::StartSession, .. })
        ));

        let empty_start = record("1", "1").with(Field::StartSession, "");
        assert!(matches!(
            normalizer.normalize(&empty_start, &slot()),
            RowOutcome::Dropped(DropReason::Malformed { field: Field::StartSession, .. })
        ));

        let bad_bytes = record("lots", "1");
        assert!(matches!(
            normalizer.normalize(&bad_bytes, &slot()),
            RowOutcome::Dropped(DropReason::Malformed { field: Field::UpBytes, .. })
        ));
    }

    #[test]
    fn test_drops_missing_required_field() {
        let rec = RawRecord::new()
            .with(Field::NodeId, "7")
            .with(Field::SubscriberId, "42");
        assert!(matches!(
            Normalizer::default().normalize(&rec, &slot()),
            RowOutcome::Dropped(DropReason::MissingField(_))
        ));
    }

    #[test]
    fn test_closed_sessions_kept_when_policy_allows() {
        let policy = RetentionPolicy {
            open_sessions_only: false,
            ..RetentionPolicy::default()
        };
        let rec = record("1", "1").with(Field::EndSession, "01.01.2024 00:05:00");
        assert!(Normalizer::new(policy).normalize(&rec, &slot()).row().is_some());
    }

    #[test]
    fn test_drop_reason_kinds() {
        assert_eq!(DropReason::MissingField(Field::UpBytes).kind(), "missing_field");
        assert_eq!(
            DropReason::NonPositiveTraffic { up: 0.0, down: 1.0 }.kind(),
            "non_positive_traffic"
        );
    }
}
