//! Timestamp parsing and wire encodings
//!
//! Measurement files carry day-first session times (`25.12.2023 10:00:00`),
//! storage keys and statistics use `YYYY-MM-DD HH:MM:SS`, persisted rows
//! carry epoch milliseconds and API rows render hour windows as ISO 8601.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

/// Format used in storage keys and query output
pub const KEY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// ISO 8601 layout of hour windows in query responses
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const DATETIME_FORMATS: &[&str] = &[
    "%d.%m.%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S%.f",
    "%d-%m-%Y %H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// Parse a session timestamp, day-first where the layout is ambiguous
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Render a timestamp the way storage keys and statistics expose it
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(KEY_FORMAT).to_string()
}

/// Whether a textual field stands for "no value"
pub fn is_null_marker(value: &str) -> bool {
    matches!(
        value.trim(),
        "" | "NaN" | "nan" | "NaT" | "null" | "NULL" | "None" | "none"
    )
}

/// Serde adapter: epoch milliseconds on write; epoch milliseconds or a
/// timestamp string on read
pub mod epoch_millis {
    use super::*;

    /// Write epoch milliseconds
    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(ts.and_utc().timestamp_millis())
    }

    /// Read epoch milliseconds or a timestamp string
    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(TimestampVisitor)
    }
}

/// Serde adapter: [`ISO_FORMAT`] strings on write; epoch milliseconds or a
/// timestamp string on read
pub mod iso_datetime {
    use super::*;

    /// Write an ISO 8601 timestamp without offset
    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.format(ISO_FORMAT).to_string())
    }

    /// Read epoch milliseconds or a timestamp string
    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(TimestampVisitor)
    }
}

/// Serde adapter for optional timestamps rendered with [`KEY_FORMAT`]
pub mod opt_key_format {
    use super::*;

    /// Write the timestamp string or null
    pub fn serialize<S>(ts: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match ts {
            Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    /// Read a timestamp string or null
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = serde::Deserialize::deserialize(deserializer)?;
        match raw {
            Some(s) => parse_timestamp(&s)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", s))),
            None => Ok(None),
        }
    }
}

/// Serde adapter for ids that may arrive as integral floats (`42.0`)
pub mod flexible_id {
    use super::*;

    /// Read an integer, integral float or numeric string
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(IdVisitor)
    }
}

/// Parse an id field, accepting integral floats
pub fn parse_id(value: &str) -> Option<u64> {
    let value = value.trim();
    value.parse::<u64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .and_then(integral_id)
    })
}

fn integral_id(v: f64) -> Option<u64> {
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 {
        Some(v as u64)
    } else {
        None
    }
}

struct TimestampVisitor;

impl<'de> Visitor<'de> for TimestampVisitor {
    type Value = NaiveDateTime;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("epoch milliseconds or a 'YYYY-MM-DD HH:MM:SS' timestamp")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        DateTime::from_timestamp_millis(v)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| E::custom(format!("timestamp out of range: {}", v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        let v = i64::try_from(v).map_err(|_| E::custom(format!("timestamp out of range: {}", v)))?;
        self.visit_i64(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if v.is_finite() && v.fract() == 0.0 {
            self.visit_i64(v as i64)
        } else {
            Err(E::custom(format!("non-integral timestamp: {}", v)))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        parse_timestamp(v).ok_or_else(|| E::custom(format!("invalid timestamp: {}", v)))
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer id")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v).map_err(|_| E::custom(format!("negative id: {}", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        integral_id(v).ok_or_else(|| E::custom(format!("non-integral id: {}", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        parse_id(v).ok_or_else(|| E::custom(format!("invalid id: {}", v)))
    }
}
