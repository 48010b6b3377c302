//! Measurement file discovery
//!
//! Files are named after the instant they were collected
//! (`psx_7_2024-01-01 00:10:00.csv`). That timestamp seeds the window
//! boundaries, so sources are processed in timestamp order.

use crate::error::Result;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Delimited text parsing
pub mod reader;

pub use reader::parse_delimited;

static NAME_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})[ T_](\d{2})[:\-](\d{2})[:\-](\d{2})")
        .expect("filename timestamp pattern is valid")
});

/// Layout of a measurement file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Comma separated (`.csv`)
    Comma,
    /// Pipe separated (`.txt`)
    Pipe,
}

impl SourceFormat {
    /// Format implied by a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("csv") => Some(SourceFormat::Comma),
            Some("txt") => Some(SourceFormat::Pipe),
            _ => None,
        }
    }

    /// Field delimiter
    pub fn delimiter(&self) -> char {
        match self {
            SourceFormat::Comma => ',',
            SourceFormat::Pipe => '|',
        }
    }
}

/// One measurement file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Location on disk
    pub path: PathBuf,
    /// Collection time encoded in the file name
    pub timestamp: NaiveDateTime,
    /// Delimited layout
    pub format: SourceFormat,
}

impl Source {
    /// Describe a file, if its name and extension identify a measurement file
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let format = SourceFormat::from_path(&path)?;
        let name = path.file_name()?.to_str()?;
        let timestamp = timestamp_from_name(name)?;
        Some(Self {
            path,
            timestamp,
            format,
        })
    }

    /// Read and parse the file into raw records
    pub async fn load(&self) -> Result<Vec<crate::row::RawRecord>> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        parse_delimited(&text, self.format.delimiter())
    }
}

/// Extract the collection timestamp embedded in a file name
pub fn timestamp_from_name(name: &str) -> Option<NaiveDateTime> {
    let caps = NAME_TIMESTAMP.captures(name)?;
    let text = format!(
        "{}-{}-{} {}:{}:{}",
        &caps[1], &caps[2], &caps[3], &caps[4], &caps[5], &caps[6]
    );
    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S").ok()
}

/// Find measurement files matching a glob pattern, sorted by timestamp
pub fn discover(pattern: &str) -> Result<Vec<Source>> {
    let mut sources = Vec::new();
    for entry in glob::glob(pattern)? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!("Unreadable path while scanning {}: {}", pattern, e);
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        if SourceFormat::from_path(&path).is_none() {
            debug!("Skipping {}: not a measurement file", path.display());
            continue;
        }
        match Source::from_path(&path) {
            Some(source) => sources.push(source),
            None => warn!("Skipping {}: no timestamp in file name", path.display()),
        }
    }

    sort_sources(&mut sources);
    Ok(sources)
}

/// Order sources by collection time, then by path
pub fn sort_sources(sources: &mut [Source]) {
    sources.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.path.cmp(&b.path)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_timestamp_from_name() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 10, 0)
            .unwrap();
        assert_eq!(timestamp_from_name("telecom_2024-01-01 00:10:00.csv"), Some(expected));
        assert_eq!(timestamp_from_name("psx_65.0_2024-01-01 00:10:00.txt"), Some(expected));
        assert_eq!(timestamp_from_name("2024-01-01T00-10-00.csv"), Some(expected));
        assert_eq!(timestamp_from_name("2024-01-01_00:10:00.csv"), Some(expected));
        assert_eq!(timestamp_from_name("notes.csv"), None);
        assert_eq!(timestamp_from_name("2024-13-01 00:10:00.csv"), None);
    }

    #[test]
    fn test_source_format() {
        assert_eq!(SourceFormat::from_path(Path::new("a.csv")), Some(SourceFormat::Comma));
        assert_eq!(SourceFormat::from_path(Path::new("a.txt")), Some(SourceFormat::Pipe));
        assert_eq!(SourceFormat::from_path(Path::new("a.json")), None);
        assert_eq!(SourceFormat::Pipe.delimiter(), '|');
    }

    #[test]
    fn test_discover_sorts_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "b_2024-01-01 00:20:00.csv",
            "a_2024-01-01 00:30:00.txt",
            "c_2024-01-01 00:10:00.csv",
            "readme.md",
            "undated.csv",
        ] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }

        let pattern = format!("{}/*", dir.path().display());
        let sources = discover(&pattern).unwrap();
        let names: Vec<String> = sources
            .iter()
            .map(|s| s.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "c_2024-01-01 00:10:00.csv",
                "b_2024-01-01 00:20:00.csv",
                "a_2024-01-01 00:30:00.txt",
            ]
        );
        assert_eq!(sources[2].format, SourceFormat::Pipe);
    }
}
