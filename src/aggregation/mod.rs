use crate::row::TrafficRow;
use crate::store::StorageKey;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Configuration types for window geometry
pub mod config;
/// Run assembly as an explicit fold over sorted sources
pub mod window;

pub use config::WindowConfig;
pub use window::{RunState, WindowAggregator};

/// Window coordinates assigned to one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAssignment {
    /// Position of the source inside its run (0-based)
    pub position: usize,
    /// Start of the run's hour window
    pub hour_window_start: NaiveDateTime,
    /// Start of this source's sub-window
    pub sub_window_start: NaiveDateTime,
}

/// All rows collected by one run, ready to be split into batches
#[derive(Debug, Clone, PartialEq)]
pub struct HourRun {
    /// Start of the hour window
    pub hour_window_start: NaiveDateTime,
    /// Number of sources that occupied a slot in this run
    pub sources: usize,
    /// Rows in source order
    pub rows: Vec<TrafficRow>,
}

impl HourRun {
    /// Split the run into one batch per node, ascending by node id
    pub fn into_batches(self) -> Vec<Batch> {
        let mut by_node: BTreeMap<u64, Vec<TrafficRow>> = BTreeMap::new();
        for row in self.rows {
            by_node.entry(row.node_id).or_default().push(row);
        }

        by_node
            .into_iter()
            .map(|(node_id, rows)| Batch {
                node_id,
                hour_window_start: self.hour_window_start,
                rows,
            })
            .collect()
    }
}

/// Rows sharing one `(node_id, hour_window_start)`: the unit of storage
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Node identifier
    pub node_id: u64,
    /// Start of the hour window
    pub hour_window_start: NaiveDateTime,
    /// Rows in ingestion order
    pub rows: Vec<TrafficRow>,
}

impl Batch {
    /// Storage key of this batch
    pub fn key(&self) -> StorageKey {
        StorageKey::new(self.node_id, self.hour_window_start)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
