use crate::error::{Result, TrafficError};
use serde::{Deserialize, Serialize};

const MINUTES_PER_HOUR: i64 = 60;

/// Geometry of the ingestion windows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Length of one sub-window in minutes
    #[serde(default = "default_sub_window_minutes")]
    pub sub_window_minutes: i64,
    /// Number of sub-windows (sources) per hour window
    #[serde(default = "default_slots_per_hour")]
    pub slots_per_hour: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            sub_window_minutes: default_sub_window_minutes(),
            slots_per_hour: default_slots_per_hour(),
        }
    }
}

fn default_sub_window_minutes() -> i64 {
    10
}

fn default_slots_per_hour() -> usize {
    6
}

impl WindowConfig {
    /// Sub-window length
    pub fn sub_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.sub_window_minutes)
    }

    /// Reject geometries that cannot form a run
    pub fn validate(&self) -> Result<()> {
        if self.sub_window_minutes <= 0 {
            return Err(TrafficError::Config(format!(
                "sub_window_minutes must be positive (got {})",
                self.sub_window_minutes
            )));
        }
        if self.slots_per_hour == 0 {
            return Err(TrafficError::Config(
                "slots_per_hour must be at least 1".to_string(),
            ));
        }
        let span = i64::try_from(self.slots_per_hour)
            .ok()
            .and_then(|slots| slots.checked_mul(self.sub_window_minutes));
        match span {
            Some(minutes) if minutes <= MINUTES_PER_HOUR => Ok(()),
            _ => Err(TrafficError::Config(format!(
                "{} sub-windows of {} minutes do not fit in one hour",
                self.slots_per_hour, self.sub_window_minutes
            ))),
        }
    }
}
