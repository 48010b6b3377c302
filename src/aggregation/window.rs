use super::{HourRun, SlotAssignment, WindowConfig};
use crate::row::TrafficRow;
use chrono::NaiveDateTime;
use tracing::info;

/// State of the run being assembled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    position: usize,
    hour_start: Option<NaiveDateTime>,
    sources: usize,
    rows: Vec<TrafficRow>,
}

impl RunState {
    /// Position the next source will occupy
    pub fn position(&self) -> usize {
        self.position
    }

    /// Hour window of the run, once its first source was seen
    pub fn hour_start(&self) -> Option<NaiveDateTime> {
        self.hour_start
    }

    /// Rows collected so far
    pub fn rows(&self) -> &[TrafficRow] {
        &self.rows
    }

    /// Whether no source has been absorbed yet
    pub fn is_empty(&self) -> bool {
        self.position == 0
    }

    fn into_run(self) -> Option<HourRun> {
        let hour_window_start = self.hour_start?;
        if self.rows.is_empty() {
            return None;
        }
        Some(HourRun {
            hour_window_start,
            sources: self.sources,
            rows: self.rows,
        })
    }
}

/// Groups consecutive sources into hour runs
#[derive(Debug, Clone, Default)]
pub struct WindowAggregator {
    config: WindowConfig,
}

impl WindowAggregator {
    /// Create an aggregator with the given window geometry
    pub fn new(config: WindowConfig) -> Self {
        Self { config }
    }

    /// Window geometry
    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Window coordinates for the next source of `state`.
    ///
    /// The first source of a run opens the hour one sub-window before its own
    /// timestamp; later sources take consecutive sub-windows of that hour.
    pub fn assign(&self, state: &RunState, source_time: NaiveDateTime) -> SlotAssignment {
        let hour_window_start = state
            .hour_start
            .unwrap_or_else(|| source_time - self.config.sub_window());
        let offset = i32::try_from(state.position).unwrap_or(i32::MAX);
        SlotAssignment {
            position: state.position,
            hour_window_start,
            sub_window_start: hour_window_start + self.config.sub_window() * offset,
        }
    }

    /// Add one source's rows to the run; returns the flushed run when full.
    ///
    /// An empty `rows` still consumes the slot.
    pub fn absorb(
        &self,
        mut state: RunState,
        slot: &SlotAssignment,
        rows: Vec<TrafficRow>,
    ) -> (RunState, Option<HourRun>) {
        state.hour_start.get_or_insert(slot.hour_window_start);
        state.rows.extend(rows);
        state.position += 1;
        state.sources += 1;

        if state.position >= self.config.slots_per_hour {
            let run = state.into_run();
            if let Some(run) = &run {
                info!(
                    hour = %run.hour_window_start,
                    rows = run.rows.len(),
                    "hour window complete"
                );
            }
            (RunState::default(), run)
        } else {
            (state, None)
        }
    }

    /// Flush whatever the trailing run collected
    pub fn finish(&self, state: RunState) -> Option<HourRun> {
        let run = state.into_run();
        if let Some(run) = &run {
            info!(
                hour = %run.hour_window_start,
                sources = run.sources,
                rows = run.rows.len(),
                "flushing partial hour window"
            );
        }
        run
    }
}
