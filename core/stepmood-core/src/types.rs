//! Row types shared by the ledger, the mood engine and the store.

use chrono::NaiveDate;
use serde::Serialize;

use crate::mood::MoodLabel;

/// A wall-clock position: calendar date plus hour of day (0-23).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HourStamp {
    pub date: NaiveDate,
    pub hour: u32,
}

impl HourStamp {
    pub fn new(date: NaiveDate, hour: u32) -> Self {
        Self { date, hour }
    }

    /// The hour that most recently finished, if it belongs to the same date.
    pub fn closed_hour(&self) -> Option<u32> {
        self.hour.checked_sub(1)
    }
}

/// Lifecycle of a day's mood row. A date without a row is uninitialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DayPhase {
    Active,
    Finalized,
}

impl DayPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayPhase::Active => "active",
            DayPhase::Finalized => "finalized",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "active" => Some(DayPhase::Active),
            "finalized" => Some(DayPhase::Finalized),
            _ => None,
        }
    }
}

/// The persisted mood record for one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoodState {
    pub date: NaiveDate,
    pub mood: i64,
    pub daily_start_mood: i64,
    pub previous_day_end_mood: i64,
    pub last_persisted_steps: i64,
    /// Latest closed hour whose gain/decay is already folded into `mood`.
    pub last_processed_hour: Option<u32>,
    pub phase: DayPhase,
}

impl MoodState {
    pub fn is_finalized(&self) -> bool {
        self.phase == DayPhase::Finalized
    }

    /// Whether the gain/decay for `hour` is already reflected in `mood`.
    pub fn has_processed(&self, hour: u32) -> bool {
        self.last_processed_hour
            .map(|processed| hour <= processed)
            .unwrap_or(false)
    }
}

/// Incremental steps attributed to one hour of one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyStepRecord {
    pub date: NaiveDate,
    pub hour: u32,
    pub steps: i64,
    /// Cumulative source total observed when this hour was last written.
    pub last_recorded_total: i64,
}

/// Archived copy of an hourly row, written once at day rollover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoricalHourlyStepRecord {
    pub date: NaiveDate,
    pub hour: u32,
    pub steps: i64,
    pub last_recorded_total: i64,
    pub archived_at: String,
}

/// Day-level aggregate written once at day rollover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyStatistics {
    pub date: NaiveDate,
    pub goal: i64,
    pub final_mood: i64,
    pub total_steps: i64,
    pub archived_at: String,
}

/// One replayed hour for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyLogEntry {
    pub hour: u32,
    pub steps: i64,
    pub mood: i64,
    pub mood_label: MoodLabel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_hour_is_none_at_midnight() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).expect("date");
        assert_eq!(HourStamp::new(date, 0).closed_hour(), None);
        assert_eq!(HourStamp::new(date, 14).closed_hour(), Some(13));
    }

    #[test]
    fn day_phase_round_trips_through_text() {
        for phase in [DayPhase::Active, DayPhase::Finalized] {
            assert_eq!(DayPhase::from_str(phase.as_str()), Some(phase));
        }
        assert_eq!(DayPhase::from_str("archived"), None);
    }
}
