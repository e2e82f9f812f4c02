//! Persisted mood transitions for one date.
//!
//! A date moves through three phases: no row (uninitialized), `Active`, and
//! `Finalized`. Every method re-reads the row it mutates inside the caller's
//! transaction; the engine itself holds no per-day state.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::rules::{clamp_mood, start_mood, MoodLabel, MoodRules, DEFAULT_START_MOOD};
use crate::db::Tables;
use crate::error::{Result, StepMoodError};
use crate::types::{DayPhase, HourlyLogEntry, MoodState};

pub const DEFAULT_CORRECTION_MARGIN: i64 = 10;

/// The net effect of folding one or more closed hours into a day's mood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoodTransition {
    pub date: NaiveDate,
    pub hours: Vec<u32>,
    pub steps: i64,
    pub previous: i64,
    pub mood: i64,
}

impl MoodTransition {
    pub fn is_drop(&self) -> bool {
        self.mood < self.previous
    }

    pub fn period_hours(&self) -> u32 {
        self.hours.len() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealOutcome {
    Unchanged,
    Corrected { from: i64, to: i64 },
}

#[derive(Debug, Clone, Copy)]
pub struct MoodEngine {
    correction_margin: i64,
}

impl Default for MoodEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CORRECTION_MARGIN)
    }
}

impl MoodEngine {
    pub fn new(correction_margin: i64) -> Self {
        Self {
            correction_margin: correction_margin.max(0),
        }
    }

    /// Returns the row for `date`, creating it if this is the first read.
    pub fn current_mood(&self, tables: &Tables<'_>, date: NaiveDate) -> Result<MoodState> {
        if let Some(state) = tables.get_mood_state(date)? {
            return Ok(state);
        }
        self.seed_day(tables, date)
    }

    /// Seeds `date` from the most recent earlier day. Callers finalize and
    /// archive earlier days first so the seed sees their final mood.
    pub fn reset_for_new_day(&self, tables: &Tables<'_>, date: NaiveDate) -> Result<MoodState> {
        self.current_mood(tables, date)
    }

    fn seed_day(&self, tables: &Tables<'_>, date: NaiveDate) -> Result<MoodState> {
        let previous_end = tables.latest_mood_state_before(date)?.map(|state| state.mood);
        let start = start_mood(previous_end);
        let state = MoodState {
            date,
            mood: start,
            daily_start_mood: start,
            previous_day_end_mood: previous_end.unwrap_or(DEFAULT_START_MOOD),
            last_persisted_steps: 0,
            last_processed_hour: None,
            phase: DayPhase::Active,
        };

        if !tables.insert_mood_state(&state)? {
            return tables
                .get_mood_state(date)?
                .ok_or_else(|| StepMoodError::CorruptRow {
                    table: "mood_state",
                    details: format!("row for {} vanished after conflicting insert", date),
                });
        }

        info!(
            date = %date,
            start_mood = start,
            previous_day_end_mood = ?previous_end,
            "Day seeded"
        );
        Ok(state)
    }

    /// Applies one closed hour. A second call for the same hour is a no-op.
    pub fn apply_hourly_update(
        &self,
        tables: &Tables<'_>,
        date: NaiveDate,
        hour: u32,
        steps_in_hour: i64,
        cumulative_total: i64,
        rules: &MoodRules,
    ) -> Result<Option<MoodTransition>> {
        self.apply_closed_hours(
            tables,
            date,
            &[(hour, steps_in_hour)],
            cumulative_total,
            rules,
        )
    }

    /// Folds `(hour, steps)` pairs into the day's mood in hour order and
    /// persists once. Hours at or before the row's last processed hour are
    /// ignored, so overlapping calls never count an hour twice.
    pub fn apply_closed_hours(
        &self,
        tables: &Tables<'_>,
        date: NaiveDate,
        hours: &[(u32, i64)],
        cumulative_total: i64,
        rules: &MoodRules,
    ) -> Result<Option<MoodTransition>> {
        if let Some((hour, _)) = hours.iter().find(|(hour, _)| *hour > 23) {
            return Err(StepMoodError::InvalidHour(*hour));
        }

        let mut state = self.current_mood(tables, date)?;
        if state.is_finalized() {
            debug!(date = %date, "Ignoring hourly update for finalized day");
            return Ok(None);
        }

        let mut pending: Vec<(u32, i64)> = hours
            .iter()
            .copied()
            .filter(|(hour, _)| !state.has_processed(*hour))
            .collect();
        pending.sort_by_key(|(hour, _)| *hour);
        pending.dedup_by_key(|(hour, _)| *hour);
        let Some(&(last_hour, _)) = pending.last() else {
            return Ok(None);
        };

        let previous = state.mood;
        let mut mood = previous;
        for (hour, steps) in &pending {
            let step = rules.step(mood, *hour, *steps);
            debug!(
                date = %date,
                hour = step.hour,
                steps = step.steps,
                gain = step.gain,
                decay = step.decay,
                mood = step.mood,
                "Hour applied"
            );
            mood = step.mood;
        }

        state.mood = mood;
        state.last_persisted_steps = cumulative_total.max(0);
        state.last_processed_hour = Some(last_hour);
        tables.update_mood_state(&state)?;

        let transition = MoodTransition {
            date,
            hours: pending.iter().map(|(hour, _)| *hour).collect(),
            steps: pending.iter().map(|(_, steps)| (*steps).max(0)).sum(),
            previous,
            mood,
        };
        info!(
            date = %date,
            hours = ?transition.hours,
            previous,
            mood,
            "Mood updated"
        );
        Ok(Some(transition))
    }

    /// Display-only extrapolation from the last authoritative update.
    pub fn live_mood(&self, state: &MoodState, cumulative_total: i64, rules: &MoodRules) -> i64 {
        rules.project(state.mood, cumulative_total - state.last_persisted_steps)
    }

    /// Replays hours `0..=through_hour` from `start`. Hours without a row count
    /// as zero-step hours.
    pub fn replay(
        &self,
        start: i64,
        recorded: &[(u32, i64)],
        through_hour: u32,
        rules: &MoodRules,
    ) -> Vec<HourlyLogEntry> {
        let mut mood = clamp_mood(start);
        (0..=through_hour.min(23))
            .map(|hour| {
                let steps = recorded
                    .iter()
                    .find(|(recorded_hour, _)| *recorded_hour == hour)
                    .map(|(_, steps)| *steps)
                    .unwrap_or(0);
                let step = rules.step(mood, hour, steps);
                mood = step.mood;
                HourlyLogEntry {
                    hour,
                    steps: step.steps,
                    mood,
                    mood_label: MoodLabel::for_mood(mood),
                }
            })
            .collect()
    }

    /// Commits the day's permanent mood by replaying the whole ledger from the
    /// start-of-day mood. Already-finalized days are returned unchanged.
    /// The mood a day ends on when its recorded hours are replayed from its
    /// start mood, with the number of recorded hours. Reads only.
    pub fn replayed_day_end(
        &self,
        tables: &Tables<'_>,
        state: &MoodState,
        rules: &MoodRules,
    ) -> Result<(i64, usize)> {
        let recorded: Vec<(u32, i64)> = tables
            .list_hours(state.date)?
            .into_iter()
            .map(|row| (row.hour, row.steps))
            .collect();
        let log = self.replay(state.daily_start_mood, &recorded, 23, rules);
        let final_mood = log
            .last()
            .map_or(state.daily_start_mood, |entry| entry.mood);
        Ok((final_mood, recorded.len()))
    }

    pub fn finalize_day(
        &self,
        tables: &Tables<'_>,
        date: NaiveDate,
        rules: &MoodRules,
    ) -> Result<Option<MoodState>> {
        let Some(mut state) = tables.get_mood_state(date)? else {
            return Ok(None);
        };
        if state.is_finalized() {
            return Ok(Some(state));
        }

        let (final_mood, recorded_hours) = self.replayed_day_end(tables, &state, rules)?;

        let running_mood = state.mood;
        state.mood = final_mood;
        state.last_processed_hour = Some(23);
        state.phase = DayPhase::Finalized;
        tables.update_mood_state(&state)?;

        info!(
            date = %date,
            running_mood,
            final_mood,
            recorded_hours,
            "Day finalized"
        );
        Ok(Some(state))
    }

    /// The day's hours replayed for display. Uses live rows when present and
    /// the archived copy otherwise; nothing is written.
    pub fn hourly_log(
        &self,
        tables: &Tables<'_>,
        date: NaiveDate,
        rules: &MoodRules,
    ) -> Result<Vec<HourlyLogEntry>> {
        let state = tables.get_mood_state(date)?;
        let mut recorded: Vec<(u32, i64)> = tables
            .list_hours(date)?
            .into_iter()
            .map(|row| (row.hour, row.steps))
            .collect();
        if recorded.is_empty() {
            recorded = tables
                .list_historical_hours(date)?
                .into_iter()
                .map(|row| (row.hour, row.steps))
                .collect();
        }
        let Some(&(last_hour, _)) = recorded.last() else {
            return Ok(Vec::new());
        };

        let finalized = state.as_ref().is_some_and(MoodState::is_finalized);
        let through_hour = if finalized { 23 } else { last_hour };
        let start = state
            .map(|state| state.daily_start_mood)
            .unwrap_or(DEFAULT_START_MOOD);
        Ok(self.replay(start, &recorded, through_hour, rules))
    }

    /// Caps a mood that exceeds what the day's recorded gains can justify.
    pub fn heal(
        &self,
        tables: &Tables<'_>,
        date: NaiveDate,
        rules: &MoodRules,
    ) -> Result<HealOutcome> {
        let Some(mut state) = tables.get_mood_state(date)? else {
            return Ok(HealOutcome::Unchanged);
        };
        if state.is_finalized() {
            return Ok(HealOutcome::Unchanged);
        }

        let total_gain: i64 = tables
            .list_hours(date)?
            .iter()
            .filter(|row| state.has_processed(row.hour))
            .map(|row| rules.gain(row.steps))
            .sum();
        let justified = clamp_mood(state.daily_start_mood + total_gain);
        if state.mood <= justified + self.correction_margin {
            return Ok(HealOutcome::Unchanged);
        }

        let from = state.mood;
        warn!(
            date = %date,
            mood = from,
            justified,
            margin = self.correction_margin,
            "Mood exceeds recorded activity; correcting"
        );
        state.mood = justified;
        tables.update_mood_state(&state)?;
        Ok(HealOutcome::Corrected {
            from,
            to: justified,
        })
    }
}
