//! The single reconciliation entry point.
//!
//! Schedulers, app-resume hooks and the CLI all call [`ReconciliationDriver::run`].
//! Each pass re-derives what to do from persisted rows, so calling it any
//! number of times per hour is safe and only the first call in an hour moves
//! the mood.
//!
//! A pass runs five phases, each in its own transaction:
//!
//! 1. **Rollover**: finalize and archive every earlier day still open, then
//!    seed today.
//! 2. **Ledger**: reconcile today's hourly rows against the step reading.
//! 3. **Mood**: fold every closed hour not yet processed into today's mood,
//!    recovering hours that never made it into the ledger.
//! 4. **Healing**: cap a mood that the recorded activity cannot justify.
//! 5. **Notification**: report a mood drop, if the mood phase produced one.
//!
//! A failing phase is logged and reported; later phases still run. The
//! notifier is called last, after every write of the pass has committed, so
//! a slow or failing notifier cannot hold up or undo persisted state.

use std::collections::BTreeSet;

use chrono::{Months, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};

use crate::collaborators::{Collaborators, MoodDrop};
use crate::config::TrackerConfig;
use crate::db::{Db, Tables};
use crate::error::Result;
use crate::ledger::{ArchiveSummary, HourLedger, ReconcileOutcome};
use crate::mood::{start_mood, HealOutcome, MoodEngine, MoodRules, MoodTransition, QuietHours};
use crate::scale::DEFAULT_DAILY_GOAL;
use crate::types::{DailyStatistics, HourStamp, HourlyLogEntry, MoodState};

/// Result of one phase of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Phase<T> {
    Done(T),
    Skipped(String),
    Failed(String),
}

impl<T> Phase<T> {
    fn from_result(phase: &'static str, result: Result<T>) -> Self {
        match result {
            Ok(value) => Phase::Done(value),
            Err(err) => {
                warn!(phase, error = %err, "Reconciliation phase failed");
                Phase::Failed(err.to_string())
            }
        }
    }

    pub fn done(&self) -> Option<&T> {
        match self {
            Phase::Done(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Phase::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedDay {
    pub date: NaiveDate,
    pub final_mood: i64,
    pub archive: Option<ArchiveSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rollover {
    /// Earlier days closed by this pass, oldest first. Usually empty.
    pub closed: Vec<ClosedDay>,
    pub today: MoodState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub now: HourStamp,
    pub rollover: Phase<Rollover>,
    pub ledger: Phase<ReconcileOutcome>,
    pub mood: Phase<Option<MoodTransition>>,
    pub healing: Phase<HealOutcome>,
    pub notification: Phase<MoodDrop>,
}

/// Goal-derived rules for the current pass.
#[derive(Debug, Clone, Copy)]
struct Settings {
    goal: i64,
    rules: MoodRules,
}

pub struct ReconciliationDriver {
    db: Db,
    ledger: HourLedger,
    engine: MoodEngine,
    collaborators: Collaborators,
}

impl ReconciliationDriver {
    pub fn new(
        db: Db,
        ledger: HourLedger,
        engine: MoodEngine,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            db,
            ledger,
            engine,
            collaborators,
        }
    }

    /// Opens the configured database and applies the configured policies.
    pub fn from_config(config: &TrackerConfig, collaborators: Collaborators) -> Result<Self> {
        let db = Db::new(config.db_path()?)?;
        Ok(Self::new(
            db,
            HourLedger::new(config.ledger),
            MoodEngine::new(config.healing.margin),
            collaborators,
        ))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn run(&self) -> TickReport {
        let now = self.collaborators.clock.now();
        let settings = self.settings();

        let rollover = Phase::from_result(
            "rollover",
            self.db.write(|t| self.roll_over(t, now.date, &settings)),
        );

        let ledger = match self.collaborators.steps.current_cumulative_steps() {
            Some(total) => Phase::from_result(
                "ledger",
                self.db
                    .write(|t| self.ledger.reconcile(t, now.date, now.hour, total)),
            ),
            None => {
                warn!(date = %now.date, hour = now.hour, "Step source unavailable; ledger not reconciled");
                Phase::Skipped("step source unavailable".to_string())
            }
        };

        let mood = if rollover.is_failed() {
            Phase::Skipped("rollover failed".to_string())
        } else {
            Phase::from_result(
                "mood",
                self.db
                    .write(|t| self.process_closed_hours(t, now, &settings.rules)),
            )
        };

        let healing = Phase::from_result(
            "healing",
            self.db
                .write(|t| self.engine.heal(t, now.date, &settings.rules)),
        );

        let notification = match mood.done() {
            Some(Some(transition)) => self.notify(transition),
            _ => Phase::Skipped("no mood transition".to_string()),
        };

        TickReport {
            now,
            rollover,
            ledger,
            mood,
            healing,
            notification,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read models
    // ─────────────────────────────────────────────────────────────────────

    /// Today's mood row. Closes any earlier open day first, then seeds today
    /// if this is its first read.
    pub fn current_mood(&self) -> Result<MoodState> {
        let now = self.collaborators.clock.now();
        let settings = self.settings();
        self.db
            .write(|t| Ok(self.roll_over(t, now.date, &settings)?.today))
    }

    /// Display-only projection. Writes nothing; a day with no row yet projects
    /// from the mood rollover would seed it with, replaying an earlier day
    /// that is still open.
    pub fn live_mood(&self, cumulative_total_now: i64) -> Result<i64> {
        let today = self.collaborators.clock.now().date;
        let settings = self.settings();
        self.db.read(|t| {
            if let Some(state) = t.get_mood_state(today)? {
                return Ok(self
                    .engine
                    .live_mood(&state, cumulative_total_now, &settings.rules));
            }
            let previous_end = match t.latest_mood_state_before(today)? {
                Some(state) if !state.is_finalized() => {
                    Some(self.engine.replayed_day_end(t, &state, &settings.rules)?.0)
                }
                Some(state) => Some(state.mood),
                None => None,
            };
            Ok(start_mood(previous_end))
        })
    }

    /// Mood rows from `range_months` months before today through today.
    pub fn mood_history(&self, range_months: u32) -> Result<Vec<MoodState>> {
        let today = self.collaborators.clock.now().date;
        let since = today
            .checked_sub_months(Months::new(range_months))
            .unwrap_or(NaiveDate::MIN);
        self.db.read(|t| t.list_mood_states_since(since))
    }

    pub fn hourly_log(&self, date: NaiveDate) -> Result<Vec<HourlyLogEntry>> {
        let settings = self.settings();
        self.db
            .read(|t| self.engine.hourly_log(t, date, &settings.rules))
    }

    pub fn daily_statistics(&self, date: NaiveDate) -> Result<Option<DailyStatistics>> {
        self.db.read(|t| t.get_daily_statistics(date))
    }

    /// The latest hour of today already folded into the mood, if any.
    pub fn last_processed_hour(&self) -> Result<Option<u32>> {
        let today = self.collaborators.clock.now().date;
        self.db.read(|t| {
            Ok(t.get_mood_state(today)?
                .and_then(|state| state.last_processed_hour))
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Phases
    // ─────────────────────────────────────────────────────────────────────

    fn roll_over(&self, t: &Tables<'_>, today: NaiveDate, settings: &Settings) -> Result<Rollover> {
        let mut pending: BTreeSet<NaiveDate> = t.unfinalized_dates_before(today)?.into_iter().collect();
        pending.extend(t.ledger_dates_before(today)?);

        let mut closed = Vec::with_capacity(pending.len());
        for date in pending {
            // Ledger rows can exist for a date whose mood row was never read.
            self.engine.current_mood(t, date)?;
            let final_mood = match self.engine.finalize_day(t, date, &settings.rules)? {
                Some(state) => state.mood,
                None => continue,
            };
            let archive = self.ledger.archive(t, date, settings.goal, final_mood)?;
            closed.push(ClosedDay {
                date,
                final_mood,
                archive,
            });
        }

        let today_state = self.engine.reset_for_new_day(t, today)?;
        if !closed.is_empty() {
            info!(
                today = %today,
                closed = closed.len(),
                start_mood = today_state.daily_start_mood,
                "Day rollover complete"
            );
        }
        Ok(Rollover {
            closed,
            today: today_state,
        })
    }

    /// Applies every closed hour of today that the mood row has not seen.
    /// Hours the ledger never recorded are recovered first so the mood and the
    /// ledger agree on what each hour contained.
    fn process_closed_hours(
        &self,
        t: &Tables<'_>,
        now: HourStamp,
        rules: &MoodRules,
    ) -> Result<Option<MoodTransition>> {
        let Some(closed_hour) = now.closed_hour() else {
            return Ok(None);
        };
        let state = self.engine.current_mood(t, now.date)?;
        if state.is_finalized() || state.has_processed(closed_hour) {
            return Ok(None);
        }

        self.ledger.fill_absent_hours(t, now.date, closed_hour)?;
        let rows = t.list_hours(now.date)?;
        let first_hour = state.last_processed_hour.map_or(0, |hour| hour + 1);
        let hours: Vec<(u32, i64)> = (first_hour..=closed_hour)
            .map(|hour| {
                let steps = rows
                    .iter()
                    .find(|row| row.hour == hour)
                    .map_or(0, |row| row.steps);
                (hour, steps)
            })
            .collect();
        if hours.len() > 1 {
            info!(
                date = %now.date,
                from = first_hour,
                through = closed_hour,
                "Processing hours missed by earlier passes"
            );
        }

        let checkpoint = rows
            .iter()
            .rev()
            .find(|row| row.hour <= closed_hour)
            .map_or(state.last_persisted_steps, |row| row.last_recorded_total);
        self.engine
            .apply_closed_hours(t, now.date, &hours, checkpoint, rules)
    }

    fn notify(&self, transition: &MoodTransition) -> Phase<MoodDrop> {
        let Some(drop) = MoodDrop::from_transition(transition) else {
            return Phase::Skipped("mood did not drop".to_string());
        };
        match self.collaborators.notifier.on_mood_drop(&drop) {
            Ok(()) => Phase::Done(drop),
            Err(err) => {
                warn!(error = %err, date = %drop.date, "Mood drop notification failed");
                Phase::Failed(err)
            }
        }
    }

    fn settings(&self) -> Settings {
        let goal = match self.collaborators.goal.daily_goal() {
            Some(goal) if goal > 0 => goal,
            other => {
                warn!(goal = ?other, fallback = DEFAULT_DAILY_GOAL, "Daily goal unavailable; using default");
                DEFAULT_DAILY_GOAL
            }
        };

        let provider = &self.collaborators.quiet_hours;
        let quiet_hours = provider
            .start()
            .zip(provider.end())
            .and_then(|(start, end)| QuietHours::new(start, end))
            .unwrap_or_else(|| {
                let fallback = QuietHours::default();
                warn!(
                    start = fallback.start(),
                    end = fallback.end(),
                    "Quiet hours unavailable; using defaults"
                );
                fallback
            });

        Settings {
            goal,
            rules: MoodRules::new(goal, quiet_hours),
        }
    }
}
