//! Hourly step ledger.
//!
//! Converts a cumulative step reading into per-hour increments for one date.
//! The ledger table is the only source of truth: the last recorded hour and
//! total are always re-derived from persisted rows, never cached.
//!
//! Invariants kept by every write:
//! - `steps >= 0` for every row.
//! - `last_recorded_total` never decreases across hours of a date, except
//!   immediately after a sensor reset, where the reading restarts from 0.
//! - Steps observed between two readings are fully attributed to hours
//!   (even split, remainder to the earliest hours), except where the
//!   per-hour ceiling clips a sensor anomaly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::{now_rfc3339, Tables};
use crate::error::{Result, StepMoodError};
use crate::types::{DailyStatistics, HistoricalHourlyStepRecord, HourlyStepRecord};

pub const DEFAULT_MAX_BACKFILL_HOURS: u32 = 6;
pub const DEFAULT_MAX_STEPS_PER_HOUR: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LedgerPolicy {
    /// Most missing hours a single reconcile pass will synthesize.
    #[serde(default = "default_max_backfill_hours")]
    pub max_backfill_hours: u32,
    /// Ceiling for steps attributed to one hour.
    #[serde(default = "default_max_steps_per_hour")]
    pub max_steps_per_hour: i64,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            max_backfill_hours: default_max_backfill_hours(),
            max_steps_per_hour: default_max_steps_per_hour(),
        }
    }
}

fn default_max_backfill_hours() -> u32 {
    DEFAULT_MAX_BACKFILL_HOURS
}

fn default_max_steps_per_hour() -> i64 {
    DEFAULT_MAX_STEPS_PER_HOUR
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Rows were written for `hours`, in ascending order.
    Recorded { hours: Vec<u32>, sensor_reset: bool },
    /// The reading matched the ledger; nothing was written.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub date: NaiveDate,
    pub hours: usize,
    pub total_steps: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HourLedger {
    policy: LedgerPolicy,
}

impl HourLedger {
    pub fn new(policy: LedgerPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// Upserts one hour. Steps are clamped into `0..=max_steps_per_hour`.
    pub fn record(
        &self,
        tables: &Tables<'_>,
        date: NaiveDate,
        hour: u32,
        steps: i64,
        running_total: i64,
    ) -> Result<HourlyStepRecord> {
        if hour > 23 {
            return Err(StepMoodError::InvalidHour(hour));
        }

        let record = HourlyStepRecord {
            date,
            hour,
            steps: self.clamp_steps(date, hour, steps),
            last_recorded_total: running_total.max(0),
        };
        tables.upsert_hour(&record)?;
        debug!(
            date = %date,
            hour,
            steps = record.steps,
            total = record.last_recorded_total,
            "Hour recorded"
        );
        Ok(record)
    }

    pub fn read(&self, tables: &Tables<'_>, date: NaiveDate) -> Result<Vec<HourlyStepRecord>> {
        tables.list_hours(date)
    }

    /// Brings the ledger for `date` up to `current_hour` using the latest
    /// cumulative reading. Safe to repeat: the same reading twice writes nothing
    /// the second time.
    ///
    /// Once the hour has moved on, steps since the previous reading belong to
    /// the hours that have closed since then: the previous reading's hour plus
    /// any hours with no reading at all. The current hour's row is opened at
    /// zero so later readings within it accumulate there.
    pub fn reconcile(
        &self,
        tables: &Tables<'_>,
        date: NaiveDate,
        current_hour: u32,
        cumulative_total: i64,
    ) -> Result<ReconcileOutcome> {
        if current_hour > 23 {
            return Err(StepMoodError::InvalidHour(current_hour));
        }
        let total = cumulative_total.max(0);
        let rows = tables.list_hours(date)?;

        let Some(last) = rows.last() else {
            return self.open_day(tables, date, current_hour, total);
        };

        let sensor_reset = total < last.last_recorded_total;
        let (baseline, delta) = if sensor_reset {
            warn!(
                date = %date,
                previous_total = last.last_recorded_total,
                total,
                "Step source reset detected; treating reading as a fresh baseline"
            );
            (0, total)
        } else {
            (last.last_recorded_total, total - last.last_recorded_total)
        };

        if current_hour <= last.hour {
            if current_hour < last.hour {
                debug!(
                    date = %date,
                    current_hour,
                    last_hour = last.hour,
                    "Clock is behind the ledger; folding steps into the latest hour"
                );
            }
            if delta == 0 && !sensor_reset {
                return Ok(ReconcileOutcome::Unchanged);
            }
            self.record(tables, date, last.hour, last.steps + delta, total)?;
            return Ok(ReconcileOutcome::Recorded {
                hours: vec![last.hour],
                sensor_reset,
            });
        }

        let missing = self.capped_missing(date, last.hour + 1, current_hour);
        let mut hours = Vec::with_capacity(missing.len() + 2);

        if sensor_reset {
            // The previous hour's total predates the reset; steps since the
            // reset start from the next hour.
            let mut receiving = missing;
            receiving.push(current_hour);
            self.spread(tables, date, &receiving, delta, baseline, None)?;
            hours.extend(receiving);
        } else {
            let mut receiving = vec![last.hour];
            receiving.extend(missing);
            self.spread(tables, date, &receiving, delta, baseline, Some(last.steps))?;
            self.record(tables, date, current_hour, 0, total)?;
            hours.extend(receiving);
            hours.push(current_hour);
        }

        Ok(ReconcileOutcome::Recorded {
            hours,
            sensor_reset,
        })
    }

    /// First reading of a date. The cumulative total continues from the last
    /// reading of an earlier date; with no earlier reading, or after a
    /// reset, the whole total belongs to the current hour.
    fn open_day(
        &self,
        tables: &Tables<'_>,
        date: NaiveDate,
        current_hour: u32,
        total: i64,
    ) -> Result<ReconcileOutcome> {
        let previous_total = tables.latest_total_before(date)?;
        let baseline = match previous_total {
            Some(previous) if total >= previous => previous,
            Some(previous) => {
                warn!(
                    date = %date,
                    previous_total = previous,
                    total,
                    "Step source reset since the previous day; treating reading as a fresh baseline"
                );
                self.record(tables, date, current_hour, total, total)?;
                return Ok(ReconcileOutcome::Recorded {
                    hours: vec![current_hour],
                    sensor_reset: true,
                });
            }
            None => {
                self.record(tables, date, current_hour, total, total)?;
                return Ok(ReconcileOutcome::Recorded {
                    hours: vec![current_hour],
                    sensor_reset: false,
                });
            }
        };

        let delta = total - baseline;
        if current_hour == 0 {
            self.record(tables, date, 0, delta, total)?;
            return Ok(ReconcileOutcome::Recorded {
                hours: vec![0],
                sensor_reset: false,
            });
        }

        let mut hours = self.capped_missing(date, 0, current_hour);
        self.spread(tables, date, &hours, delta, baseline, None)?;
        self.record(tables, date, current_hour, 0, total)?;
        hours.push(current_hour);
        Ok(ReconcileOutcome::Recorded {
            hours,
            sensor_reset: false,
        })
    }

    /// Hours in `from..to`, keeping only the latest `max_backfill_hours`.
    fn capped_missing(&self, date: NaiveDate, from: u32, to: u32) -> Vec<u32> {
        let missing: Vec<u32> = (from..to).collect();
        let skipped = missing
            .len()
            .saturating_sub(self.policy.max_backfill_hours as usize);
        if skipped > 0 {
            warn!(
                date = %date,
                skipped,
                cap = self.policy.max_backfill_hours,
                "Backfill capped; earliest missing hours left for missed-hour recovery"
            );
        }
        missing[skipped..].to_vec()
    }

    /// Splits `delta` evenly over `hours`, advancing the running total from
    /// `baseline`. `first_steps` carries what the first hour already holds.
    fn spread(
        &self,
        tables: &Tables<'_>,
        date: NaiveDate,
        hours: &[u32],
        delta: i64,
        baseline: i64,
        first_steps: Option<i64>,
    ) -> Result<()> {
        let shares = distribute(delta, hours.len());
        let mut running = baseline;
        for (index, (hour, share)) in hours.iter().zip(shares).enumerate() {
            running += share;
            let held = if index == 0 { first_steps.unwrap_or(0) } else { 0 };
            self.record(tables, date, *hour, held + share, running)?;
        }
        if hours.len() > 1 {
            info!(
                date = %date,
                hours = ?hours,
                steps = delta,
                "Spread steps across closed hours"
            );
        }
        Ok(())
    }

    /// Records every hour in `0..=through_hour` that has no row, estimating its
    /// steps from the cumulative totals on either side of the gap.
    pub fn fill_absent_hours(
        &self,
        tables: &Tables<'_>,
        date: NaiveDate,
        through_hour: u32,
    ) -> Result<Vec<HourlyStepRecord>> {
        if through_hour > 23 {
            return Err(StepMoodError::InvalidHour(through_hour));
        }
        let rows = tables.list_hours(date)?;
        let opening_total = match rows.first() {
            Some(first) if first.hour > 0 => tables.latest_total_before(date)?.unwrap_or(0),
            _ => 0,
        };
        let mut filled = Vec::new();

        let mut hour = 0;
        while hour <= through_hour {
            if rows.iter().any(|row| row.hour == hour) {
                hour += 1;
                continue;
            }

            let before_total = rows
                .iter()
                .rev()
                .find(|row| row.hour < hour)
                .map_or(opening_total, |row| row.last_recorded_total);
            let after = rows.iter().find(|row| row.hour > hour);
            let (run_end, after_baseline) = match after {
                // A row at the ceiling may have lost steps to the clamp, so its
                // own steps say nothing about where its hour started.
                Some(row) if row.steps >= self.policy.max_steps_per_hour => {
                    (row.hour, before_total)
                }
                Some(row) => (row.hour, row.last_recorded_total - row.steps),
                None => (through_hour + 1, before_total),
            };

            let run: Vec<u32> = (hour..run_end).collect();
            let shares = distribute((after_baseline - before_total).max(0), run.len());
            let mut running = before_total;
            for (absent, share) in run.iter().zip(shares) {
                if *absent > through_hour {
                    break;
                }
                running += share;
                filled.push(self.record(tables, date, *absent, share, running)?);
            }

            hour = run_end;
        }

        if !filled.is_empty() {
            info!(
                date = %date,
                hours = ?filled.iter().map(|row| row.hour).collect::<Vec<_>>(),
                "Recovered hours that were never recorded"
            );
        }
        Ok(filled)
    }

    /// Copies a finished day into the archive tables, then clears its live
    /// rows. A date with no live rows is left untouched.
    pub fn archive(
        &self,
        tables: &Tables<'_>,
        date: NaiveDate,
        goal: i64,
        final_mood: i64,
    ) -> Result<Option<ArchiveSummary>> {
        let rows = tables.list_hours(date)?;
        if rows.is_empty() {
            return Ok(None);
        }

        let archived_at = now_rfc3339();
        let total_steps: i64 = rows.iter().map(|row| row.steps).sum();
        for row in &rows {
            tables.insert_historical_hour(&HistoricalHourlyStepRecord {
                date,
                hour: row.hour,
                steps: row.steps,
                last_recorded_total: row.last_recorded_total,
                archived_at: archived_at.clone(),
            })?;
        }
        tables.insert_daily_statistics(&DailyStatistics {
            date,
            goal,
            final_mood,
            total_steps,
            archived_at,
        })?;
        tables.delete_hours(date)?;

        info!(date = %date, hours = rows.len(), total_steps, "Day archived");
        Ok(Some(ArchiveSummary {
            date,
            hours: rows.len(),
            total_steps,
        }))
    }

    fn clamp_steps(&self, date: NaiveDate, hour: u32, steps: i64) -> i64 {
        if steps > self.policy.max_steps_per_hour {
            warn!(
                date = %date,
                hour,
                steps,
                ceiling = self.policy.max_steps_per_hour,
                "Implausible hourly step count clamped"
            );
            return self.policy.max_steps_per_hour;
        }
        steps.max(0)
    }
}

/// Splits `amount` across `slots`; the remainder goes one unit at a time to
/// the earliest slots.
pub fn distribute(amount: i64, slots: usize) -> Vec<i64> {
    if slots == 0 {
        return Vec::new();
    }
    let amount = amount.max(0);
    let count = slots as i64;
    let base = amount / count;
    let remainder = amount % count;
    (0..count)
        .map(|index| base + i64::from(index < remainder))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 14).expect("valid date")
    }

    fn open_db(dir: &tempfile::TempDir) -> Db {
        Db::new(dir.path().join("stepmood.db")).expect("db init")
    }

    fn rows(db: &Db) -> Vec<(u32, i64, i64)> {
        db.read(|t| t.list_hours(date()))
            .expect("list")
            .into_iter()
            .map(|row| (row.hour, row.steps, row.last_recorded_total))
            .collect()
    }

    #[test]
    fn distribute_gives_remainder_to_earliest_slots() {
        assert_eq!(distribute(10, 3), vec![4, 3, 3]);
        assert_eq!(distribute(11, 3), vec![4, 4, 3]);
        assert_eq!(distribute(2, 4), vec![1, 1, 0, 0]);
        assert_eq!(distribute(0, 2), vec![0, 0]);
        assert_eq!(distribute(-5, 2), vec![0, 0]);
        assert!(distribute(7, 0).is_empty());
    }

    #[test]
    fn first_reading_of_the_day_records_current_hour() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();

        let outcome = db
            .write(|t| ledger.reconcile(t, date(), 8, 1_200))
            .expect("reconcile");
        assert_eq!(
            outcome,
            ReconcileOutcome::Recorded {
                hours: vec![8],
                sensor_reset: false
            }
        );
        assert_eq!(rows(&db), vec![(8, 1_200, 1_200)]);
    }

    #[test]
    fn same_hour_readings_accumulate_and_repeat_is_a_no_op() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();

        db.write(|t| ledger.reconcile(t, date(), 9, 100))
            .expect("first");
        db.write(|t| ledger.reconcile(t, date(), 10, 400))
            .expect("next hour");
        db.write(|t| ledger.reconcile(t, date(), 10, 650))
            .expect("same hour");
        assert_eq!(rows(&db), vec![(9, 400, 400), (10, 250, 650)]);

        let before = rows(&db);
        let outcome = db
            .write(|t| ledger.reconcile(t, date(), 10, 650))
            .expect("repeat");
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(rows(&db), before);
    }

    #[test]
    fn steps_since_last_reading_belong_to_the_closed_hour() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();

        db.write(|t| ledger.reconcile(t, date(), 9, 0)).expect("09:05");
        let outcome = db
            .write(|t| ledger.reconcile(t, date(), 10, 300))
            .expect("10:05");
        assert_eq!(
            outcome,
            ReconcileOutcome::Recorded {
                hours: vec![9, 10],
                sensor_reset: false
            }
        );
        assert_eq!(rows(&db), vec![(9, 300, 300), (10, 0, 300)]);

        db.write(|t| ledger.reconcile(t, date(), 10, 420))
            .expect("10:40");
        db.write(|t| ledger.reconcile(t, date(), 11, 500))
            .expect("11:05");
        assert_eq!(
            rows(&db),
            vec![(9, 300, 300), (10, 200, 500), (11, 0, 500)]
        );
    }

    #[test]
    fn gap_is_backfilled_evenly_with_monotonic_totals() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();

        db.write(|t| ledger.reconcile(t, date(), 8, 1_000))
            .expect("seed");
        let outcome = db
            .write(|t| ledger.reconcile(t, date(), 12, 1_902))
            .expect("reconcile");
        assert_eq!(
            outcome,
            ReconcileOutcome::Recorded {
                hours: vec![8, 9, 10, 11, 12],
                sensor_reset: false
            }
        );

        let recorded = rows(&db);
        assert_eq!(
            recorded,
            vec![
                (8, 1_226, 1_226),
                (9, 226, 1_452),
                (10, 225, 1_677),
                (11, 225, 1_902),
                (12, 0, 1_902),
            ]
        );
        let total: i64 = recorded.iter().map(|(_, steps, _)| steps).sum();
        assert_eq!(total, 1_902);
        for pair in recorded.windows(2) {
            assert_eq!(pair[1].1, pair[1].2 - pair[0].2);
        }
    }

    #[test]
    fn backfill_respects_the_cap() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::new(LedgerPolicy {
            max_backfill_hours: 2,
            ..LedgerPolicy::default()
        });

        db.write(|t| ledger.reconcile(t, date(), 1, 0)).expect("seed");
        let outcome = db
            .write(|t| ledger.reconcile(t, date(), 7, 300))
            .expect("reconcile");
        assert_eq!(
            outcome,
            ReconcileOutcome::Recorded {
                hours: vec![1, 5, 6, 7],
                sensor_reset: false
            }
        );
        assert_eq!(
            rows(&db),
            vec![(1, 100, 100), (5, 100, 200), (6, 100, 300), (7, 0, 300)]
        );
    }

    #[test]
    fn sensor_reset_restarts_from_zero_baseline() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();

        db.write(|t| ledger.reconcile(t, date(), 14, 8_000))
            .expect("seed");
        let outcome = db
            .write(|t| ledger.reconcile(t, date(), 15, 50))
            .expect("reconcile");
        assert_eq!(
            outcome,
            ReconcileOutcome::Recorded {
                hours: vec![15],
                sensor_reset: true
            }
        );
        assert_eq!(rows(&db), vec![(14, 8_000, 8_000), (15, 50, 50)]);

        db.write(|t| ledger.reconcile(t, date(), 15, 80))
            .expect("after reset");
        assert_eq!(rows(&db)[1], (15, 80, 80));
    }

    #[test]
    fn sensor_reset_within_an_hour_keeps_earlier_steps() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();

        db.write(|t| ledger.reconcile(t, date(), 11, 3_000))
            .expect("seed");
        db.write(|t| ledger.reconcile(t, date(), 12, 3_400))
            .expect("next hour");
        db.write(|t| ledger.reconcile(t, date(), 12, 3_450))
            .expect("same hour");
        db.write(|t| ledger.reconcile(t, date(), 12, 30))
            .expect("reset");
        assert_eq!(rows(&db), vec![(11, 3_400, 3_400), (12, 80, 30)]);
    }

    #[test]
    fn implausible_hour_is_clamped_but_total_advances() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();

        db.write(|t| ledger.reconcile(t, date(), 6, 100)).expect("seed");
        db.write(|t| ledger.reconcile(t, date(), 7, 40_100))
            .expect("spike");
        assert_eq!(rows(&db), vec![(6, 10_000, 40_100), (7, 0, 40_100)]);

        db.write(|t| ledger.reconcile(t, date(), 8, 40_400))
            .expect("after spike");
        assert_eq!(rows(&db)[1], (7, 300, 40_400));
    }

    #[test]
    fn rejects_hours_outside_the_day() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();

        let err = db
            .write(|t| ledger.reconcile(t, date(), 24, 10))
            .expect_err("hour 24");
        assert!(matches!(err, StepMoodError::InvalidHour(24)));
    }

    #[test]
    fn fills_absent_hours_from_bracketing_totals() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();

        db.write(|t| {
            ledger.record(t, date(), 2, 100, 100)?;
            ledger.record(t, date(), 6, 50, 450)?;
            Ok(())
        })
        .expect("seed");

        let filled = db
            .write(|t| ledger.fill_absent_hours(t, date(), 7))
            .expect("fill");
        let hours: Vec<u32> = filled.iter().map(|row| row.hour).collect();
        assert_eq!(hours, vec![0, 1, 3, 4, 5, 7]);

        assert_eq!(
            rows(&db),
            vec![
                (0, 0, 0),
                (1, 0, 0),
                (2, 100, 100),
                (3, 100, 200),
                (4, 100, 300),
                (5, 100, 400),
                (6, 50, 450),
                (7, 0, 450),
            ]
        );

        let again = db
            .write(|t| ledger.fill_absent_hours(t, date(), 7))
            .expect("fill again");
        assert!(again.is_empty());
    }

    #[test]
    fn clamped_row_after_a_gap_does_not_credit_the_gap() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();

        db.write(|t| {
            ledger.record(t, date(), 2, 100, 100)?;
            ledger.record(t, date(), 6, 40_350, 40_450)?;
            Ok(())
        })
        .expect("seed");
        assert_eq!(rows(&db)[1], (6, 10_000, 40_450));

        db.write(|t| ledger.fill_absent_hours(t, date(), 6))
            .expect("fill");
        let gap: Vec<(u32, i64, i64)> = rows(&db)
            .into_iter()
            .filter(|(hour, _, _)| (3..6).contains(hour))
            .collect();
        assert_eq!(gap, vec![(3, 0, 100), (4, 0, 100), (5, 0, 100)]);
    }

    #[test]
    fn first_reading_continues_from_the_previous_day() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();
        let yesterday = date().pred_opt().expect("previous date");

        db.write(|t| {
            ledger.record(t, yesterday, 21, 400, 7_900)?;
            ledger.archive(t, yesterday, 10_000, 47)?;
            Ok(())
        })
        .expect("yesterday");

        let outcome = db
            .write(|t| ledger.reconcile(t, date(), 8, 8_000))
            .expect("reconcile");
        assert_eq!(
            outcome,
            ReconcileOutcome::Recorded {
                hours: vec![2, 3, 4, 5, 6, 7, 8],
                sensor_reset: false
            }
        );
        let recorded = rows(&db);
        assert_eq!(recorded.last(), Some(&(8, 0, 8_000)));
        let total: i64 = recorded.iter().map(|(_, steps, _)| steps).sum();
        assert_eq!(total, 100);

        db.write(|t| ledger.fill_absent_hours(t, date(), 8))
            .expect("fill");
        assert_eq!(&rows(&db)[..2], &[(0, 0, 7_900), (1, 0, 7_900)]);
    }

    #[test]
    fn first_reading_below_the_previous_day_is_a_reset() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();
        let yesterday = date().pred_opt().expect("previous date");

        db.write(|t| ledger.record(t, yesterday, 22, 500, 9_000))
            .expect("yesterday");
        let outcome = db
            .write(|t| ledger.reconcile(t, date(), 7, 120))
            .expect("reconcile");
        assert_eq!(
            outcome,
            ReconcileOutcome::Recorded {
                hours: vec![7],
                sensor_reset: true
            }
        );
        assert_eq!(rows(&db), vec![(7, 120, 120)]);
    }

    #[test]
    fn archive_copies_rows_and_clears_live_table() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);
        let ledger = HourLedger::default();

        db.write(|t| {
            ledger.reconcile(t, date(), 9, 300)?;
            ledger.reconcile(t, date(), 10, 300)?;
            ledger.reconcile(t, date(), 13, 1_200)?;
            Ok(())
        })
        .expect("seed");

        let summary = db
            .write(|t| ledger.archive(t, date(), 10_000, 61))
            .expect("archive")
            .expect("rows archived");
        assert_eq!(summary.hours, 5);
        assert_eq!(summary.total_steps, 1_200);

        assert!(rows(&db).is_empty());
        let archived = db
            .read(|t| t.list_historical_hours(date()))
            .expect("archived");
        assert_eq!(archived.len(), 5);
        let stats = db
            .read(|t| t.get_daily_statistics(date()))
            .expect("stats")
            .expect("stats row");
        assert_eq!(stats.final_mood, 61);
        assert_eq!(stats.total_steps, 1_200);
        assert_eq!(stats.goal, 10_000);

        let again = db
            .write(|t| ledger.archive(t, date(), 10_000, 61))
            .expect("archive again");
        assert!(again.is_none());
    }
}
