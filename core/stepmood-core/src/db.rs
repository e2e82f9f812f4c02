//! SQLite persistence for the step ledger and mood rows.
//!
//! Two live tables (`mood_state`, `hourly_steps`) carry today's working state;
//! two archival tables (`historical_hourly_steps`, `daily_statistics`) are
//! append-only and written once per day at rollover.
//!
//! Every mutation goes through [`Db::write`], which runs the closure inside an
//! IMMEDIATE transaction. Callers re-read whatever they depend on inside that
//! closure, so racing reconciliation passes serialize on the database rather
//! than on any in-process lock.

use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};

use crate::error::{Result, StepMoodError};
use crate::types::{
    DailyStatistics, DayPhase, HistoricalHourlyStepRecord, HourlyStepRecord, MoodState,
};

const MOOD_COLUMNS: &str = "date, mood, daily_start_mood, previous_day_end_mood, \
                            last_persisted_steps, last_processed_hour, phase";

pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: PathBuf) -> Result<Self> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `op` against a consistent snapshot. Nothing `op` writes is kept.
    pub fn read<T>(&self, op: impl FnOnce(&Tables<'_>) -> Result<T>) -> Result<T> {
        self.with_connection(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Deferred)
                .map_err(|err| StepMoodError::storage("Failed to begin read transaction", err))?;
            let tables = Tables::new(&tx);
            op(&tables)
        })
    }

    /// Runs `op` inside an IMMEDIATE transaction and commits if it succeeds.
    pub fn write<T>(&self, op: impl FnOnce(&Tables<'_>) -> Result<T>) -> Result<T> {
        self.with_connection(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| StepMoodError::storage("Failed to begin write transaction", err))?;
            let value = {
                let tables = Tables::new(&tx);
                op(&tables)?
            };
            tx.commit()
                .map_err(|err| StepMoodError::storage("Failed to commit transaction", err))?;
            Ok(value)
        })
    }

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS mood_state (
                    date TEXT PRIMARY KEY,
                    mood INTEGER NOT NULL,
                    daily_start_mood INTEGER NOT NULL,
                    previous_day_end_mood INTEGER NOT NULL,
                    last_persisted_steps INTEGER NOT NULL DEFAULT 0,
                    last_processed_hour INTEGER,
                    phase TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS hourly_steps (
                    date TEXT NOT NULL,
                    hour INTEGER NOT NULL,
                    steps INTEGER NOT NULL,
                    last_recorded_total INTEGER NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (date, hour)
                 );
                 CREATE TABLE IF NOT EXISTS historical_hourly_steps (
                    date TEXT NOT NULL,
                    hour INTEGER NOT NULL,
                    steps INTEGER NOT NULL,
                    last_recorded_total INTEGER NOT NULL,
                    archived_at TEXT NOT NULL,
                    PRIMARY KEY (date, hour, archived_at)
                 );
                 CREATE TABLE IF NOT EXISTS daily_statistics (
                    date TEXT PRIMARY KEY,
                    goal INTEGER NOT NULL,
                    final_mood INTEGER NOT NULL,
                    total_steps INTEGER NOT NULL,
                    archived_at TEXT NOT NULL
                 );
                 COMMIT;",
            )
            .map_err(|err| StepMoodError::storage("Failed to initialize schema", err))
        })
    }

    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| StepMoodError::io("Failed to create data dir", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| StepMoodError::storage("Failed to open sqlite db", err))?;

        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| StepMoodError::storage("Failed to set busy_timeout", err))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| StepMoodError::storage("Failed to enable WAL", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| StepMoodError::storage("Failed to set synchronous", err))?;

        Ok(conn)
    }
}

/// Table operations scoped to one open transaction.
pub struct Tables<'c> {
    conn: &'c Connection,
}

impl<'c> Tables<'c> {
    fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // ─────────────────────────────────────────────────────────────────────
    // mood_state
    // ─────────────────────────────────────────────────────────────────────

    pub fn get_mood_state(&self, date: NaiveDate) -> Result<Option<MoodState>> {
        self.conn
            .query_row(
                &format!("SELECT {MOOD_COLUMNS} FROM mood_state WHERE date = ?1"),
                params![date],
                mood_state_from_row,
            )
            .optional()
            .map_err(|err| StepMoodError::storage("Failed to query mood state", err))
    }

    pub fn latest_mood_state_before(&self, date: NaiveDate) -> Result<Option<MoodState>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {MOOD_COLUMNS} FROM mood_state WHERE date < ?1 \
                     ORDER BY date DESC LIMIT 1"
                ),
                params![date],
                mood_state_from_row,
            )
            .optional()
            .map_err(|err| StepMoodError::storage("Failed to query previous mood state", err))
    }

    /// Inserts a new day row. Returns false if the date already had one.
    pub fn insert_mood_state(&self, state: &MoodState) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT INTO mood_state \
                    (date, mood, daily_start_mood, previous_day_end_mood, \
                     last_persisted_steps, last_processed_hour, phase, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(date) DO NOTHING",
                params![
                    state.date,
                    state.mood,
                    state.daily_start_mood,
                    state.previous_day_end_mood,
                    state.last_persisted_steps,
                    state.last_processed_hour,
                    state.phase.as_str(),
                    now_rfc3339()
                ],
            )
            .map_err(|err| StepMoodError::storage("Failed to insert mood state", err))?;
        Ok(inserted > 0)
    }

    /// Writes the mutable fields of an existing row. The start and
    /// previous-day snapshots are fixed at creation and never rewritten.
    pub fn update_mood_state(&self, state: &MoodState) -> Result<()> {
        self.conn
            .execute(
                "UPDATE mood_state SET \
                    mood = ?2, \
                    last_persisted_steps = ?3, \
                    last_processed_hour = ?4, \
                    phase = ?5, \
                    updated_at = ?6 \
                 WHERE date = ?1",
                params![
                    state.date,
                    state.mood,
                    state.last_persisted_steps,
                    state.last_processed_hour,
                    state.phase.as_str(),
                    now_rfc3339()
                ],
            )
            .map_err(|err| StepMoodError::storage("Failed to update mood state", err))?;
        Ok(())
    }

    pub fn list_mood_states_since(&self, since: NaiveDate) -> Result<Vec<MoodState>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {MOOD_COLUMNS} FROM mood_state WHERE date >= ?1 ORDER BY date ASC"
            ))
            .map_err(|err| StepMoodError::storage("Failed to prepare mood history query", err))?;
        let rows = stmt
            .query_map(params![since], mood_state_from_row)
            .map_err(|err| StepMoodError::storage("Failed to query mood history", err))?;

        let mut states = Vec::new();
        for row in rows {
            states.push(
                row.map_err(|err| StepMoodError::storage("Failed to decode mood row", err))?,
            );
        }
        Ok(states)
    }

    pub fn unfinalized_dates_before(&self, date: NaiveDate) -> Result<Vec<NaiveDate>> {
        self.dates(
            "SELECT date FROM mood_state WHERE date < ?1 AND phase != 'finalized' \
             ORDER BY date ASC",
            date,
        )
    }

    // ─────────────────────────────────────────────────────────────────────
    // hourly_steps
    // ─────────────────────────────────────────────────────────────────────

    pub fn list_hours(&self, date: NaiveDate) -> Result<Vec<HourlyStepRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT date, hour, steps, last_recorded_total FROM hourly_steps \
                 WHERE date = ?1 ORDER BY hour ASC",
            )
            .map_err(|err| StepMoodError::storage("Failed to prepare hourly query", err))?;
        let rows = stmt
            .query_map(params![date], |row| {
                Ok(HourlyStepRecord {
                    date: row.get(0)?,
                    hour: row.get(1)?,
                    steps: row.get(2)?,
                    last_recorded_total: row.get(3)?,
                })
            })
            .map_err(|err| StepMoodError::storage("Failed to query hourly rows", err))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(
                row.map_err(|err| StepMoodError::storage("Failed to decode hourly row", err))?,
            );
        }
        Ok(records)
    }

    pub fn upsert_hour(&self, record: &HourlyStepRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO hourly_steps (date, hour, steps, last_recorded_total, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(date, hour) DO UPDATE SET \
                    steps = excluded.steps, \
                    last_recorded_total = excluded.last_recorded_total, \
                    updated_at = excluded.updated_at",
                params![
                    record.date,
                    record.hour,
                    record.steps,
                    record.last_recorded_total,
                    now_rfc3339()
                ],
            )
            .map_err(|err| StepMoodError::storage("Failed to upsert hourly row", err))?;
        Ok(())
    }

    pub fn delete_hours(&self, date: NaiveDate) -> Result<usize> {
        self.conn
            .execute("DELETE FROM hourly_steps WHERE date = ?1", params![date])
            .map_err(|err| StepMoodError::storage("Failed to delete hourly rows", err))
    }

    pub fn ledger_dates_before(&self, date: NaiveDate) -> Result<Vec<NaiveDate>> {
        self.dates(
            "SELECT DISTINCT date FROM hourly_steps WHERE date < ?1 ORDER BY date ASC",
            date,
        )
    }

    /// Cumulative total of the latest reading on any earlier date, live or
    /// archived.
    pub fn latest_total_before(&self, date: NaiveDate) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT last_recorded_total FROM ( \
                    SELECT date, hour, last_recorded_total, '' AS archived_at \
                    FROM hourly_steps WHERE date < ?1 \
                    UNION ALL \
                    SELECT date, hour, last_recorded_total, archived_at \
                    FROM historical_hourly_steps WHERE date < ?1 \
                 ) ORDER BY date DESC, hour DESC, archived_at DESC LIMIT 1",
                params![date],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StepMoodError::storage("Failed to query previous step total", err))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Archive tables
    // ─────────────────────────────────────────────────────────────────────

    pub fn insert_historical_hour(&self, record: &HistoricalHourlyStepRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO historical_hourly_steps \
                    (date, hour, steps, last_recorded_total, archived_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(date, hour, archived_at) DO NOTHING",
                params![
                    record.date,
                    record.hour,
                    record.steps,
                    record.last_recorded_total,
                    record.archived_at
                ],
            )
            .map_err(|err| StepMoodError::storage("Failed to archive hourly row", err))?;
        Ok(())
    }

    /// Rows from the most recent archive batch for `date`.
    pub fn list_historical_hours(&self, date: NaiveDate) -> Result<Vec<HistoricalHourlyStepRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT date, hour, steps, last_recorded_total, archived_at \
                 FROM historical_hourly_steps \
                 WHERE date = ?1 AND archived_at = ( \
                    SELECT MAX(archived_at) FROM historical_hourly_steps WHERE date = ?1 \
                 ) \
                 ORDER BY hour ASC",
            )
            .map_err(|err| StepMoodError::storage("Failed to prepare archive query", err))?;
        let rows = stmt
            .query_map(params![date], |row| {
                Ok(HistoricalHourlyStepRecord {
                    date: row.get(0)?,
                    hour: row.get(1)?,
                    steps: row.get(2)?,
                    last_recorded_total: row.get(3)?,
                    archived_at: row.get(4)?,
                })
            })
            .map_err(|err| StepMoodError::storage("Failed to query archived rows", err))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(
                row.map_err(|err| StepMoodError::storage("Failed to decode archived row", err))?,
            );
        }
        Ok(records)
    }

    /// Inserts the aggregate for a day. Existing aggregates are never replaced.
    pub fn insert_daily_statistics(&self, stats: &DailyStatistics) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT INTO daily_statistics (date, goal, final_mood, total_steps, archived_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(date) DO NOTHING",
                params![
                    stats.date,
                    stats.goal,
                    stats.final_mood,
                    stats.total_steps,
                    stats.archived_at
                ],
            )
            .map_err(|err| StepMoodError::storage("Failed to insert daily statistics", err))?;
        Ok(inserted > 0)
    }

    pub fn get_daily_statistics(&self, date: NaiveDate) -> Result<Option<DailyStatistics>> {
        self.conn
            .query_row(
                "SELECT date, goal, final_mood, total_steps, archived_at \
                 FROM daily_statistics WHERE date = ?1",
                params![date],
                |row| {
                    Ok(DailyStatistics {
                        date: row.get(0)?,
                        goal: row.get(1)?,
                        final_mood: row.get(2)?,
                        total_steps: row.get(3)?,
                        archived_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(|err| StepMoodError::storage("Failed to query daily statistics", err))
    }

    fn dates(&self, sql: &str, date: NaiveDate) -> Result<Vec<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|err| StepMoodError::storage("Failed to prepare date query", err))?;
        let rows = stmt
            .query_map(params![date], |row| row.get::<_, NaiveDate>(0))
            .map_err(|err| StepMoodError::storage("Failed to query dates", err))?;

        let mut dates = Vec::new();
        for row in rows {
            dates.push(row.map_err(|err| StepMoodError::storage("Failed to decode date", err))?);
        }
        Ok(dates)
    }
}

fn mood_state_from_row(row: &Row<'_>) -> rusqlite::Result<MoodState> {
    let phase_raw: String = row.get(6)?;
    let phase = DayPhase::from_str(&phase_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown day phase: {}", phase_raw),
            )),
        )
    })?;

    Ok(MoodState {
        date: row.get(0)?,
        mood: row.get(1)?,
        daily_start_mood: row.get(2)?,
        previous_day_end_mood: row.get(3)?,
        last_persisted_steps: row.get(4)?,
        last_processed_hour: row.get(5)?,
        phase,
    })
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).expect("valid date")
    }

    fn open_db(dir: &tempfile::TempDir) -> Db {
        Db::new(dir.path().join("stepmood.db")).expect("db init")
    }

    fn mood_row(day: u32, mood: i64) -> MoodState {
        MoodState {
            date: date(day),
            mood,
            daily_start_mood: mood,
            previous_day_end_mood: 50,
            last_persisted_steps: 0,
            last_processed_hour: None,
            phase: DayPhase::Active,
        }
    }

    #[test]
    fn schema_includes_live_and_archive_tables() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);

        let tables = db
            .with_connection(|conn| {
                let mut stmt = conn
                    .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
                    .map_err(|err| StepMoodError::storage("Failed to query sqlite_master", err))?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))
                    .map_err(|err| StepMoodError::storage("Failed to read table names", err))?;
                let mut names = Vec::new();
                for row in rows {
                    names.push(
                        row.map_err(|err| StepMoodError::storage("Failed to decode name", err))?,
                    );
                }
                Ok(names)
            })
            .expect("tables");

        for table in [
            "mood_state",
            "hourly_steps",
            "historical_hourly_steps",
            "daily_statistics",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn inserts_mood_state_once_and_updates_mutable_fields() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);

        let row = mood_row(1, 50);
        assert!(db.write(|t| t.insert_mood_state(&row)).expect("insert"));
        assert!(!db
            .write(|t| t.insert_mood_state(&mood_row(1, 99)))
            .expect("second insert"));

        let mut updated = row.clone();
        updated.mood = 61;
        updated.daily_start_mood = 12;
        updated.last_persisted_steps = 4_200;
        updated.last_processed_hour = Some(9);
        updated.phase = DayPhase::Finalized;
        db.write(|t| t.update_mood_state(&updated)).expect("update");

        let loaded = db
            .read(|t| t.get_mood_state(date(1)))
            .expect("read")
            .expect("row exists");
        assert_eq!(loaded.mood, 61);
        assert_eq!(loaded.daily_start_mood, 50);
        assert_eq!(loaded.last_persisted_steps, 4_200);
        assert_eq!(loaded.last_processed_hour, Some(9));
        assert!(loaded.is_finalized());
    }

    #[test]
    fn finds_latest_state_before_and_unfinalized_dates() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);

        db.write(|t| {
            t.insert_mood_state(&mood_row(1, 40))?;
            t.insert_mood_state(&mood_row(3, 70))?;
            let mut finalized = mood_row(2, 55);
            finalized.phase = DayPhase::Finalized;
            t.insert_mood_state(&finalized)?;
            Ok(())
        })
        .expect("seed");

        let previous = db
            .read(|t| t.latest_mood_state_before(date(3)))
            .expect("query")
            .expect("row exists");
        assert_eq!(previous.date, date(2));

        let pending = db
            .read(|t| t.unfinalized_dates_before(date(4)))
            .expect("query");
        assert_eq!(pending, vec![date(1), date(3)]);

        let history = db
            .read(|t| t.list_mood_states_since(date(2)))
            .expect("query");
        let dates: Vec<_> = history.iter().map(|state| state.date).collect();
        assert_eq!(dates, vec![date(2), date(3)]);
    }

    #[test]
    fn upserts_and_deletes_hourly_rows() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);

        let mut record = HourlyStepRecord {
            date: date(5),
            hour: 9,
            steps: 120,
            last_recorded_total: 120,
        };
        db.write(|t| t.upsert_hour(&record)).expect("insert");
        record.steps = 340;
        record.last_recorded_total = 340;
        db.write(|t| t.upsert_hour(&record)).expect("overwrite");

        let rows = db.read(|t| t.list_hours(date(5))).expect("list");
        assert_eq!(rows, vec![record]);

        let dates = db.read(|t| t.ledger_dates_before(date(6))).expect("dates");
        assert_eq!(dates, vec![date(5)]);

        let removed = db.write(|t| t.delete_hours(date(5))).expect("delete");
        assert_eq!(removed, 1);
        assert!(db.read(|t| t.list_hours(date(5))).expect("list").is_empty());
    }

    #[test]
    fn latest_total_before_spans_live_and_archived_rows() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);

        assert_eq!(
            db.read(|t| t.latest_total_before(date(10))).expect("empty"),
            None
        );

        db.write(|t| {
            t.insert_historical_hour(&HistoricalHourlyStepRecord {
                date: date(3),
                hour: 21,
                steps: 400,
                last_recorded_total: 7_900,
                archived_at: "2026-03-04T00:05:00+00:00".to_string(),
            })?;
            t.insert_historical_hour(&HistoricalHourlyStepRecord {
                date: date(3),
                hour: 20,
                steps: 100,
                last_recorded_total: 7_500,
                archived_at: "2026-03-04T00:05:00+00:00".to_string(),
            })
        })
        .expect("archive rows");
        assert_eq!(
            db.read(|t| t.latest_total_before(date(4))).expect("archived"),
            Some(7_900)
        );

        db.write(|t| {
            t.upsert_hour(&HourlyStepRecord {
                date: date(4),
                hour: 2,
                steps: 30,
                last_recorded_total: 7_930,
            })
        })
        .expect("live row");
        assert_eq!(
            db.read(|t| t.latest_total_before(date(5))).expect("live"),
            Some(7_930)
        );
        assert_eq!(
            db.read(|t| t.latest_total_before(date(4))).expect("same day excluded"),
            Some(7_900)
        );
    }

    #[test]
    fn daily_statistics_are_insert_once() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);

        let stats = DailyStatistics {
            date: date(7),
            goal: 10_000,
            final_mood: 64,
            total_steps: 8_123,
            archived_at: "2026-03-08T00:05:00+00:00".to_string(),
        };
        assert!(db.write(|t| t.insert_daily_statistics(&stats)).expect("insert"));

        let mut replacement = stats.clone();
        replacement.final_mood = 1;
        assert!(!db
            .write(|t| t.insert_daily_statistics(&replacement))
            .expect("second insert"));

        let loaded = db
            .read(|t| t.get_daily_statistics(date(7)))
            .expect("read")
            .expect("row exists");
        assert_eq!(loaded, stats);
    }

    #[test]
    fn failed_write_rolls_back() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = open_db(&temp_dir);

        let result: Result<()> = db.write(|t| {
            t.upsert_hour(&HourlyStepRecord {
                date: date(9),
                hour: 3,
                steps: 10,
                last_recorded_total: 10,
            })?;
            Err(StepMoodError::InvalidHour(99))
        });
        assert!(result.is_err());
        assert!(db.read(|t| t.list_hours(date(9))).expect("list").is_empty());
    }
}
