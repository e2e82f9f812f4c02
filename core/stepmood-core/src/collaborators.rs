//! Interfaces to everything outside the core: sensors, user settings,
//! notification delivery and wall-clock time.
//!
//! Production implementations live here alongside fixed/recording variants
//! that the CLI and the integration tests use to drive the reconciliation
//! pass deterministically.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Local, NaiveDate, Timelike};
use serde::Serialize;
use tracing::info;

use crate::mood::MoodTransition;
use crate::types::HourStamp;

/// A cumulative step counter that may reset or be unavailable.
pub trait StepSource: Send + Sync {
    /// `None` when no reading can be taken right now.
    fn current_cumulative_steps(&self) -> Option<i64>;
}

pub trait UserGoalProvider: Send + Sync {
    fn daily_goal(&self) -> Option<i64>;
}

pub trait QuietHoursProvider: Send + Sync {
    fn start(&self) -> Option<u32>;
    fn end(&self) -> Option<u32>;
}

/// Receives mood drops. Errors are logged by the caller and otherwise ignored.
///
/// Called at the end of a reconciliation pass, after all of its writes have
/// committed. The pass waits for the call to return, so implementations that
/// deliver over a slow channel should queue the drop and return.
pub trait Notifier: Send + Sync {
    fn on_mood_drop(&self, drop: &MoodDrop) -> Result<(), String>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> HourStamp;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoodDrop {
    pub date: NaiveDate,
    pub previous_mood: i64,
    pub new_mood: i64,
    pub steps_in_period: i64,
    pub period_hours: u32,
}

impl MoodDrop {
    pub fn from_transition(transition: &MoodTransition) -> Option<Self> {
        if !transition.is_drop() {
            return None;
        }
        Some(Self {
            date: transition.date,
            previous_mood: transition.previous,
            new_mood: transition.mood,
            steps_in_period: transition.steps,
            period_hours: transition.period_hours(),
        })
    }
}

/// The set of collaborators a driver is wired with.
pub struct Collaborators {
    pub clock: Box<dyn Clock>,
    pub steps: Box<dyn StepSource>,
    pub goal: Box<dyn UserGoalProvider>,
    pub quiet_hours: Box<dyn QuietHoursProvider>,
    pub notifier: Box<dyn Notifier>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Production implementations
// ─────────────────────────────────────────────────────────────────────────────

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> HourStamp {
        let now = Local::now();
        HourStamp::new(now.date_naive(), now.hour())
    }
}

/// Logs mood drops instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn on_mood_drop(&self, drop: &MoodDrop) -> Result<(), String> {
        info!(
            date = %drop.date,
            previous_mood = drop.previous_mood,
            new_mood = drop.new_mood,
            steps = drop.steps_in_period,
            period_hours = drop.period_hours,
            "Mood dropped"
        );
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixed implementations
// ─────────────────────────────────────────────────────────────────────────────

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<HourStamp>>,
}

impl FixedClock {
    pub fn new(now: HourStamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: HourStamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> HourStamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A step reading set by hand. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct FixedStepSource {
    total: Arc<Mutex<Option<i64>>>,
}

impl FixedStepSource {
    pub fn new(total: i64) -> Self {
        Self {
            total: Arc::new(Mutex::new(Some(total))),
        }
    }

    pub fn set(&self, total: i64) {
        *self.total.lock().unwrap_or_else(PoisonError::into_inner) = Some(total);
    }

    pub fn set_unavailable(&self) {
        *self.total.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl StepSource for FixedStepSource {
    fn current_cumulative_steps(&self) -> Option<i64> {
        *self.total.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps every drop it is handed; can be told to fail delivery.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    drops: Arc<Mutex<Vec<MoodDrop>>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records drops but reports every delivery as failed.
    pub fn failing() -> Self {
        Self {
            drops: Arc::default(),
            failing: true,
        }
    }

    pub fn drops(&self) -> Vec<MoodDrop> {
        self.drops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn on_mood_drop(&self, drop: &MoodDrop) -> Result<(), String> {
        self.drops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(drop.clone());
        if self.failing {
            return Err("notification channel unavailable".to_string());
        }
        Ok(())
    }
}
