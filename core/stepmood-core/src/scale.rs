//! Goal scaling.
//!
//! Every mood constant is derived from the user's daily step goal so that a
//! 5,000-step goal and a 20,000-step goal feel equally demanding. Values are
//! recomputed on demand and never persisted.

use serde::Serialize;

pub const DEFAULT_DAILY_GOAL: i64 = 10_000;

const GOAL_BASE: i64 = 10_000;
const STEPS_PER_POINT_AT_BASE: i64 = 150;
const INACTIVITY_THRESHOLD_AT_BASE: i64 = 250;
const DECAY_PER_HOUR_AT_BASE: i64 = 5;

const MIN_STEPS_PER_POINT: i64 = 50;
const MIN_INACTIVITY_THRESHOLD: i64 = 50;
const MIN_DECAY_PER_HOUR: i64 = 1;

/// Constants derived from a daily step goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GoalScale {
    /// Steps needed to earn one mood point.
    pub steps_per_mood_point: i64,
    /// Steps per hour below which an hour counts as inactive.
    pub inactivity_threshold: i64,
    /// Mood lost for an inactive hour.
    pub decay_per_hour: i64,
}

impl GoalScale {
    pub fn from_goal(daily_goal: i64) -> Self {
        Self {
            steps_per_mood_point: scaled(STEPS_PER_POINT_AT_BASE, daily_goal)
                .max(MIN_STEPS_PER_POINT),
            inactivity_threshold: scaled(INACTIVITY_THRESHOLD_AT_BASE, daily_goal)
                .max(MIN_INACTIVITY_THRESHOLD),
            decay_per_hour: scaled(DECAY_PER_HOUR_AT_BASE, daily_goal).max(MIN_DECAY_PER_HOUR),
        }
    }
}

impl Default for GoalScale {
    fn default() -> Self {
        Self::from_goal(DEFAULT_DAILY_GOAL)
    }
}

fn scaled(at_base: i64, daily_goal: i64) -> i64 {
    at_base.saturating_mul(daily_goal) / GOAL_BASE
}
