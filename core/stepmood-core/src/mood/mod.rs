//! Mood arithmetic and its persisted lifecycle.
//! [`rules`] is pure; [`engine`] reads and writes mood rows through [`crate::db::Tables`].

mod engine;
mod rules;

pub use engine::{HealOutcome, MoodEngine, MoodTransition, DEFAULT_CORRECTION_MARGIN};
pub use rules::{
    clamp_mood, start_mood, MoodLabel, MoodRules, MoodStep, QuietHours, DEFAULT_QUIET_END,
    DEFAULT_QUIET_START, DEFAULT_START_MOOD, MAX_MOOD, MIN_MOOD, OVEREXERTION_DECAY,
    OVEREXERTION_THRESHOLD,
};
