//! Pure gain/decay arithmetic.
//!
//! Nothing here touches storage. The engine, the replay used by finalization
//! and the display log all go through [`MoodRules::step`] so that the three
//! can never disagree about what an hour was worth.

use serde::Serialize;

use crate::scale::GoalScale;

pub const MIN_MOOD: i64 = 0;
pub const MAX_MOOD: i64 = 130;
pub const DEFAULT_START_MOOD: i64 = 50;

/// Flat decay applied while mood sits above [`OVEREXERTION_THRESHOLD`].
pub const OVEREXERTION_DECAY: i64 = 8;
pub const OVEREXERTION_THRESHOLD: i64 = 100;

pub const DEFAULT_QUIET_START: u32 = 22;
pub const DEFAULT_QUIET_END: u32 = 7;

const HIGH_END_MOOD: i64 = 115;
const LOW_END_MOOD: i64 = 20;
const START_AFTER_HIGH_DAY: i64 = 60;
const START_AFTER_LOW_DAY: i64 = 30;

pub fn clamp_mood(value: i64) -> i64 {
    value.clamp(MIN_MOOD, MAX_MOOD)
}

/// Seed mood for a new day. `None` means there is no prior day at all.
pub fn start_mood(previous_day_end: Option<i64>) -> i64 {
    match previous_day_end {
        None => DEFAULT_START_MOOD,
        Some(mood) if mood > HIGH_END_MOOD => START_AFTER_HIGH_DAY,
        Some(mood) if mood < LOW_END_MOOD => START_AFTER_LOW_DAY,
        Some(_) => DEFAULT_START_MOOD,
    }
}

/// Hours of the day in which no decay applies. `start..end`, end exclusive,
/// wrapping past midnight when `start > end`. `start == end` is an empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuietHours {
    start: u32,
    end: u32,
}

impl QuietHours {
    pub fn new(start: u32, end: u32) -> Option<Self> {
        if start > 23 || end > 23 {
            return None;
        }
        Some(Self { start, end })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            start: DEFAULT_QUIET_START,
            end: DEFAULT_QUIET_END,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodLabel {
    Exhausted,
    Sad,
    Neutral,
    Happy,
    Energetic,
    Overexcited,
}

impl MoodLabel {
    pub fn for_mood(mood: i64) -> Self {
        match mood {
            i64::MIN..=19 => MoodLabel::Exhausted,
            20..=39 => MoodLabel::Sad,
            40..=59 => MoodLabel::Neutral,
            60..=79 => MoodLabel::Happy,
            80..=100 => MoodLabel::Energetic,
            _ => MoodLabel::Overexcited,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MoodLabel::Exhausted => "exhausted",
            MoodLabel::Sad => "sad",
            MoodLabel::Neutral => "neutral",
            MoodLabel::Happy => "happy",
            MoodLabel::Energetic => "energetic",
            MoodLabel::Overexcited => "overexcited",
        }
    }
}

/// The outcome of folding one hour into a mood value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MoodStep {
    pub hour: u32,
    pub steps: i64,
    pub gain: i64,
    pub decay: i64,
    pub previous: i64,
    pub mood: i64,
}

/// Goal scale plus quiet hours: everything the formula depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MoodRules {
    pub scale: GoalScale,
    pub quiet_hours: QuietHours,
}

impl MoodRules {
    pub fn new(daily_goal: i64, quiet_hours: QuietHours) -> Self {
        Self {
            scale: GoalScale::from_goal(daily_goal),
            quiet_hours,
        }
    }

    pub fn gain(&self, steps: i64) -> i64 {
        steps.max(0) / self.scale.steps_per_mood_point
    }

    pub fn decay(&self, hour: u32, steps: i64, previous: i64) -> i64 {
        if self.quiet_hours.contains(hour) {
            0
        } else if previous > OVEREXERTION_THRESHOLD {
            OVEREXERTION_DECAY
        } else if steps < self.scale.inactivity_threshold {
            self.scale.decay_per_hour
        } else {
            0
        }
    }

    pub fn step(&self, previous: i64, hour: u32, steps: i64) -> MoodStep {
        let steps = steps.max(0);
        let gain = self.gain(steps);
        let decay = self.decay(hour, steps, previous);
        MoodStep {
            hour,
            steps,
            gain,
            decay,
            previous,
            mood: clamp_mood(previous + gain - decay),
        }
    }

    /// Read-time extrapolation: gains only, no decay, never persisted.
    pub fn project(&self, base: i64, steps_since_checkpoint: i64) -> i64 {
        if steps_since_checkpoint <= 0 {
            return base;
        }
        clamp_mood(base + steps_since_checkpoint / self.scale.steps_per_mood_point)
    }
}
