//! # stepmood-core
//!
//! Turns a cumulative step counter into a gap-free hourly step ledger and a
//! bounded daily mood value.
//!
//! ## Design Principles
//!
//! - **Persisted state is the only state**: the ledger and mood rows are
//!   re-read on every operation. Nothing is cached between calls, so a process
//!   killed at any point resumes correctly.
//! - **One entry point**: every caller runs [`ReconciliationDriver::run`];
//!   repeating it within an hour is harmless.
//! - **Synchronous**: no async runtime. Concurrent callers serialize on
//!   SQLite write transactions.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepmood_core::{load_config, ReconciliationDriver, SystemClock, TracingNotifier};
//!
//! let config = load_config(None)?;
//! let collaborators = config.collaborators(
//!     Box::new(SystemClock),
//!     Box::new(my_step_source),
//!     Box::new(TracingNotifier),
//! );
//! let driver = ReconciliationDriver::from_config(&config, collaborators)?;
//! let report = driver.run();
//! let mood = driver.current_mood()?;
//! ```

pub mod collaborators;
pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod ledger;
pub mod mood;
pub mod scale;
pub mod types;

pub use collaborators::{
    Clock, Collaborators, FixedClock, FixedStepSource, MoodDrop, Notifier, QuietHoursProvider,
    RecordingNotifier, StepSource, SystemClock, TracingNotifier, UserGoalProvider,
};
pub use config::{
    data_dir, default_config_path, load_config, log_dir, GoalConfig, HealingConfig,
    QuietHoursConfig, StorageConfig, TrackerConfig,
};
pub use db::{Db, Tables};
pub use driver::{ClosedDay, Phase, ReconciliationDriver, Rollover, TickReport};
pub use error::{Result, StepMoodError};
pub use ledger::{distribute, ArchiveSummary, HourLedger, LedgerPolicy, ReconcileOutcome};
pub use mood::{HealOutcome, MoodEngine, MoodLabel, MoodRules, MoodTransition, QuietHours};
pub use scale::{GoalScale, DEFAULT_DAILY_GOAL};
pub use types::*;
