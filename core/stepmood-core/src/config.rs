//! User configuration (`~/.stepmood/config.toml`).
//!
//! Every table and key is optional. A missing file is the same as an empty
//! one. Out-of-range values are not rejected at load time; the providers
//! report them as unavailable and the driver falls back to defaults.

use std::path::PathBuf;

use serde::Deserialize;

use crate::collaborators::{
    Clock, Collaborators, Notifier, QuietHoursProvider, StepSource, UserGoalProvider,
};
use crate::error::{Result, StepMoodError};
use crate::ledger::LedgerPolicy;
use crate::mood::{DEFAULT_CORRECTION_MARGIN, DEFAULT_QUIET_END, DEFAULT_QUIET_START};
use crate::scale::DEFAULT_DAILY_GOAL;

const DATA_DIR_NAME: &str = ".stepmood";
const CONFIG_FILE_NAME: &str = "config.toml";
const DB_FILE_NAME: &str = "stepmood.db";
const LOG_DIR_NAME: &str = "logs";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TrackerConfig {
    #[serde(default)]
    pub goal: GoalConfig,
    #[serde(default)]
    pub quiet_hours: QuietHoursConfig,
    #[serde(default)]
    pub ledger: LedgerPolicy,
    #[serde(default)]
    pub healing: HealingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoalConfig {
    #[serde(default = "default_daily_steps")]
    pub daily_steps: i64,
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            daily_steps: default_daily_steps(),
        }
    }
}

impl UserGoalProvider for GoalConfig {
    fn daily_goal(&self) -> Option<i64> {
        (self.daily_steps > 0).then_some(self.daily_steps)
    }
}

/// Signed so that a negative hour in the file reads as "unavailable" rather
/// than failing the whole load.
#[derive(Debug, Clone, Deserialize)]
pub struct QuietHoursConfig {
    #[serde(default = "default_quiet_start")]
    pub start: i64,
    #[serde(default = "default_quiet_end")]
    pub end: i64,
}

impl Default for QuietHoursConfig {
    fn default() -> Self {
        Self {
            start: default_quiet_start(),
            end: default_quiet_end(),
        }
    }
}

impl QuietHoursProvider for QuietHoursConfig {
    fn start(&self) -> Option<u32> {
        hour_of_day(self.start)
    }

    fn end(&self) -> Option<u32> {
        hour_of_day(self.end)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealingConfig {
    /// How far the persisted mood may exceed the recorded activity before the
    /// healing pass overwrites it.
    #[serde(default = "default_margin")]
    pub margin: i64,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            margin: default_margin(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl TrackerConfig {
    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join(DB_FILE_NAME)),
        }
    }

    /// Wires the configured goal and quiet hours together with the given
    /// runtime collaborators.
    pub fn collaborators(
        &self,
        clock: Box<dyn Clock>,
        steps: Box<dyn StepSource>,
        notifier: Box<dyn Notifier>,
    ) -> Collaborators {
        Collaborators {
            clock,
            steps,
            goal: Box::new(self.goal.clone()),
            quiet_hours: Box::new(self.quiet_hours.clone()),
            notifier,
        }
    }
}

fn hour_of_day(value: i64) -> Option<u32> {
    u32::try_from(value).ok().filter(|hour| *hour <= 23)
}

fn default_daily_steps() -> i64 {
    DEFAULT_DAILY_GOAL
}

fn default_quiet_start() -> i64 {
    i64::from(DEFAULT_QUIET_START)
}

fn default_quiet_end() -> i64 {
    i64::from(DEFAULT_QUIET_END)
}

fn default_margin() -> i64 {
    DEFAULT_CORRECTION_MARGIN
}

pub fn data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(StepMoodError::HomeDirNotFound)?;
    Ok(home.join(DATA_DIR_NAME))
}

pub fn log_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join(LOG_DIR_NAME))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(CONFIG_FILE_NAME))
}

pub fn load_config(path: Option<PathBuf>) -> Result<TrackerConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(TrackerConfig::default());
    }

    let content = fs_err::read_to_string(&config_path)
        .map_err(|err| StepMoodError::io("Failed to read config", err))?;
    toml::from_str::<TrackerConfig>(&content).map_err(|err| StepMoodError::ConfigMalformed {
        path: config_path,
        details: err.to_string(),
    })
}
