//! Error types for stepmood-core operations.
//!
//! Component operations return [`Result`] and propagate with `?`. The
//! reconciliation driver is the only boundary that swallows errors: it turns
//! them into tagged phase results and logs them.

use std::path::PathBuf;

/// All errors that can occur in stepmood-core operations.
#[derive(Debug, thiserror::Error)]
pub enum StepMoodError {
    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Storage error: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Corrupt row in {table}: {details}")]
    CorruptRow { table: &'static str, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Input Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Hour out of range (expected 0-23): {0}")]
    InvalidHour(u32),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StepMoodError {
    pub fn storage(context: impl Into<String>, source: rusqlite::Error) -> Self {
        StepMoodError::Storage {
            context: context.into(),
            source,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StepMoodError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StepMoodError>;
