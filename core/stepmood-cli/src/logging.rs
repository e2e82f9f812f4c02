//! Log setup: stderr plus a daily-rolling file under `~/.stepmood/logs/`.
//!
//! `RUST_LOG` is honoured. `STEPMOOD_DEBUG_LOG=1` forces debug output.

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "stepmood.log";

/// The returned guard flushes the file writer on drop; hold it for the life
/// of `main`.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let file_dir = log_dir.and_then(|dir| match fs_err::create_dir_all(dir) {
        Ok(()) => Some(dir),
        Err(err) => {
            eprintln!("stepmood: file logging disabled: {err}");
            None
        }
    });
    let Some(dir) = file_dir else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(stderr_layer)
            .init();
        return None;
    };

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
    tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    Some(guard)
}

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var("STEPMOOD_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}
