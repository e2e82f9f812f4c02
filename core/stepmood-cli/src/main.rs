//! stepmood: manual reconciliation trigger and inspector.
//!
//! Runs the same reconciliation pass a scheduler would, and prints the read
//! models the UI shows.
//!
//! ## Subcommands
//!
//! - `tick`: one reconciliation pass with a given step reading
//! - `mood`: today's mood row, plus the live projection for a reading
//! - `log`: a day's hourly log
//! - `history`: mood rows for the last N months
//! - `stats`: a finished day's archived statistics

mod logging;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use stepmood_core::{
    load_config, log_dir, Clock, DailyStatistics, FixedClock, FixedStepSource, HourStamp,
    HourlyLogEntry, MoodLabel, MoodState, Phase, ReconciliationDriver, SystemClock,
    TickReport, TracingNotifier, TrackerConfig,
};

#[derive(Parser)]
#[command(name = "stepmood")]
#[command(about = "Hourly step ledger and mood reconciliation")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.stepmood/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Database file, overriding `[storage] db_path`
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass
    Tick {
        /// Cumulative step reading to reconcile against
        #[arg(long)]
        steps: i64,

        /// Treat this hour as the current time
        #[arg(long, value_name = "YYYY-MM-DDTHH", value_parser = parse_hour_stamp)]
        at: Option<HourStamp>,
    },

    /// Show today's mood
    Mood {
        /// Cumulative step reading for the live projection
        #[arg(long)]
        steps: Option<i64>,
    },

    /// Show a day's hourly log (default: today)
    Log {
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
    },

    /// Show mood rows for the last N months
    History {
        #[arg(long, default_value_t = 1)]
        months: u32,
    },

    /// Show a finished day's archived statistics
    Stats {
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: NaiveDate,
    },
}

#[derive(Serialize)]
struct MoodView {
    #[serde(flatten)]
    state: MoodState,
    label: MoodLabel,
    live_mood: Option<i64>,
}

fn main() {
    let cli = Cli::parse();
    let _logging_guard = logging::init(log_dir().ok().as_deref());

    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "stepmood failed");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let mut config = match load_config(cli.config.clone()) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "Config unusable; continuing with defaults");
            TrackerConfig::default()
        }
    };
    if let Some(db) = cli.db.clone() {
        config.storage.db_path = Some(db);
    }

    // Only `tick` has a reading; every other command sees an unavailable source.
    let (at, steps) = match &cli.command {
        Commands::Tick { steps, at } => (*at, FixedStepSource::new(*steps)),
        _ => (None, FixedStepSource::default()),
    };
    let clock: Box<dyn Clock> = match at {
        Some(stamp) => Box::new(FixedClock::new(stamp)),
        None => Box::new(SystemClock),
    };
    let collaborators = config.collaborators(clock, Box::new(steps), Box::new(TracingNotifier));
    let driver =
        ReconciliationDriver::from_config(&config, collaborators).map_err(|err| err.to_string())?;

    match cli.command {
        Commands::Tick { .. } => {
            let report = driver.run();
            emit(cli.json, &report, print_tick)
        }
        Commands::Mood { steps } => {
            let state = driver.current_mood().map_err(|err| err.to_string())?;
            let live_mood = steps
                .map(|total| driver.live_mood(total))
                .transpose()
                .map_err(|err| err.to_string())?;
            let view = MoodView {
                label: MoodLabel::for_mood(state.mood),
                state,
                live_mood,
            };
            emit(cli.json, &view, print_mood)
        }
        Commands::Log { date } => {
            let date = date.unwrap_or_else(|| SystemClock.now().date);
            let log = driver.hourly_log(date).map_err(|err| err.to_string())?;
            emit(cli.json, &log, |entries: &Vec<HourlyLogEntry>| print_log(date, entries))
        }
        Commands::History { months } => {
            let history = driver.mood_history(months).map_err(|err| err.to_string())?;
            emit(cli.json, &history, |history: &Vec<MoodState>| {
                print_history(history)
            })
        }
        Commands::Stats { date } => {
            let stats = driver
                .daily_statistics(date)
                .map_err(|err| err.to_string())?;
            emit(cli.json, &stats, |stats: &Option<DailyStatistics>| {
                print_stats(date, stats)
            })
        }
    }
}

fn parse_hour_stamp(value: &str) -> Result<HourStamp, String> {
    let (date, hour) = value
        .split_once('T')
        .ok_or_else(|| format!("expected YYYY-MM-DDTHH, got {value}"))?;
    let date = date
        .parse::<NaiveDate>()
        .map_err(|err| format!("invalid date {date}: {err}"))?;
    let hour = hour
        .parse::<u32>()
        .ok()
        .filter(|hour| *hour <= 23)
        .ok_or_else(|| format!("invalid hour {hour}"))?;
    Ok(HourStamp::new(date, hour))
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T)) -> Result<(), String> {
    if json {
        let rendered = serde_json::to_string_pretty(value).map_err(|err| err.to_string())?;
        println!("{rendered}");
    } else {
        text(value);
    }
    Ok(())
}

fn phase_line<T>(name: &str, phase: &Phase<T>, describe: impl FnOnce(&T) -> String) {
    let detail = match phase {
        Phase::Done(value) => describe(value),
        Phase::Skipped(reason) => format!("skipped ({reason})"),
        Phase::Failed(message) => format!("FAILED: {message}"),
    };
    println!("  {name:<13} {detail}");
}

fn print_tick(report: &TickReport) {
    println!("Pass at {} {:02}:00", report.now.date, report.now.hour);
    phase_line("rollover", &report.rollover, |rollover| {
        let closed: Vec<String> = rollover
            .closed
            .iter()
            .map(|day| format!("{} (final {})", day.date, day.final_mood))
            .collect();
        if closed.is_empty() {
            format!("today starts at {}", rollover.today.daily_start_mood)
        } else {
            format!("closed {}", closed.join(", "))
        }
    });
    phase_line("ledger", &report.ledger, |outcome| format!("{outcome:?}"));
    phase_line("mood", &report.mood, |transition| match transition {
        Some(transition) => format!(
            "{} -> {} over hours {:?}",
            transition.previous, transition.mood, transition.hours
        ),
        None => "no closed hour pending".to_string(),
    });
    phase_line("healing", &report.healing, |outcome| format!("{outcome:?}"));
    phase_line("notification", &report.notification, |drop| {
        format!("sent ({} -> {})", drop.previous_mood, drop.new_mood)
    });
}

fn print_mood(view: &MoodView) {
    println!(
        "{}: {} ({}), started at {}, {}",
        view.state.date,
        view.state.mood,
        view.label.as_str(),
        view.state.daily_start_mood,
        view.state.phase.as_str()
    );
    match view.state.last_processed_hour {
        Some(hour) => println!("Processed through {hour:02}:00"),
        None => println!("No hour processed yet"),
    }
    if let Some(live) = view.live_mood {
        println!("Live: {live}");
    }
}

fn print_log(date: NaiveDate, entries: &[HourlyLogEntry]) {
    if entries.is_empty() {
        println!("No hours recorded for {date}");
        return;
    }
    println!("{date}");
    for entry in entries {
        println!(
            "  {:02}:00 {:>6} steps  mood {:>3} {}",
            entry.hour,
            entry.steps,
            entry.mood,
            entry.mood_label.as_str()
        );
    }
}

fn print_history(history: &[MoodState]) {
    for state in history {
        println!(
            "{} {:>3} {}",
            state.date,
            state.mood,
            state.phase.as_str()
        );
    }
}

fn print_stats(date: NaiveDate, stats: &Option<DailyStatistics>) {
    match stats {
        Some(stats) => println!(
            "{}: {} steps (goal {}), final mood {}",
            stats.date, stats.total_steps, stats.goal, stats.final_mood
        ),
        None => println!("No archived statistics for {date}"),
    }
}
