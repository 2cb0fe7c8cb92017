//! PB Intervals timer CSV export.
//!
//! The app imports exactly the 28 columns it exports, in the same order; the
//! first row carries the timer settings and every row carries one call.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{ReconciledInterval, SyncError};

const COLUMNS: [&str; 28] = [
    "TimerName",
    "TimerColour",
    "Alert",
    "Vibration",
    "IntervalShuffle",
    "ReactionSessionRound",
    "ReactionSessionRoundHundredths",
    "ReactionIntervalDurationMin",
    "ReactionIntervalDurationMinHundredths",
    "ReactionIntervalDurationMax",
    "ReactionIntervalDurationMaxHundredths",
    "RestBetweenIntervalsMin",
    "RestBetweenIntervalsMinHundredths",
    "RestBetweenIntervalsMax",
    "RestBetweenIntervalsMaxHundredths",
    "NumberOfRounds",
    "RestBetweenRoundsMin",
    "RestBetweenRoundsMinHundredths",
    "RestBetweenRoundsMax",
    "RestBetweenRoundsMaxHundredths",
    "CallName",
    "CallColour",
    "ReactionMaxNumberOfCalls",
    "CallDurationMin",
    "CallDurationMinHundredths",
    "CallDurationMax",
    "CallDurationMaxHundredths",
    "HalfWayAlert",
];

const COL_TIMER_NAME: usize = 0;
const COL_TIMER_COLOUR: usize = 1;
const COL_ALERT: usize = 2;
const COL_VIBRATION: usize = 3;
const COL_SHUFFLE: usize = 4;
const COL_ROUNDS: usize = 15;
const COL_CALL_NAME: usize = 20;
const COL_CALL_COLOUR: usize = 21;
const COL_CALL_DURATION: usize = 23;
const COL_HALFWAY: usize = 27;

const TIMER_COLOUR: &str = "#FFA500";
const TIMER_ALERT: &str = "Four Beeps (Default)";
const TIMER_VIBRATION: &str = "One Vibration";

/// `HH:MM:SS` of the whole seconds in `seconds`.
pub fn seconds_to_hhmmss(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.trunc() as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

fn watts(value: f64) -> i64 {
    value.round() as i64
}

/// Steady intervals show their average; ramps show start, end and average.
pub fn format_call_name(interval: &ReconciledInterval) -> String {
    if interval.is_steady {
        format!("{} [{}W]", interval.name, watts(interval.average_value))
    } else {
        format!(
            "{} [{}-{}W, avg:{}W]",
            interval.name,
            watts(interval.start_value),
            watts(interval.end_value),
            watts(interval.average_value)
        )
    }
}

/// `<stem>_pbintervals.csv` next to the TCX input.
pub fn default_output_path(tcx_path: &Path) -> PathBuf {
    let stem = tcx_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workout".to_string());
    tcx_path.with_file_name(format!("{}_pbintervals.csv", stem))
}

fn ascii(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

pub fn write_pbintervals<W: Write>(
    workout_name: &str,
    intervals: &[ReconciledInterval],
    out: W,
) -> Result<(), SyncError> {
    let export_err = |e: csv::Error| SyncError::Export(e.to_string());
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(out);

    writer.write_record(COLUMNS).map_err(export_err)?;
    for (idx, interval) in intervals.iter().enumerate() {
        let mut row: Vec<String> = vec![String::new(); COLUMNS.len()];
        if idx == 0 {
            row[COL_TIMER_NAME] = ascii(workout_name);
            row[COL_TIMER_COLOUR] = TIMER_COLOUR.to_string();
            row[COL_ALERT] = TIMER_ALERT.to_string();
            row[COL_VIBRATION] = TIMER_VIBRATION.to_string();
            row[COL_SHUFFLE] = "FALSE".to_string();
            row[COL_ROUNDS] = "1".to_string();
        }
        row[COL_CALL_NAME] = ascii(&format_call_name(interval));
        row[COL_CALL_COLOUR] = interval.zone.color_hex().to_string();
        row[COL_CALL_DURATION] = seconds_to_hhmmss(interval.duration_s);
        row[COL_HALFWAY] = "FALSE".to_string();
        writer.write_record(&row).map_err(export_err)?;
    }

    let mut out = writer
        .into_inner()
        .map_err(|e| SyncError::Export(e.to_string()))?;
    // The app's own export ends with a blank line.
    out.write_all(b"\n")
        .and_then(|_| out.flush())
        .map_err(|e| SyncError::Export(e.to_string()))
}
