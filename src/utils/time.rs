// src/utils/time.rs: elapsed time and timestamp formatting for the run log

use std::time::Duration;

use chrono::{DateTime, Local};

/// Formats the time between two second-resolution timestamps as `H:MM:SS`.
/// Hours are unbounded; an end before the start counts as zero.
///
/// # Arguments
///
/// * `start_secs` - Start timestamp in seconds.
/// * `end_secs` - End timestamp in seconds.
///
/// # Returns
/// String H:MM:SS
pub fn spend_time(start_secs: u64, end_secs: u64) -> String {
    let seconds = end_secs.saturating_sub(start_secs);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds % 60)
}

/// Same as `spend_time`, floored to whole seconds.
pub fn format_elapsed(elapsed: Duration) -> String {
    spend_time(0, elapsed.as_secs())
}

/// ctime-style timestamp, e.g. `Sat Oct 17 09:05:01 2026`.
pub fn ctime(at: &DateTime<Local>) -> String {
    at.format("%a %b %e %H:%M:%S %Y").to_string()
}

pub fn ctime_now() -> String {
    ctime(&Local::now())
}
