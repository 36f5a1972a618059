//! Human-readable formatting for cycle reports.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt::Write;
use std::time::Duration;

/// strftime pattern used when `TIME_FORMAT` is not set.
pub const DEFAULT_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

const BYTE_UNITS: &[&str] = &["bytes", "KB", "MB", "GB", "TB", "PB", "EB"];

/// `1 image`, `3 images`.
pub fn pluralize(count: usize, singular: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}s", count, singular)
    }
}

/// Elapsed wall time with two decimals, e.g. `1.27 seconds`.
pub fn elapsed(duration: Duration) -> String {
    format!("{:.2} seconds", duration.as_secs_f64())
}

/// Binary byte size with up to two decimals, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let number = format!("{:.2}", value);
    let number = number.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", number, BYTE_UNITS[unit])
}

/// Relative time such as `3 days ago` or `a few seconds ago`.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(then);
    let phrase = relative_phrase(delta.num_seconds().unsigned_abs());
    if delta.num_seconds() < 0 {
        format!("in {}", phrase)
    } else {
        format!("{} ago", phrase)
    }
}

fn relative_phrase(seconds: u64) -> String {
    let secs = seconds as f64;
    let minutes = (secs / 60.0).round() as u64;
    let hours = (secs / 3600.0).round() as u64;
    let days = (secs / 86_400.0).round() as u64;

    match seconds {
        0..=44 => "a few seconds".to_string(),
        45..=89 => "a minute".to_string(),
        _ if minutes < 45 => format!("{} minutes", minutes),
        _ if minutes < 90 => "an hour".to_string(),
        _ if hours < 22 => format!("{} hours", hours),
        _ if hours < 36 => "a day".to_string(),
        _ if days < 26 => format!("{} days", days),
        _ if days < 46 => "a month".to_string(),
        _ if days < 320 => format!("{} months", ((days as f64) / 30.4).round() as u64),
        _ if days < 548 => "a year".to_string(),
        _ => format!("{} years", ((days as f64) / 365.0).round() as u64),
    }
}

/// True if `pattern` is a strftime pattern chrono can render.
pub fn is_valid_time_format(pattern: &str) -> bool {
    let mut out = String::new();
    write!(out, "{}", DateTime::<Utc>::UNIX_EPOCH.format(pattern)).is_ok()
}

/// `now` rendered in `tz` with `pattern`, followed by the zone abbreviation.
pub fn zoned_time(now: DateTime<Utc>, tz: Tz, pattern: &str) -> String {
    let local = now.with_timezone(&tz);
    let mut out = String::new();
    if write!(out, "{}", local.format(pattern)).is_err() {
        out.clear();
        let _ = write!(out, "{}", local.format(DEFAULT_TIME_FORMAT));
    }
    if tz == chrono_tz::UTC || tz.name().eq_ignore_ascii_case("utc") {
        out.push_str(" UTC");
    } else {
        let _ = write!(out, " {}", local.format("%Z"));
    }
    out
}
