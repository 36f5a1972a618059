//! Human-readable cycle output.

use super::prune::PruneOutcome;
use crate::format::{format_bytes, pluralize, time_ago, zoned_time};
use crate::state::TrackedImage;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

pub fn banner() -> String {
    format!("tagwatch v{}", env!("CARGO_PKG_VERSION"))
}

/// `watching 3 containers @ 03/10/2024 12:05:09 UTC`
pub fn status_line(watching: usize, now: DateTime<Utc>, tz: Tz, pattern: &str) -> String {
    format!(
        "watching {} @ {}",
        pluralize(watching, "container"),
        zoned_time(now, tz, pattern)
    )
}

/// A rule as wide as `line`.
pub fn dashes(line: &str) -> String {
    "-".repeat(line.chars().count())
}

/// Summary of the images found updated this cycle.
///
/// `on_start` replaces the per-image listing with a count, used on the first
/// cycle when every container is refreshed regardless of age.
pub fn update_summary(updates: &[TrackedImage], now: DateTime<Utc>, on_start: bool) -> String {
    if updates.is_empty() {
        return "no updates found".to_string();
    }
    if on_start {
        return format!("updating {} on start", pluralize(updates.len(), "image"));
    }
    let lines: Vec<String> = updates
        .iter()
        .map(|row| {
            let pushed = row.docker_hub_last_updated.unwrap_or(now);
            format!("{} | {}", row.reference(), time_ago(pushed, now))
        })
        .collect();
    format!(
        "{} found:\n  * {}",
        pluralize(updates.len(), "update"),
        lines.join("\n  * ")
    )
}

/// Notification body; the first cycle leads with the status line.
pub fn notification_text(summary: &str, status: Option<&str>) -> String {
    match status {
        Some(status) => format!("{}\n{}", status, summary),
        None => summary.to_string(),
    }
}

/// What a prune pass covers: `images`, `volumes` or `images & volumes`.
pub fn prune_label(images: bool, volumes: bool) -> &'static str {
    match (images, volumes) {
        (true, true) => "images & volumes",
        (true, false) => "images",
        (false, true) => "volumes",
        (false, false) => "nothing",
    }
}

/// `2 images | 1.5 MB`, `1 volume | 0 bytes`
pub fn prune_lines(outcome: &PruneOutcome) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(images) = outcome.images {
        lines.push(format!(
            "{} | {}",
            pluralize(images.deleted, "image"),
            format_bytes(images.space_reclaimed)
        ));
    }
    if let Some(volumes) = outcome.volumes {
        lines.push(format!(
            "{} | {}",
            pluralize(volumes.deleted, "volume"),
            format_bytes(volumes.space_reclaimed)
        ));
    }
    lines
}
