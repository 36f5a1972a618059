//! Label-driven watch policy.
//!
//! Containers opt in or out of tracking with the `tagwatch.enable` label.
//! An explicit `false` always wins, an explicit `true` always includes the
//! container, and everything else follows the global [`WatchPolicy`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Label that opts a container in (`true`) or out (`false`).
pub const ENABLE_LABEL: &str = "tagwatch.enable";

/// Label that forces a container to be treated as stale on the first cycle.
pub const UPDATE_ON_START_LABEL: &str = "tagwatch.update-on-start";

/// Global default for containers without an [`ENABLE_LABEL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatchPolicy {
    /// Watch every container unless it opts out.
    #[default]
    All,
    /// Watch only containers that opt in.
    OptIn,
}

impl WatchPolicy {
    pub fn from_watch_all(watch_all: bool) -> Self {
        if watch_all {
            WatchPolicy::All
        } else {
            WatchPolicy::OptIn
        }
    }
}

fn label_is(labels: &HashMap<String, String>, key: &str, value: &str) -> bool {
    labels
        .get(key)
        .map(|v| v.trim().eq_ignore_ascii_case(value))
        .unwrap_or(false)
}

/// Decide whether a container with `labels` is tracked under `policy`.
pub fn should_watch(labels: &HashMap<String, String>, policy: WatchPolicy) -> bool {
    if label_is(labels, ENABLE_LABEL, "false") {
        return false;
    }
    policy == WatchPolicy::All || label_is(labels, ENABLE_LABEL, "true")
}

/// Whether the container must be refreshed on the first cycle regardless of age.
pub fn wants_update_on_start(labels: &HashMap<String, String>, global: bool) -> bool {
    global || label_is(labels, UPDATE_ON_START_LABEL, "true")
}
