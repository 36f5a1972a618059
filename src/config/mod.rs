//! Runtime configuration.
//!
//! [`Config`] is an explicit, immutable value built once at startup and
//! threaded through the reconciler. Nothing reads the environment after it
//! has been constructed.

use crate::format::DEFAULT_TIME_FORMAT;
use crate::image::{is_digest, ImageRef};
use crate::policy::WatchPolicy;
use chrono_tz::Tz;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Repository the watcher itself is published as.
pub const DEFAULT_SELF_IMAGE: &str = "tagwatch/tagwatch";

/// Name given to the self-update helper container.
pub const HELPER_CONTAINER_NAME: &str = "tagwatch-helper";

/// Default poll interval in minutes.
pub const DEFAULT_TIMER_MINUTES: u64 = 30;

/// How the process was launched, decided once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Regular reconciliation loop.
    Normal,
    /// Second phase of a self-update: replace `original_container_id` once it
    /// has exited.
    Helper { original_container_id: String },
}

/// Where the tracked-image table and process state live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Storage {
    Memory,
    Disk(PathBuf),
}

/// HTTP webhook settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpSettings {
    pub url: Option<String>,
    pub subject: String,
}

/// SMTP settings. Anything missing is reported when a message is sent.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct EmailSettings {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub from_name: String,
    pub to: Vec<String>,
    pub subject: String,
}

impl std::fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from_name", &self.from_name)
            .field("to", &self.to)
            .field("subject", &self.subject)
            .finish()
    }
}

/// Selected notification transport.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum NotifyTarget {
    #[default]
    None,
    Http(HttpSettings),
    Email(EmailSettings),
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Delay between the end of one cycle and the start of the next.
    /// Zero runs a single cycle.
    pub poll_interval: Duration,
    pub watch_policy: WatchPolicy,
    /// Images tracked without a backing container.
    pub extra_images: Vec<ImageRef>,
    pub auto_update: bool,
    pub update_on_start: bool,
    pub auto_update_self: bool,
    pub prune_images: bool,
    pub prune_volumes: bool,
    /// Repository name of the watcher's own image (`namespace/repository`).
    pub self_image: String,
    pub helper_name: String,
    pub in_container: bool,
    /// Id (or hostname prefix) of the container this process runs in.
    pub own_container: Option<String>,
    pub storage: Storage,
    pub notify: NotifyTarget,
    #[serde(serialize_with = "serialize_tz")]
    pub timezone: Tz,
    pub time_format: String,
    pub verbose: bool,
}

fn serialize_tz<S: serde::Serializer>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(tz.name())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_TIMER_MINUTES * 60),
            watch_policy: WatchPolicy::All,
            extra_images: Vec::new(),
            auto_update: false,
            update_on_start: false,
            auto_update_self: false,
            prune_images: false,
            prune_volumes: false,
            self_image: ImageRef::parse(DEFAULT_SELF_IMAGE).image,
            helper_name: HELPER_CONTAINER_NAME.to_string(),
            in_container: false,
            own_container: None,
            storage: Storage::Memory,
            notify: NotifyTarget::None,
            timezone: chrono_tz::UTC,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            verbose: false,
        }
    }
}

impl Config {
    /// Pulls happen when either auto-update or update-on-start is on.
    pub fn downloads_enabled(&self) -> bool {
        self.auto_update || self.update_on_start
    }

    pub fn prune_enabled(&self) -> bool {
        self.prune_images || self.prune_volumes
    }

    /// A zero interval runs a single cycle.
    pub fn run_once(&self) -> bool {
        self.poll_interval.is_zero()
    }

    /// True if `image` (any form) is the watcher's own repository.
    pub fn is_self_image(&self, image: &str) -> bool {
        ImageRef::parse(image).image == self.self_image
    }
}

/// Split a comma-separated image list, dropping empty items and digests.
pub fn parse_extra_images(raw: &str) -> Vec<ImageRef> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| {
            if is_digest(item) {
                warn!(image = item, "Ignoring extra image pinned by digest");
                None
            } else {
                Some(ImageRef::parse(item))
            }
        })
        .collect()
}

/// Whether this process runs inside a Docker container.
pub fn detect_in_container() -> bool {
    Path::new("/.dockerenv").exists()
}
