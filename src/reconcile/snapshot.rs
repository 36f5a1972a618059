use crate::config::Config;
use crate::docker::ContainerSummary;
use crate::image::is_digest;
use crate::policy::{should_watch, wants_update_on_start};
use crate::state::WatchEntry;
use tracing::debug;

/// Turn a container listing into the entries to upsert, extra images last.
pub fn build_entries(containers: &[ContainerSummary], config: &Config) -> Vec<WatchEntry> {
    let mut entries = Vec::with_capacity(containers.len() + config.extra_images.len());

    for container in containers {
        if is_digest(&container.image) {
            debug!(container = %container.name, image = %container.image, "Skipping container running a digest");
            continue;
        }
        if container.name == config.helper_name && config.is_self_image(&container.image) {
            continue;
        }
        if !should_watch(&container.labels, config.watch_policy) {
            debug!(container = %container.name, "Skipping container excluded by label");
            continue;
        }
        let stale_on_start = wants_update_on_start(&container.labels, config.update_on_start);
        entries.push(WatchEntry::from_container(container, stale_on_start));
    }

    entries.extend(config.extra_images.iter().cloned().map(WatchEntry::extra));
    entries
}
