//! Update decision rule.
//!
//! Steady state compares the registry's timestamp with the one recorded last
//! cycle. On the first run a container is also stale when it was created
//! before the registry's last push, which is what the epoch sentinel for
//! update-on-start relies on.

use crate::registry::Registry;
use crate::state::{Decision, TrackedImage};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Whether a newer image is available.
pub fn is_updated(
    stored_last_updated: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    registry_last_updated: DateTime<Utc>,
    first_run: bool,
) -> bool {
    let newer_than_recorded = stored_last_updated.is_some_and(|t| t < registry_last_updated);
    let created_before_push =
        first_run && created_at.is_some_and(|t| t < registry_last_updated);
    newer_than_recorded || created_before_push
}

/// Resolve every row against the registry and decide.
///
/// A failed lookup leaves its row out of the result, so the stored state for
/// that image is untouched; the rest of the batch still gets decided.
pub async fn check_registry(
    rows: &[TrackedImage],
    registry: &dyn Registry,
    first_run: bool,
) -> Vec<Decision> {
    let mut decisions = Vec::with_capacity(rows.len());
    for row in rows {
        let image = row.image_ref();
        match registry.lookup(&image).await {
            Ok(info) => {
                let updated = is_updated(
                    row.docker_hub_last_updated,
                    row.created_at,
                    info.last_updated,
                    first_run,
                );
                debug!(
                    image = %image,
                    registry_last_updated = %info.last_updated,
                    updated,
                    "Checked registry"
                );
                decisions.push(Decision {
                    id: row.id,
                    registry_last_updated: info.last_updated,
                    is_updated: updated,
                });
            }
            Err(e) => warn!(image = %image, "Registry lookup failed, skipping: {}", e),
        }
    }
    decisions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageRef;
    use crate::registry::{RegistryError, TagInfo};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    /// Answers from a fixed table and fails for anything else.
    struct TableRegistry(HashMap<String, DateTime<Utc>>);

    #[async_trait]
    impl Registry for TableRegistry {
        async fn lookup(&self, image: &ImageRef) -> Result<TagInfo, RegistryError> {
            let reference = image.reference();
            match self.0.get(&reference) {
                Some(last_updated) => Ok(TagInfo {
                    name: image.tag.clone(),
                    last_updated: *last_updated,
                }),
                None => Err(RegistryError::NotFound { reference }),
            }
        }
    }

    fn row(id: i64, image: &str, stored: DateTime<Utc>) -> TrackedImage {
        TrackedImage {
            id,
            image: image.to_string(),
            tag: "latest".to_string(),
            container_id: Some(format!("c{}", id)),
            container_name: Some(format!("container-{}", id)),
            created_at: Some(at(2024, 1, 1)),
            docker_hub_last_updated: Some(stored),
            is_active: true,
            is_updated: false,
        }
    }

    #[tokio::test]
    async fn failed_lookup_skips_only_its_row() {
        let rows = vec![
            row(1, "library/nginx", at(2024, 2, 1)),
            row(2, "private/app", at(2024, 2, 1)),
            row(3, "library/redis", at(2024, 2, 1)),
        ];
        let registry = TableRegistry(HashMap::from([
            ("library/nginx:latest".to_string(), at(2024, 3, 1)),
            ("library/redis:latest".to_string(), at(2024, 2, 1)),
        ]));

        let decisions = check_registry(&rows, &registry, false).await;

        assert_eq!(
            decisions,
            vec![
                Decision {
                    id: 1,
                    registry_last_updated: at(2024, 3, 1),
                    is_updated: true,
                },
                Decision {
                    id: 3,
                    registry_last_updated: at(2024, 2, 1),
                    is_updated: false,
                },
            ]
        );
    }

    #[test]
    fn newer_registry_timestamp_is_an_update() {
        assert!(is_updated(Some(at(2024, 1, 1)), None, at(2024, 2, 1), false));
    }

    #[test]
    fn equal_timestamps_are_not_an_update() {
        assert!(!is_updated(Some(at(2024, 1, 1)), None, at(2024, 1, 1), false));
    }

    #[test]
    fn unknown_stored_timestamp_is_not_an_update_in_steady_state() {
        assert!(!is_updated(None, Some(at(2023, 1, 1)), at(2024, 1, 1), false));
    }

    #[test]
    fn epoch_sentinel_fires_on_first_run() {
        assert!(is_updated(
            None,
            Some(DateTime::<Utc>::UNIX_EPOCH),
            at(1970, 1, 2),
            true
        ));
    }

    #[test]
    fn first_run_ignores_containers_created_after_push() {
        assert!(!is_updated(None, Some(at(2024, 3, 1)), at(2024, 2, 1), true));
    }

    #[test]
    fn extra_images_never_fire_on_first_run() {
        assert!(!is_updated(None, None, at(2024, 2, 1), true));
    }

    // A long-lived container created before the last push is flagged again
    // whenever the process restarts, because every start is a first run.
    #[test]
    fn restart_reflags_container_created_before_push() {
        let created = at(2024, 1, 10);
        let pushed = at(2024, 1, 20);
        assert!(!is_updated(Some(pushed), Some(created), pushed, false));
        assert!(is_updated(None, Some(created), pushed, true));
    }
}
