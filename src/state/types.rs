use crate::docker::ContainerSummary;
use crate::image::ImageRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the tracked-image table, unique on `(image, tag)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedImage {
    pub id: i64,
    pub image: String,
    pub tag: String,
    /// `None` for extra images that no container runs.
    pub container_id: Option<String>,
    pub container_name: Option<String>,
    /// Creation time of the watched container. The Unix epoch marks an entry
    /// that must be treated as stale on the first cycle.
    pub created_at: Option<DateTime<Utc>>,
    /// Last registry update time recorded for this reference.
    pub docker_hub_last_updated: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_updated: bool,
}

impl TrackedImage {
    pub fn image_ref(&self) -> ImageRef {
        ImageRef::new(self.image.clone(), self.tag.clone())
    }

    /// `image:tag`.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    pub fn has_container(&self) -> bool {
        self.container_id.is_some()
    }
}

/// A reference observed in the current snapshot, ready to upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub image: ImageRef,
    pub container_id: Option<String>,
    pub container_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl WatchEntry {
    /// Entry backed by a live container. `stale_on_start` replaces the
    /// creation time with the epoch.
    pub fn from_container(container: &ContainerSummary, stale_on_start: bool) -> Self {
        let created_at = if stale_on_start {
            DateTime::<Utc>::UNIX_EPOCH
        } else {
            container.created
        };
        Self {
            image: ImageRef::parse(&container.image),
            container_id: Some(container.id.clone()),
            container_name: Some(container.name.clone()),
            created_at: Some(created_at),
        }
    }

    /// Entry for an image watched without a container.
    pub fn extra(image: ImageRef) -> Self {
        Self {
            image,
            container_id: None,
            container_name: None,
            created_at: None,
        }
    }

    pub fn has_container(&self) -> bool {
        self.container_id.is_some()
    }
}

/// Which updated rows to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatedKind {
    All,
    /// Only rows backed by a container.
    WithContainer,
}

/// Outcome of a registry check for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub id: i64,
    pub registry_last_updated: DateTime<Utc>,
    pub is_updated: bool,
}
