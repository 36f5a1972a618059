//! Registry lookups.
//!
//! The reconciler only needs one fact from a registry: when a tag was last
//! pushed. Every failure is a typed [`RegistryError`] so the caller can skip
//! the image and carry on with the batch.

mod hub;

pub use hub::{DockerHubClient, DOCKER_HUB_URL};

use crate::image::ImageRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// What the registry reports about one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{reference} not found in registry")]
    NotFound { reference: String },

    #[error("registry answered for tag '{found}' instead of '{expected}'")]
    TagMismatch { expected: String, found: String },

    #[error("malformed registry response for {reference}: {reason}")]
    Malformed { reference: String, reason: String },
}

/// Resolves an image tag to its registry metadata.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn lookup(&self, image: &ImageRef) -> Result<TagInfo, RegistryError>;
}
