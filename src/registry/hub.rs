use super::{Registry, RegistryError, TagInfo};
use crate::image::ImageRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Public Docker Hub API endpoint.
pub const DOCKER_HUB_URL: &str = "https://hub.docker.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct HubTag {
    name: String,
    last_updated: Option<DateTime<Utc>>,
}

/// Docker Hub tag lookups (`/v2/repositories/{image}/tags/{tag}`).
#[derive(Debug, Clone)]
pub struct DockerHubClient {
    client: Client,
    base_url: String,
}

impl DockerHubClient {
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_base_url(DOCKER_HUB_URL)
    }

    /// Point the client at another Hub-compatible endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("tagwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn tag_url(&self, image: &ImageRef) -> String {
        format!(
            "{}/v2/repositories/{}/tags/{}",
            self.base_url, image.image, image.tag
        )
    }
}

/// Turn a Hub tag payload into [`TagInfo`], checking it answers for `image`.
fn parse_tag(image: &ImageRef, body: &str) -> Result<TagInfo, RegistryError> {
    let tag: HubTag = serde_json::from_str(body).map_err(|e| RegistryError::Malformed {
        reference: image.reference(),
        reason: e.to_string(),
    })?;
    if tag.name != image.tag {
        return Err(RegistryError::TagMismatch {
            expected: image.tag.clone(),
            found: tag.name,
        });
    }
    let last_updated = tag.last_updated.ok_or_else(|| RegistryError::Malformed {
        reference: image.reference(),
        reason: "missing last_updated".to_string(),
    })?;
    Ok(TagInfo {
        name: tag.name,
        last_updated,
    })
}

#[async_trait]
impl Registry for DockerHubClient {
    async fn lookup(&self, image: &ImageRef) -> Result<TagInfo, RegistryError> {
        let url = self.tag_url(image);
        debug!(image = %image, %url, "Looking up tag");

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound {
                reference: image.reference(),
            });
        }
        let body = response.error_for_status()?.text().await?;
        parse_tag(image, &body)
    }
}
