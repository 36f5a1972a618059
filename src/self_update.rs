//! Self-update hand-off.
//!
//! A watcher running in a container cannot remove and recreate its own
//! container: the process dies with the removal. Instead it spawns a sibling
//! helper container from its current (not yet pulled) image and exits. The
//! helper waits for the original to stop, pulls the new image and recreates
//! the original under the same name with the same configuration.
//!
//! ```text
//! pending -> helper-spawned -> waiting-for-exit -> updating -> done
//!                                    |
//!                                    +-> aborted (still running after the retry budget)
//! ```

use crate::docker::{ContainerRuntime, CreateRequest, DockerError};
use crate::error::{Error, Result};
use crate::state::TrackedImage;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Command-line flag that starts the process in helper mode.
pub const HELPER_FLAG: &str = "--update-helper";

/// How the helper waits for the original container to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelperTiming {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for HelperTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfUpdatePhase {
    Pending,
    HelperSpawned,
    WaitingForExit,
    Updating,
    Done,
    Aborted,
}

impl fmt::Display for SelfUpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelfUpdatePhase::Pending => "pending",
            SelfUpdatePhase::HelperSpawned => "helper-spawned",
            SelfUpdatePhase::WaitingForExit => "waiting-for-exit",
            SelfUpdatePhase::Updating => "updating",
            SelfUpdatePhase::Done => "done",
            SelfUpdatePhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

pub struct SelfUpdater {
    runtime: Arc<dyn ContainerRuntime>,
    helper_name: String,
    /// Executable the helper runs; `None` keeps the image's entrypoint.
    entrypoint: Option<String>,
    timing: HelperTiming,
}

impl SelfUpdater {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, helper_name: impl Into<String>) -> Self {
        let entrypoint = std::env::current_exe()
            .ok()
            .map(|path| path.to_string_lossy().into_owned());
        Self {
            runtime,
            helper_name: helper_name.into(),
            entrypoint,
            timing: HelperTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: HelperTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_entrypoint(mut self, entrypoint: Option<String>) -> Self {
        self.entrypoint = entrypoint;
        self
    }

    /// Remove a helper container left behind by an earlier self-update.
    /// Returns whether one was found.
    pub async fn remove_stray_helper(&self) -> Result<bool> {
        let containers = self.runtime.list_containers(true).await?;
        let Some(helper) = containers.iter().find(|c| c.name == self.helper_name) else {
            return Ok(false);
        };
        self.runtime.remove_container(&helper.id).await?;
        info!(container = %helper.id, "removed {}", self.helper_name);
        Ok(true)
    }

    /// Engine payload for a helper that replaces `original_id`.
    fn helper_request(&self, own: &TrackedImage, original_id: &str, binds: Vec<String>) -> CreateRequest {
        let mut body = Map::new();
        body.insert("Image".to_string(), Value::String(own.reference()));
        if let Some(entrypoint) = &self.entrypoint {
            body.insert("Entrypoint".to_string(), json!([entrypoint]));
        }
        body.insert("Cmd".to_string(), json!([HELPER_FLAG, original_id]));
        body.insert("HostConfig".to_string(), json!({ "Binds": binds }));
        CreateRequest {
            name: self.helper_name.clone(),
            body,
        }
    }

    /// Phase one: start the helper container for `own`, the watcher's own
    /// tracked row. Returns the helper's container id once it is running.
    pub async fn spawn_helper(&self, own: &TrackedImage) -> Result<String> {
        let container_id = own.container_id.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "{} is tracked without a container, nothing to update",
                own.reference()
            ))
        })?;

        let original = self.runtime.inspect_container(container_id).await?;
        if let Err(e) = self.remove_stray_helper().await {
            debug!("Could not clear previous helper: {}", e);
        }

        let request = self.helper_request(own, &original.id, original.spec.binds());
        let helper_id = self.runtime.create_container(&request).await?;
        self.runtime.start_container(&helper_id).await?;

        info!(
            helper = %helper_id,
            original = %original.id,
            phase = %SelfUpdatePhase::HelperSpawned,
            "{} container started",
            self.helper_name
        );
        Ok(helper_id)
    }

    /// Phase two, run inside the helper: wait for `original_id` to exit, then
    /// pull its image and recreate it.
    pub async fn complete_update(&self, original_id: &str) -> Result<SelfUpdatePhase> {
        info!(original = %original_id, "auto update started");

        let mut attempt = 1;
        let details = loop {
            let details = match self.runtime.inspect_container(original_id).await {
                Ok(details) => details,
                Err(DockerError::ContainerNotFound { .. }) => {
                    warn!(original = %original_id, "original container not found - update aborted");
                    return Ok(SelfUpdatePhase::Aborted);
                }
                Err(e) => return Err(e.into()),
            };
            if details.is_exited() {
                break details;
            }
            if attempt >= self.timing.max_attempts {
                warn!(
                    original = %original_id,
                    attempts = attempt,
                    "original container did not stop - update aborted"
                );
                return Ok(SelfUpdatePhase::Aborted);
            }
            if attempt == 1 {
                info!(phase = %SelfUpdatePhase::WaitingForExit, "waiting for {} to stop", details.name);
            } else {
                debug!(attempt, "still waiting");
            }
            attempt += 1;
            tokio::time::sleep(self.timing.poll_interval).await;
        };

        let image = details
            .spec
            .image()
            .ok_or_else(|| {
                Error::Config(format!("container {} has no image in its config", details.name))
            })?
            .to_string();

        info!(phase = %SelfUpdatePhase::Updating, image = %image, "downloading {}", image);
        self.runtime.pull_image(&image).await?;
        info!("download complete");

        if let Err(e) = self.runtime.remove_container(&details.id).await {
            warn!(container = %details.name, "Failed to remove original container: {}", e);
        }
        let request = CreateRequest::recreate(&details, None);
        let new_id = self.runtime.create_container(&request).await?;
        self.runtime.start_container(&new_id).await?;

        info!(container = %details.name, id = %new_id, phase = %SelfUpdatePhase::Done, "update complete");
        Ok(SelfUpdatePhase::Done)
    }
}
