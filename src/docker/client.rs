//! Docker Engine API client.
//!
//! All engine interactions go through `DockerClient`, which provides
//! consistent timeout handling, error mapping to [`DockerError`], and a single
//! point where the engine connection is constructed.

use super::types::{ContainerDetails, ContainerSummary, CreateRequest, PruneReport};
use super::{ContainerRuntime, DockerError};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::{CreateImageOptions, PruneImagesOptions};
use bollard::volume::PruneVolumesOptions;
use bollard::Docker;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Timeout for quick calls (list, inspect, start, remove).
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for stopping a container (engine waits for the grace period first).
const STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for pulls and prunes, which move real data.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Engine API client over the local Docker socket.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connect using `DOCKER_HOST` or the platform default socket.
    pub fn connect() -> Result<Self, DockerError> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| DockerError::DaemonUnavailable {
                reason: e.to_string(),
            })?;
        Ok(Self { docker })
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    /// Await an engine call with a timeout, mapping errors for `op` on `target`.
    async fn call<T, F>(
        &self,
        op: &str,
        target: &str,
        timeout: Duration,
        fut: F,
    ) -> Result<T, DockerError>
    where
        F: Future<Output = Result<T, bollard::errors::Error>>,
    {
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DockerError::from_api(op, target, e)),
            Err(_) => Err(DockerError::timeout(format!("{} {}", op, target), timeout)),
        }
    }

    fn to_value<T: serde::Serialize>(op: &str, model: &T) -> Result<Value, DockerError> {
        serde_json::to_value(model).map_err(|e| DockerError::invalid_request(op, e.to_string()))
    }

    /// Pull `reference`, resolving only once the progress stream has ended.
    async fn pull_stream(&self, reference: &str) -> Result<(), DockerError> {
        let options = CreateImageOptions {
            from_image: reference.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let info = progress.map_err(|e| DockerError::from_api("pull image", reference, e))?;
            let info = Self::to_value("pull image", &info)?;
            if let Some(message) = info.get("error").and_then(Value::as_str) {
                return Err(DockerError::stream(
                    format!("pull image {}", reference),
                    message,
                ));
            }
            if let Some(status) = info.get("status").and_then(Value::as_str) {
                tracing::trace!(image = %reference, "{}", status);
            }
        }
        Ok(())
    }

    fn prune_report(op: &str, value: &Value, deleted_key: &str) -> PruneReport {
        let deleted = value
            .get(deleted_key)
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        let space_reclaimed = value
            .get("SpaceReclaimed")
            .and_then(Value::as_i64)
            .map(|bytes| bytes.max(0) as u64)
            .unwrap_or(0);
        tracing::debug!(deleted, space_reclaimed, "{} complete", op);
        PruneReport {
            deleted,
            space_reclaimed,
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    // ========================================================================
    // Inspection
    // ========================================================================

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, DockerError> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let containers = self
            .call(
                "list containers",
                "",
                API_TIMEOUT,
                self.docker.list_containers(Some(options)),
            )
            .await?;

        let mut summaries = Vec::with_capacity(containers.len());
        for container in &containers {
            let value = Self::to_value("list containers", container)?;
            match ContainerSummary::from_api_value(&value) {
                Some(summary) => summaries.push(summary),
                None => tracing::debug!("Skipping container listing without id or image"),
            }
        }
        Ok(summaries)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, DockerError> {
        let response = self
            .call(
                "inspect container",
                id,
                API_TIMEOUT,
                self.docker
                    .inspect_container(id, None::<InspectContainerOptions>),
            )
            .await?;
        let value = Self::to_value("inspect container", &response)?;
        ContainerDetails::from_inspect_value(&value)
            .map_err(|reason| DockerError::invalid_request("inspect container", reason))
    }

    // ========================================================================
    // Images
    // ========================================================================

    async fn pull_image(&self, reference: &str) -> Result<(), DockerError> {
        match tokio::time::timeout(TRANSFER_TIMEOUT, self.pull_stream(reference)).await {
            Ok(result) => result,
            Err(_) => Err(DockerError::timeout(
                format!("pull image {}", reference),
                TRANSFER_TIMEOUT,
            )),
        }
    }

    async fn prune_images(&self) -> Result<PruneReport, DockerError> {
        let mut filters = HashMap::new();
        filters.insert("dangling".to_string(), vec!["true".to_string()]);
        let response = self
            .call(
                "prune images",
                "",
                TRANSFER_TIMEOUT,
                self.docker
                    .prune_images(Some(PruneImagesOptions { filters })),
            )
            .await?;
        let value = Self::to_value("prune images", &response)?;
        Ok(Self::prune_report("prune images", &value, "ImagesDeleted"))
    }

    async fn prune_volumes(&self) -> Result<PruneReport, DockerError> {
        let response = self
            .call(
                "prune volumes",
                "",
                TRANSFER_TIMEOUT,
                self.docker.prune_volumes(None::<PruneVolumesOptions<String>>),
            )
            .await?;
        let value = Self::to_value("prune volumes", &response)?;
        Ok(Self::prune_report("prune volumes", &value, "VolumesDeleted"))
    }

    // ========================================================================
    // Container lifecycle
    // ========================================================================

    async fn create_container(&self, request: &CreateRequest) -> Result<String, DockerError> {
        let config: Config<String> =
            serde_json::from_value(Value::Object(request.body.clone())).map_err(|e| {
                DockerError::invalid_request(format!("create container {}", request.name), e.to_string())
            })?;
        let options = CreateContainerOptions {
            name: request.name.clone(),
            platform: None,
        };
        let response = self
            .call(
                "create container",
                &request.name,
                API_TIMEOUT,
                self.docker.create_container(Some(options), config),
            )
            .await?;
        for warning in &response.warnings {
            tracing::warn!(container = %request.name, "{}", warning);
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.call(
            "start container",
            id,
            API_TIMEOUT,
            self.docker
                .start_container(id, None::<StartContainerOptions<String>>),
        )
        .await
    }

    async fn stop_container(&self, id: &str) -> Result<(), DockerError> {
        self.call(
            "stop container",
            id,
            STOP_TIMEOUT,
            self.docker.stop_container(id, None::<StopContainerOptions>),
        )
        .await
    }

    /// Force-remove a container. Returns `Ok(())` if the container doesn't exist.
    async fn remove_container(&self, id: &str) -> Result<(), DockerError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self
            .call(
                "remove container",
                id,
                API_TIMEOUT,
                self.docker.remove_container(id, Some(options)),
            )
            .await
        {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}
