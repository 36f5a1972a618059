//! Container runtime access.
//!
//! The reconciler only talks to the engine through [`ContainerRuntime`], so
//! the cycle can be driven against an in-memory runtime in tests.

pub mod client;
pub mod error;
pub mod types;

pub use client::DockerClient;
pub use error::DockerError;
pub use types::{ContainerDetails, ContainerSpec, ContainerSummary, CreateRequest, PruneReport};

use async_trait::async_trait;

/// Operations the reconciler needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers; `all` includes stopped ones.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, DockerError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, DockerError>;

    /// Pull `reference`, resolving once the pull has fully completed.
    async fn pull_image(&self, reference: &str) -> Result<(), DockerError>;

    /// Create a container and return its id. The container is not started.
    async fn create_container(&self, request: &CreateRequest) -> Result<String, DockerError>;

    async fn start_container(&self, id: &str) -> Result<(), DockerError>;

    async fn stop_container(&self, id: &str) -> Result<(), DockerError>;

    /// Force-remove a container. A container that is already gone is not an error.
    async fn remove_container(&self, id: &str) -> Result<(), DockerError>;

    /// Remove dangling images.
    async fn prune_images(&self) -> Result<PruneReport, DockerError>;

    /// Remove volumes not referenced by any container.
    async fn prune_volumes(&self) -> Result<PruneReport, DockerError>;
}
