use crate::docker::{ContainerRuntime, CreateRequest, DockerError};
use tracing::debug;

/// Replace a container with a fresh one from the same configuration.
///
/// The live container is inspected first so the replacement gets exactly the
/// command, environment, host config and networks it had. The image
/// reference in its config is kept, which now resolves to the pulled image.
/// Returns the new container id.
pub async fn recreate_container(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
) -> Result<String, DockerError> {
    let details = runtime.inspect_container(container_id).await?;
    let request = CreateRequest::recreate(&details, None);

    runtime.remove_container(&details.id).await?;
    let new_id = runtime.create_container(&request).await?;
    runtime.start_container(&new_id).await?;

    debug!(container = %details.name, old = %details.id, new = %new_id, "Recreated container");
    Ok(new_id)
}
