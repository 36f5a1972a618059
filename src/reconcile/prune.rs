use crate::docker::{ContainerRuntime, PruneReport};
use tracing::warn;

/// What a prune pass reclaimed; `None` for kinds that were not pruned or failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub images: Option<PruneReport>,
    pub volumes: Option<PruneReport>,
}

/// Prune dangling images and/or unused volumes. Failures are logged.
pub async fn prune(runtime: &dyn ContainerRuntime, images: bool, volumes: bool) -> PruneOutcome {
    let mut outcome = PruneOutcome::default();
    if images {
        match runtime.prune_images().await {
            Ok(report) => outcome.images = Some(report),
            Err(e) => warn!("Failed to prune images: {}", e),
        }
    }
    if volumes {
        match runtime.prune_volumes().await {
            Ok(report) => outcome.volumes = Some(report),
            Err(e) => warn!("Failed to prune volumes: {}", e),
        }
    }
    outcome
}
