//! # tagwatch
//!
//! Watches the containers on a Docker host, detects when a newer image is
//! published on Docker Hub for the tag they run, and optionally pulls the
//! image and recreates the containers with their original configuration,
//! including the container tagwatch itself runs in.
//!
//! ## Features
//!
//! - **Tracked-image store**: one row per `(image, tag)` in SQLite, with
//!   active/updated lifecycle flags kept consistent by transactions
//! - **Label policy**: `tagwatch.enable` opts containers in or out,
//!   `tagwatch.update-on-start` forces a refresh on the first cycle
//! - **Config-preserving recreate**: command, environment, host config and
//!   networks are copied from `inspect`, only the image content changes
//! - **Self-update**: a helper container finishes the update after the
//!   watcher's own container has stopped
//! - **Notifications**: HTTP webhook or SMTP summaries
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tagwatch::{reconcile, Config, DockerClient, DockerHubClient, NoopNotifier, RunMode};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), tagwatch::Error> {
//! let services = reconcile::Services {
//!     runtime: Arc::new(DockerClient::connect()?),
//!     registry: Arc::new(DockerHubClient::new()?),
//!     notifier: Arc::new(NoopNotifier),
//! };
//! reconcile::run(RunMode::Normal, Config::default(), services, CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decision;
pub mod docker;
pub mod error;
pub mod format;
pub mod image;
pub mod notify;
pub mod policy;
pub mod reconcile;
pub mod registry;
pub mod self_update;
pub mod state;

// Re-export commonly used types
pub use config::{Config, NotifyTarget, RunMode, Storage};
pub use docker::{ContainerRuntime, DockerClient, DockerError};
pub use error::{Error, Result};
pub use image::ImageRef;
pub use notify::{Notifier, NoopNotifier};
pub use policy::WatchPolicy;
pub use reconcile::{CycleReport, Services, Watcher};
pub use registry::{DockerHubClient, Registry, RegistryError};
pub use self_update::SelfUpdater;
pub use state::{SystemStateFile, TrackedImage, TrackedImageStore};
