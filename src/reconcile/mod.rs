//! Reconciliation loop.
//!
//! One cycle takes a container snapshot, records it, asks the registry which
//! images moved, refreshes the affected containers and reports. Cycles run
//! strictly one after another: the next one is scheduled a full poll interval
//! after the previous one finished.
//!
//! # Cycle steps
//!
//! 1. snapshot containers and upsert them into the store
//! 2. first cycle only: banner, stray helper removal, silent prune
//! 3. registry check and decision
//! 4. summary and notification
//! 5. pull and recreate updated containers (never the watcher itself)
//! 6. mark the watcher's own image as pending
//! 7. prune when a container-backed image was updated
//! 8. hand off to the self-update helper when pending
//! 9. clear the one-shot update flags
//! 10. stop the watcher's own container after a one-shot run or a hand-off

mod prune;
mod recreate;
mod report;
mod snapshot;

pub use prune::{prune, PruneOutcome};
pub use recreate::recreate_container;
pub use report::{
    banner, dashes, notification_text, prune_label, prune_lines, status_line, update_summary,
};
pub use snapshot::build_entries;

use crate::config::{Config, RunMode, Storage};
use crate::decision::check_registry;
use crate::docker::ContainerRuntime;
use crate::error::Result;
use crate::format::{elapsed, pluralize};
use crate::notify::{dispatch, Notifier};
use crate::registry::Registry;
use crate::self_update::{SelfUpdatePhase, SelfUpdater};
use crate::state::{SystemStateFile, TrackedImage, TrackedImageStore, UpdatedKind};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// External collaborators the reconciler drives.
#[derive(Clone)]
pub struct Services {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub registry: Arc<dyn Registry>,
    pub notifier: Arc<dyn Notifier>,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub first_run: bool,
    /// Number of references recorded from the snapshot.
    pub watching: usize,
    /// `image:tag` of every row found updated.
    pub updates: Vec<String>,
    pub downloaded: Vec<String>,
    /// Names of recreated containers.
    pub recreated: Vec<String>,
    /// References or container names whose pull or recreate failed.
    pub failed: Vec<String>,
    pub pruned: Option<PruneOutcome>,
    pub notified: bool,
    pub self_update_pending: bool,
    pub helper_spawned: bool,
    pub stopped_self: bool,
}

pub struct Watcher {
    config: Config,
    store: TrackedImageStore,
    system: SystemStateFile,
    services: Services,
    self_updater: SelfUpdater,
}

impl Watcher {
    pub fn new(
        config: Config,
        store: TrackedImageStore,
        system: SystemStateFile,
        services: Services,
    ) -> Self {
        let self_updater = SelfUpdater::new(services.runtime.clone(), config.helper_name.clone());
        Self {
            config,
            store,
            system,
            services,
            self_updater,
        }
    }

    /// Replace the self-update coordinator (timing or entrypoint overrides).
    pub fn with_self_updater(mut self, self_updater: SelfUpdater) -> Self {
        self.self_updater = self_updater;
        self
    }

    pub fn store(&self) -> &TrackedImageStore {
        &self.store
    }

    pub fn system(&self) -> &SystemStateFile {
        &self.system
    }

    /// Run cycles until a one-shot run finishes, a helper takes over, or
    /// `cancel` fires between cycles.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        loop {
            let handed_off = match self.run_cycle().await {
                Ok(report) => report.helper_spawned,
                Err(e) => {
                    error!("Cycle failed: {}", e.with_suggestion());
                    false
                }
            };

            if self.config.run_once() {
                debug!("Poll interval is zero, not rescheduling");
                return Ok(());
            }
            if handed_off {
                info!("handed off to {}, not rescheduling", self.config.helper_name);
                return Ok(());
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Run a single reconciliation cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let started = Instant::now();
        let first_run = self.system.first_run();
        let mut report = CycleReport {
            first_run,
            ..CycleReport::default()
        };

        self.store.init(first_run).await?;

        // Snapshot
        let containers = self.services.runtime.list_containers(false).await?;
        let entries = build_entries(&containers, &self.config);
        let watching = self.store.upsert(entries).await?;
        report.watching = watching.len();

        let status = status_line(
            report.watching,
            Utc::now(),
            self.config.timezone,
            &self.config.time_format,
        );

        if first_run {
            info!("{}", banner());
            self.first_run_housekeeping().await;
        }
        info!("{}", status);
        info!("{}", dashes(&status));

        // Registry check
        let active = self.store.active().await?;
        if !active.is_empty() {
            let decisions =
                check_registry(&active, self.services.registry.as_ref(), first_run).await;
            self.store.apply_decisions(decisions).await?;
        }

        // Reporting
        let updated = self.store.updated(UpdatedKind::All).await?;
        report.updates = updated.iter().map(TrackedImage::reference).collect();
        let on_start = first_run && self.config.update_on_start;
        let summary = update_summary(&updated, Utc::now(), on_start);
        for line in summary.lines() {
            info!("{}", line);
        }
        if !updated.is_empty() || first_run {
            let text = notification_text(&summary, first_run.then_some(status.as_str()));
            report.notified = dispatch(self.services.notifier.as_ref(), &text).await;
        }

        // Download and recreate
        let with_container = self.store.updated(UpdatedKind::WithContainer).await?;
        let containers_updated = !with_container.is_empty();
        let (own, others): (Vec<TrackedImage>, Vec<TrackedImage>) = with_container
            .into_iter()
            .partition(|row| self.config.is_self_image(&row.image));

        if self.config.downloads_enabled() && !others.is_empty() {
            let pulled = self.download(&others, &mut report).await;
            self.recreate(&pulled, &mut report).await;
        }

        // Own image
        if let Some(own) = own.first() {
            self.defer_self_update(own)?;
        }
        report.self_update_pending = self.system.update_pending();

        // Prune
        if self.config.prune_enabled() && containers_updated {
            report.pruned = Some(self.prune_and_report().await);
        }

        // Self-update hand-off
        if self.system.update_pending() {
            report.helper_spawned = self.hand_off().await?;
        }

        self.store.clear_updated_flags().await?;
        self.system.mark_first_run_complete()?;
        info!("run complete in {}", elapsed(started.elapsed()));

        if self.config.in_container && (self.config.run_once() || report.helper_spawned) {
            report.stopped_self = self.stop_self().await;
        }

        Ok(report)
    }

    async fn first_run_housekeeping(&self) {
        if let Err(e) = self.self_updater.remove_stray_helper().await {
            debug!("Could not check for a stray helper: {}", e);
        }
        if self.config.prune_enabled() {
            let outcome = prune(
                self.services.runtime.as_ref(),
                self.config.prune_images,
                self.config.prune_volumes,
            )
            .await;
            debug!(?outcome, "Startup prune complete");
        }
    }

    /// Pull every row's image. Returns the rows whose pull succeeded.
    async fn download(
        &self,
        rows: &[TrackedImage],
        report: &mut CycleReport,
    ) -> Vec<TrackedImage> {
        let started = Instant::now();
        info!("downloading {}", pluralize(rows.len(), "image"));

        let mut pulled = Vec::with_capacity(rows.len());
        for row in rows {
            let reference = row.reference();
            match self.services.runtime.pull_image(&reference).await {
                Ok(()) => {
                    debug!(image = %reference, "Pulled image");
                    report.downloaded.push(reference);
                    pulled.push(row.clone());
                }
                Err(e) => {
                    warn!(image = %reference, "Failed to pull image, skipping: {}", e);
                    report.failed.push(reference);
                }
            }
        }

        info!("downloads complete in {}", elapsed(started.elapsed()));
        pulled
    }

    async fn recreate(&self, rows: &[TrackedImage], report: &mut CycleReport) {
        if rows.is_empty() {
            return;
        }
        let started = Instant::now();
        info!("recreating {}", pluralize(rows.len(), "container"));

        for row in rows {
            let Some(container_id) = row.container_id.as_deref() else {
                continue;
            };
            let name = row
                .container_name
                .clone()
                .unwrap_or_else(|| container_id.to_string());
            match recreate_container(self.services.runtime.as_ref(), container_id).await {
                Ok(new_id) => {
                    info!(container = %name, id = %new_id, "{} recreated", name);
                    report.recreated.push(name);
                }
                Err(e) => {
                    warn!(container = %name, "Failed to recreate container, skipping: {}", e);
                    report.failed.push(name);
                }
            }
        }

        info!("recreations complete in {}", elapsed(started.elapsed()));
    }

    /// The watcher's own image moved: never recreate it inline.
    fn defer_self_update(&mut self, own: &TrackedImage) -> Result<()> {
        if self.config.auto_update_self {
            info!(
                image = %own.reference(),
                phase = %SelfUpdatePhase::Pending,
                "tagwatch update found, updating at end of run"
            );
            self.system.set_update_pending(true)?;
        } else {
            info!(
                image = %own.reference(),
                "tagwatch update available: pull {} and recreate {} manually",
                own.reference(),
                own.container_name.as_deref().unwrap_or("the tagwatch container")
            );
        }
        Ok(())
    }

    async fn prune_and_report(&self) -> PruneOutcome {
        let started = Instant::now();
        info!(
            "pruning {}",
            prune_label(self.config.prune_images, self.config.prune_volumes)
        );
        let outcome = prune(
            self.services.runtime.as_ref(),
            self.config.prune_images,
            self.config.prune_volumes,
        )
        .await;
        for line in prune_lines(&outcome) {
            info!("{}", line);
        }
        info!("pruning complete in {}", elapsed(started.elapsed()));
        outcome
    }

    /// Phase one of the self-update. Returns whether a helper was started.
    async fn hand_off(&mut self) -> Result<bool> {
        let Some(own) = self.store.find_by_image(&self.config.self_image).await? else {
            warn!("tagwatch update pending but its container is not tracked, dropping");
            self.system.set_update_pending(false)?;
            return Ok(false);
        };

        let message = "updating tagwatch...be right back";
        info!("{}", message);
        dispatch(self.services.notifier.as_ref(), message).await;

        match self.self_updater.spawn_helper(&own).await {
            Ok(_) => {
                self.system.set_update_pending(false)?;
                Ok(true)
            }
            Err(e) => {
                warn!("Failed to start {}: {}", self.config.helper_name, e);
                Ok(false)
            }
        }
    }

    /// Stop the container this process runs in. Returns whether it was asked to stop.
    async fn stop_self(&self) -> bool {
        let tracked = match self.store.find_by_image(&self.config.self_image).await {
            Ok(row) => row.and_then(|row| row.container_id),
            Err(e) => {
                debug!("Could not look up own container: {}", e);
                None
            }
        };
        let Some(id) = tracked.or_else(|| self.config.own_container.clone()) else {
            warn!("running in a container but could not determine which one, not stopping");
            return false;
        };

        info!(container = %id, "stopping tagwatch container");
        match self.services.runtime.stop_container(&id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(container = %id, "Failed to stop own container: {}", e);
                false
            }
        }
    }
}

/// Open the store and process state for `storage`.
pub async fn open_state(storage: &Storage) -> Result<(TrackedImageStore, SystemStateFile)> {
    match storage {
        Storage::Memory => Ok((
            TrackedImageStore::in_memory().await?,
            SystemStateFile::in_memory(),
        )),
        Storage::Disk(dir) => Ok((
            TrackedImageStore::open(dir).await?,
            SystemStateFile::initialize(dir)?,
        )),
    }
}

/// Process entry point: the helper procedure or the regular loop.
pub async fn run(
    mode: RunMode,
    config: Config,
    services: Services,
    cancel: CancellationToken,
) -> Result<()> {
    match mode {
        RunMode::Helper {
            original_container_id,
        } => {
            let updater = SelfUpdater::new(services.runtime.clone(), config.helper_name.clone());
            let phase = updater.complete_update(&original_container_id).await?;
            debug!(%phase, "Helper finished");
            Ok(())
        }
        RunMode::Normal => {
            let (store, system) = open_state(&config.storage).await?;
            let mut watcher = Watcher::new(config, store, system, services);
            watcher.run(cancel).await
        }
    }
}
