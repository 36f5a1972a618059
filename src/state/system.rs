use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const STATE_FILE_NAME: &str = "state.json";

/// Process-scoped flags that live outside the tracked-image table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    /// True until the first cycle of this process has completed.
    pub first_run: bool,
    /// The watcher's own image is newer and a helper must be spawned at
    /// the end of the cycle.
    pub update_pending: bool,
    pub version: String,
    pub started_at: DateTime<Utc>,
}

impl SystemState {
    fn fresh() -> Self {
        Self {
            first_run: true,
            update_pending: false,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }
}

/// [`SystemState`] mirrored to `<data>/state.json` on every change.
#[derive(Debug)]
pub struct SystemStateFile {
    path: Option<PathBuf>,
    state: SystemState,
}

impl SystemStateFile {
    /// Start a new process generation under `data_dir`.
    ///
    /// Every start is a first run, and a pending self-update left by an
    /// earlier process is dropped: the fresh first-run check re-derives it.
    pub fn initialize(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).map_err(|e| {
            Error::Filesystem(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        let path = data_dir.join(STATE_FILE_NAME);
        match Self::load(&path) {
            Ok(Some(previous)) => debug!(
                version = %previous.version,
                update_pending = previous.update_pending,
                "Replacing state from previous run"
            ),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), "Discarding unreadable state file: {}", e),
        }

        let file = Self {
            path: Some(path),
            state: SystemState::fresh(),
        };
        file.save()?;
        Ok(file)
    }

    /// State that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: SystemState::fresh(),
        }
    }

    /// Read a state file, `None` if it does not exist.
    pub fn load(path: &Path) -> Result<Option<SystemState>> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn first_run(&self) -> bool {
        self.state.first_run
    }

    pub fn update_pending(&self) -> bool {
        self.state.update_pending
    }

    pub fn set_update_pending(&mut self, pending: bool) -> Result<()> {
        if self.state.update_pending != pending {
            self.state.update_pending = pending;
            self.save()?;
        }
        Ok(())
    }

    pub fn mark_first_run_complete(&mut self) -> Result<()> {
        if self.state.first_run {
            self.state.first_run = false;
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let contents = serde_json::to_string_pretty(&self.state)?;
        Self::atomic_write(path, &contents)
    }

    /// Write-then-rename so a crash never leaves a torn state file.
    fn atomic_write(path: &Path, contents: &str) -> Result<()> {
        use std::io::Write;

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .map_err(|e| Error::Filesystem(format!("Failed to create temp file: {}", e)))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| Error::Filesystem(format!("Failed to write temp file: {}", e)))?;
        file.sync_all()
            .map_err(|e| Error::Filesystem(format!("Failed to sync temp file: {}", e)))?;
        drop(file);

        fs::rename(&temp_path, path)
            .map_err(|e| Error::Filesystem(format!("Failed to rename temp file: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_first_run() {
        let state = SystemStateFile::in_memory();
        assert!(state.first_run());
        assert!(!state.update_pending());
    }

    #[test]
    fn changes_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = SystemStateFile::initialize(dir.path()).unwrap();
        state.set_update_pending(true).unwrap();
        state.mark_first_run_complete().unwrap();

        let on_disk = SystemStateFile::load(&dir.path().join(STATE_FILE_NAME))
            .unwrap()
            .unwrap();
        assert!(on_disk.update_pending);
        assert!(!on_disk.first_run);
        assert!(!dir.path().join("state.tmp").exists());
    }

    #[test]
    fn restart_begins_a_new_generation() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut state = SystemStateFile::initialize(dir.path()).unwrap();
            state.set_update_pending(true).unwrap();
            state.mark_first_run_complete().unwrap();
        }
        let state = SystemStateFile::initialize(dir.path()).unwrap();
        assert!(state.first_run());
        assert!(!state.update_pending());
    }

    #[test]
    fn torn_state_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        fs::write(&path, "{\"first_run\": fal").unwrap();

        let state = SystemStateFile::initialize(dir.path()).unwrap();
        assert!(state.first_run());
        assert!(!state.update_pending());
        assert!(SystemStateFile::load(&path).unwrap().is_some());
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SystemStateFile::load(&dir.path().join("nope.json"))
            .unwrap()
            .is_none());
    }
}
