// thiserror's generated code for struct variants trips unused_assignments.
#![allow(unused_assignments)]

use crate::docker::DockerError;
use crate::registry::RegistryError;
use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(tagwatch::config::invalid),
        help("Run `tagwatch --help` to see every option and its environment variable")
    )]
    Config(String),

    #[error("Docker error: {0}")]
    #[diagnostic(
        code(tagwatch::docker::error),
        help("Check that Docker is running with `docker ps`")
    )]
    Docker(#[from] DockerError),

    #[error("Registry error: {0}")]
    #[diagnostic(code(tagwatch::registry::error))]
    Registry(#[from] RegistryError),

    #[error("Database error: {0}")]
    #[diagnostic(
        code(tagwatch::database::error),
        help("See recovery suggestions based on the specific error type")
    )]
    Database(#[from] tokio_rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Notification failed: {0}")]
    #[diagnostic(
        code(tagwatch::notify::failed),
        help("Check the NOTIFY_* settings for the selected notification type")
    )]
    Notify(String),

    #[error("Filesystem error: {0}")]
    #[diagnostic(code(tagwatch::filesystem::error))]
    Filesystem(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::Config(_) => {
                Some("Every option can be set as a flag or an environment variable; see `tagwatch --help`.".to_string())
            }
            Error::Docker(DockerError::DaemonUnavailable { .. }) => Some(
                "Check that Docker is running and that the socket is mounted:\n  -v /var/run/docker.sock:/var/run/docker.sock".to_string(),
            ),
            Error::Docker(_) => Some("Check that Docker is running: docker ps".to_string()),
            Error::Database(e) => {
                // tokio_rusqlite wraps the rusqlite error opaquely, so match on text.
                let err_str = e.to_string();
                if err_str.contains("database is locked") || err_str.contains("SQLITE_BUSY") {
                    Some(
                        "Another tagwatch instance may be using this data directory. Stop it, or point DATA_DIR somewhere else.".to_string(),
                    )
                } else if err_str.contains("database disk image is malformed")
                    || err_str.contains("SQLITE_CORRUPT")
                {
                    Some(
                        "Database corrupted. Remove the data directory (state is rebuilt on the next start) or set DB_MEMORY=true.".to_string(),
                    )
                } else {
                    Some("Set DB_MEMORY=true to run without an on-disk database.".to_string())
                }
            }
            Error::Notify(_) => Some(
                "Notification failures never stop the watcher; fix the NOTIFY_* settings and restart.".to_string(),
            ),
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}
