use std::fmt;
use std::time::Duration;

/// Structured error type for Docker Engine API calls.
///
/// Variants are machine-actionable so callers can tell a vanished container
/// apart from an unreachable daemon without string matching.
#[derive(Debug)]
pub enum DockerError {
    /// Engine API call did not complete in time.
    Timeout { operation: String, timeout: Duration },

    /// Engine API answered with an error status.
    Api {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    /// Container doesn't exist (HTTP 404 from the engine).
    ContainerNotFound { container: String },

    /// Name already in use or container in a conflicting state (HTTP 409).
    Conflict { operation: String, message: String },

    /// A progress stream (image pull) reported an error.
    Stream { operation: String, message: String },

    /// Docker daemon socket could not be reached.
    DaemonUnavailable { reason: String },

    /// A create request could not be turned into an engine payload.
    InvalidRequest { operation: String, reason: String },
}

impl DockerError {
    /// Create a timeout error.
    pub fn timeout(op: impl Into<String>, dur: Duration) -> Self {
        DockerError::Timeout {
            operation: op.into(),
            timeout: dur,
        }
    }

    /// Create a not-found error for `container`.
    pub fn not_found(container: impl Into<String>) -> Self {
        DockerError::ContainerNotFound {
            container: container.into(),
        }
    }

    /// Create a stream error (e.g. a failed layer download).
    pub fn stream(op: impl Into<String>, message: impl Into<String>) -> Self {
        DockerError::Stream {
            operation: op.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-request error.
    pub fn invalid_request(op: impl Into<String>, reason: impl Into<String>) -> Self {
        DockerError::InvalidRequest {
            operation: op.into(),
            reason: reason.into(),
        }
    }

    /// Map a `bollard` error for `op` against `target` (container id/name or image).
    pub fn from_api(op: impl Into<String>, target: &str, err: bollard::errors::Error) -> Self {
        use bollard::errors::Error as ApiError;

        let operation = op.into();
        match err {
            ApiError::DockerResponseServerError {
                status_code: 404,
                message,
            } if operation.contains("container") => {
                tracing::debug!("{} {}: {}", operation, target, message);
                DockerError::not_found(target)
            }
            ApiError::DockerResponseServerError {
                status_code: 409,
                message,
            } => DockerError::Conflict { operation, message },
            ApiError::DockerResponseServerError {
                status_code,
                message,
            } => DockerError::Api {
                operation,
                status: Some(status_code),
                message,
            },
            ApiError::DockerStreamError { error } => DockerError::Stream {
                operation,
                message: error,
            },
            other => DockerError::Api {
                operation,
                status: None,
                message: other.to_string(),
            },
        }
    }

    /// True when the target container is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DockerError::ContainerNotFound { .. })
    }
}

impl fmt::Display for DockerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerError::Timeout { operation, timeout } => {
                write!(
                    f,
                    "Timed out running '{}' (exceeded {} seconds)",
                    operation,
                    timeout.as_secs()
                )
            }
            DockerError::Api {
                operation,
                status,
                message,
            } => {
                if let Some(code) = status {
                    write!(f, "'{}' failed (status {}): {}", operation, code, message)
                } else {
                    write!(f, "'{}' failed: {}", operation, message)
                }
            }
            DockerError::ContainerNotFound { container } => {
                write!(f, "No such container: {}", container)
            }
            DockerError::Conflict { operation, message } => {
                write!(f, "'{}' conflicted: {}", operation, message)
            }
            DockerError::Stream { operation, message } => {
                write!(f, "'{}' stream failed: {}", operation, message)
            }
            DockerError::DaemonUnavailable { reason } => {
                write!(f, "Docker daemon is not responding ({})", reason)
            }
            DockerError::InvalidRequest { operation, reason } => {
                write!(f, "Invalid request for '{}': {}", operation, reason)
            }
        }
    }
}

impl std::error::Error for DockerError {}
