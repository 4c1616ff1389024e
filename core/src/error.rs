use thiserror::Error;

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;

/// Errors produced by the monitoring subsystem.
///
/// Only `Transport` is retryable; everything else is either a caller error
/// or a terminal engine-side failure.
#[derive(Debug, Clone, Error)]
pub enum MonitorError {
    /// Host unreachable, connection refused, or request timed out.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("host {0} not found")]
    HostNotFound(i64),

    #[error("container {0} not found")]
    ContainerNotFound(String),

    /// Malformed subscription or filter; surfaced synchronously, never retried.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The engine answered, but with something we cannot use.
    #[error("engine error: {0}")]
    Engine(String),

    #[error("storage error: {0}")]
    Store(String),
}

impl MonitorError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn engine(err: impl std::fmt::Display) -> Self {
        Self::Engine(err.to_string())
    }

    /// Whether a retry can conceivably change the outcome.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
