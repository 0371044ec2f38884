use thiserror::Error;
use tracing::{error, warn};

/// Domain-specific errors for the orchestrator.
///
/// Arbitration and routing failures are handled locally (logged, pool
/// self-heals) and must never take down the orchestrator process. Only a
/// confirmed missing runtime - no worker can ever be spawned - is allowed
/// to surface as a fatal startup error.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// No idle worker and spawning a replacement also failed. Retryable:
    /// the next trigger attempt goes through the full acquisition path.
    #[error("worker pool exhausted: {0}")]
    PoolExhausted(String),

    /// A run request lost the arbitration race (a newer request was
    /// accepted before this one could bind). Informational, not fatal.
    #[error("ownership denied for '{script}'")]
    OwnershipDenied { script: String },

    /// A message was addressed to a pid with no live worker.
    #[error("transport dropped: no worker with pid {pid}")]
    TransportDropped { pid: u32 },

    /// A worker's transport stalled; the surface gets reloaded, the worker
    /// is left alone.
    #[error("worker {pid} unresponsive")]
    UnresponsiveWorker { pid: u32 },

    /// A persisted document could not be written. In-memory state stays
    /// authoritative until the next successful write.
    #[error("failed to persist {path}: {source}")]
    PersistenceWriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("script metadata error: {0}")]
    Metadata(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Extension trait for ergonomic error logging on recoverable paths.
pub trait ResultExt<T> {
    /// Log at error level and discard. Use when the failure is recoverable
    /// and the caller has nothing better to do with it.
    fn log_err(self) -> Option<T>;
    /// Log at warn level and discard. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    fn log_err(self) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                error!(error = ?e, "Operation failed");
                None
            }
        }
    }

    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = ?e, "Operation warning");
                None
            }
        }
    }
}
