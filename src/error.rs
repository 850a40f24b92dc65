//! Error types for the controller core
//!
//! Mirrors how failures are treated: transport and watch errors are logged
//! by the caller, parse errors skip a single application, and watch start
//! failures are propagated to the application handler.

/// Errors produced by the watch, matching and batching engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cluster API request failed: {0}")]
    Transport(#[from] kube::Error),

    #[error("watch stream failed: {0}")]
    Watch(#[from] kube::runtime::watcher::Error),

    #[error("failed to start watch for {kind}: {reason}")]
    WatchStart { kind: String, reason: String },

    #[error("failed to parse application {key}: {reason}")]
    Parse { key: String, reason: String },

    #[error("unexpected object: {0}")]
    UnexpectedObject(String),

    #[error("batch queue closed")]
    QueueClosed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
