//! Worker error types

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the remote worker subsystem.
///
/// Protocol-level failures are contained at the supervisor/runtime boundary
/// and never surface as mediator events; the variants here are what callers
/// of `connect` and the module registry can see.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker: {0}")]
    SpawnFailure(String),

    #[error("worker handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("module {path}::{member} is not registered")]
    ModuleNotRegistered { path: String, member: String },

    #[error("module {path}::{member} is not a plain function")]
    NotAPlainFunction { path: String, member: String },

    #[error("module {path}::{member} is a plain function but no plain_function config was given")]
    NotWorkerLogic { path: String, member: String },

    /// The supervisor task is gone, so commands can no longer reach the
    /// worker. Returned by `connect` on a component whose supervisor
    /// already shut down.
    #[error("worker channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = WorkerError::ModuleNotRegistered {
            path: "handlers".to_string(),
            member: "echo".to_string(),
        };
        assert_eq!(err.to_string(), "module handlers::echo is not registered");

        let err = WorkerError::HandshakeTimeout(Duration::from_secs(10));
        assert!(err.to_string().contains("10s"));
    }
}
