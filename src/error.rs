use crate::subprocess::streaming::StreamSource;
use crate::subprocess::{ExitStatus, ProcessError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of a supervised tunnel run.
///
/// `Config`, `Precondition`, `Spawn` and `PrematureExit` end the run before
/// the tunnel is up. `UnexpectedExit` is reported after cleanup when the
/// tunnel dies without being asked to. `StreamRead` and `ShutdownTimeout` are only ever logged.
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("config validation failed: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to add DNS rule: {0}")]
    Precondition(String),

    #[error("failed to spawn tunnel process: {0}")]
    Spawn(#[from] ProcessError),

    #[error("tunnel process exited prematurely ({status}). Initial output:\n{early_output}")]
    PrematureExit {
        status: ExitStatus,
        early_output: String,
    },

    #[error("tunnel process exited unexpectedly ({0})")]
    UnexpectedExit(ExitStatus),

    #[error("{stream} stream read error: {source}")]
    StreamRead {
        stream: StreamSource,
        #[source]
        source: std::io::Error,
    },

    #[error("tunnel process did not exit within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("supervisor cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
}
