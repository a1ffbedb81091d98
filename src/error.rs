//! Central error type for the orchestrator.
//!
//! Everything fallible funnels into [`StartError`] so that `main` can map a
//! failure onto a distinct exit code: configuration problems abort before
//! anything is killed or launched, window/layout problems abort before the
//! first device window, and per-device launch failures are collected as
//! warnings instead of surfacing here (see `launcher::LaunchReport`).

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StartError>;

#[derive(Error, Debug)]
pub enum StartError {
    #[error("configuration profile not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("missing configuration option [{section}] {option}")]
    MissingOption { section: String, option: String },

    #[error("invalid value for [{section}] {option}: {value:?}")]
    InvalidOption {
        section: String,
        option: String,
        value: String,
    },

    #[error("could not determine the home directory")]
    HomeDir,

    #[error("monitor {index} not present (server reports {available})")]
    Monitor { index: usize, available: usize },

    #[error("window {0:?} could not be measured within the settle window")]
    WindowMeasurement(String),

    #[error("invalid mask input: {0:?}")]
    MaskInput(String),

    #[error("failed to start {title:?}: {source}")]
    Spawn {
        title: String,
        source: std::io::Error,
    },

    #[error("remote step {step:?} on {host} failed ({status})")]
    RemoteCommandFailed {
        host: String,
        step: String,
        status: ExitStatus,
    },

    #[error("X11 connection failed: {0}")]
    X11Connect(#[from] x11rb::errors::ConnectError),

    #[error("X11 request failed: {0}")]
    X11Request(#[from] x11rb::errors::ConnectionError),

    #[error("X11 reply failed: {0}")]
    X11Reply(#[from] x11rb::errors::ReplyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StartError {
    /// Exit code reported by the binary: 2 for configuration errors, 3 for
    /// layout/window errors, 1 for everything else. 0 (success) and 4
    /// (partial launch failure) are decided in `main` from the launch report.
    pub fn exit_code(&self) -> i32 {
        match self {
            StartError::ConfigNotFound(_)
            | StartError::Config(_)
            | StartError::MissingOption { .. }
            | StartError::InvalidOption { .. } => 2,
            StartError::Monitor { .. }
            | StartError::WindowMeasurement(_)
            | StartError::X11Connect(_)
            | StartError::X11Request(_)
            | StartError::X11Reply(_) => 3,
            _ => 1,
        }
    }
}
