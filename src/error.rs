//! Failure domains of the agent.
//!
//! Only [`StartupError`] and [`ConfigError`] are fatal. Spawn and signal
//! failures are reported and folded back into the state machine.
use std::{io, path::PathBuf};

use nix::{errno::Errno, unistd::Pid};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("already running with pid={0}")]
    AlreadyRunning(Pid),

    #[error("fork failed: {0}")]
    Fork(#[source] Errno),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("no process to signal")]
    NoSuchProcess,

    #[error("kill failed: {0}")]
    Kill(#[source] Errno),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("no window manager command given")]
    MissingCommand,

    #[error("bad key binding {chord:?}: {reason}")]
    Binding { chord: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("can't set up control channel {path}: {source}")]
    Control {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't set up event watcher: {0}")]
    Watcher(#[source] io::Error),
}
