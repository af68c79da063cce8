//! Operator requests and the named pipe they arrive on.
//!
//! A hotkey daemon writes one chord or command word per line into the pipe.
//! The pipe is opened read-write so the agent itself always counts as a
//! writer and epoll never reports a hang-up once external writers go away.
use std::{
    fs::{self, OpenOptions},
    io,
    os::{
        fd::{AsRawFd, OwnedFd, RawFd},
        unix::fs::{FileTypeExt, OpenOptionsExt},
    },
    path::{Path, PathBuf},
};

use nix::{libc, sys::signal::Signal, sys::stat::Mode, unistd::mkfifo};
use tracing::{debug, warn};

use crate::{error::StartupError, keys::Bindings};

/// Longest line accepted from the pipe before it is discarded.
const MAX_PENDING: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Abort,
    Terminate,
    Kill,
}

impl SignalKind {
    pub fn signal(self) -> Signal {
        match self {
            Self::Abort => Signal::SIGABRT,
            Self::Terminate => Signal::SIGTERM,
            Self::Kill => Signal::SIGKILL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    RequestAbortRestart,
    RequestTerminateRestart,
    RequestKillRestart,
    RequestQuit,
    SoftRestart(SignalKind),
}

impl ControlEvent {
    /// The signal a restart request kills the child with, `None` for quit.
    pub fn restart_signal(self) -> Option<SignalKind> {
        match self {
            Self::RequestAbortRestart => Some(SignalKind::Abort),
            Self::RequestTerminateRestart => Some(SignalKind::Terminate),
            Self::RequestKillRestart => Some(SignalKind::Kill),
            Self::SoftRestart(kind) => Some(kind),
            Self::RequestQuit => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::RequestAbortRestart => "SIGABRT",
            Self::RequestTerminateRestart => "SIGTERM",
            Self::RequestKillRestart => "SIGKILL",
            Self::RequestQuit => "exit",
            Self::SoftRestart(_) => "soft restart",
        }
    }
}

/// One complete line read from the control channel.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Control(ControlEvent),
    Unknown(String),
}

/// Reassembles newline-terminated lines out of arbitrary read chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Set while skipping the rest of an overlong line.
    discarding: bool,
}

impl LineBuffer {
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in data {
            if byte == b'\n' {
                if !self.discarding {
                    let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                    if !line.is_empty() {
                        lines.push(line);
                    }
                }
                self.pending.clear();
                self.discarding = false;
            } else if self.discarding {
                continue;
            } else if self.pending.len() < MAX_PENDING {
                self.pending.push(byte);
            } else {
                warn!("  - Control line longer than {MAX_PENDING} bytes, dropping ..");
                self.pending.clear();
                self.discarding = true;
            }
        }
        lines
    }
}

pub struct ControlChannel {
    path: PathBuf,
    created: bool,
    fd: RawFd,
    lines: LineBuffer,
    bindings: Bindings,
}

impl ControlChannel {
    /// Creates (or reuses) the pipe at `path`. The returned fd is handed to
    /// the watcher, which owns it from then on.
    pub fn create(path: &Path, bindings: Bindings) -> Result<(Self, OwnedFd), StartupError> {
        let fail = |source: io::Error| StartupError::Control {
            path: path.to_path_buf(),
            source,
        };

        let created = match fs::metadata(path) {
            Ok(meta) if meta.file_type().is_fifo() => false,
            Ok(_) => {
                return Err(fail(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "exists and is not a fifo",
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|e| fail(e.into()))?;
                true
            }
            Err(e) => return Err(fail(e)),
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(fail)?;
        let fd = OwnedFd::from(file);
        debug!("control channel {} on fd={}", path.display(), fd.as_raw_fd());

        let channel = Self {
            path: path.to_path_buf(),
            created,
            fd: fd.as_raw_fd(),
            lines: LineBuffer::default(),
            bindings,
        };
        Ok((channel, fd))
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn feed(&mut self, data: &[u8]) -> Vec<Input> {
        self.lines
            .feed(data)
            .into_iter()
            .map(|line| match self.bindings.resolve(&line) {
                Some(event) => Input::Control(event),
                None => Input::Unknown(line),
            })
            .collect()
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        if self.created {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}
