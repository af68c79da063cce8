//! The supervision state machine.
//!
//! Every transition runs to completion on the control loop before the next
//! notification is looked at, so "child exited" and "operator asked for a
//! restart" can never interleave inside a transition. The machine only
//! decides; starting, signalling and reaping go through [`AsChildManager`].
use nix::unistd::Pid;
use tracing::{error, info, warn};

use crate::{
    child::AsChildManager,
    control::{ControlEvent, SignalKind},
    error::{SignalError, SpawnError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No child and nothing pending.
    Waiting,
    Running,
    /// A kill signal went out and the exit has not been reaped yet.
    Killing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Agent<M> {
    manager: M,
    state: State,
    autodetect: bool,
    name: String,
}

impl<M> Agent<M>
where
    M: AsChildManager,
{
    pub fn new(manager: M, name: impl Into<String>, autodetect: bool) -> Self {
        Self {
            manager,
            state: State::Waiting,
            autodetect,
            name: name.into(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn current(&self) -> Option<Pid> {
        self.manager.current()
    }

    #[cfg(test)]
    pub fn manager(&self) -> &M {
        &self.manager
    }

    #[cfg(test)]
    pub fn manager_mut(&mut self) -> &mut M {
        &mut self.manager
    }

    /// Spawns the child. On failure the state is left for the caller to settle.
    pub fn start(&mut self) -> bool {
        match self.manager.spawn() {
            Ok(pid) => {
                self.state = State::Running;
                info!("  + Starting {} pid={} ..", self.name, pid);
                true
            }
            Err(SpawnError::AlreadyRunning(pid)) => {
                warn!("  - {} already running pid={}, not starting", self.name, pid);
                false
            }
            Err(e) => {
                error!("  - Can't start {}: {}", self.name, e);
                false
            }
        }
    }

    /// Kills the child with `kind`; the new one is started once the exit is
    /// reaped. With no child there is nothing to wait for, so start right away.
    pub fn restart(&mut self, kind: SignalKind) {
        info!("+ Restarting {} ..", self.name);

        let Some(pid) = self.manager.current() else {
            self.start();
            return;
        };

        info!(
            "  + Killing {} pid={} sig={} ..",
            self.name,
            pid,
            kind.signal()
        );
        self.state = State::Killing;
        match self.manager.signal(kind) {
            Ok(()) => {}
            Err(SignalError::NoSuchProcess) => {
                // already gone, the exit notification is on its way
                info!("  - pid={} already exited ..", pid);
            }
            Err(e) => warn!("  - Can't signal pid={}: {}", pid, e),
        }
    }

    /// Handles a child-state-changed notification.
    pub fn child_changed(&mut self) {
        info!("+ SIGCHLD received ..");

        let exits = self.manager.reap_exited();
        for exit in &exits {
            info!("  + Reaping {} pid={} ({}) ..", self.name, exit.pid, exit.report);
        }

        if exits.is_empty() && self.manager.current().is_some() {
            info!("  - Nothing exited, {} still running ..", self.name);
            return;
        }

        // An operator-requested restart always gets a new child; only
        // unsolicited exits are subject to autodetect.
        if self.state == State::Killing || self.autodetect {
            if !self.start() {
                self.state = State::Waiting;
            }
        } else {
            info!("  + Not restarting {}, autodetect disabled ..", self.name);
            self.state = State::Waiting;
        }
    }

    pub fn handle(&mut self, event: ControlEvent) -> Flow {
        match event.restart_signal() {
            Some(kind) => {
                self.restart(kind);
                Flow::Continue
            }
            None => {
                info!("  + Exiting ..");
                Flow::Quit
            }
        }
    }
}
