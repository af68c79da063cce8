//! The single consumer of every notification.
//!
//! Child exits, the soft-restart signal and hotkey lines all come out of one
//! watcher, one at a time, and each is handled to completion before the next
//! poll. This is what keeps the agent's transitions from overlapping.
use std::io;

use nix::sys::signal::Signal;
use tracing::{info, warn};

use crate::{
    agent::{Agent, Flow},
    child::AsChildManager,
    control::{ControlChannel, ControlEvent, Input, SignalKind},
    watcher::{AsWatcher, Event},
};

/// Bytes read from the control channel per event.
pub const CONTROL_BUFSIZE: usize = 256;

/// Signals the loop consumes as events.
pub const WATCHED_SIGNALS: [Signal; 2] = [Signal::SIGCHLD, Signal::SIGHUP];

pub fn handle_event<M>(event: Event, agent: &mut Agent<M>, control: &mut ControlChannel) -> Flow
where
    M: AsChildManager,
{
    match event {
        Event::Signal(Signal::SIGCHLD) => {
            agent.child_changed();
            Flow::Continue
        }
        Event::Signal(Signal::SIGHUP) => {
            info!("+ SIGHUP received ..");
            agent.handle(ControlEvent::SoftRestart(SignalKind::Terminate))
        }
        Event::Signal(sig) => {
            warn!("- Unexpected signal {} ..", sig);
            Flow::Continue
        }
        Event::File(fd, data) if fd == control.fd() => {
            for input in control.feed(data) {
                match input {
                    Input::Control(event) => {
                        match agent.current() {
                            Some(pid) => info!("+ Magic KeyPress ({}) pid={} ..", event.label(), pid),
                            None => info!("+ Magic KeyPress ({}) ..", event.label()),
                        }
                        if agent.handle(event) == Flow::Quit {
                            // anything queued behind quit is dropped
                            return Flow::Quit;
                        }
                    }
                    Input::Unknown(line) => warn!("  - Unrecognized key {:?} ..", line),
                }
            }
            Flow::Continue
        }
        Event::File(fd, _) => {
            warn!("- Data on unexpected fd={} ..", fd);
            Flow::Continue
        }
    }
}

/// Starts the child when `autostart` is set, before any event is looked at,
/// then runs the loop.
pub fn supervise<W, M>(
    agent: &mut Agent<M>,
    watcher: &mut W,
    control: &mut ControlChannel,
    autostart: bool,
) -> io::Result<()>
where
    W: AsWatcher,
    M: AsChildManager,
{
    if autostart {
        agent.start();
    }
    run(agent, watcher, control)
}

/// Processes events until a quit request comes in.
pub fn run<W, M>(agent: &mut Agent<M>, watcher: &mut W, control: &mut ControlChannel) -> io::Result<()>
where
    W: AsWatcher,
    M: AsChildManager,
{
    loop {
        if let Some(event) = watcher.poll_block()? {
            if handle_event(event, agent, control) == Flow::Quit {
                return Ok(());
            }
        }
    }
}
