use nix::{
    errno::Errno,
    sys::{
        epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout},
        signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal},
        signalfd::{SfdFlags, SignalFd},
    },
};
use std::{
    collections::HashMap,
    io,
    os::{
        fd::{OwnedFd, RawFd},
        unix::io::AsRawFd,
    },
};
use tracing::warn;

use crate::buffd::BufFd;

use super::{AsWatcher, Event};

pub struct EpollWatcher {
    mask: SigSet,
    event_buffer: [EpollEvent; 1],
    signal_fd: SignalFd,
    epoll: Epoll,
    fdstore: HashMap<RawFd, BufFd>,
}

impl EpollWatcher {
    pub fn new() -> io::Result<Self> {
        let mask = SigSet::empty();

        // Signals are added to the mask as they get watched
        let signal_fd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)?;

        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;

        // Register the signal fd with epoll
        let event = EpollEvent::new(EpollFlags::EPOLLIN, signal_fd.as_raw_fd() as _);
        epoll.add(&signal_fd, event)?;

        Ok(Self {
            mask,
            event_buffer: [EpollEvent::empty(); 1],
            signal_fd,
            epoll,
            fdstore: HashMap::new(),
        })
    }

    fn epoll(&mut self, timeout: EpollTimeout) -> io::Result<Option<Event<'_>>> {
        let num_fds = match self.epoll.wait(&mut self.event_buffer, timeout) {
            Ok(n) => n,
            Err(Errno::EINTR) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if num_fds == 0 {
            return Ok(None);
        }

        let data = self.event_buffer[0].data();

        if data == self.signal_fd.as_raw_fd() as u64 {
            // None means another reader got there first
            match self.signal_fd.read_signal()? {
                Some(siginfo) => Ok(Some(Event::Signal(Signal::try_from(
                    siginfo.ssi_signo as i32,
                )?))),
                None => Ok(None),
            }
        } else if let Some(buf_fd) = self.fdstore.get_mut(&(data as RawFd)) {
            if buf_fd.read()? > 0 {
                Ok(Some(Event::File(data as _, buf_fd.data())))
            } else {
                Ok(None)
            }
        } else {
            warn!("received an event for fd={} not in the store", data);
            Ok(None)
        }
    }
}

impl AsWatcher for EpollWatcher {
    fn watch_signal(&mut self, signal: Signal) -> io::Result<()> {
        if signal == Signal::SIGCHLD {
            // Only exits matter. Stopping or continuing the child must not
            // look like a state change.
            let action = SigAction::new(SigHandler::SigDfl, SaFlags::SA_NOCLDSTOP, SigSet::empty());
            unsafe { sigaction(Signal::SIGCHLD, &action) }?;
        }

        // Block it so it doesn't interrupt other syscalls and stays pending
        // for the signalfd
        let mut single = SigSet::empty();
        single.add(signal);
        single.thread_block()?;
        self.mask.add(signal);
        self.signal_fd.set_mask(&self.mask)?;
        Ok(())
    }

    fn watch_fd(&mut self, fd: OwnedFd, bufsize: usize) -> io::Result<RawFd> {
        let raw = fd.as_raw_fd();
        if self.fdstore.contains_key(&raw) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("fd={raw} is already being watched"),
            ));
        }
        let buf_fd = BufFd::new(fd, bufsize);
        // register interest of fd to kernel
        self.epoll
            .add(buf_fd.as_fd(), EpollEvent::new(EpollFlags::EPOLLIN, raw as _))?;
        // become owner of fd and its userspace buffer
        self.fdstore.insert(raw, buf_fd);
        Ok(raw)
    }

    fn poll_block(&mut self) -> io::Result<Option<Event<'_>>> {
        self.epoll(EpollTimeout::NONE)
    }
}
