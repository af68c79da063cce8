//! The one queue every notification reaches the agent through.
//!
//! Asynchronous OS signals are never handled where they interrupt. A backend
//! blocks them and hands them out as [`Event::Signal`] from the same poll
//! that reports readable descriptors, so the consumer sees a single ordered
//! stream and never has to be re-entrant.
use nix::sys::signal::Signal;
use std::io;
use std::os::fd::{OwnedFd, RawFd};

pub enum Event<'a> {
    Signal(Signal),
    File(RawFd, &'a [u8]),
}

pub trait AsWatcher {
    /// Blocks `signal` for the calling thread and reports it as an event.
    fn watch_signal(&mut self, signal: Signal) -> io::Result<()>;

    /// Takes ownership of `fd` and reports reads of up to `bufsize` bytes.
    fn watch_fd(&mut self, fd: OwnedFd, bufsize: usize) -> io::Result<RawFd>;

    /// Waits until something happens. `None` means the wakeup carried
    /// nothing to report and the caller should poll again.
    fn poll_block(&mut self) -> io::Result<Option<Event<'_>>>;
}
