//! An owned file descriptor with a co-located buffer attached.
//!
//! Bundling the fd with the buffer its reads land in means anything that can
//! still reference the descriptor can also reference the bytes last read from
//! it, whatever backend drives the I/O.
use nix::errno::Errno;

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

#[derive(Debug)]
pub struct BufFd {
    fd: OwnedFd,
    buffer: Box<[u8]>,
    curr_len: usize,
}

impl BufFd {
    pub fn new(fd: OwnedFd, bufsize: usize) -> Self {
        Self {
            fd,
            buffer: vec![0; bufsize].into_boxed_slice(),
            curr_len: 0,
        }
    }

    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.curr_len]
    }

    /// Reads whatever is available, returning the number of bytes now held.
    pub fn read(&mut self) -> Result<usize, Errno> {
        match nix::unistd::read(self.fd.as_raw_fd(), &mut self.buffer) {
            Ok(n) => {
                self.curr_len = n;
                Ok(n)
            }
            Err(Errno::EAGAIN) => {
                // level-triggered epoll will call us again once data shows up
                self.curr_len = 0;
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }
}
