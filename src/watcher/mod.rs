mod interface;
pub use interface::{AsWatcher, Event};

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub use epoll::EpollWatcher as Watcher;
