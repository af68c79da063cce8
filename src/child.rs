//! Owns the single supervised process from fork to reap.
//!
//! The manager is the only writer of the child slot. It never decides when
//! to start or kill; the [`Agent`](crate::agent::Agent) does that through
//! [`AsChildManager`].
use std::{
    ffi::CStr,
    fmt,
    fs::File,
    os::fd::{AsRawFd, RawFd},
    path::PathBuf,
};

use nix::{
    errno::Errno,
    libc,
    sys::{
        signal::{kill, signal, SigHandler, SigSet, Signal},
        wait::{waitpid, WaitPidFlag, WaitStatus},
    },
    unistd::{dup2, fork, ForkResult, Pid},
};
use tracing::{debug, error, warn};

use crate::{
    control::SignalKind,
    error::{SignalError, SpawnError},
    exec_args::ExecArgs,
    output, sysexits,
};

/// Exit status of a child whose image could not be loaded.
pub const EXIT_UNAVAILABLE: i32 = sysexits::EX_UNAVAILABLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReport {
    Exited(i32),
    Signaled(Signal, bool),
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Exited(EXIT_UNAVAILABLE) => {
                write!(f, "status={EXIT_UNAVAILABLE}, executable unavailable")
            }
            Self::Exited(code) => write!(f, "status={code}"),
            Self::Signaled(sig, true) => write!(f, "sig={sig}, core dumped"),
            Self::Signaled(sig, false) => write!(f, "sig={sig}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exit {
    pub pid: Pid,
    pub report: ExitReport,
}

pub trait AsChildManager {
    /// The tracked child, if any.
    fn current(&self) -> Option<Pid>;

    fn spawn(&mut self) -> Result<Pid, SpawnError>;

    fn signal(&mut self, kind: SignalKind) -> Result<(), SignalError>;

    /// Collects every child that exited since the last call. Never blocks.
    fn reap_exited(&mut self) -> Vec<Exit>;
}

pub struct ChildManager {
    exec: ExecArgs,
    output: Option<PathBuf>,
    child: Option<Pid>,
}

impl ChildManager {
    pub fn new(exec: ExecArgs, output: Option<PathBuf>) -> Self {
        Self {
            exec,
            output,
            child: None,
        }
    }

    fn open_output(&self) -> Option<File> {
        let path = self.output.as_deref()?;
        match output::open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("    - Can't open {}: {}, output not redirected", path.display(), e);
                None
            }
        }
    }

    fn forget(&mut self, pid: Pid, report: ExitReport) -> Exit {
        if self.child == Some(pid) {
            self.child = None;
        } else {
            debug!("reaped untracked pid={}", pid);
        }
        Exit { pid, report }
    }
}

impl AsChildManager for ChildManager {
    fn current(&self) -> Option<Pid> {
        self.child
    }

    fn spawn(&mut self) -> Result<Pid, SpawnError> {
        if let Some(pid) = self.child {
            return Err(SpawnError::AlreadyRunning(pid));
        }

        let prog = self.exec.program();
        let argv = self.exec.to_argv();
        debug!("exec {} as {:?}", self.exec.name(), prog);
        let out = self.open_output();

        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                // the child holds its own copy of the output fd
                drop(out);
                self.child = Some(child);
                Ok(child)
            }
            Ok(ForkResult::Child) => exec_child(&prog, &argv, out.as_ref().map(|f| f.as_raw_fd())),
            Err(e) => Err(SpawnError::Fork(e)),
        }
    }

    fn signal(&mut self, kind: SignalKind) -> Result<(), SignalError> {
        let pid = self.child.ok_or(SignalError::NoSuchProcess)?;
        kill(pid, kind.signal()).map_err(|e| match e {
            Errno::ESRCH => SignalError::NoSuchProcess,
            e => SignalError::Kill(e),
        })
    }

    fn reap_exited(&mut self) -> Vec<Exit> {
        let mut exits = Vec::new();
        loop {
            match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, status)) => {
                    exits.push(self.forget(pid, ExitReport::Exited(status)));
                }
                Ok(WaitStatus::Signaled(pid, sig, core)) => {
                    exits.push(self.forget(pid, ExitReport::Signaled(sig, core)));
                }
                Ok(WaitStatus::StillAlive) => break,
                Err(Errno::ECHILD) => break, // No more children
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    error!("Error in waitpid: {}", e);
                    break;
                }
                _ => {}
            }
        }
        exits
    }
}

/// Runs in the forked child: only async-signal-safe calls from here on.
fn exec_child(prog: &CStr, argv: &[*const libc::c_char], out: Option<RawFd>) -> ! {
    if let Some(fd) = out {
        let _ = dup2(fd, libc::STDOUT_FILENO);
        let _ = dup2(fd, libc::STDERR_FILENO);
    }

    // The agent blocks the signals it reads through signalfd, and masks are
    // inherited across exec.
    unsafe {
        let _ = signal(Signal::SIGCHLD, SigHandler::SigDfl);
        let _ = signal(Signal::SIGHUP, SigHandler::SigDfl);
    }
    let _ = SigSet::empty().thread_set_mask();

    unsafe {
        libc::execvp(prog.as_ptr(), argv.as_ptr());
    }

    let msg = b"    - exec failed\n";
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr() as *const _, msg.len());
        libc::_exit(EXIT_UNAVAILABLE)
    }
}

/// Scripted stand-in used by the state machine tests.
#[cfg(test)]
pub mod fake {
    use super::*;

    #[derive(Default)]
    pub struct FakeManager {
        pub child: Option<Pid>,
        pub next_pid: i32,
        pub spawns: usize,
        pub signals: Vec<SignalKind>,
        /// Exits reported by the next `reap_exited`.
        pub exited: Vec<Exit>,
        pub fail_spawn: bool,
    }

    impl FakeManager {
        pub fn new() -> Self {
            Self {
                next_pid: 100,
                ..Self::default()
            }
        }

        /// The tracked child dies with `report`.
        pub fn die(&mut self, report: ExitReport) {
            if let Some(pid) = self.child {
                self.exited.push(Exit { pid, report });
            }
        }
    }

    impl AsChildManager for FakeManager {
        fn current(&self) -> Option<Pid> {
            self.child
        }

        fn spawn(&mut self) -> Result<Pid, SpawnError> {
            self.spawns += 1;
            if let Some(pid) = self.child {
                return Err(SpawnError::AlreadyRunning(pid));
            }
            if self.fail_spawn {
                return Err(SpawnError::Fork(Errno::EAGAIN));
            }
            let pid = Pid::from_raw(self.next_pid);
            self.next_pid += 1;
            self.child = Some(pid);
            Ok(pid)
        }

        fn signal(&mut self, kind: SignalKind) -> Result<(), SignalError> {
            self.child.ok_or(SignalError::NoSuchProcess)?;
            self.signals.push(kind);
            Ok(())
        }

        fn reap_exited(&mut self) -> Vec<Exit> {
            let exits = std::mem::take(&mut self.exited);
            for exit in &exits {
                if self.child == Some(exit.pid) {
                    self.child = None;
                }
            }
            exits
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, thread, time::Duration};

    use serial_test::serial;

    use super::*;

    fn manager(args: &[&str], output: Option<PathBuf>) -> ChildManager {
        let owned: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        ChildManager::new(ExecArgs::new(&owned).unwrap(), output)
    }

    fn wait_for_exit(manager: &mut ChildManager) -> Vec<Exit> {
        for _ in 0..500 {
            let exits = manager.reap_exited();
            if !exits.is_empty() {
                return exits;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("child never exited");
    }

    #[test]
    #[serial]
    fn reaps_exit_status_and_clears_slot() {
        let mut m = manager(&["sh", "-c", "exit 3"], None);
        let pid = m.spawn().unwrap();
        assert_eq!(m.current(), Some(pid));

        let exits = wait_for_exit(&mut m);
        assert_eq!(
            exits,
            vec![Exit {
                pid,
                report: ExitReport::Exited(3)
            }]
        );
        assert_eq!(m.current(), None);
        assert!(m.reap_exited().is_empty());
    }

    #[test]
    #[serial]
    fn refuses_second_spawn_while_tracked() {
        let mut m = manager(&["sleep", "30"], None);
        let pid = m.spawn().unwrap();
        assert!(matches!(m.spawn(), Err(SpawnError::AlreadyRunning(p)) if p == pid));

        m.signal(SignalKind::Kill).unwrap();
        let exits = wait_for_exit(&mut m);
        assert_eq!(exits[0].report, ExitReport::Signaled(Signal::SIGKILL, false));
    }

    #[test]
    #[serial]
    fn terminate_delivers_sigterm() {
        let mut m = manager(&["sleep", "30"], None);
        m.spawn().unwrap();
        m.signal(SignalKind::Terminate).unwrap();
        let exits = wait_for_exit(&mut m);
        assert_eq!(exits[0].report, ExitReport::Signaled(Signal::SIGTERM, false));
    }

    #[test]
    #[serial]
    fn missing_executable_exits_unavailable() {
        let mut m = manager(&["wmagent-no-such-wm"], None);
        m.spawn().unwrap();
        let exits = wait_for_exit(&mut m);
        assert_eq!(exits[0].report, ExitReport::Exited(EXIT_UNAVAILABLE));
        assert!(exits[0].report.to_string().contains("unavailable"));
    }

    #[test]
    fn signal_without_child_is_refused() {
        let mut m = manager(&["true"], None);
        assert_eq!(m.signal(SignalKind::Abort), Err(SignalError::NoSuchProcess));
    }

    #[test]
    #[serial]
    fn output_is_redirected_after_separator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wm.out");
        let mut m = manager(&["sh", "-c", "echo out; echo err >&2"], Some(path.clone()));
        m.spawn().unwrap();
        wait_for_exit(&mut m);

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("------------[ "));
        let rest: Vec<_> = lines.collect();
        assert!(rest.contains(&"out"));
        assert!(rest.contains(&"err"));
    }

    #[test]
    #[serial]
    fn unopenable_output_still_starts_child() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = manager(&["true"], Some(dir.path().join("missing/wm.out")));
        m.spawn().unwrap();
        let exits = wait_for_exit(&mut m);
        assert_eq!(exits[0].report, ExitReport::Exited(0));
    }

    #[test]
    #[serial]
    fn child_starts_with_clear_signal_mask() {
        let mut blocked = SigSet::empty();
        blocked.add(Signal::SIGHUP);
        blocked.thread_block().unwrap();

        let mut m = manager(&["sleep", "30"], None);
        m.spawn().unwrap();
        // would be held pending forever if the mask leaked into the child
        thread::sleep(Duration::from_millis(50));
        kill(m.current().unwrap(), Signal::SIGHUP).unwrap();
        let exits = wait_for_exit(&mut m);
        blocked.thread_unblock().unwrap();
        assert_eq!(exits[0].report, ExitReport::Signaled(Signal::SIGHUP, false));
    }
}
