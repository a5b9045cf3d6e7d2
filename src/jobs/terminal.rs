//! Controlling-terminal handling for job control.

use std::os::fd::RawFd;

use nix::unistd::Pid;

/// The shell's view of its controlling terminal. Present only when the
/// shell is interactive and stdin is a tty.
#[derive(Debug, Clone, Copy)]
pub struct TerminalControl {
    tty_fd: RawFd,
    shell_pgid: Pid,
}

impl TerminalControl {
    /// Acquire the terminal: put the shell in its own process group and
    /// take terminal ownership. Returns `None` when there is no tty.
    pub fn acquire() -> Option<Self> {
        let tty_fd = open_tty()?;
        let shell_pid = nix::unistd::getpid();
        // The shell may already be a process-group leader (login shell).
        let _ = nix::unistd::setpgid(shell_pid, shell_pid);
        let control = TerminalControl { tty_fd, shell_pgid: nix::unistd::getpgrp() };
        control.give_to(control.shell_pgid);
        Some(control)
    }

    pub fn shell_pgid(&self) -> Pid {
        self.shell_pgid
    }

    pub fn give_to(&self, pgid: Pid) {
        unsafe { libc::tcsetpgrp(self.tty_fd, pgid.as_raw()) };
    }

    /// Transfer the terminal to a foreground job, restoring it to the
    /// shell when the guard drops, on every exit path.
    pub fn foreground_guard(&self, pgid: Pid) -> ForegroundGuard {
        self.give_to(pgid);
        ForegroundGuard { control: *self }
    }
}

pub struct ForegroundGuard {
    control: TerminalControl,
}

impl Drop for ForegroundGuard {
    fn drop(&mut self) {
        self.control.give_to(self.control.shell_pgid);
    }
}

/// Find a usable tty fd: /dev/tty, else the first standard fd that is a
/// terminal.
fn open_tty() -> Option<RawFd> {
    use std::os::fd::IntoRawFd;
    if let Ok(file) = std::fs::OpenOptions::new().read(true).write(true).open("/dev/tty") {
        let fd = file.into_raw_fd();
        unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
        return Some(fd);
    }
    for fd in [2, 0, 1] {
        if unsafe { libc::isatty(fd) } == 1 {
            return Some(fd);
        }
    }
    None
}
