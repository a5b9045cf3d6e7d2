//! Signal plumbing: the SIGCHLD self-pipe and signal dispositions.
//!
//! The SIGCHLD handler does exactly one async-signal-safe thing: write
//! a byte to the self-pipe. All reaping happens in the main loop via
//! `waitpid(WNOHANG)`. Trapped signals use the same pipe to wake any
//! blocking wait, with a pending flag per signal number read back on
//! the main loop side.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

const MAX_SIGNAL: usize = 64;

static SELF_PIPE_READ: AtomicI32 = AtomicI32::new(-1);
static SELF_PIPE_WRITE: AtomicI32 = AtomicI32::new(-1);
static PENDING: [AtomicBool; MAX_SIGNAL + 1] = {
    #[allow(clippy::declare_interior_mutable_const)]
    const FALSE: AtomicBool = AtomicBool::new(false);
    [FALSE; MAX_SIGNAL + 1]
};

extern "C" fn on_sigchld(_sig: libc::c_int) {
    wake();
}

extern "C" fn on_trapped_signal(sig: libc::c_int) {
    if (0..=MAX_SIGNAL as i32).contains(&sig) {
        PENDING[sig as usize].store(true, Ordering::Relaxed);
    }
    wake();
}

/// The only code shared with signal context. `write` to a pipe is
/// async-signal-safe; a full pipe just drops the wakeup byte, which is
/// fine because the buffer being full already guarantees a wakeup.
fn wake() {
    let fd = SELF_PIPE_WRITE.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte = [1u8];
        unsafe {
            libc::write(fd, byte.as_ptr() as *const libc::c_void, 1);
        }
    }
}

/// A forked child shares the pipe object with its parent; reading from
/// it would steal the parent's wakeups. Children that keep running
/// shell code replace it with a fresh pipe.
pub fn reinit_in_child() {
    let read_fd = SELF_PIPE_READ.swap(-1, Ordering::Relaxed);
    let write_fd = SELF_PIPE_WRITE.swap(-1, Ordering::Relaxed);
    for fd in [read_fd, write_fd] {
        if fd >= 0 {
            unsafe { libc::close(fd) };
        }
    }
    for flag in PENDING.iter() {
        flag.store(false, Ordering::Relaxed);
    }
    let _ = init();
}

/// Create the self-pipe and install the SIGCHLD handler. Idempotent.
pub fn init() -> nix::Result<()> {
    if SELF_PIPE_WRITE.load(Ordering::Relaxed) >= 0 {
        return Ok(());
    }
    let (read_end, write_end) = nix::unistd::pipe()?;
    {
        use std::os::fd::AsRawFd;
        for fd in [read_end.as_raw_fd(), write_end.as_raw_fd()] {
            unsafe {
                libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK);
                libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            }
        }
    }
    {
        use std::os::fd::IntoRawFd;
        SELF_PIPE_READ.store(read_end.into_raw_fd(), Ordering::Relaxed);
        SELF_PIPE_WRITE.store(write_end.into_raw_fd(), Ordering::Relaxed);
    }

    let action = SigAction::new(
        SigHandler::Handler(on_sigchld),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGCHLD, &action)? };
    Ok(())
}

/// Block until the self-pipe has a byte, then drain it. Callers loop
/// `waitpid` afterwards; coalesced SIGCHLDs therefore cannot strand a
/// child.
pub fn wait_for_wakeup() {
    let fd = SELF_PIPE_READ.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }
    let mut buf = [0u8; 64];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n > 0 {
            break;
        }
        let err = Errno::last();
        match err {
            Errno::EINTR => continue,
            Errno::EAGAIN => {
                // Non-blocking pipe with nothing buffered: poll for
                // readability, interruptible by any signal.
                let mut pfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
                unsafe { libc::poll(&mut pfd, 1, -1) };
            }
            _ => break,
        }
    }
    drain();
}

/// Empty the pipe without blocking.
pub fn drain() {
    let fd = SELF_PIPE_READ.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }
    let mut buf = [0u8; 64];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n <= 0 {
            break;
        }
    }
}

/// Register a handler for a trapped signal; delivery is deferred to the
/// main loop via [`take_pending`].
pub fn catch_signal(sig: Signal) -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_trapped_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { sigaction(sig, &action)? };
    Ok(())
}

pub fn ignore_signal(sig: Signal) -> nix::Result<()> {
    let action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    unsafe { sigaction(sig, &action)? };
    Ok(())
}

pub fn default_signal(sig: Signal) -> nix::Result<()> {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    unsafe { sigaction(sig, &action)? };
    Ok(())
}

/// Signal numbers whose traps fired since the last call.
pub fn take_pending() -> Vec<i32> {
    let mut fired = Vec::new();
    for (sig, flag) in PENDING.iter().enumerate() {
        if flag.swap(false, Ordering::Relaxed) {
            fired.push(sig as i32);
        }
    }
    fired
}

/// Job-control signals the interactive shell must not die from or be
/// stopped by.
pub const INTERACTIVE_IGNORED: &[Signal] = &[
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// Put the interactive shell's dispositions in place.
pub fn set_interactive_dispositions() {
    for &sig in INTERACTIVE_IGNORED {
        let _ = ignore_signal(sig);
    }
}

/// Reset everything a child must not inherit. One helper so every fork
/// site applies the same policy.
pub fn reset_child_signals() {
    for sig in [
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGTERM,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGPIPE,
        Signal::SIGCHLD,
    ] {
        let _ = default_signal(sig);
    }
}
