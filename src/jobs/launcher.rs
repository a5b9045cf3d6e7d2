//! The single fork path.
//!
//! Every child the shell creates — pipeline stages, subshells, command
//! substitutions, background lists — goes through [`Spawner`], so
//! signal policy, process-group assignment, and the PGID sync protocol
//! are applied exactly once, consistently.
//!
//! The sync protocol: the first child becomes the group leader and
//! closes both ends of the sync pipe. Every later child blocks on a
//! read of the sync pipe after its own `setpgid`; once the parent has
//! called `setpgid` for every child it closes the write end, the reads
//! return EOF, and the children proceed into user code. No child can
//! run user code before its group membership is settled.

use std::io::Write;
use std::os::fd::{AsRawFd, OwnedFd};

use nix::unistd::{fork, setpgid, ForkResult, Pid};

use crate::jobs::signals;

/// Per-pipeline fork context.
pub struct Spawner {
    /// Process-group handling on: children get their own group.
    job_control: bool,
    /// Background without job control: children ignore INT/QUIT.
    background: bool,
    leader: Option<Pid>,
    sync_read: Option<OwnedFd>,
    sync_write: Option<OwnedFd>,
}

impl Spawner {
    pub fn new(job_control: bool, background: bool) -> nix::Result<Self> {
        let (sync_read, sync_write) = if job_control {
            let (r, w) = nix::unistd::pipe()?;
            (Some(r), Some(w))
        } else {
            (None, None)
        };
        Ok(Spawner { job_control, background, leader: None, sync_read, sync_write })
    }

    /// The pipeline's process group, once the first child exists.
    pub fn pgid(&self) -> Option<Pid> {
        self.leader
    }

    /// Fork one child. `body` runs in the child and its return value
    /// becomes the child's exit status; it must not return if it execs.
    pub fn spawn<F>(&mut self, body: F) -> nix::Result<Pid>
    where
        F: FnOnce() -> i32,
    {
        // Buffered output forked into the child would print twice.
        flush_stdio();

        match unsafe { fork()? } {
            ForkResult::Parent { child } => {
                if self.job_control {
                    let pgid = *self.leader.get_or_insert(child);
                    // Both sides call setpgid; whichever runs first wins
                    // and the other is a no-op.
                    let _ = setpgid(child, pgid);
                }
                Ok(child)
            }
            ForkResult::Child => {
                let code = self.run_child(body);
                let _ = std::io::stdout().flush();
                let _ = std::io::stderr().flush();
                unsafe { libc::_exit(code) }
            }
        }
    }

    fn run_child<F>(&mut self, body: F) -> i32
    where
        F: FnOnce() -> i32,
    {
        signals::reset_child_signals();
        if self.background && !self.job_control {
            // Async lists in a non-job-control shell must not be killed
            // by the terminal's interrupt keys.
            let _ = signals::ignore_signal(nix::sys::signal::Signal::SIGINT);
            let _ = signals::ignore_signal(nix::sys::signal::Signal::SIGQUIT);
        }

        if self.job_control {
            match self.leader {
                None => {
                    // Pipeline leader: own group, no need to wait.
                    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
                    self.sync_read.take();
                    self.sync_write.take();
                }
                Some(leader) => {
                    let _ = setpgid(Pid::from_raw(0), leader);
                    // Drop our copy of the write end, then block until
                    // the parent closes the last one.
                    self.sync_write.take();
                    if let Some(read_end) = self.sync_read.take() {
                        let mut byte = [0u8; 1];
                        loop {
                            let n = unsafe {
                                libc::read(read_end.as_raw_fd(), byte.as_mut_ptr().cast(), 1)
                            };
                            if n >= 0 || nix::errno::Errno::last() != nix::errno::Errno::EINTR {
                                break;
                            }
                        }
                    }
                    // Settled; assert membership once more for safety.
                    let _ = setpgid(Pid::from_raw(0), leader);
                }
            }
        }
        body()
    }

    /// Release the non-leader children: every fork is done and every
    /// `setpgid` has been issued.
    pub fn finish(&mut self) {
        self.sync_write.take();
        self.sync_read.take();
    }
}

impl Drop for Spawner {
    fn drop(&mut self) {
        self.finish();
    }
}

pub fn flush_stdio() {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}

/// Exec an external command; only returns on failure, with the exit
/// status the shell reports (127 not found, 126 not executable).
pub fn exec_external(path: &str, argv: &[String], env: &[(String, String)]) -> i32 {
    use std::ffi::CString;

    let Ok(c_path) = CString::new(path) else {
        eprintln!("oxsh: {path}: invalid command name");
        return 127;
    };
    let c_argv: Vec<CString> = argv
        .iter()
        .filter_map(|a| CString::new(a.as_str()).ok())
        .collect();
    let c_env: Vec<CString> = env
        .iter()
        .filter_map(|(k, v)| CString::new(format!("{k}={v}")).ok())
        .collect();

    let err = match nix::unistd::execve(&c_path, &c_argv, &c_env) {
        Err(e) => e,
        Ok(infallible) => match infallible {},
    };
    match err {
        nix::errno::Errno::ENOEXEC => {
            // Script without a #! line: run it with sh, as shells do.
            let mut sh_argv = vec![CString::new("sh").unwrap(), c_path.clone()];
            sh_argv.extend(c_argv.into_iter().skip(1));
            let sh = CString::new("/bin/sh").unwrap();
            let _ = nix::unistd::execve(&sh, &sh_argv, &c_env);
            eprintln!("oxsh: {path}: cannot execute");
            126
        }
        nix::errno::Errno::ENOENT => {
            eprintln!("oxsh: {path}: No such file or directory");
            127
        }
        nix::errno::Errno::EACCES => {
            eprintln!("oxsh: {path}: Permission denied");
            126
        }
        other => {
            eprintln!("oxsh: {path}: {other}");
            126
        }
    }
}

/// Search `PATH` for a command name. Names containing a slash are used
/// as-is without a search.
pub fn find_command(name: &str, path_var: &str) -> Option<std::path::PathBuf> {
    if name.contains('/') {
        return Some(std::path::PathBuf::from(name));
    }
    for dir in path_var.split(':') {
        let dir = if dir.is_empty() { "." } else { dir };
        let candidate = std::path::Path::new(dir).join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_command_with_slash_skips_search() {
        assert_eq!(
            find_command("/bin/sh", "/nonexistent").unwrap(),
            std::path::PathBuf::from("/bin/sh")
        );
    }

    #[test]
    fn find_command_searches_path() {
        let found = find_command("sh", "/usr/bin:/bin").expect("sh not found");
        assert!(found.ends_with("sh"));
    }

    #[test]
    fn find_command_missing() {
        assert!(find_command("definitely-not-a-command-xyzzy", "/usr/bin:/bin").is_none());
    }
}
