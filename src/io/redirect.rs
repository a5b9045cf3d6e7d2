//! File-descriptor redirection.
//!
//! The executor expands redirect targets and hands over resolved
//! operations. Applying them in-process returns a [`RedirGuard`] that
//! saved every clobbered fd with `F_DUPFD_CLOEXEC`; dropping the guard
//! restores the originals in LIFO order on every exit path. Children
//! apply without saving and simply exec with the fds in place.

use std::fs::OpenOptions;
use std::io::{Seek, Write};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};

use crate::interp::control::ShellError;

/// Where saved fds are parked, out of the way of user redirections.
const SAVED_FD_BASE: libc::c_int = 10;

/// Heredoc bodies up to this size go through a pipe; larger ones spill
/// to an unlinked temp file so the pre-fork write cannot block.
const PIPE_BODY_MAX: usize = 4096;

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedRedirect {
    File { fd: RawFd, path: String, mode: OpenMode },
    Dup { fd: RawFd, target: DupTarget },
    /// Heredoc or here-string body served on `fd`.
    Content { fd: RawFd, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// `noclobber` refuses to truncate an existing file.
    Write { noclobber: bool },
    Append,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupTarget {
    Fd(RawFd),
    /// `n>&-` / `n<&-`
    Close,
}

/// Restores the saved fd image when dropped.
#[derive(Debug, Default)]
pub struct RedirGuard {
    /// `(fd, saved)` — `saved` is `None` when the fd was closed before.
    saved: Vec<(RawFd, Option<RawFd>)>,
    active: bool,
}

impl RedirGuard {
    /// Keep the redirections permanently (plain `exec 3<file`).
    pub fn commit(mut self) {
        for (_, saved) in self.saved.drain(..) {
            if let Some(saved_fd) = saved {
                unsafe { libc::close(saved_fd) };
            }
        }
        self.active = false;
    }
}

impl Drop for RedirGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        for (fd, saved) in self.saved.drain(..).rev() {
            match saved {
                Some(saved_fd) => unsafe {
                    libc::dup2(saved_fd, fd);
                    libc::close(saved_fd);
                },
                None => unsafe {
                    libc::close(fd);
                },
            }
        }
    }
}

fn redirect_error(context: &str, message: impl Into<String>) -> ShellError {
    ShellError::Redirect { context: context.to_string(), message: message.into() }
}

/// Apply the redirects. With `save`, the returned guard can undo them;
/// without (in a child that will exec or exit), nothing is saved.
pub fn apply(redirects: &[ResolvedRedirect], save: bool) -> Result<RedirGuard, ShellError> {
    let mut guard = RedirGuard { saved: Vec::new(), active: save };
    for redirect in redirects {
        if let Err(e) = apply_one(redirect, save, &mut guard) {
            // The guard restores what was already applied.
            return Err(e);
        }
    }
    Ok(guard)
}

fn save_fd(fd: RawFd, guard: &mut RedirGuard) {
    let saved = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, SAVED_FD_BASE) };
    guard.saved.push((fd, (saved >= 0).then_some(saved)));
}

fn apply_one(
    redirect: &ResolvedRedirect,
    save: bool,
    guard: &mut RedirGuard,
) -> Result<(), ShellError> {
    match redirect {
        ResolvedRedirect::File { fd, path, mode } => {
            let file = open_target(path, *mode)?;
            if save {
                save_fd(*fd, guard);
            }
            let src = file.into_raw_fd();
            if src != *fd {
                if unsafe { libc::dup2(src, *fd) } < 0 {
                    let err = std::io::Error::last_os_error();
                    unsafe { libc::close(src) };
                    return Err(redirect_error(path, err.to_string()));
                }
                unsafe { libc::close(src) };
            }
            Ok(())
        }
        ResolvedRedirect::Dup { fd, target } => {
            if save {
                save_fd(*fd, guard);
            }
            match target {
                DupTarget::Fd(src) => {
                    if unsafe { libc::dup2(*src, *fd) } < 0 {
                        return Err(redirect_error(
                            &src.to_string(),
                            "bad file descriptor",
                        ));
                    }
                }
                DupTarget::Close => {
                    unsafe { libc::close(*fd) };
                }
            }
            Ok(())
        }
        ResolvedRedirect::Content { fd, body } => {
            let src = content_fd(body)?;
            if save {
                save_fd(*fd, guard);
            }
            if src != *fd {
                if unsafe { libc::dup2(src, *fd) } < 0 {
                    let err = std::io::Error::last_os_error();
                    unsafe { libc::close(src) };
                    return Err(redirect_error("here-document", err.to_string()));
                }
                unsafe { libc::close(src) };
            }
            Ok(())
        }
    }
}

fn open_target(path: &str, mode: OpenMode) -> Result<std::fs::File, ShellError> {
    let mut options = OpenOptions::new();
    match mode {
        OpenMode::Read => {
            options.read(true);
        }
        OpenMode::Write { noclobber } => {
            options.write(true).create(true);
            if noclobber {
                // O_EXCL first; an existing non-regular target (like
                // /dev/null) is still allowed, without truncation.
                match OpenOptions::new().write(true).create_new(true).open(path) {
                    Ok(file) => return Ok(file),
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        let is_regular =
                            std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(true);
                        if is_regular {
                            return Err(redirect_error(path, "cannot overwrite existing file"));
                        }
                    }
                    Err(e) => return Err(redirect_error(path, e.to_string())),
                }
            } else {
                options.truncate(true);
            }
        }
        OpenMode::Append => {
            options.append(true).create(true);
        }
        OpenMode::ReadWrite => {
            options.read(true).write(true).create(true);
        }
    }
    options.open(path).map_err(|e| {
        let message = if matches!(mode, OpenMode::Write { noclobber: true })
            && e.kind() == std::io::ErrorKind::AlreadyExists
        {
            "cannot overwrite existing file".to_string()
        } else {
            e.to_string()
        };
        redirect_error(path, message)
    })
}

/// Produce a readable fd serving `body`: a pre-filled pipe for small
/// bodies, an unlinked temp file otherwise.
fn content_fd(body: &str) -> Result<RawFd, ShellError> {
    if body.len() <= PIPE_BODY_MAX {
        let (read_end, write_end) = nix::unistd::pipe()
            .map_err(|e| redirect_error("here-document", e.to_string()))?;
        let mut remaining = body.as_bytes();
        while !remaining.is_empty() {
            match nix::unistd::write(&write_end, remaining) {
                Ok(n) => remaining = &remaining[n..],
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(redirect_error("here-document", e.to_string())),
            }
        }
        drop(write_end);
        Ok(read_end.into_raw_fd())
    } else {
        let mut file = tempfile::tempfile()
            .map_err(|e| redirect_error("here-document", e.to_string()))?;
        file.write_all(body.as_bytes())
            .and_then(|_| file.rewind())
            .map_err(|e| redirect_error("here-document", e.to_string()))?;
        Ok(file.into_raw_fd())
    }
}

/// Check that an fd is open; `n>&m` with a closed `m` is an error.
pub fn fd_is_open(fd: RawFd) -> bool {
    unsafe { libc::fcntl(fd, libc::F_GETFD) >= 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_fd_to_string(fd: RawFd) -> String {
        let mut out = String::new();
        let mut file = unsafe { <std::fs::File as std::os::fd::FromRawFd>::from_raw_fd(fd) };
        file.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn content_small_goes_through_pipe() {
        let fd = content_fd("hello\n").unwrap();
        assert_eq!(read_fd_to_string(fd), "hello\n");
    }

    #[test]
    fn content_large_spills_to_file() {
        let body = "x".repeat(PIPE_BODY_MAX * 4);
        let fd = content_fd(&body).unwrap();
        assert_eq!(read_fd_to_string(fd), body);
    }

    #[test]
    fn noclobber_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing");
        std::fs::write(&path, "old").unwrap();
        let err = open_target(
            path.to_str().unwrap(),
            OpenMode::Write { noclobber: true },
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot overwrite"));
        // The clobbering form truncates it.
        open_target(path.to_str().unwrap(), OpenMode::Write { noclobber: false }).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn guard_restores_fds() {
        // Use a high fd that nothing else in the test process touches.
        const FD: RawFd = 9;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        assert!(!fd_is_open(FD));
        {
            let redirects = [ResolvedRedirect::File {
                fd: FD,
                path: path.to_str().unwrap().to_string(),
                mode: OpenMode::Write { noclobber: false },
            }];
            let _guard = apply(&redirects, true).unwrap();
            assert!(fd_is_open(FD));
            nix::unistd::write(
                unsafe { &std::os::fd::BorrowedFd::borrow_raw(FD) },
                b"redirected",
            )
            .unwrap();
        }
        // The guard closed FD again, since it was not open before.
        assert!(!fd_is_open(FD));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "redirected");
    }

    #[test]
    fn failed_redirect_rolls_back() {
        // A different fd from guard_restores_fds; the tests run in
        // parallel threads and fds are process-global.
        const FD: RawFd = 8;
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good");
        let redirects = [
            ResolvedRedirect::File {
                fd: FD,
                path: good.to_str().unwrap().to_string(),
                mode: OpenMode::Write { noclobber: false },
            },
            ResolvedRedirect::File {
                fd: FD,
                path: dir.path().join("no/such/dir").to_str().unwrap().to_string(),
                mode: OpenMode::Read,
            },
        ];
        assert!(apply(&redirects, true).is_err());
        // The first redirect was undone by the returned-error guard.
        assert!(!fd_is_open(FD));
    }
}
