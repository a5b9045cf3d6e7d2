//! Command substitution: `$(list)` and `` `list` ``.
//!
//! Forks a subshell whose stdout is a capture pipe. The child inherits
//! a copy of the shell state and cannot affect the parent; the parent
//! reads until EOF, reaps that child directly, and strips trailing
//! newlines from the captured text.

use std::io::Read;
use std::os::fd::AsRawFd;

use nix::sys::wait::{waitpid, WaitStatus};

use crate::ast::CommandList;
use crate::interp::control::{ExecResult, Interrupt};
use crate::jobs::launcher::Spawner;
use crate::shell::Shell;

pub fn command_substitute(shell: &mut Shell, body: &CommandList) -> ExecResult<String> {
    let (read_end, write_end) = nix::unistd::pipe().map_err(|e| {
        Interrupt::Error(crate::interp::control::ShellError::System(e.to_string()))
    })?;
    let read_fd = read_end.as_raw_fd();
    let write_fd = write_end.as_raw_fd();

    let mut spawner = Spawner::new(false, false).map_err(|e| {
        Interrupt::Error(crate::interp::control::ShellError::System(e.to_string()))
    })?;
    let pid = spawner
        .spawn(|| {
            unsafe {
                libc::close(read_fd);
                libc::dup2(write_fd, 1);
                libc::close(write_fd);
            }
            shell.enter_subshell();
            shell.run_list_to_status(body)
        })
        .map_err(|e| Interrupt::Error(crate::interp::control::ShellError::System(e.to_string())))?;

    drop(write_end);
    let mut output = String::new();
    {
        let mut file = std::fs::File::from(read_end);
        let _ = file.read_to_string(&mut output);
    }

    let status = loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => break code,
            Ok(WaitStatus::Signaled(_, sig, _)) => break 128 + sig as i32,
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => break 0,
        }
    };
    shell.state.last_status = status;

    while output.ends_with('\n') {
        output.pop();
    }
    Ok(output)
}
