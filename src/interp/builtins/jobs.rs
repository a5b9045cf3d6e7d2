//! Job-control builtins: `jobs`, `fg`, `bg`, `wait`, `kill`.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;

use crate::interp::control::ExecResult;
use crate::jobs::{self, JobState, ProcState};
use crate::shell::Shell;

pub fn builtin_jobs(shell: &mut Shell, _argv: &[String]) -> ExecResult<i32> {
    jobs::reap(&mut shell.jobs);
    let current = shell.jobs.current_id();
    for job in shell.jobs.iter() {
        let marker = if Some(job.id) == current { '+' } else { '-' };
        let state = match job.state() {
            JobState::Running => "Running",
            JobState::Stopped => "Stopped",
            JobState::Done => "Done",
        };
        super::outln(format!("[{}]{}  {:<22}{}", job.id, marker, state, job.command));
    }
    Ok(0)
}

fn resolve_job(shell: &mut Shell, argv: &[String], name: &str) -> Option<usize> {
    jobs::reap(&mut shell.jobs);
    let id = match argv.get(1) {
        Some(spec) => shell.jobs.resolve(spec),
        None => shell.jobs.current_id(),
    };
    if id.is_none() {
        match argv.get(1) {
            Some(spec) => shell.diagnose(&format!("{name}: {spec}: no such job")),
            None => shell.diagnose(&format!("{name}: current: no such job")),
        }
    }
    id
}

pub fn builtin_fg(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let Some(id) = resolve_job(shell, argv, "fg") else {
        return Ok(1);
    };
    let (pgid, command) = match shell.jobs.get(id) {
        Some(job) => (job.pgid, job.command.clone()),
        None => return Ok(1),
    };
    eprintln!("{command}");
    mark_running(shell, id);
    let _ = killpg(pgid, Signal::SIGCONT);
    shell.resume_foreground(id)
}

pub fn builtin_bg(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let Some(id) = resolve_job(shell, argv, "bg") else {
        return Ok(1);
    };
    let (pgid, command) = match shell.jobs.get(id) {
        Some(job) => (job.pgid, job.command.clone()),
        None => return Ok(1),
    };
    mark_running(shell, id);
    let _ = killpg(pgid, Signal::SIGCONT);
    eprintln!("[{id}]+ {command} &");
    Ok(0)
}

fn mark_running(shell: &mut Shell, id: usize) {
    if let Some(job) = shell.jobs.get_mut(id) {
        for proc_entry in &mut job.procs {
            if matches!(proc_entry.state, ProcState::Stopped(_)) {
                proc_entry.state = ProcState::Running;
            }
        }
        job.notified = false;
    }
}

pub fn builtin_wait(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    if argv.len() == 1 {
        // Wait for every job; status 0.
        let ids: Vec<usize> = shell.jobs.iter().map(|j| j.id).collect();
        for id in ids {
            jobs::wait_for_job(&mut shell.jobs, id);
            if let Some(job) = shell.jobs.get_mut(id) {
                if job.state() == JobState::Done {
                    job.notified = true;
                }
            }
        }
        shell.jobs.gc();
        return Ok(0);
    }

    let mut status = 0;
    for spec in &argv[1..] {
        // A plain pid may name a job too; already-reaped jobs still
        // carry their stored status.
        let id = if let Ok(pid) = spec.parse::<i32>() {
            shell
                .jobs
                .job_of_pid(Pid::from_raw(pid))
                .map(|j| j.id)
                .or_else(|| shell.jobs.resolve(spec))
        } else {
            shell.jobs.resolve(spec)
        };
        let Some(id) = id else {
            shell.diagnose(&format!("wait: {spec}: no such job"));
            status = 127;
            continue;
        };
        let state = jobs::wait_for_job(&mut shell.jobs, id);
        status = match state {
            JobState::Done => {
                let s = shell.jobs.get(id).map(|j| j.status()).unwrap_or(0);
                if let Some(job) = shell.jobs.get_mut(id) {
                    job.notified = true;
                }
                s
            }
            JobState::Stopped => 128 + libc::SIGTSTP,
            JobState::Running => 0,
        };
    }
    shell.jobs.gc();
    Ok(status)
}

pub fn builtin_kill(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let mut signal = Signal::SIGTERM;
    let mut args = &argv[1..];

    if let Some(first) = args.first() {
        if first == "-l" {
            for sig in Signal::iterator() {
                let name = sig.as_str().trim_start_matches("SIG");
                super::out(format!("{name} "));
            }
            super::outln("");
            return Ok(0);
        }
        if first == "-s" {
            let Some(name) = args.get(1) else {
                shell.diagnose("kill: -s requires a signal name");
                return Ok(2);
            };
            match parse_signal(name) {
                Some(sig) => signal = sig,
                None => {
                    shell.diagnose(&format!("kill: {name}: invalid signal specification"));
                    return Ok(1);
                }
            }
            args = &args[2..];
        } else if let Some(name) = first.strip_prefix('-') {
            if !name.is_empty() && name != "-" {
                match parse_signal(name) {
                    Some(sig) => {
                        signal = sig;
                        args = &args[1..];
                    }
                    None => {
                        shell.diagnose(&format!("kill: {first}: invalid signal specification"));
                        return Ok(1);
                    }
                }
            }
        }
    }

    let mut status = 0;
    for target in args {
        if target == "--" {
            continue;
        }
        let result = if target.starts_with('%') {
            jobs::reap(&mut shell.jobs);
            match shell.jobs.resolve(target) {
                Some(id) => {
                    let pgid = shell.jobs.get(id).unwrap().pgid;
                    killpg(pgid, signal)
                }
                None => {
                    shell.diagnose(&format!("kill: {target}: no such job"));
                    status = 1;
                    continue;
                }
            }
        } else {
            match target.parse::<i32>() {
                Ok(pid) => nix::sys::signal::kill(Pid::from_raw(pid), signal),
                Err(_) => {
                    shell.diagnose(&format!("kill: {target}: arguments must be process or job IDs"));
                    status = 1;
                    continue;
                }
            }
        };
        if let Err(e) = result {
            shell.diagnose(&format!("kill: {target}: {e}"));
            status = 1;
        }
    }
    Ok(status)
}

/// `TERM`, `SIGTERM`, or a number.
pub fn parse_signal(text: &str) -> Option<Signal> {
    if let Ok(n) = text.parse::<i32>() {
        return Signal::try_from(n).ok();
    }
    let name = text.to_ascii_uppercase();
    let name = if name.starts_with("SIG") { name } else { format!("SIG{name}") };
    Signal::iterator().find(|sig| sig.as_str() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_parsing() {
        assert_eq!(parse_signal("TERM"), Some(Signal::SIGTERM));
        assert_eq!(parse_signal("SIGINT"), Some(Signal::SIGINT));
        assert_eq!(parse_signal("int"), Some(Signal::SIGINT));
        assert_eq!(parse_signal("9"), Some(Signal::SIGKILL));
        assert_eq!(parse_signal("NOPE"), None);
    }
}
