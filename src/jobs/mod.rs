//! Job tracking and reaping.
//!
//! One [`Job`] per backgrounded list or tracked pipeline, one entry per
//! process. Reaping always loops `waitpid(-1, WNOHANG|WUNTRACED|
//! WCONTINUED)` until the kernel has nothing more to say, so coalesced
//! SIGCHLDs never strand a child. Completed background jobs are
//! reported at the next prompt boundary, not mid-command.

pub mod launcher;
pub mod signals;
pub mod terminal;

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Running,
    /// Stopped by this signal.
    Stopped(i32),
    /// Exit status (`128 + n` for signal deaths).
    Done(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
}

#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub pid: Pid,
    pub state: ProcState,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: usize,
    pub pgid: Pid,
    pub command: String,
    pub procs: Vec<ProcEntry>,
    /// Completed-and-reported jobs are dropped at the prompt boundary.
    pub notified: bool,
}

impl Job {
    pub fn state(&self) -> JobState {
        if self.procs.iter().all(|p| matches!(p.state, ProcState::Done(_))) {
            JobState::Done
        } else if self
            .procs
            .iter()
            .all(|p| !matches!(p.state, ProcState::Running))
        {
            JobState::Stopped
        } else {
            JobState::Running
        }
    }

    /// The job's exit status is its last process's status.
    pub fn status(&self) -> i32 {
        match self.procs.last().map(|p| p.state) {
            Some(ProcState::Done(code)) => code,
            _ => 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
    next_id: usize,
    /// `%+` and `%-`.
    current: Option<usize>,
    previous: Option<usize>,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable { jobs: Vec::new(), next_id: 1, current: None, previous: None }
    }

    pub fn add(&mut self, pgid: Pid, pids: Vec<Pid>, command: String) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.push(Job {
            id,
            pgid,
            command,
            procs: pids
                .into_iter()
                .map(|pid| ProcEntry { pid, state: ProcState::Running })
                .collect(),
            notified: false,
        });
        self.previous = self.current;
        self.current = Some(id);
        id
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn current_id(&self) -> Option<usize> {
        self.current
    }

    /// Resolve a `%` job designator: `%%`/`%+`, `%-`, `%n`, `%prefix`,
    /// `%?substring`.
    pub fn resolve(&self, spec: &str) -> Option<usize> {
        let body = spec.strip_prefix('%').unwrap_or(spec);
        match body {
            "" | "%" | "+" => self.current,
            "-" => self.previous.or(self.current),
            _ => {
                if let Ok(n) = body.parse::<usize>() {
                    return self.get(n).map(|j| j.id);
                }
                if let Some(sub) = body.strip_prefix('?') {
                    return self.jobs.iter().find(|j| j.command.contains(sub)).map(|j| j.id);
                }
                self.jobs
                    .iter()
                    .find(|j| j.command.starts_with(body))
                    .map(|j| j.id)
            }
        }
    }

    /// Apply one wait status to whichever job owns the pid. Returns the
    /// pid's new state.
    pub fn update(&mut self, pid: Pid, state: ProcState) {
        for job in &mut self.jobs {
            if let Some(proc_entry) = job.procs.iter_mut().find(|p| p.pid == pid) {
                proc_entry.state = state;
                if state == ProcState::Running {
                    // SIGCONT: the whole job is running again.
                    job.notified = false;
                }
                return;
            }
        }
    }

    pub fn job_of_pid(&self, pid: Pid) -> Option<&Job> {
        self.jobs.iter().find(|j| j.procs.iter().any(|p| p.pid == pid))
    }

    /// Drop jobs that are done and have been reported; fix `%+`/`%-`.
    pub fn gc(&mut self) {
        self.jobs.retain(|j| !(j.state() == JobState::Done && j.notified));
        let ids: Vec<usize> = self.jobs.iter().map(|j| j.id).collect();
        let alive = |id: Option<usize>| id.filter(|i| ids.contains(i));
        self.current = alive(self.current);
        self.previous = alive(self.previous);
        if self.current.is_none() {
            // Prefer a stopped job, then the most recent.
            self.current = self
                .jobs
                .iter()
                .rev()
                .find(|j| j.state() == JobState::Stopped)
                .or_else(|| self.jobs.last())
                .map(|j| j.id);
        }
        if self.previous == self.current {
            self.previous = None;
        }
    }

    /// Print state changes of background jobs; called at the prompt
    /// boundary. Done jobs become eligible for removal.
    pub fn notify_changes(&mut self) {
        let current = self.current;
        for job in &mut self.jobs {
            if job.notified {
                continue;
            }
            let marker = if Some(job.id) == current { '+' } else { '-' };
            match job.state() {
                JobState::Done => {
                    let status = job.status();
                    if status == 0 {
                        eprintln!("[{}]{}  Done                    {}", job.id, marker, job.command);
                    } else {
                        eprintln!(
                            "[{}]{}  Exit {:<19}{}",
                            job.id, marker, status, job.command
                        );
                    }
                    job.notified = true;
                }
                JobState::Stopped => {
                    eprintln!("[{}]{}  Stopped                 {}", job.id, marker, job.command);
                    job.notified = true;
                }
                JobState::Running => {}
            }
        }
        self.gc();
    }
}

/// Translate one `waitpid` status into a table update.
fn proc_state_of(status: WaitStatus) -> Option<(Pid, ProcState)> {
    match status {
        WaitStatus::Exited(pid, code) => Some((pid, ProcState::Done(code))),
        WaitStatus::Signaled(pid, sig, _core) => Some((pid, ProcState::Done(128 + sig as i32))),
        WaitStatus::Stopped(pid, sig) => Some((pid, ProcState::Stopped(sig as i32))),
        WaitStatus::Continued(pid) => Some((pid, ProcState::Running)),
        _ => None,
    }
}

/// Reap every pending child state change without blocking. Loops until
/// the kernel reports nothing further (`StillAlive`) or no children
/// remain (`ECHILD`).
pub fn reap(table: &mut JobTable) {
    signals::drain();
    loop {
        match waitpid(
            Pid::from_raw(-1),
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED),
        ) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => {
                if let Some((pid, state)) = proc_state_of(status) {
                    table.update(pid, state);
                }
            }
            Err(nix::errno::Errno::ECHILD) => break,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => break,
        }
    }
}

/// Block until the job leaves the Running state, reaping as SIGCHLD
/// arrives via the self-pipe.
pub fn wait_for_job(table: &mut JobTable, id: usize) -> JobState {
    loop {
        reap(table);
        let Some(job) = table.get(id) else { return JobState::Done };
        match job.state() {
            JobState::Running => signals::wait_for_wakeup(),
            state => return state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_job(states: &[ProcState]) -> (JobTable, usize) {
        let mut table = JobTable::new();
        let pids: Vec<Pid> = (1..=states.len() as i32).map(|i| Pid::from_raw(1000 + i)).collect();
        let id = table.add(Pid::from_raw(1001), pids.clone(), "cmd".to_string());
        for (pid, state) in pids.iter().zip(states) {
            table.update(*pid, *state);
        }
        (table, id)
    }

    #[test]
    fn job_state_transitions() {
        let (table, id) = table_with_job(&[ProcState::Running, ProcState::Done(0)]);
        assert_eq!(table.get(id).unwrap().state(), JobState::Running);

        let (table, id) = table_with_job(&[ProcState::Stopped(20), ProcState::Done(0)]);
        assert_eq!(table.get(id).unwrap().state(), JobState::Stopped);

        let (table, id) = table_with_job(&[ProcState::Done(0), ProcState::Done(1)]);
        assert_eq!(table.get(id).unwrap().state(), JobState::Done);
    }

    #[test]
    fn job_status_is_last_process() {
        let (table, id) = table_with_job(&[ProcState::Done(1), ProcState::Done(0)]);
        assert_eq!(table.get(id).unwrap().status(), 0);
        let (table, id) = table_with_job(&[ProcState::Done(0), ProcState::Done(3)]);
        assert_eq!(table.get(id).unwrap().status(), 3);
    }

    #[test]
    fn resolve_designators() {
        let mut table = JobTable::new();
        let first = table.add(Pid::from_raw(100), vec![Pid::from_raw(100)], "sleep 100".into());
        let second = table.add(Pid::from_raw(200), vec![Pid::from_raw(200)], "cat file".into());
        assert_eq!(table.resolve("%+"), Some(second));
        assert_eq!(table.resolve("%%"), Some(second));
        assert_eq!(table.resolve("%-"), Some(first));
        assert_eq!(table.resolve("%1"), Some(first));
        assert_eq!(table.resolve("%sleep"), Some(first));
        assert_eq!(table.resolve("%?file"), Some(second));
        assert_eq!(table.resolve("%9"), None);
    }

    #[test]
    fn gc_drops_notified_done_jobs() {
        let (mut table, id) = table_with_job(&[ProcState::Done(0)]);
        table.get_mut(id).unwrap().notified = true;
        table.gc();
        assert!(table.get(id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn gc_promotes_stopped_to_current() {
        let mut table = JobTable::new();
        let stopped = table.add(Pid::from_raw(1), vec![Pid::from_raw(1)], "a".into());
        let done = table.add(Pid::from_raw(2), vec![Pid::from_raw(2)], "b".into());
        table.update(Pid::from_raw(1), ProcState::Stopped(20));
        table.update(Pid::from_raw(2), ProcState::Done(0));
        table.get_mut(done).unwrap().notified = true;
        table.gc();
        assert_eq!(table.current_id(), Some(stopped));
    }
}
