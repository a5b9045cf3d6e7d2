//! The shell: owned state plus the top-level drivers.
//!
//! One `Shell` per process. The drivers read one logical command at a
//! time — accumulating lines while the parser reports the input as
//! incomplete — and feed it through parse → expand → execute. Job
//! state changes are reported at prompt boundaries.

use std::collections::HashMap;

use crate::interp::control::Interrupt;
use crate::interp::state::ShellState;
use crate::jobs::{signals, JobTable};
use crate::jobs::terminal::TerminalControl;
use crate::parser::{parse_script, ParseError};

#[derive(Debug, Default)]
pub struct Traps {
    pub exit: Option<String>,
    /// Signal number → command text.
    pub signals: HashMap<i32, String>,
}

pub struct Shell {
    pub state: ShellState,
    pub jobs: JobTable,
    pub terminal: Option<TerminalControl>,
    pub traps: Traps,
    /// Loop nesting, for `break`/`continue` validation.
    pub loop_depth: u32,
    /// Non-zero while running an `if`/`while`/`until` condition, where
    /// errexit must not fire.
    pub condition_depth: u32,
    /// `.`/`source` nesting, for `return`.
    pub source_depth: u32,
    pub is_subshell: bool,
}

impl Shell {
    pub fn new(arg0: &str) -> Self {
        let _ = signals::init();
        let mut state = ShellState::from_env(arg0);
        if let Ok(cwd) = std::env::current_dir() {
            let _ = state.set_scalar("PWD", cwd.to_string_lossy().into_owned());
            state.export("PWD");
        }
        Shell {
            state,
            jobs: JobTable::new(),
            terminal: None,
            traps: Traps::default(),
            loop_depth: 0,
            condition_depth: 0,
            source_depth: 0,
            is_subshell: false,
        }
    }

    /// Interactive setup: terminal acquisition, job control, and the
    /// dispositions that keep the shell alive at the keyboard.
    pub fn init_interactive(&mut self) {
        self.state.interactive = true;
        self.terminal = TerminalControl::acquire();
        if self.terminal.is_some() {
            self.state.options.monitor = true;
        }
        signals::set_interactive_dispositions();
    }

    pub fn job_control_active(&self) -> bool {
        self.state.options.monitor && self.terminal.is_some() && !self.is_subshell
    }

    /// Single-line diagnostic, uniform across every failure path.
    pub fn diagnose(&self, message: &str) {
        eprintln!("oxsh: {message}");
    }

    /// Called in forked children that keep running shell code: drop
    /// everything owned by the parent shell.
    pub fn enter_subshell(&mut self) {
        self.jobs = JobTable::new();
        self.traps = Traps::default();
        self.terminal = None;
        self.state.options.monitor = false;
        self.state.interactive = false;
        self.is_subshell = true;
        signals::reinit_in_child();
    }

    /// Execute trap commands for signals that arrived since the last
    /// boundary. `$?` is preserved across the trap body.
    pub fn run_pending_traps(&mut self) {
        for sig in signals::take_pending() {
            let Some(action) = self.traps.signals.get(&sig).cloned() else {
                continue;
            };
            let saved_status = self.state.last_status;
            self.run_trap_action(&action);
            self.state.last_status = saved_status;
        }
    }

    fn run_trap_action(&mut self, action: &str) {
        match parse_script(action, &self.state.aliases) {
            Ok(list) => {
                let _ = self.run_list_to_status(&list);
            }
            Err(e) => self.diagnose(&format!("trap: {e}")),
        }
    }

    /// The EXIT trap runs once, at shell exit.
    pub fn run_exit_trap(&mut self) {
        if let Some(action) = self.traps.exit.take() {
            self.run_trap_action(&action);
        }
    }

    // ---- drivers ----

    /// Run a complete command string (`-c`, script files). Parse errors
    /// are fatal with status 2, as for any non-interactive shell.
    pub fn run_text(&mut self, text: &str) -> i32 {
        let list = match parse_script(text, &self.state.aliases) {
            Ok(list) => list,
            Err(e) => {
                self.diagnose(&e.to_string());
                return 2;
            }
        };
        let status = self.run_list_to_status(&list);
        self.state.last_status = status;
        status
    }

    /// Drive a non-interactive stream one logical command at a time.
    pub fn run_stream(&mut self, read_line: &mut dyn FnMut() -> Option<String>) -> i32 {
        let mut buffer = String::new();
        loop {
            let Some(line) = read_line() else {
                if !buffer.trim().is_empty() {
                    // Unterminated construct at EOF.
                    if let Err(e) = parse_script(&buffer, &self.state.aliases) {
                        self.diagnose(&e.to_string());
                        return 2;
                    }
                }
                break;
            };
            buffer.push_str(&line);
            if !line.ends_with('\n') {
                buffer.push('\n');
            }
            match parse_script(&buffer, &self.state.aliases) {
                Err(ref e) if e.is_incomplete() => continue,
                Err(e) => {
                    self.diagnose(&e.to_string());
                    return 2;
                }
                Ok(list) => {
                    buffer.clear();
                    match self.run_list(&list) {
                        Ok(status) => self.state.last_status = status,
                        Err(Interrupt::Exit(status)) => {
                            self.state.last_status = status;
                            return status;
                        }
                        Err(interrupt) => {
                            let status = self.interrupt_status(interrupt);
                            self.state.last_status = status;
                        }
                    }
                }
            }
        }
        self.state.last_status
    }

    /// The interactive REPL: prompt, accumulate until the parser stops
    /// reporting `Incomplete`, run, notify job changes.
    pub fn run_interactive(&mut self) -> i32 {
        let mut buffer = String::new();
        loop {
            crate::jobs::reap(&mut self.jobs);
            self.run_pending_traps();
            if buffer.is_empty() {
                self.jobs.notify_changes();
            }

            let prompt = if buffer.is_empty() {
                self.state.get_str("PS1").unwrap_or_else(|| "oxsh$ ".to_string())
            } else {
                self.state.get_str("PS2").unwrap_or_else(|| "> ".to_string())
            };
            eprint!("{prompt}");
            crate::jobs::launcher::flush_stdio();

            let Some(line) = crate::interp::builtins::read_line_fd(0) else {
                if buffer.is_empty() {
                    eprintln!("exit");
                    break;
                }
                // EOF inside a construct: report and reset.
                self.report_parse_failure(&buffer);
                buffer.clear();
                continue;
            };
            buffer.push_str(&line);

            match parse_script(&buffer, &self.state.aliases) {
                Err(ref e) if e.is_incomplete() => continue,
                Err(e) => {
                    self.diagnose(&e.to_string());
                    self.state.last_status = 2;
                    buffer.clear();
                }
                Ok(list) => {
                    buffer.clear();
                    match self.run_list(&list) {
                        Ok(status) => self.state.last_status = status,
                        Err(Interrupt::Exit(status)) => {
                            self.state.last_status = status;
                            return status;
                        }
                        Err(interrupt) => {
                            let status = self.interrupt_status(interrupt);
                            self.state.last_status = status;
                        }
                    }
                }
            }
        }
        self.state.last_status
    }

    fn report_parse_failure(&mut self, buffer: &str) {
        if let Err(e) = parse_script(buffer, &self.state.aliases) {
            self.diagnose(&e.to_string());
            self.state.last_status = 2;
        }
    }

    /// Parse helper for tests and embedders.
    pub fn parse(&self, text: &str) -> Result<crate::ast::CommandList, ParseError> {
        parse_script(text, &self.state.aliases)
    }
}
