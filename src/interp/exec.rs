//! The executor: walks the AST and produces exit statuses.
//!
//! Simple commands dispatch function → builtin → external. Builtins,
//! functions, and compounds run in-process with redirects applied to
//! the shell's own fd table behind a restore guard; externals and every
//! multi-stage pipeline fork through the single launcher path.

use crate::ast::*;
use crate::expand::{expand_word_single, expand_words};
use crate::interp::arith::eval_arith;
use crate::interp::builtins;
use crate::interp::cond::eval_cond;
use crate::interp::control::{ExecResult, Interrupt, ShellError};
use crate::interp::state::Value;
use crate::io::redirect::{self, DupTarget, OpenMode, ResolvedRedirect};
use crate::jobs::launcher::{self, Spawner};
use crate::jobs::{self, JobState, ProcState};
use crate::shell::Shell;

impl Shell {
    // ---- lists ----

    pub fn run_list(&mut self, list: &CommandList) -> ExecResult<i32> {
        let mut status = self.state.last_status;
        for item in &list.items {
            self.run_pending_traps();
            self.state.lineno = item.line;
            if item.background {
                status = self.run_background(item)?;
            } else {
                let (result, errexit_eligible) = self.run_and_or(item)?;
                status = result;
                self.state.last_status = status;
                if status != 0
                    && errexit_eligible
                    && self.state.options.errexit
                    && self.condition_depth == 0
                {
                    return Err(Interrupt::Exit(status));
                }
            }
        }
        Ok(status)
    }

    /// Returns the status and whether errexit may act on it (a failing
    /// `&&`/`||` operand other than the last, or a `!` pipeline, is
    /// protected).
    fn run_and_or(&mut self, item: &AndOr) -> ExecResult<(i32, bool)> {
        let mut status = self.run_pipeline(&item.first)?;
        self.state.last_status = status;
        if item.rest.is_empty() {
            return Ok((status, !item.first.negated));
        }

        let mut ran_last = true;
        let mut last_negated = item.first.negated;
        for (i, (op, pipeline)) in item.rest.iter().enumerate() {
            let run = match op {
                AndOrOp::And => status == 0,
                AndOrOp::Or => status != 0,
            };
            if run {
                status = self.run_pipeline(pipeline)?;
                self.state.last_status = status;
                ran_last = i == item.rest.len() - 1;
                last_negated = pipeline.negated;
            } else {
                ran_last = false;
            }
        }
        Ok((status, ran_last && !last_negated))
    }

    fn run_background(&mut self, item: &AndOr) -> ExecResult<i32> {
        let job_control = self.job_control_active();
        let mut spawner = Spawner::new(job_control, true).map_err(system_err)?;
        let body = AndOr { background: false, ..item.clone() };
        let pid = spawner
            .spawn(|| {
                self.enter_subshell();
                match self.run_and_or(&body) {
                    Ok((status, _)) => status,
                    Err(interrupt) => self.interrupt_status(interrupt),
                }
            })
            .map_err(system_err)?;
        spawner.finish();
        let pgid = spawner.pgid().unwrap_or(pid);
        let id = self.jobs.add(pgid, vec![pid], describe_and_or(item));
        self.state.last_bg_pid = Some(pid.as_raw());
        if self.state.interactive {
            eprintln!("[{id}] {pid}");
        }
        self.state.last_status = 0;
        Ok(0)
    }

    // ---- pipelines ----

    fn run_pipeline(&mut self, pipeline: &Pipeline) -> ExecResult<i32> {
        let status = if pipeline.stages.len() == 1 {
            self.run_command(&pipeline.stages[0])?
        } else {
            self.run_multi_stage(pipeline)?
        };
        self.state.last_status = status;
        Ok(if pipeline.negated {
            i32::from(status == 0)
        } else {
            status
        })
    }

    /// Fork every stage, wire the pipes, and synchronize process-group
    /// membership through the launcher before any stage runs user code.
    fn run_multi_stage(&mut self, pipeline: &Pipeline) -> ExecResult<i32> {
        let n = pipeline.stages.len();
        let job_control = self.job_control_active();
        let mut spawner = Spawner::new(job_control, false).map_err(system_err)?;
        let mut pids = Vec::with_capacity(n);
        let mut prev_read: Option<std::os::fd::OwnedFd> = None;

        for (i, stage) in pipeline.stages.iter().enumerate() {
            let next_pipe = if i + 1 < n {
                Some(nix::unistd::pipe().map_err(system_err)?)
            } else {
                None
            };
            {
                use std::os::fd::AsRawFd;
                let stdin_fd = prev_read.as_ref().map(|fd| fd.as_raw_fd());
                let pipe_fds = next_pipe
                    .as_ref()
                    .map(|(r, w)| (r.as_raw_fd(), w.as_raw_fd()));
                let pid = spawner
                    .spawn(|| {
                        if let Some(fd) = stdin_fd {
                            unsafe {
                                libc::dup2(fd, 0);
                                libc::close(fd);
                            }
                        }
                        if let Some((read_fd, write_fd)) = pipe_fds {
                            unsafe {
                                libc::close(read_fd);
                                libc::dup2(write_fd, 1);
                                libc::close(write_fd);
                            }
                        }
                        self.enter_subshell();
                        self.run_command_to_status(stage)
                    })
                    .map_err(system_err)?;
                pids.push(pid);
            }
            prev_read = next_pipe.map(|(r, _w)| r);
        }
        drop(prev_read);
        spawner.finish();

        let pgid = spawner.pgid().unwrap_or(pids[0]);
        let id = self.jobs.add(pgid, pids, describe_pipeline(pipeline));
        self.wait_foreground(id, job_control)
    }

    /// Bring a resumed job back to the foreground (the `fg` builtin).
    pub fn resume_foreground(&mut self, id: usize) -> ExecResult<i32> {
        let job_control = self.job_control_active();
        self.wait_foreground(id, job_control)
    }

    /// Wait for a foreground job, transferring the terminal for its
    /// duration when job control is on.
    fn wait_foreground(&mut self, id: usize, job_control: bool) -> ExecResult<i32> {
        let guard = match (&self.terminal, job_control) {
            (Some(tc), true) => {
                let pgid = self.jobs.get(id).map(|j| j.pgid);
                pgid.map(|pgid| tc.foreground_guard(pgid))
            }
            _ => None,
        };
        let state = jobs::wait_for_job(&mut self.jobs, id);
        drop(guard);

        match state {
            JobState::Done => {
                let status = self.job_exit_status(id);
                if let Some(job) = self.jobs.get_mut(id) {
                    job.notified = true;
                }
                self.jobs.gc();
                Ok(status)
            }
            JobState::Stopped => {
                // Report now; the job stays for fg/bg.
                let (job_id, command) = match self.jobs.get(id) {
                    Some(j) => (j.id, j.command.clone()),
                    None => return Ok(0),
                };
                if let Some(job) = self.jobs.get_mut(id) {
                    job.notified = true;
                }
                eprintln!("\n[{job_id}]+  Stopped                 {command}");
                Ok(128 + libc::SIGTSTP)
            }
            JobState::Running => Ok(0),
        }
    }

    fn job_exit_status(&self, id: usize) -> i32 {
        let Some(job) = self.jobs.get(id) else { return 0 };
        if self.state.options.pipefail {
            let mut status = 0;
            for proc_entry in &job.procs {
                if let ProcState::Done(code) = proc_entry.state {
                    if code != 0 {
                        status = code;
                    }
                }
            }
            status
        } else {
            job.status()
        }
    }

    // ---- commands ----

    pub fn run_command(&mut self, command: &Command) -> ExecResult<i32> {
        match command {
            Command::Simple(simple) => self.run_simple(simple),
            Command::Compound(compound) => self.run_compound(compound),
            Command::FunctionDef(def) => {
                self.state.functions.insert(def.name.clone(), def.clone());
                Ok(0)
            }
        }
    }

    /// Child-side command execution: interrupts become statuses.
    pub fn run_command_to_status(&mut self, command: &Command) -> i32 {
        match self.run_command(command) {
            Ok(status) => status,
            Err(interrupt) => self.interrupt_status(interrupt),
        }
    }

    pub fn run_list_to_status(&mut self, list: &CommandList) -> i32 {
        match self.run_list(list) {
            Ok(status) => status,
            Err(interrupt) => self.interrupt_status(interrupt),
        }
    }

    /// Convert a leaked interrupt into an exit status, reporting real
    /// errors. Used at process boundaries (children) and the driver.
    pub fn interrupt_status(&mut self, interrupt: Interrupt) -> i32 {
        match interrupt {
            Interrupt::Exit(status) => status,
            Interrupt::Return(status) => status,
            Interrupt::Break(_) | Interrupt::Continue(_) => {
                self.diagnose("break/continue: only meaningful in a loop");
                0
            }
            Interrupt::Error(error) => {
                let status = error.status();
                self.diagnose(&error.to_string());
                status
            }
        }
    }

    // ---- compound commands ----

    fn run_compound(&mut self, compound: &CompoundCommand) -> ExecResult<i32> {
        if matches!(compound.kind, CompoundKind::Subshell(_)) {
            return self.run_subshell(compound);
        }
        let resolved = self.resolve_redirects(&compound.redirects)?;
        let guard = redirect::apply(&resolved, true).map_err(Interrupt::Error)?;
        let result = self.run_compound_kind(&compound.kind);
        launcher::flush_stdio();
        drop(guard);
        result
    }

    fn run_compound_kind(&mut self, kind: &CompoundKind) -> ExecResult<i32> {
        match kind {
            CompoundKind::BraceGroup(body) => self.run_list(body),
            CompoundKind::Subshell(_) => unreachable!("handled in run_compound"),
            CompoundKind::If { clauses, else_body } => {
                for clause in clauses {
                    if self.run_condition(&clause.condition)? == 0 {
                        return self.run_list(&clause.body);
                    }
                }
                match else_body {
                    Some(body) => self.run_list(body),
                    None => Ok(0),
                }
            }
            CompoundKind::While { condition, body } => self.run_loop(condition, body, false),
            CompoundKind::Until { condition, body } => self.run_loop(condition, body, true),
            CompoundKind::For { var, words, body } => self.run_for(var, words.as_deref(), body),
            CompoundKind::CStyleFor { init, condition, update, body } => {
                self.run_cstyle_for(init.as_ref(), condition.as_ref(), update.as_ref(), body)
            }
            CompoundKind::Case { subject, arms } => self.run_case(subject, arms),
            CompoundKind::Select { var, words, body } => self.run_select(var, words.as_deref(), body),
            CompoundKind::ArithCommand(expr) => {
                let value = eval_arith(self, expr)?;
                Ok(i32::from(value == 0))
            }
            CompoundKind::Cond(expr) => Ok(if eval_cond(self, expr)? { 0 } else { 1 }),
        }
    }

    fn run_subshell(&mut self, compound: &CompoundCommand) -> ExecResult<i32> {
        let job_control = self.job_control_active();
        let mut spawner = Spawner::new(job_control, false).map_err(system_err)?;
        let kind = compound.kind.clone();
        let redirects = self.resolve_redirects(&compound.redirects)?;
        let pid = spawner
            .spawn(|| {
                if redirect::apply(&redirects, false).is_err() {
                    return 1;
                }
                self.enter_subshell();
                match &kind {
                    CompoundKind::Subshell(body) => self.run_list_to_status(body),
                    _ => unreachable!(),
                }
            })
            .map_err(system_err)?;
        spawner.finish();
        let pgid = spawner.pgid().unwrap_or(pid);
        let id = self.jobs.add(pgid, vec![pid], "(subshell)".to_string());
        self.wait_foreground(id, job_control)
    }

    /// Conditions suppress errexit for their duration.
    fn run_condition(&mut self, list: &CommandList) -> ExecResult<i32> {
        self.condition_depth += 1;
        let result = self.run_list(list);
        self.condition_depth -= 1;
        result
    }

    fn run_loop(&mut self, condition: &CommandList, body: &CommandList, until: bool) -> ExecResult<i32> {
        let mut status = 0;
        loop {
            let cond = self.run_condition(condition)?;
            let proceed = if until { cond != 0 } else { cond == 0 };
            if !proceed {
                break;
            }
            match self.run_body_once(body) {
                LoopStep::Normal(s) => status = s,
                LoopStep::Break => break,
                LoopStep::Continue => continue,
                LoopStep::Propagate(interrupt) => return Err(interrupt),
            }
        }
        Ok(status)
    }

    fn run_for(&mut self, var: &str, words: Option<&[Word]>, body: &CommandList) -> ExecResult<i32> {
        let items = match words {
            Some(words) => expand_words(self, words)?,
            None => self.state.positional().to_vec(),
        };
        let mut status = 0;
        for item in items {
            self.state.set_scalar(var, item).map_err(Interrupt::Error)?;
            match self.run_body_once(body) {
                LoopStep::Normal(s) => status = s,
                LoopStep::Break => break,
                LoopStep::Continue => continue,
                LoopStep::Propagate(interrupt) => return Err(interrupt),
            }
        }
        Ok(status)
    }

    fn run_cstyle_for(
        &mut self,
        init: Option<&ArithExpr>,
        condition: Option<&ArithExpr>,
        update: Option<&ArithExpr>,
        body: &CommandList,
    ) -> ExecResult<i32> {
        if let Some(init) = init {
            eval_arith(self, init)?;
        }
        let mut status = 0;
        loop {
            if let Some(condition) = condition {
                if eval_arith(self, condition)? == 0 {
                    break;
                }
            }
            match self.run_body_once(body) {
                LoopStep::Normal(s) => status = s,
                LoopStep::Break => break,
                LoopStep::Continue => {
                    if let Some(update) = update {
                        eval_arith(self, update)?;
                    }
                    continue;
                }
                LoopStep::Propagate(interrupt) => return Err(interrupt),
            }
            if let Some(update) = update {
                eval_arith(self, update)?;
            }
        }
        Ok(status)
    }

    /// One loop-body iteration with `break`/`continue` accounting.
    fn run_body_once(&mut self, body: &CommandList) -> LoopStep {
        self.loop_depth += 1;
        let result = self.run_list(body);
        self.loop_depth -= 1;
        match result {
            Ok(status) => LoopStep::Normal(status),
            Err(Interrupt::Break(n)) => {
                if n > 1 {
                    LoopStep::Propagate(Interrupt::Break(n - 1))
                } else {
                    LoopStep::Break
                }
            }
            Err(Interrupt::Continue(n)) => {
                if n > 1 {
                    LoopStep::Propagate(Interrupt::Continue(n - 1))
                } else {
                    LoopStep::Continue
                }
            }
            Err(other) => LoopStep::Propagate(other),
        }
    }

    fn run_case(&mut self, subject: &Word, arms: &[CaseArm]) -> ExecResult<i32> {
        let subject = expand_word_single(self, subject)?;
        let nocase = self.state.shopts.nocasematch;
        let mut status = 0;
        let mut fall_through = false;
        for arm in arms {
            let hit = fall_through || {
                let mut matched = false;
                for pattern_word in &arm.patterns {
                    let pieces = crate::expand::expand_word_pattern(self, pattern_word)?;
                    if crate::expand::pattern::matches(&pieces, &subject, nocase) {
                        matched = true;
                        break;
                    }
                }
                matched
            };
            if !hit {
                continue;
            }
            status = self.run_list(&arm.body)?;
            match arm.terminator {
                CaseTerminator::Break => return Ok(status),
                CaseTerminator::FallThrough => {
                    fall_through = true;
                }
                CaseTerminator::ContinueMatching => {
                    fall_through = false;
                }
            }
        }
        Ok(status)
    }

    fn run_select(&mut self, var: &str, words: Option<&[Word]>, body: &CommandList) -> ExecResult<i32> {
        let items = match words {
            Some(words) => expand_words(self, words)?,
            None => self.state.positional().to_vec(),
        };
        let mut status = 0;
        loop {
            for (i, item) in items.iter().enumerate() {
                eprintln!("{}) {}", i + 1, item);
            }
            let prompt = self.state.get_str("PS3").unwrap_or_else(|| "#? ".to_string());
            eprint!("{prompt}");
            launcher::flush_stdio();
            let Some(line) = builtins::read_line_fd(0) else {
                // EOF ends the select loop.
                break;
            };
            let line = line.trim_end_matches('\n').to_string();
            self.state.set_scalar("REPLY", line.clone()).map_err(Interrupt::Error)?;
            let choice = line
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| items.get(n.wrapping_sub(1)))
                .cloned()
                .unwrap_or_default();
            self.state.set_scalar(var, choice).map_err(Interrupt::Error)?;
            match self.run_body_once(body) {
                LoopStep::Normal(s) => status = s,
                LoopStep::Break => break,
                LoopStep::Continue => continue,
                LoopStep::Propagate(interrupt) => return Err(interrupt),
            }
        }
        Ok(status)
    }

    // ---- simple commands ----

    fn run_simple(&mut self, cmd: &SimpleCommand) -> ExecResult<i32> {
        self.state.lineno = cmd.line;

        if cmd.words.is_empty() {
            // Assignment-only: assignments persist in the current scope.
            for assignment in &cmd.assignments {
                self.apply_assignment(assignment)?;
            }
            if !cmd.redirects.is_empty() {
                let resolved = self.resolve_redirects(&cmd.redirects)?;
                let guard = redirect::apply(&resolved, true).map_err(Interrupt::Error)?;
                drop(guard);
            }
            return Ok(if cmd.assignments.is_empty() { self.state.last_status } else { 0 });
        }

        let argv = expand_words(self, &cmd.words)?;
        let resolved = self.resolve_redirects(&cmd.redirects)?;

        if argv.is_empty() {
            // Everything expanded away: assignments persist and the
            // redirects still happen.
            for assignment in &cmd.assignments {
                self.apply_assignment(assignment)?;
            }
            let guard = redirect::apply(&resolved, true).map_err(Interrupt::Error)?;
            drop(guard);
            return Ok(self.state.last_status);
        }

        if self.state.options.xtrace {
            let ps4 = self.state.get_str("PS4").unwrap_or_else(|| "+ ".to_string());
            eprintln!("{ps4}{}", argv.join(" "));
        }
        if self.state.options.noexec {
            return Ok(0);
        }

        let name = argv[0].clone();

        // Functions run in-process with the assignments as call-local
        // bindings.
        if self.state.functions.contains_key(&name) {
            let def = self.state.functions[&name].clone();
            self.state.push_scope();
            let bind = self.bind_temp_assignments(&cmd.assignments);
            let result = match bind {
                Ok(()) => {
                    let guard = redirect::apply(&resolved, true).map_err(Interrupt::Error);
                    match guard {
                        Ok(guard) => {
                            let r = self.call_function(&def, &argv[1..]);
                            launcher::flush_stdio();
                            drop(guard);
                            r
                        }
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(e),
            };
            self.state.pop_scope();
            return result;
        }

        if name == "exec" {
            return self.run_exec_builtin(&argv[1..], &resolved, &cmd.assignments);
        }

        if let Some(builtin) = builtins::find_builtin(&name) {
            let special = builtins::is_special_builtin(&name);
            if special {
                // Special builtins: assignments persist.
                for assignment in &cmd.assignments {
                    self.apply_assignment(assignment)?;
                }
            } else {
                self.state.push_scope();
            }
            let bind = if special {
                Ok(())
            } else {
                self.bind_temp_assignments(&cmd.assignments)
            };
            let result = match bind {
                Ok(()) => match redirect::apply(&resolved, true).map_err(Interrupt::Error) {
                    Ok(guard) => {
                        let r = builtin(self, &argv);
                        launcher::flush_stdio();
                        drop(guard);
                        r
                    }
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            if !special {
                self.state.pop_scope();
            }
            return result;
        }

        self.run_external(&argv, &resolved, &cmd.assignments)
    }

    fn bind_temp_assignments(&mut self, assignments: &[Assignment]) -> ExecResult<()> {
        for assignment in assignments {
            let value = match &assignment.value {
                AssignValue::Scalar(word) => expand_word_single(self, word)?,
                AssignValue::Array(_) => {
                    return Err(Interrupt::Error(ShellError::Custom(
                        "array assignment not allowed here".to_string(),
                    )))
                }
            };
            self.state.set_local(&assignment.name, Some(Value::Scalar(value)));
        }
        Ok(())
    }

    pub fn call_function(&mut self, def: &FunctionDef, args: &[String]) -> ExecResult<i32> {
        self.state.funcname.push(def.name.clone());
        self.state.push_positional(args.to_vec());
        self.state.push_scope();

        let result = self.run_command(&Command::Compound((*def.body).clone()));

        self.state.pop_scope();
        self.state.pop_positional();
        self.state.funcname.pop();

        match result {
            Err(Interrupt::Return(status)) => Ok(status),
            other => other,
        }
    }

    fn run_exec_builtin(
        &mut self,
        args: &[String],
        resolved: &[ResolvedRedirect],
        assignments: &[Assignment],
    ) -> ExecResult<i32> {
        // exec is a special builtin: its assignment prefix persists in
        // the shell, whether or not an exec happens.
        for assignment in assignments {
            self.apply_assignment(assignment)?;
        }
        if args.is_empty() {
            // Permanent redirections on the shell itself. Their failure
            // is a shell-level failure outside interactive use.
            match redirect::apply(resolved, true) {
                Ok(guard) => {
                    guard.commit();
                    return Ok(0);
                }
                Err(e) => {
                    if self.state.interactive {
                        return Err(Interrupt::Error(e));
                    }
                    self.diagnose(&e.to_string());
                    return Err(Interrupt::Exit(1));
                }
            }
        }
        let env = self.child_env(assignments)?;
        let path_var = self.state.get_str("PATH").unwrap_or_default();
        let Some(path) = launcher::find_command(&args[0], &path_var) else {
            if !self.state.interactive {
                self.diagnose(&format!("{}: command not found", args[0]));
                return Err(Interrupt::Exit(127));
            }
            return Err(Interrupt::Error(ShellError::CommandNotFound(args[0].clone())));
        };
        redirect::apply(resolved, false).map_err(Interrupt::Error)?;
        launcher::flush_stdio();
        let status = launcher::exec_external(&path.to_string_lossy(), args, &env);
        if self.state.interactive {
            Ok(status)
        } else {
            Err(Interrupt::Exit(status))
        }
    }

    fn run_external(
        &mut self,
        argv: &[String],
        resolved: &[ResolvedRedirect],
        assignments: &[Assignment],
    ) -> ExecResult<i32> {
        let name = &argv[0];
        let path_var = self.state.get_str("PATH").unwrap_or_default();
        let Some(path) = launcher::find_command(name, &path_var) else {
            return Err(Interrupt::Error(ShellError::CommandNotFound(name.clone())));
        };
        if path.is_dir() {
            return Err(Interrupt::Error(ShellError::IsDirectory(name.clone())));
        }
        let env = self.child_env(assignments)?;
        let path_text = path.to_string_lossy().into_owned();

        let job_control = self.job_control_active();
        let mut spawner = Spawner::new(job_control, false).map_err(system_err)?;
        let argv_owned = argv.to_vec();
        let redirects = resolved.to_vec();
        let pid = spawner
            .spawn(|| {
                if let Err(e) = redirect::apply(&redirects, false) {
                    eprintln!("oxsh: {e}");
                    return 1;
                }
                launcher::exec_external(&path_text, &argv_owned, &env)
            })
            .map_err(system_err)?;
        spawner.finish();
        let pgid = spawner.pgid().unwrap_or(pid);
        let id = self.jobs.add(pgid, vec![pid], argv.join(" "));
        self.wait_foreground(id, job_control)
    }

    /// Environment for a child: exported variables plus the command's
    /// own assignment prefix.
    fn child_env(&mut self, assignments: &[Assignment]) -> ExecResult<Vec<(String, String)>> {
        let mut env = self.state.exported_env();
        for assignment in assignments {
            let value = match &assignment.value {
                AssignValue::Scalar(word) => expand_word_single(self, word)?,
                AssignValue::Array(_) => continue,
            };
            env.retain(|(name, _)| name != &assignment.name);
            env.push((assignment.name.clone(), value));
        }
        Ok(env)
    }

    // ---- assignments ----

    pub fn apply_assignment(&mut self, assignment: &Assignment) -> ExecResult<()> {
        match (&assignment.index, &assignment.value) {
            (Some(index), AssignValue::Scalar(word)) => {
                let idx = crate::interp::arith::eval_arith_text(self, index)?;
                if idx < 0 {
                    return Err(Interrupt::Error(ShellError::Expansion(format!(
                        "{}: bad array subscript",
                        assignment.name
                    ))));
                }
                let value = expand_word_single(self, word)?;
                let value = if assignment.append {
                    let old = element_text(self, &assignment.name, idx as usize);
                    format!("{old}{value}")
                } else {
                    value
                };
                self.state
                    .set_element(&assignment.name, idx as usize, value)
                    .map_err(Interrupt::Error)?;
            }
            (None, AssignValue::Scalar(word)) => {
                let value = expand_word_single(self, word)?;
                if assignment.append {
                    self.state
                        .append_scalar(&assignment.name, &value)
                        .map_err(Interrupt::Error)?;
                } else {
                    self.state
                        .set_scalar(&assignment.name, value)
                        .map_err(Interrupt::Error)?;
                }
            }
            (None, AssignValue::Array(words)) => {
                let mut items = Vec::new();
                if assignment.append {
                    if let Some(Value::Array(old)) = self.state.get(&assignment.name).map(|v| v.value.clone()) {
                        items = old;
                    }
                }
                for word in words {
                    items.push(Some(expand_word_single(self, word)?));
                }
                self.state
                    .set_array(&assignment.name, items)
                    .map_err(Interrupt::Error)?;
            }
            (Some(_), AssignValue::Array(_)) => {
                return Err(Interrupt::Error(ShellError::Expansion(format!(
                    "{}: cannot assign list to array member",
                    assignment.name
                ))));
            }
        }
        Ok(())
    }

    // ---- redirects ----

    pub fn resolve_redirects(&mut self, redirects: &[Redirect]) -> ExecResult<Vec<ResolvedRedirect>> {
        let noclobber = self.state.options.noclobber;
        let mut resolved = Vec::new();
        for redirect in redirects {
            let fd = redirect.fd.unwrap_or_else(|| redirect.kind.default_fd());
            match &redirect.kind {
                RedirKind::In(target) => {
                    let path = expand_word_single(self, target)?;
                    resolved.push(ResolvedRedirect::File { fd, path, mode: OpenMode::Read });
                }
                RedirKind::Out(target) => {
                    let path = expand_word_single(self, target)?;
                    resolved.push(ResolvedRedirect::File {
                        fd,
                        path,
                        mode: OpenMode::Write { noclobber },
                    });
                }
                RedirKind::Clobber(target) => {
                    let path = expand_word_single(self, target)?;
                    resolved.push(ResolvedRedirect::File {
                        fd,
                        path,
                        mode: OpenMode::Write { noclobber: false },
                    });
                }
                RedirKind::Append(target) => {
                    let path = expand_word_single(self, target)?;
                    resolved.push(ResolvedRedirect::File { fd, path, mode: OpenMode::Append });
                }
                RedirKind::ReadWrite(target) => {
                    let path = expand_word_single(self, target)?;
                    resolved.push(ResolvedRedirect::File { fd, path, mode: OpenMode::ReadWrite });
                }
                RedirKind::DupIn(target) | RedirKind::DupOut(target) => {
                    let text = expand_word_single(self, target)?;
                    let dup_target = if text == "-" {
                        DupTarget::Close
                    } else {
                        match text.parse::<i32>() {
                            Ok(n) => DupTarget::Fd(n),
                            Err(_) => {
                                return Err(Interrupt::Error(ShellError::Redirect {
                                    context: text,
                                    message: "ambiguous redirect".to_string(),
                                }))
                            }
                        }
                    };
                    resolved.push(ResolvedRedirect::Dup { fd, target: dup_target });
                }
                RedirKind::OutBoth(target) => {
                    let path = expand_word_single(self, target)?;
                    resolved.push(ResolvedRedirect::File {
                        fd: 1,
                        path,
                        mode: OpenMode::Write { noclobber },
                    });
                    resolved.push(ResolvedRedirect::Dup { fd: 2, target: DupTarget::Fd(1) });
                }
                RedirKind::AppendBoth(target) => {
                    let path = expand_word_single(self, target)?;
                    resolved.push(ResolvedRedirect::File { fd: 1, path, mode: OpenMode::Append });
                    resolved.push(ResolvedRedirect::Dup { fd: 2, target: DupTarget::Fd(1) });
                }
                RedirKind::HereDoc(doc) => {
                    let body = if doc.quoted {
                        doc.body.as_literal().unwrap_or_default()
                    } else {
                        expand_word_single(self, &doc.body)?
                    };
                    resolved.push(ResolvedRedirect::Content { fd, body });
                }
                RedirKind::HereString(target) => {
                    let mut body = expand_word_single(self, target)?;
                    body.push('\n');
                    resolved.push(ResolvedRedirect::Content { fd, body });
                }
            }
        }
        Ok(resolved)
    }
}

enum LoopStep {
    Normal(i32),
    Break,
    Continue,
    Propagate(Interrupt),
}

fn system_err(e: nix::errno::Errno) -> Interrupt {
    Interrupt::Error(ShellError::System(e.to_string()))
}

fn element_text(shell: &Shell, name: &str, index: usize) -> String {
    match shell.state.get(name).map(|v| &v.value) {
        Some(Value::Array(items)) => items
            .get(index)
            .and_then(|v| v.clone())
            .unwrap_or_default(),
        Some(Value::Scalar(s)) if index == 0 => s.clone(),
        _ => String::new(),
    }
}

// ---- display for the job table ----

fn describe_and_or(item: &AndOr) -> String {
    let mut out = describe_pipeline(&item.first);
    for (op, pipeline) in &item.rest {
        out.push_str(match op {
            AndOrOp::And => " && ",
            AndOrOp::Or => " || ",
        });
        out.push_str(&describe_pipeline(pipeline));
    }
    out
}

fn describe_pipeline(pipeline: &Pipeline) -> String {
    let stages: Vec<String> = pipeline.stages.iter().map(describe_command).collect();
    let mut out = String::new();
    if pipeline.negated {
        out.push_str("! ");
    }
    out.push_str(&stages.join(" | "));
    out
}

fn describe_command(command: &Command) -> String {
    match command {
        Command::Simple(simple) => {
            let words: Vec<String> = simple
                .words
                .iter()
                .map(|w| w.as_literal().unwrap_or_else(|| "...".to_string()))
                .collect();
            words.join(" ")
        }
        Command::Compound(compound) => match &compound.kind {
            CompoundKind::Subshell(_) => "( ... )".to_string(),
            CompoundKind::BraceGroup(_) => "{ ...; }".to_string(),
            CompoundKind::If { .. } => "if ...".to_string(),
            CompoundKind::While { .. } => "while ...".to_string(),
            CompoundKind::Until { .. } => "until ...".to_string(),
            CompoundKind::For { .. } | CompoundKind::CStyleFor { .. } => "for ...".to_string(),
            CompoundKind::Case { .. } => "case ...".to_string(),
            CompoundKind::Select { .. } => "select ...".to_string(),
            CompoundKind::ArithCommand(_) => "(( ... ))".to_string(),
            CompoundKind::Cond(_) => "[[ ... ]]".to_string(),
        },
        Command::FunctionDef(def) => format!("{}()", def.name),
    }
}
