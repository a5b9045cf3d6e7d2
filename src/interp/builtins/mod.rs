//! Builtin commands.
//!
//! Each builtin is a function from the shell and an argv to an exit
//! status. Special builtins (POSIX) run with assignment prefixes
//! applied persistently and keep their effects in the current shell;
//! the executor handles that distinction, the table here only names
//! them.

mod cd;
mod echo;
mod jobs;
mod read;
mod set_opts;
mod source;
mod test;
mod trap;

pub use read::read_line_fd;

use crate::interp::control::{ExecResult, Interrupt};
use crate::interp::state::Value;
use crate::shell::Shell;

pub type BuiltinFn = fn(&mut Shell, &[String]) -> ExecResult<i32>;

/// Builtin output goes straight through the stdout handle so it lands
/// on whatever fd 1 currently is; the `print!` macros would not.
pub(crate) fn out(text: impl AsRef<str>) {
    use std::io::Write;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    let _ = handle.write_all(text.as_ref().as_bytes());
}

pub(crate) fn outln(text: impl AsRef<str>) {
    out(text);
    out("\n");
}

const SPECIAL_BUILTINS: &[&str] = &[
    ":", ".", "break", "continue", "eval", "exec", "exit", "export", "readonly", "return", "set",
    "shift", "source", "trap", "unset",
];

pub fn is_special_builtin(name: &str) -> bool {
    SPECIAL_BUILTINS.contains(&name)
}

pub fn find_builtin(name: &str) -> Option<BuiltinFn> {
    Some(match name {
        ":" | "true" => builtin_true,
        "false" => builtin_false,
        "." | "source" => source::builtin_source,
        "alias" => builtin_alias,
        "bg" => jobs::builtin_bg,
        "break" => builtin_break,
        "cd" => cd::builtin_cd,
        "continue" => builtin_continue,
        "echo" => echo::builtin_echo,
        "eval" => builtin_eval,
        "exit" => builtin_exit,
        "export" => builtin_export,
        "fg" => jobs::builtin_fg,
        "jobs" => jobs::builtin_jobs,
        "kill" => jobs::builtin_kill,
        "local" => builtin_local,
        "printf" => echo::builtin_printf,
        "pwd" => cd::builtin_pwd,
        "read" => read::builtin_read,
        "readonly" => builtin_readonly,
        "return" => builtin_return,
        "set" => set_opts::builtin_set,
        "shift" => builtin_shift,
        "shopt" => set_opts::builtin_shopt,
        "test" | "[" => test::builtin_test,
        "trap" => trap::builtin_trap,
        "type" => builtin_type,
        "unalias" => builtin_unalias,
        "unset" => builtin_unset,
        "wait" => jobs::builtin_wait,
        _ => return None,
    })
}

pub fn is_builtin(name: &str) -> bool {
    find_builtin(name).is_some()
}

fn usage(shell: &mut Shell, message: &str) -> ExecResult<i32> {
    shell.diagnose(message);
    Ok(2)
}

fn builtin_true(_shell: &mut Shell, _argv: &[String]) -> ExecResult<i32> {
    Ok(0)
}

fn builtin_false(_shell: &mut Shell, _argv: &[String]) -> ExecResult<i32> {
    Ok(1)
}

fn builtin_eval(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let text = argv[1..].join(" ");
    if text.trim().is_empty() {
        return Ok(0);
    }
    let list = match crate::parser::parse_script(&text, &shell.state.aliases) {
        Ok(list) => list,
        Err(e) => {
            shell.diagnose(&format!("eval: {e}"));
            return Ok(2);
        }
    };
    shell.run_list(&list)
}

fn builtin_exit(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let status = match argv.get(1) {
        None => shell.state.last_status,
        Some(arg) => match arg.parse::<i32>() {
            Ok(n) => n,
            Err(_) => {
                shell.diagnose(&format!("exit: {arg}: numeric argument required"));
                2
            }
        },
    };
    Err(Interrupt::Exit(status & 0xff))
}

fn builtin_return(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    if !shell.state.in_function() && shell.source_depth == 0 {
        shell.diagnose("return: can only `return' from a function or sourced script");
        return Ok(1);
    }
    let status = match argv.get(1) {
        None => shell.state.last_status,
        Some(arg) => arg.parse::<i32>().unwrap_or(2),
    };
    Err(Interrupt::Return(status & 0xff))
}

fn loop_count(argv: &[String]) -> Option<u32> {
    match argv.get(1) {
        None => Some(1),
        Some(arg) => arg.parse::<u32>().ok().filter(|n| *n >= 1),
    }
}

fn builtin_break(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let Some(n) = loop_count(argv) else {
        return usage(shell, "break: loop count out of range");
    };
    if shell.loop_depth == 0 {
        shell.diagnose("break: only meaningful in a `for', `while', or `until' loop");
        return Ok(0);
    }
    Err(Interrupt::Break(n))
}

fn builtin_continue(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let Some(n) = loop_count(argv) else {
        return usage(shell, "continue: loop count out of range");
    };
    if shell.loop_depth == 0 {
        shell.diagnose("continue: only meaningful in a `for', `while', or `until' loop");
        return Ok(0);
    }
    Err(Interrupt::Continue(n))
}

fn builtin_shift(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let n = match argv.get(1) {
        None => 1,
        Some(arg) => match arg.parse::<usize>() {
            Ok(n) => n,
            Err(_) => return usage(shell, &format!("shift: {arg}: numeric argument required")),
        },
    };
    if shell.state.shift_positional(n) {
        Ok(0)
    } else {
        shell.diagnose("shift: shift count out of range");
        Ok(1)
    }
}

fn split_name_value(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (arg, None),
    }
}

fn builtin_export(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let args: Vec<&String> = argv[1..].iter().filter(|a| *a != "-p").collect();
    if args.is_empty() {
        for name in shell.state.all_names() {
            if let Some(var) = shell.state.get(&name) {
                if var.exported {
                    outln(format!("export {}={}", name, quote_value(var.value.as_str())));
                }
            }
        }
        return Ok(0);
    }
    let mut status = 0;
    for arg in args {
        let (name, value) = split_name_value(arg);
        if let Some(value) = value {
            if let Err(e) = shell.state.set_scalar(name, value) {
                shell.diagnose(&e.to_string());
                status = 1;
                continue;
            }
        }
        shell.state.export(name);
    }
    Ok(status)
}

fn builtin_readonly(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let mut status = 0;
    for arg in &argv[1..] {
        if arg == "-p" {
            continue;
        }
        let (name, value) = split_name_value(arg);
        if let Some(value) = value {
            if let Err(e) = shell.state.set_scalar(name, value) {
                shell.diagnose(&e.to_string());
                status = 1;
                continue;
            }
        }
        shell.state.mark_readonly(name);
    }
    Ok(status)
}

fn builtin_local(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    if !shell.state.in_function() {
        shell.diagnose("local: can only be used in a function");
        return Ok(1);
    }
    for arg in &argv[1..] {
        let (name, value) = split_name_value(arg);
        shell
            .state
            .set_local(name, value.map(|v| Value::Scalar(v.to_string())));
    }
    Ok(0)
}

fn builtin_unset(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let mut functions = false;
    let mut status = 0;
    for arg in &argv[1..] {
        match arg.as_str() {
            "-f" => functions = true,
            "-v" => functions = false,
            name => {
                if functions {
                    shell.state.functions.remove(name);
                } else if let Err(e) = shell.state.unset(name) {
                    shell.diagnose(&e.to_string());
                    status = 1;
                }
            }
        }
    }
    Ok(status)
}

fn builtin_alias(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    if argv.len() == 1 {
        let mut names: Vec<&String> = shell.state.aliases.keys().collect();
        names.sort();
        for name in names {
            outln(format!("alias {}={}", name, quote_value(&shell.state.aliases[name])));
        }
        return Ok(0);
    }
    let mut status = 0;
    for arg in &argv[1..] {
        match arg.split_once('=') {
            Some((name, value)) => {
                shell.state.aliases.insert(name.to_string(), value.to_string());
            }
            None => match shell.state.aliases.get(arg) {
                Some(value) => outln(format!("alias {}={}", arg, quote_value(value))),
                None => {
                    shell.diagnose(&format!("alias: {arg}: not found"));
                    status = 1;
                }
            },
        }
    }
    Ok(status)
}

fn builtin_unalias(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let mut status = 0;
    for arg in &argv[1..] {
        if arg == "-a" {
            shell.state.aliases.clear();
        } else if shell.state.aliases.remove(arg).is_none() {
            shell.diagnose(&format!("unalias: {arg}: not found"));
            status = 1;
        }
    }
    Ok(status)
}

const KEYWORDS: &[&str] = &[
    "if", "then", "else", "elif", "fi", "while", "until", "for", "do", "done", "case", "esac",
    "in", "function", "select", "{", "}", "!", "[[", "]]",
];

fn builtin_type(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let mut status = 0;
    for name in &argv[1..] {
        if let Some(value) = shell.state.aliases.get(name) {
            outln(format!("{name} is aliased to `{value}'"));
        } else if KEYWORDS.contains(&name.as_str()) {
            outln(format!("{name} is a shell keyword"));
        } else if shell.state.functions.contains_key(name) {
            outln(format!("{name} is a function"));
        } else if is_builtin(name) {
            outln(format!("{name} is a shell builtin"));
        } else {
            let path_var = shell.state.get_str("PATH").unwrap_or_default();
            match crate::jobs::launcher::find_command(name, &path_var) {
                Some(path) => outln(format!("{name} is {}", path.display())),
                None => {
                    shell.diagnose(&format!("type: {name}: not found"));
                    status = 1;
                }
            }
        }
    }
    Ok(status)
}

fn quote_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
