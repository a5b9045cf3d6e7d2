//! `set` and `shopt`.

use crate::interp::control::ExecResult;
use crate::shell::Shell;

const SET_O_NAMES: &[&str] = &[
    "errexit", "nounset", "pipefail", "xtrace", "noglob", "noclobber", "noexec", "monitor",
    "emacs", "vi",
];

fn set_o(shell: &mut Shell, name: &str, on: bool) -> bool {
    let o = &mut shell.state.options;
    match name {
        "errexit" => o.errexit = on,
        "nounset" => o.nounset = on,
        "pipefail" => o.pipefail = on,
        "xtrace" => o.xtrace = on,
        "noglob" => o.noglob = on,
        "noclobber" => o.noclobber = on,
        "noexec" => o.noexec = on,
        "monitor" => o.monitor = on,
        "emacs" => {
            o.emacs = on;
            if on {
                o.vi = false;
            }
        }
        "vi" => {
            o.vi = on;
            if on {
                o.emacs = false;
            }
        }
        _ => return false,
    }
    true
}

fn get_o(shell: &Shell, name: &str) -> bool {
    let o = &shell.state.options;
    match name {
        "errexit" => o.errexit,
        "nounset" => o.nounset,
        "pipefail" => o.pipefail,
        "xtrace" => o.xtrace,
        "noglob" => o.noglob,
        "noclobber" => o.noclobber,
        "noexec" => o.noexec,
        "monitor" => o.monitor,
        "emacs" => o.emacs,
        "vi" => o.vi,
        _ => false,
    }
}

fn flag_option(flag: char) -> Option<&'static str> {
    Some(match flag {
        'e' => "errexit",
        'u' => "nounset",
        'x' => "xtrace",
        'f' => "noglob",
        'C' => "noclobber",
        'n' => "noexec",
        'm' => "monitor",
        _ => return None,
    })
}

pub fn builtin_set(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    if argv.len() == 1 {
        for name in shell.state.all_names() {
            if let Some(var) = shell.state.get(&name) {
                super::outln(format!("{}={}", name, var.value.as_str()));
            }
        }
        return Ok(0);
    }

    let mut i = 1;
    while i < argv.len() {
        let arg = &argv[i];
        match arg.as_str() {
            "--" => {
                let rest: Vec<String> = argv[i + 1..].to_vec();
                shell.state.set_positional(rest);
                return Ok(0);
            }
            "-o" | "+o" => {
                let on = arg.starts_with('-');
                match argv.get(i + 1) {
                    Some(name) => {
                        if !set_o(shell, name, on) {
                            shell.diagnose(&format!("set: {name}: invalid option name"));
                            return Ok(2);
                        }
                        i += 2;
                    }
                    None => {
                        for name in SET_O_NAMES {
                            super::outln(format!(
                                "{name:<15} {}",
                                if get_o(shell, name) { "on" } else { "off" }
                            ));
                        }
                        i += 1;
                    }
                }
            }
            _ if arg.starts_with('-') || arg.starts_with('+') => {
                let on = arg.starts_with('-');
                for flag in arg[1..].chars() {
                    match flag_option(flag) {
                        Some(name) => {
                            set_o(shell, name, on);
                        }
                        None => {
                            shell.diagnose(&format!("set: -{flag}: invalid option"));
                            return Ok(2);
                        }
                    }
                }
                i += 1;
            }
            _ => {
                // Remaining words become the positional parameters.
                let rest: Vec<String> = argv[i..].to_vec();
                shell.state.set_positional(rest);
                return Ok(0);
            }
        }
    }
    Ok(0)
}

pub fn builtin_shopt(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let mut mode: Option<bool> = None;
    let mut names = Vec::new();
    for arg in &argv[1..] {
        match arg.as_str() {
            "-s" => mode = Some(true),
            "-u" => mode = Some(false),
            "-p" | "-q" => {}
            name => names.push(name.to_string()),
        }
    }

    let known = ["dotglob", "nullglob", "failglob", "nocaseglob", "nocasematch"];
    if names.is_empty() {
        for name in known {
            super::outln(format!(
                "{name}\t{}",
                if get_shopt(shell, name) { "on" } else { "off" }
            ));
        }
        return Ok(0);
    }

    let mut status = 0;
    for name in &names {
        if !known.contains(&name.as_str()) {
            shell.diagnose(&format!("shopt: {name}: invalid shell option name"));
            status = 1;
            continue;
        }
        match mode {
            Some(on) => set_shopt(shell, name, on),
            None => {
                super::outln(format!(
                    "{name}\t{}",
                    if get_shopt(shell, name) { "on" } else { "off" }
                ));
                if !get_shopt(shell, name) {
                    status = 1;
                }
            }
        }
    }
    Ok(status)
}

fn set_shopt(shell: &mut Shell, name: &str, on: bool) {
    let s = &mut shell.state.shopts;
    match name {
        "dotglob" => s.dotglob = on,
        "nullglob" => s.nullglob = on,
        "failglob" => s.failglob = on,
        "nocaseglob" => s.nocaseglob = on,
        "nocasematch" => s.nocasematch = on,
        _ => {}
    }
}

fn get_shopt(shell: &Shell, name: &str) -> bool {
    let s = &shell.state.shopts;
    match name {
        "dotglob" => s.dotglob,
        "nullglob" => s.nullglob,
        "failglob" => s.failglob,
        "nocaseglob" => s.nocaseglob,
        "nocasematch" => s.nocasematch,
        _ => false,
    }
}
