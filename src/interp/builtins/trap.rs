//! The `trap` builtin.
//!
//! EXIT traps run when the shell exits; signal traps are recorded and
//! executed at the next command boundary after the self-pipe reports
//! the signal. DEBUG and ERR are not supported.

use nix::sys::signal::Signal;

use crate::interp::builtins::jobs::parse_signal;
use crate::interp::control::ExecResult;
use crate::jobs::signals;
use crate::shell::Shell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapTarget {
    Exit,
    Signal(i32),
}

pub fn builtin_trap(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let args = &argv[1..];

    if args.is_empty() || args[0] == "-p" {
        if let Some(action) = &shell.traps.exit {
            super::outln(format!("trap -- {} EXIT", quote(action)));
        }
        let mut sigs: Vec<(&i32, &String)> = shell.traps.signals.iter().collect();
        sigs.sort_by_key(|(sig, _)| **sig);
        for (sig, action) in sigs {
            let name = Signal::try_from(*sig)
                .map(|s| s.as_str().trim_start_matches("SIG").to_string())
                .unwrap_or_else(|_| sig.to_string());
            super::outln(format!("trap -- {} {}", quote(action), name));
        }
        return Ok(0);
    }

    if args[0] == "-l" {
        for sig in Signal::iterator() {
            super::out(format!("{} ", sig.as_str().trim_start_matches("SIG")));
        }
        super::outln("");
        return Ok(0);
    }

    // `trap CMD SIG...`; a CMD of `-` resets, `` ignores. A first
    // argument that looks like a signal with nothing before it resets.
    let (action, targets) = if args.len() == 1 {
        (Some("-".to_string()), &args[0..])
    } else {
        (Some(args[0].clone()), &args[1..])
    };
    let action = action.unwrap();

    let mut status = 0;
    for target_text in targets {
        let target = match parse_target(target_text) {
            Some(target) => target,
            None => {
                shell.diagnose(&format!("trap: {target_text}: invalid signal specification"));
                status = 1;
                continue;
            }
        };
        match target {
            TrapTarget::Exit => {
                shell.traps.exit = match action.as_str() {
                    "-" => None,
                    _ => Some(action.clone()),
                };
            }
            TrapTarget::Signal(sig) => {
                let Ok(signal) = Signal::try_from(sig) else {
                    status = 1;
                    continue;
                };
                match action.as_str() {
                    "-" => {
                        shell.traps.signals.remove(&sig);
                        let _ = signals::default_signal(signal);
                    }
                    "" => {
                        shell.traps.signals.remove(&sig);
                        let _ = signals::ignore_signal(signal);
                    }
                    _ => {
                        shell.traps.signals.insert(sig, action.clone());
                        if signals::catch_signal(signal).is_err() {
                            shell.diagnose(&format!(
                                "trap: {target_text}: cannot trap this signal"
                            ));
                            shell.traps.signals.remove(&sig);
                            status = 1;
                        }
                    }
                }
            }
        }
    }
    Ok(status)
}

fn parse_target(text: &str) -> Option<TrapTarget> {
    if text == "EXIT" || text == "0" {
        return Some(TrapTarget::Exit);
    }
    if text == "DEBUG" || text == "ERR" || text == "RETURN" {
        return None;
    }
    parse_signal(text).map(|sig| TrapTarget::Signal(sig as i32))
}

fn quote(action: &str) -> String {
    format!("'{}'", action.replace('\'', "'\\''"))
}
