//! `cd` and `pwd`.

use crate::interp::control::ExecResult;
use crate::shell::Shell;

pub fn builtin_cd(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let target = match argv.get(1).map(|s| s.as_str()) {
        None | Some("--") => match shell.state.get_str("HOME") {
            Some(home) => home,
            None => {
                shell.diagnose("cd: HOME not set");
                return Ok(1);
            }
        },
        Some("-") => match shell.state.get_str("OLDPWD") {
            Some(oldpwd) => {
                super::outln(&oldpwd);
                oldpwd
            }
            None => {
                shell.diagnose("cd: OLDPWD not set");
                return Ok(1);
            }
        },
        Some(path) => {
            let mut target = path.to_string();
            // CDPATH search for relative paths.
            if !path.starts_with('/') && !path.starts_with('.') {
                if let Some(cdpath) = shell.state.get_str("CDPATH") {
                    for dir in cdpath.split(':') {
                        if dir.is_empty() {
                            continue;
                        }
                        let candidate = format!("{dir}/{path}");
                        if std::path::Path::new(&candidate).is_dir() {
                            super::outln(&candidate);
                            target = candidate;
                            break;
                        }
                    }
                }
            }
            target
        }
    };

    let old = std::env::current_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Err(e) = std::env::set_current_dir(&target) {
        shell.diagnose(&format!("cd: {target}: {}", io_message(&e)));
        return Ok(1);
    }
    let new = std::env::current_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or(target);
    let _ = shell.state.set_scalar("OLDPWD", old);
    let _ = shell.state.set_scalar("PWD", new);
    shell.state.export("OLDPWD");
    shell.state.export("PWD");
    Ok(0)
}

pub fn builtin_pwd(shell: &mut Shell, _argv: &[String]) -> ExecResult<i32> {
    match std::env::current_dir() {
        Ok(dir) => {
            super::outln(dir.display().to_string());
            Ok(0)
        }
        Err(e) => {
            shell.diagnose(&format!("pwd: {}", io_message(&e)));
            Ok(1)
        }
    }
}

fn io_message(e: &std::io::Error) -> String {
    match e.kind() {
        std::io::ErrorKind::NotFound => "No such file or directory".to_string(),
        std::io::ErrorKind::PermissionDenied => "Permission denied".to_string(),
        _ => e.to_string(),
    }
}
