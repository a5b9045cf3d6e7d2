//! `.` / `source`.

use crate::interp::control::{ExecResult, Interrupt};
use crate::shell::Shell;

pub fn builtin_source(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let Some(path_arg) = argv.get(1) else {
        shell.diagnose(".: filename argument required");
        return Ok(2);
    };

    // PATH search first for bare names, then the name itself.
    let path = if path_arg.contains('/') {
        path_arg.clone()
    } else {
        let path_var = shell.state.get_str("PATH").unwrap_or_default();
        path_var
            .split(':')
            .map(|dir| {
                if dir.is_empty() {
                    format!("./{path_arg}")
                } else {
                    format!("{dir}/{path_arg}")
                }
            })
            .find(|candidate| std::path::Path::new(candidate).is_file())
            .unwrap_or_else(|| path_arg.clone())
    };

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            shell.diagnose(&format!(".: {path_arg}: {e}"));
            return Ok(1);
        }
    };

    let list = match crate::parser::parse_script(&text, &shell.state.aliases) {
        Ok(list) => list,
        Err(e) => {
            shell.diagnose(&format!(".: {path_arg}: {e}"));
            return Ok(2);
        }
    };

    let replaced_positional = argv.len() > 2;
    if replaced_positional {
        shell.state.push_positional(argv[2..].to_vec());
    }
    shell.source_depth += 1;
    let result = shell.run_list(&list);
    shell.source_depth -= 1;
    if replaced_positional {
        shell.state.pop_positional();
    }

    match result {
        Ok(status) => Ok(status),
        // `return` ends the sourced script, not the enclosing shell.
        Err(Interrupt::Return(status)) => Ok(status),
        Err(other) => Err(other),
    }
}
