//! The `read` builtin.
//!
//! Reads bytes one at a time so nothing beyond the consumed line is
//! taken from a shared, non-seekable stdin. Behavior against pipes vs
//! in-memory harness streams is host-sensitive; revalidate per target
//! runtime when porting.

use crate::interp::control::ExecResult;
use crate::shell::Shell;

/// Read one line from `fd` without buffering past the newline. `None`
/// on EOF with nothing read.
pub fn read_line_fd(fd: i32) -> Option<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = unsafe { libc::read(fd, byte.as_mut_ptr().cast(), 1) };
        match n {
            1 => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            0 => {
                if line.is_empty() {
                    return None;
                }
                break;
            }
            _ => {
                if nix::errno::Errno::last() == nix::errno::Errno::EINTR {
                    continue;
                }
                if line.is_empty() {
                    return None;
                }
                break;
            }
        }
    }
    Some(String::from_utf8_lossy(&line).into_owned())
}

pub fn builtin_read(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let mut raw = false;
    let mut args = &argv[1..];
    while let Some(first) = args.first() {
        match first.as_str() {
            "-r" => raw = true,
            "--" => {
                args = &args[1..];
                break;
            }
            _ => break,
        }
        args = &args[1..];
    }

    let mut line = match read_line_fd(0) {
        Some(line) => line,
        None => {
            // EOF: clear the target variables and fail.
            for name in args {
                let _ = shell.state.set_scalar(name, "");
            }
            return Ok(1);
        }
    };
    if line.ends_with('\n') {
        line.pop();
    }

    // Without -r, backslash-newline continues the line and other
    // backslashes escape the next character.
    if !raw {
        while line.ends_with('\\') && !line.ends_with("\\\\") {
            line.pop();
            match read_line_fd(0) {
                Some(more) => {
                    line.push_str(more.trim_end_matches('\n'));
                }
                None => break,
            }
        }
        line = unescape(&line);
    }

    let names: Vec<&str> = if args.is_empty() {
        vec!["REPLY"]
    } else {
        args.iter().map(|s| s.as_str()).collect()
    };

    let ifs = shell.state.ifs();
    let fields = split_for_read(&line, &ifs, names.len());
    let mut status = 0;
    for (i, name) in names.iter().enumerate() {
        let value = fields.get(i).cloned().unwrap_or_default();
        if let Err(e) = shell.state.set_scalar(name, value) {
            shell.diagnose(&e.to_string());
            status = 1;
        }
    }
    Ok(status)
}

fn unescape(line: &str) -> String {
    let mut out = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split into at most `n` fields; the last field keeps the remainder
/// with trailing IFS whitespace trimmed.
fn split_for_read(line: &str, ifs: &str, n: usize) -> Vec<String> {
    if n <= 1 {
        let trimmed = trim_ifs(line, ifs);
        return vec![trimmed.to_string()];
    }
    let is_ifs = |c: char| ifs.contains(c);
    let mut fields = Vec::new();
    let mut rest = line.trim_start_matches(is_ifs);
    while fields.len() + 1 < n {
        match rest.find(is_ifs) {
            Some(at) => {
                fields.push(rest[..at].to_string());
                rest = rest[at..].trim_start_matches(is_ifs);
            }
            None => break,
        }
    }
    fields.push(trim_ifs(rest, ifs).to_string());
    fields
}

fn trim_ifs<'a>(s: &'a str, ifs: &str) -> &'a str {
    let is_ifs_ws = |c: char| ifs.contains(c) && matches!(c, ' ' | '\t' | '\n');
    s.trim_start_matches(is_ifs_ws).trim_end_matches(is_ifs_ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_assigns_remainder_to_last() {
        let fields = split_for_read("a b c d", " \t\n", 2);
        assert_eq!(fields, ["a", "b c d"]);
    }

    #[test]
    fn split_single_keeps_whole_line() {
        let fields = split_for_read("  a b  ", " \t\n", 1);
        assert_eq!(fields, ["a b"]);
    }

    #[test]
    fn unescape_drops_backslashes() {
        assert_eq!(unescape(r"a\ b\\c"), r"a b\c");
    }
}
