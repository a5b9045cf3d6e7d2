//! Evaluation of `[[ ... ]]` conditional expressions.
//!
//! No word splitting or pathname expansion applies to the operands.
//! `==` / `!=` pattern-match with the right side's quoting provenance;
//! `=~` matches a regular expression and fills `BASH_REMATCH`.

use std::os::unix::fs::MetadataExt;

use crate::ast::{CondBinaryOp, CondExpr, CondUnaryOp, Word};
use crate::expand::pattern;
use crate::expand::{expand_word_pattern, expand_word_single};
use crate::interp::arith::eval_arith_text;
use crate::interp::control::{ExecResult, Interrupt, ShellError};
use crate::shell::Shell;

/// Evaluate to a truth value; expansion or regex errors propagate.
pub fn eval_cond(shell: &mut Shell, expr: &CondExpr) -> ExecResult<bool> {
    match expr {
        CondExpr::And(lhs, rhs) => Ok(eval_cond(shell, lhs)? && eval_cond(shell, rhs)?),
        CondExpr::Or(lhs, rhs) => Ok(eval_cond(shell, lhs)? || eval_cond(shell, rhs)?),
        CondExpr::Not(inner) => Ok(!eval_cond(shell, inner)?),
        CondExpr::Word(word) => Ok(!expand_word_single(shell, word)?.is_empty()),
        CondExpr::Unary { op, operand } => {
            let arg = expand_word_single(shell, operand)?;
            eval_unary(shell, *op, &arg)
        }
        CondExpr::Binary { op, lhs, rhs } => eval_binary(shell, *op, lhs, rhs),
    }
}

fn eval_unary(shell: &mut Shell, op: CondUnaryOp, arg: &str) -> ExecResult<bool> {
    use std::fs;
    let meta = || fs::metadata(arg);
    let symlink_meta = || fs::symlink_metadata(arg);
    Ok(match op {
        CondUnaryOp::Exists => symlink_meta().is_ok(),
        CondUnaryOp::IsFile => meta().map(|m| m.is_file()).unwrap_or(false),
        CondUnaryOp::IsDir => meta().map(|m| m.is_dir()).unwrap_or(false),
        CondUnaryOp::IsSymlink => symlink_meta().map(|m| m.file_type().is_symlink()).unwrap_or(false),
        CondUnaryOp::IsFifo => meta()
            .map(|m| m.mode() & libc::S_IFMT == libc::S_IFIFO)
            .unwrap_or(false),
        CondUnaryOp::IsBlock => meta()
            .map(|m| m.mode() & libc::S_IFMT == libc::S_IFBLK)
            .unwrap_or(false),
        CondUnaryOp::IsChar => meta()
            .map(|m| m.mode() & libc::S_IFMT == libc::S_IFCHR)
            .unwrap_or(false),
        CondUnaryOp::IsSocket => meta()
            .map(|m| m.mode() & libc::S_IFMT == libc::S_IFSOCK)
            .unwrap_or(false),
        CondUnaryOp::NonEmptyFile => meta().map(|m| m.len() > 0).unwrap_or(false),
        CondUnaryOp::Readable => access(arg, libc::R_OK),
        CondUnaryOp::Writable => access(arg, libc::W_OK),
        CondUnaryOp::Executable => access(arg, libc::X_OK),
        CondUnaryOp::IsTty => match arg.parse::<i32>() {
            Ok(fd) => unsafe { libc::isatty(fd) == 1 },
            Err(_) => false,
        },
        CondUnaryOp::ZeroLength => arg.is_empty(),
        CondUnaryOp::NonZeroLength => !arg.is_empty(),
        CondUnaryOp::VarSet => shell.state.is_set(arg),
        CondUnaryOp::OptionSet => option_is_set(shell, arg),
    })
}

fn access(path: &str, mode: libc::c_int) -> bool {
    let Ok(c_path) = std::ffi::CString::new(path) else { return false };
    unsafe { libc::access(c_path.as_ptr(), mode) == 0 }
}

fn option_is_set(shell: &Shell, name: &str) -> bool {
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

fn eval_binary(shell: &mut Shell, op: CondBinaryOp, lhs: &Word, rhs: &Word) -> ExecResult<bool> {
    match op {
        CondBinaryOp::Match | CondBinaryOp::NoMatch => {
            let subject = expand_word_single(shell, lhs)?;
            let pieces = expand_word_pattern(shell, rhs)?;
            let nocase = shell.state.shopts.nocasematch;
            let hit = pattern::matches(&pieces, &subject, nocase);
            Ok(if op == CondBinaryOp::Match { hit } else { !hit })
        }
        CondBinaryOp::Regex => regex_match(shell, lhs, rhs),
        CondBinaryOp::StrLt => {
            let a = expand_word_single(shell, lhs)?;
            let b = expand_word_single(shell, rhs)?;
            Ok(a < b)
        }
        CondBinaryOp::StrGt => {
            let a = expand_word_single(shell, lhs)?;
            let b = expand_word_single(shell, rhs)?;
            Ok(a > b)
        }
        CondBinaryOp::NumEq
        | CondBinaryOp::NumNe
        | CondBinaryOp::NumLt
        | CondBinaryOp::NumLe
        | CondBinaryOp::NumGt
        | CondBinaryOp::NumGe => {
            let a_text = expand_word_single(shell, lhs)?;
            let b_text = expand_word_single(shell, rhs)?;
            let a = eval_arith_text(shell, &a_text)?;
            let b = eval_arith_text(shell, &b_text)?;
            Ok(match op {
                CondBinaryOp::NumEq => a == b,
                CondBinaryOp::NumNe => a != b,
                CondBinaryOp::NumLt => a < b,
                CondBinaryOp::NumLe => a <= b,
                CondBinaryOp::NumGt => a > b,
                _ => a >= b,
            })
        }
        CondBinaryOp::NewerThan | CondBinaryOp::OlderThan => {
            let a = expand_word_single(shell, lhs)?;
            let b = expand_word_single(shell, rhs)?;
            let ma = std::fs::metadata(&a).ok();
            let mb = std::fs::metadata(&b).ok();
            Ok(match (ma, mb) {
                (Some(ma), Some(mb)) => {
                    let newer = (ma.mtime(), ma.mtime_nsec()) > (mb.mtime(), mb.mtime_nsec());
                    if op == CondBinaryOp::NewerThan { newer } else { !newer && ma.mtime() != mb.mtime() }
                }
                // -nt: true when only the left exists; -ot: only right.
                (Some(_), None) => op == CondBinaryOp::NewerThan,
                (None, Some(_)) => op == CondBinaryOp::OlderThan,
                (None, None) => false,
            })
        }
        CondBinaryOp::SameFile => {
            let a = expand_word_single(shell, lhs)?;
            let b = expand_word_single(shell, rhs)?;
            match (std::fs::metadata(&a), std::fs::metadata(&b)) {
                (Ok(ma), Ok(mb)) => Ok(ma.dev() == mb.dev() && ma.ino() == mb.ino()),
                _ => Ok(false),
            }
        }
    }
}

/// `=~`: the unquoted parts of the right operand are regex syntax,
/// quoted parts match literally. Capture groups land in `BASH_REMATCH`.
fn regex_match(shell: &mut Shell, lhs: &Word, rhs: &Word) -> ExecResult<bool> {
    let subject = expand_word_single(shell, lhs)?;
    let pieces = expand_word_pattern(shell, rhs)?;

    let mut source = String::new();
    if shell.state.shopts.nocasematch {
        source.push_str("(?i)");
    }
    for piece in &pieces {
        if piece.quoted {
            for c in piece.text.chars() {
                if !c.is_ascii_alphanumeric() {
                    source.push('\\');
                }
                source.push(c);
            }
        } else {
            source.push_str(&piece.text);
        }
    }

    let re = regex_lite::Regex::new(&source).map_err(|e| {
        Interrupt::Error(ShellError::Expansion(format!("invalid regex: {e}")))
    })?;

    match re.captures(&subject) {
        Some(caps) => {
            let items: Vec<Option<String>> = (0..caps.len())
                .map(|i| Some(caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default()))
                .collect();
            shell.state.set_array("BASH_REMATCH", items).map_err(Interrupt::Error)?;
            Ok(true)
        }
        None => {
            shell
                .state
                .set_array("BASH_REMATCH", Vec::new())
                .map_err(Interrupt::Error)?;
            Ok(false)
        }
    }
}
