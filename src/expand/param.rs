//! Parameter expansion: `$x`, `${x}`, special parameters, positional
//! parameters, arrays, and the `${x...}` operator suite.

use crate::ast::{ArrayIndex, ParamExpansion, ParamOp, ReplaceAnchor, Word};
use crate::expand::pattern::{self, PatternPiece};
use crate::expand::split::Seg;
use crate::interp::arith::eval_arith_text;
use crate::interp::control::{ExecResult, Interrupt, ShellError};
use crate::interp::state::Value;
use crate::shell::Shell;

/// A parameter's raw value before quoting decisions.
#[derive(Debug, Clone, PartialEq)]
enum ParamValue {
    Unset,
    Str(String),
    /// `$@`, `$*`, `${a[@]}`, `${a[*]}` — one entry per element. The
    /// flag says whether `*`-style joining applies inside quotes.
    Fields(Vec<String>, JoinStyle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinStyle {
    /// `@`: one field per element inside quotes.
    Separate,
    /// `*`: joined with the first IFS character inside quotes.
    Join,
}

/// Expand one parameter reference into segments.
pub fn expand_param(
    shell: &mut Shell,
    param: &ParamExpansion,
    in_dquotes: bool,
) -> ExecResult<Vec<Seg>> {
    let value = base_value(shell, param)?;
    let value = apply_op(shell, param, value, in_dquotes)?;

    // nounset applies after default-style operators had their chance.
    if matches!(value, ParamValue::Unset)
        && shell.state.options.nounset
        && !is_exempt_from_nounset(&param.name)
    {
        return Err(Interrupt::Error(ShellError::UnsetVariable(param.name.clone())));
    }

    Ok(to_segs(shell, value, in_dquotes))
}

fn is_exempt_from_nounset(name: &str) -> bool {
    matches!(name, "@" | "*" | "?" | "$" | "!" | "#" | "-" | "0")
}

fn to_segs(shell: &Shell, value: ParamValue, in_dquotes: bool) -> Vec<Seg> {
    match value {
        ParamValue::Unset => vec![Seg::Text {
            text: String::new(),
            quoted: in_dquotes,
            splittable: !in_dquotes,
        }],
        ParamValue::Str(s) => vec![Seg::Text { text: s, quoted: in_dquotes, splittable: !in_dquotes }],
        ParamValue::Fields(items, style) => {
            if in_dquotes && style == JoinStyle::Join {
                let sep = shell.state.ifs().chars().next().map(String::from).unwrap_or_default();
                return vec![Seg::Text { text: items.join(&sep), quoted: true, splittable: false }];
            }
            // "$@" with no parameters expands to no fields at all; an
            // empty segment list (not an empty string) encodes that.
            let mut segs = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    segs.push(Seg::Break);
                }
                segs.push(Seg::Text {
                    text: item.clone(),
                    quoted: in_dquotes,
                    splittable: !in_dquotes,
                });
            }
            segs
        }
    }
}

// ---- base values ----

fn base_value(shell: &mut Shell, param: &ParamExpansion) -> ExecResult<ParamValue> {
    let name = param.name.as_str();

    if let Some(index) = &param.index {
        return array_value(shell, name, index);
    }

    Ok(match name {
        "@" => ParamValue::Fields(shell.state.positional().to_vec(), JoinStyle::Separate),
        "*" => ParamValue::Fields(shell.state.positional().to_vec(), JoinStyle::Join),
        "#" => ParamValue::Str(shell.state.positional().len().to_string()),
        "?" => ParamValue::Str(shell.state.last_status.to_string()),
        "$" => ParamValue::Str(shell.state.shell_pid.to_string()),
        "!" => match shell.state.last_bg_pid {
            Some(pid) => ParamValue::Str(pid.to_string()),
            None => ParamValue::Unset,
        },
        "-" => ParamValue::Str(option_flags(shell)),
        "0" => ParamValue::Str(shell.state.arg0.clone()),
        _ if name.chars().all(|c| c.is_ascii_digit()) => {
            let n: usize = name.parse().map_err(|_| {
                Interrupt::Error(ShellError::BadSubstitution(name.to_string()))
            })?;
            match n.checked_sub(1).and_then(|i| shell.state.positional().get(i)) {
                Some(v) => ParamValue::Str(v.clone()),
                None if n == 0 => ParamValue::Str(shell.state.arg0.clone()),
                None => ParamValue::Unset,
            }
        }
        // Maintained by the shell itself rather than the variable table.
        "LINENO" if shell.state.get(name).is_none() => {
            ParamValue::Str(shell.state.lineno.to_string())
        }
        "FUNCNAME" if shell.state.get(name).is_none() => match shell.state.funcname.last() {
            Some(name) => ParamValue::Str(name.clone()),
            None => ParamValue::Unset,
        },
        _ => match shell.state.get(name) {
            Some(var) => ParamValue::Str(var.value.as_str().to_string()),
            None => ParamValue::Unset,
        },
    })
}

fn option_flags(shell: &Shell) -> String {
    let mut flags = String::new();
    let o = &shell.state.options;
    for (on, c) in [
        (o.errexit, 'e'),
        (o.noclobber, 'C'),
        (o.noglob, 'f'),
        (shell.state.interactive, 'i'),
        (o.monitor, 'm'),
        (o.noexec, 'n'),
        (o.nounset, 'u'),
        (o.xtrace, 'x'),
    ] {
        if on {
            flags.push(c);
        }
    }
    flags
}

fn array_value(shell: &mut Shell, name: &str, index: &ArrayIndex) -> ExecResult<ParamValue> {
    let items: Vec<Option<String>> = match shell.state.get(name).map(|v| v.value.clone()) {
        Some(Value::Array(items)) => items,
        Some(Value::Scalar(s)) => vec![Some(s)],
        None => Vec::new(),
    };
    match index {
        ArrayIndex::All | ArrayIndex::Star => {
            let style = if matches!(index, ArrayIndex::All) {
                JoinStyle::Separate
            } else {
                JoinStyle::Join
            };
            let set: Vec<String> = items.into_iter().flatten().collect();
            Ok(ParamValue::Fields(set, style))
        }
        ArrayIndex::Expr(text) => {
            let idx = eval_arith_text(shell, text)?;
            let len = items.len() as i64;
            let idx = if idx < 0 { len + idx } else { idx };
            if idx < 0 || idx >= len {
                return Ok(ParamValue::Unset);
            }
            match &items[idx as usize] {
                Some(v) => Ok(ParamValue::Str(v.clone())),
                None => Ok(ParamValue::Unset),
            }
        }
    }
}

// ---- operators ----

fn apply_op(
    shell: &mut Shell,
    param: &ParamExpansion,
    value: ParamValue,
    in_dquotes: bool,
) -> ExecResult<ParamValue> {
    let Some(op) = &param.op else { return Ok(value) };

    let is_null = match &value {
        ParamValue::Unset => true,
        ParamValue::Str(s) => s.is_empty(),
        ParamValue::Fields(items, _) => items.is_empty(),
    };
    let is_unset = matches!(value, ParamValue::Unset)
        || matches!(&value, ParamValue::Fields(items, _) if items.is_empty());

    match op {
        ParamOp::Default { word, check_empty } => {
            if is_unset || (*check_empty && is_null) {
                Ok(ParamValue::Str(expand_arg(shell, word)?))
            } else {
                Ok(value)
            }
        }
        ParamOp::Assign { word, check_empty } => {
            if is_unset || (*check_empty && is_null) {
                let new = expand_arg(shell, word)?;
                if !is_assignable(&param.name) {
                    return Err(Interrupt::Error(ShellError::BadSubstitution(format!(
                        "${{{}}}: cannot assign in this way",
                        param.name
                    ))));
                }
                shell.state.set_scalar(&param.name, new.clone()).map_err(Interrupt::Error)?;
                Ok(ParamValue::Str(new))
            } else {
                Ok(value)
            }
        }
        ParamOp::Error { word, check_empty } => {
            if is_unset || (*check_empty && is_null) {
                let message = match word {
                    Some(w) => expand_arg(shell, w)?,
                    None => "parameter null or not set".to_string(),
                };
                Err(Interrupt::Error(ShellError::Expansion(format!(
                    "{}: {message}",
                    param.name
                ))))
            } else {
                Ok(value)
            }
        }
        ParamOp::Alternative { word, check_empty } => {
            if is_unset || (*check_empty && is_null) {
                Ok(ParamValue::Str(String::new()))
            } else {
                Ok(ParamValue::Str(expand_arg(shell, word)?))
            }
        }
        ParamOp::Length => Ok(ParamValue::Str(match &value {
            ParamValue::Unset => "0".to_string(),
            ParamValue::Str(s) => s.chars().count().to_string(),
            ParamValue::Fields(items, _) => items.len().to_string(),
        })),
        ParamOp::RemovePattern { pattern, suffix, greedy } => {
            let pieces = pattern_pieces(shell, pattern)?;
            map_value(value, |s| remove_pattern(&s, &pieces, *suffix, *greedy))
        }
        ParamOp::Replace { pattern, replacement, all, anchor } => {
            let pieces = pattern_pieces(shell, pattern)?;
            let replacement = match replacement {
                Some(word) => expand_arg(shell, word)?,
                None => String::new(),
            };
            map_value(value, |s| replace_pattern(&s, &pieces, &replacement, *all, *anchor))
        }
        ParamOp::CaseMod { upper, all, pattern } => {
            let pieces = match pattern {
                Some(word) => Some(pattern_pieces(shell, word)?),
                None => None,
            };
            map_value(value, |s| case_mod(&s, *upper, *all, pieces.as_deref()))
        }
        ParamOp::Substring { offset, length } => {
            let off = eval_arith_text(shell, offset)?;
            let len = match length {
                Some(text) => Some(eval_arith_text(shell, text)?),
                None => None,
            };
            Ok(substring(value, off, len))
        }
        ParamOp::Indirect => {
            let target = match &value {
                ParamValue::Str(s) => s.clone(),
                _ => String::new(),
            };
            if target.is_empty() {
                return Ok(ParamValue::Unset);
            }
            let inner = ParamExpansion::plain(target);
            base_value(shell, &inner)
        }
        ParamOp::Keys => {
            let keys = match shell.state.get(&param.name).map(|v| &v.value) {
                Some(Value::Array(items)) => items
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.is_some())
                    .map(|(i, _)| i.to_string())
                    .collect(),
                Some(Value::Scalar(_)) => vec!["0".to_string()],
                None => Vec::new(),
            };
            let style = if matches!(param.index, Some(ArrayIndex::Star)) {
                JoinStyle::Join
            } else {
                JoinStyle::Separate
            };
            let _ = in_dquotes;
            Ok(ParamValue::Fields(keys, style))
        }
    }
}

fn is_assignable(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Operator arguments expand without field splitting.
fn expand_arg(shell: &mut Shell, word: &Word) -> ExecResult<String> {
    crate::expand::expand_word_single(shell, word)
}

/// Patterns keep quoting provenance so quoted metacharacters stay
/// literal.
fn pattern_pieces(shell: &mut Shell, word: &Word) -> ExecResult<Vec<PatternPiece>> {
    crate::expand::expand_word_pattern(shell, word)
}

fn map_value(
    value: ParamValue,
    f: impl Fn(String) -> String,
) -> ExecResult<ParamValue> {
    Ok(match value {
        ParamValue::Unset => ParamValue::Str(f(String::new())),
        ParamValue::Str(s) => ParamValue::Str(f(s)),
        ParamValue::Fields(items, style) => {
            ParamValue::Fields(items.into_iter().map(f).collect(), style)
        }
    })
}

fn char_boundaries(s: &str) -> Vec<usize> {
    let mut bounds: Vec<usize> = s.char_indices().map(|(i, _)| i).collect();
    bounds.push(s.len());
    bounds
}

fn remove_pattern(s: &str, pieces: &[PatternPiece], suffix: bool, greedy: bool) -> String {
    let Ok(re) = pattern::compile_pattern(pieces, false) else {
        return s.to_string();
    };
    let bounds = char_boundaries(s);
    if suffix {
        // `%` removes the shortest suffix, `%%` the longest.
        let order: Box<dyn Iterator<Item = &usize>> = if greedy {
            Box::new(bounds.iter())
        } else {
            Box::new(bounds.iter().rev())
        };
        for &at in order {
            if re.is_match(&s[at..]) {
                return s[..at].to_string();
            }
        }
    } else {
        let order: Box<dyn Iterator<Item = &usize>> = if greedy {
            Box::new(bounds.iter().rev())
        } else {
            Box::new(bounds.iter())
        };
        for &at in order {
            if re.is_match(&s[..at]) {
                return s[at..].to_string();
            }
        }
    }
    s.to_string()
}

fn replace_pattern(
    s: &str,
    pieces: &[PatternPiece],
    replacement: &str,
    all: bool,
    anchor: Option<ReplaceAnchor>,
) -> String {
    let mut source = String::from("(?s)");
    match anchor {
        Some(ReplaceAnchor::Start) => {
            source.push('^');
            source.push_str(&pattern::pieces_to_regex(pieces, true));
        }
        Some(ReplaceAnchor::End) => {
            source.push_str(&pattern::pieces_to_regex(pieces, true));
            source.push('$');
        }
        None => source.push_str(&pattern::pieces_to_regex(pieces, true)),
    }
    let Ok(re) = regex_lite::Regex::new(&source) else {
        return s.to_string();
    };
    // `$` must stay literal in the replacement.
    let literal = replacement.replace('$', "$$");
    if all && anchor.is_none() {
        re.replace_all(s, literal.as_str()).into_owned()
    } else {
        re.replace(s, literal.as_str()).into_owned()
    }
}

fn case_mod(s: &str, upper: bool, all: bool, pieces: Option<&[PatternPiece]>) -> String {
    let matches_char = |c: char| -> bool {
        match pieces {
            None => true,
            Some(pieces) => pattern::matches(pieces, &c.to_string(), false),
        }
    };
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        let eligible = (all || i == 0) && matches_char(c);
        if eligible && upper {
            out.extend(c.to_uppercase());
        } else if eligible && !upper {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn substring(value: ParamValue, offset: i64, length: Option<i64>) -> ParamValue {
    match value {
        ParamValue::Unset => ParamValue::Str(String::new()),
        ParamValue::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let n = chars.len() as i64;
            let start = if offset < 0 { (n + offset).max(0) } else { offset.min(n) };
            let end = match length {
                None => n,
                Some(len) if len < 0 => (n + len).max(start),
                Some(len) => (start + len).min(n),
            };
            ParamValue::Str(chars[start as usize..end.max(start) as usize].iter().collect())
        }
        ParamValue::Fields(items, style) => {
            let n = items.len() as i64;
            let start = if offset < 0 {
                (n + offset).max(0)
            } else {
                // Offset 1 is the first positional parameter.
                (offset - 1).clamp(0, n)
            };
            let end = match length {
                None => n,
                Some(len) if len < 0 => n,
                Some(len) => (start + len).min(n),
            };
            ParamValue::Fields(
                items[start as usize..end.max(start) as usize].to_vec(),
                style,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::word_parser::{parse_word, WordContext};
    use crate::shell::Shell;

    fn shell() -> Shell {
        Shell::new("test")
    }

    fn expand(shell: &mut Shell, text: &str) -> String {
        let word = parse_word(text, WordContext::Normal).unwrap();
        crate::expand::expand_word_single(shell, &word).unwrap()
    }

    fn expand_err(shell: &mut Shell, text: &str) -> Interrupt {
        let word = parse_word(text, WordContext::Normal).unwrap();
        crate::expand::expand_word_single(shell, &word).unwrap_err()
    }

    #[test]
    fn plain_and_braced() {
        let mut sh = shell();
        sh.state.set_scalar("x", "value").unwrap();
        assert_eq!(expand(&mut sh, "$x"), "value");
        assert_eq!(expand(&mut sh, "${x}"), "value");
        assert_eq!(expand(&mut sh, "$nosuch"), "");
    }

    #[test]
    fn special_params() {
        let mut sh = shell();
        sh.state.last_status = 42;
        assert_eq!(expand(&mut sh, "$?"), "42");
        sh.state.set_positional(vec!["a".into(), "b".into()]);
        assert_eq!(expand(&mut sh, "$#"), "2");
        assert_eq!(expand(&mut sh, "$1"), "a");
    }

    #[test]
    fn default_operators() {
        let mut sh = shell();
        assert_eq!(expand(&mut sh, "${x:-fallback}"), "fallback");
        sh.state.set_scalar("x", "").unwrap();
        assert_eq!(expand(&mut sh, "${x:-fallback}"), "fallback");
        assert_eq!(expand(&mut sh, "${x-fallback}"), "");
        sh.state.set_scalar("x", "real").unwrap();
        assert_eq!(expand(&mut sh, "${x:-fallback}"), "real");
    }

    #[test]
    fn assign_default() {
        let mut sh = shell();
        assert_eq!(expand(&mut sh, "${y:=assigned}"), "assigned");
        assert_eq!(sh.state.get_str("y").unwrap(), "assigned");
    }

    #[test]
    fn error_if_unset() {
        let mut sh = shell();
        let err = expand_err(&mut sh, "${z:?custom message}");
        match err {
            Interrupt::Error(e) => assert!(e.to_string().contains("custom message")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn alternative() {
        let mut sh = shell();
        assert_eq!(expand(&mut sh, "${x:+alt}"), "");
        sh.state.set_scalar("x", "set").unwrap();
        assert_eq!(expand(&mut sh, "${x:+alt}"), "alt");
    }

    #[test]
    fn length() {
        let mut sh = shell();
        sh.state.set_scalar("s", "héllo").unwrap();
        assert_eq!(expand(&mut sh, "${#s}"), "5");
        sh.state.set_positional(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(expand(&mut sh, "${#@}"), "3");
    }

    #[test]
    fn pattern_removal() {
        let mut sh = shell();
        sh.state.set_scalar("path", "/usr/local/bin").unwrap();
        assert_eq!(expand(&mut sh, "${path#*/}"), "usr/local/bin");
        assert_eq!(expand(&mut sh, "${path##*/}"), "bin");
        sh.state.set_scalar("file", "archive.tar.gz").unwrap();
        assert_eq!(expand(&mut sh, "${file%.*}"), "archive.tar");
        assert_eq!(expand(&mut sh, "${file%%.*}"), "archive");
    }

    #[test]
    fn replacement() {
        let mut sh = shell();
        sh.state.set_scalar("s", "aXbXc").unwrap();
        assert_eq!(expand(&mut sh, "${s/X/-}"), "a-bXc");
        assert_eq!(expand(&mut sh, "${s//X/-}"), "a-b-c");
        assert_eq!(expand(&mut sh, "${s/X}"), "abXc");
        assert_eq!(expand(&mut sh, "${s/#a/A}"), "AXbXc");
        assert_eq!(expand(&mut sh, "${s/%c/C}"), "aXbXC");
    }

    #[test]
    fn case_modification() {
        let mut sh = shell();
        sh.state.set_scalar("w", "hello world").unwrap();
        assert_eq!(expand(&mut sh, "${w^}"), "Hello world");
        assert_eq!(expand(&mut sh, "${w^^}"), "HELLO WORLD");
        sh.state.set_scalar("u", "SHOUT").unwrap();
        assert_eq!(expand(&mut sh, "${u,}"), "sHOUT");
        assert_eq!(expand(&mut sh, "${u,,}"), "shout");
        assert_eq!(expand(&mut sh, "${u,,[SH]}"), "shOUT");
    }

    #[test]
    fn substrings() {
        let mut sh = shell();
        sh.state.set_scalar("s", "abcdefgh").unwrap();
        assert_eq!(expand(&mut sh, "${s:2}"), "cdefgh");
        assert_eq!(expand(&mut sh, "${s:2:3}"), "cde");
        assert_eq!(expand(&mut sh, "${s: -3}"), "fgh");
        assert_eq!(expand(&mut sh, "${s:1:-2}"), "bcdef");
        assert_eq!(expand(&mut sh, "${s:20}"), "");
    }

    #[test]
    fn positional_slice() {
        let mut sh = shell();
        sh.state.set_positional(vec!["a".into(), "b".into(), "c".into(), "d".into()]);
        assert_eq!(expand(&mut sh, "${@:2:2}"), "b c");
    }

    #[test]
    fn indirection() {
        let mut sh = shell();
        sh.state.set_scalar("ref", "target").unwrap();
        sh.state.set_scalar("target", "hit").unwrap();
        assert_eq!(expand(&mut sh, "${!ref}"), "hit");
    }

    #[test]
    fn arrays() {
        let mut sh = shell();
        sh.state
            .set_array("a", vec![Some("x".into()), None, Some("z".into())])
            .unwrap();
        assert_eq!(expand(&mut sh, "${a[0]}"), "x");
        assert_eq!(expand(&mut sh, "${a[2]}"), "z");
        assert_eq!(expand(&mut sh, "${a[1]}"), "");
        assert_eq!(expand(&mut sh, "${a[@]}"), "x z");
        assert_eq!(expand(&mut sh, "${#a[@]}"), "2");
        assert_eq!(expand(&mut sh, "${!a[@]}"), "0 2");
        assert_eq!(expand(&mut sh, "${a[-1]}"), "z");
    }

    #[test]
    fn nounset() {
        let mut sh = shell();
        sh.state.options.nounset = true;
        assert!(matches!(
            expand_err(&mut sh, "$missing"),
            Interrupt::Error(ShellError::UnsetVariable(_))
        ));
        // Defaults defuse it; specials are exempt.
        assert_eq!(expand(&mut sh, "${missing:-ok}"), "ok");
        assert_eq!(expand(&mut sh, "$!"), "");
    }
}
