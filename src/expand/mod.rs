//! Word expansion.
//!
//! The stages run in the fixed, observable order: brace expansion,
//! tilde expansion, parameter/command/arithmetic substitution, field
//! splitting, pathname expansion, quote removal. Quoting provenance
//! rides along the whole way, so a `*` from a quoted span never globs
//! and `"$@"` produces exactly one field per positional parameter.

pub mod brace;
pub mod command_subst;
pub mod glob;
pub mod param;
pub mod pattern;
pub mod split;
pub mod tilde;

use crate::ast::{Word, WordPart};
use crate::expand::pattern::PatternPiece;
use crate::expand::split::{join_field, split_fields, Seg};
use crate::interp::control::ExecResult;
use crate::shell::Shell;

/// Fully expand words into argv elements: brace, tilde, substitutions,
/// splitting, globbing, quote removal.
pub fn expand_words(shell: &mut Shell, words: &[Word]) -> ExecResult<Vec<String>> {
    let ifs = shell.state.ifs();
    let mut argv = Vec::new();
    for word in words {
        for braced in brace::brace_expand(word) {
            let mut segs = Vec::new();
            eval_parts(shell, &braced.parts, false, &mut segs)?;
            for field in split_fields(&segs, &ifs) {
                argv.extend(glob::glob_field(shell, &field)?);
            }
        }
    }
    Ok(argv)
}

/// Expand to exactly one string: no brace expansion, splitting, or
/// globbing. Used for redirect targets, assignment values, heredoc
/// bodies, and `${x:-word}` arguments.
pub fn expand_word_single(shell: &mut Shell, word: &Word) -> ExecResult<String> {
    let mut segs = Vec::new();
    eval_parts(shell, &word.parts, false, &mut segs)?;
    let mut out = String::new();
    for seg in &segs {
        match seg {
            Seg::Break => out.push(' '),
            Seg::Text { text, .. } => out.push_str(text),
        }
    }
    Ok(out)
}

/// Expand a word into pattern pieces, substitutions done but glob
/// characters still live and quoted spans marked inert. Used for case
/// patterns, `[[ == ]]` operands, and `${x#pattern}` arguments.
pub fn expand_word_pattern(shell: &mut Shell, word: &Word) -> ExecResult<Vec<PatternPiece>> {
    let mut segs = Vec::new();
    eval_parts(shell, &word.parts, false, &mut segs)?;
    let mut pieces = Vec::new();
    for seg in segs {
        match seg {
            Seg::Break => pieces.push(PatternPiece::unquoted(" ")),
            Seg::Text { text, quoted, .. } => pieces.push(PatternPiece { text, quoted }),
        }
    }
    Ok(pieces)
}

/// Evaluate word parts into segments, recursing into double quotes.
fn eval_parts(
    shell: &mut Shell,
    parts: &[WordPart],
    in_dquotes: bool,
    out: &mut Vec<Seg>,
) -> ExecResult<()> {
    for part in parts {
        match part {
            WordPart::Literal(text) => out.push(Seg::Text {
                text: text.clone(),
                quoted: in_dquotes,
                splittable: false,
            }),
            WordPart::SingleQuoted(text) => out.push(Seg::quoted(text.clone())),
            WordPart::Escaped(c) => out.push(Seg::quoted(c.to_string())),
            WordPart::DoubleQuoted(inner) => {
                if inner.is_empty() {
                    // Bare "" anchors an empty field.
                    out.push(Seg::quoted(""));
                } else {
                    eval_parts(shell, inner, true, out)?;
                }
            }
            WordPart::Param(param) => {
                out.extend(param::expand_param(shell, param, in_dquotes)?);
            }
            WordPart::CommandSubst { body, .. } => {
                let text = command_subst::command_substitute(shell, body)?;
                out.push(Seg::Text { text, quoted: in_dquotes, splittable: !in_dquotes });
            }
            WordPart::Arith(expr) => {
                let value = crate::interp::arith::eval_arith(shell, expr)?;
                out.push(Seg::Text {
                    text: value.to_string(),
                    quoted: in_dquotes,
                    splittable: !in_dquotes,
                });
            }
            WordPart::Tilde(user) => {
                let home = tilde::tilde_expand(&shell.state, user.as_deref());
                out.push(Seg::Text { text: home, quoted: true, splittable: false });
            }
            WordPart::Brace(items) => {
                // Reached only in non-list contexts (case patterns,
                // assignment-adjacent words): braces are literal there.
                out.push(Seg::Text {
                    text: render_brace_literal(shell, items)?,
                    quoted: in_dquotes,
                    splittable: false,
                });
            }
        }
    }
    Ok(())
}

fn render_brace_literal(
    shell: &mut Shell,
    items: &[crate::ast::BraceItem],
) -> ExecResult<String> {
    use crate::ast::BraceItem;
    let mut rendered = Vec::new();
    for item in items {
        match item {
            BraceItem::Word(word) => rendered.push(expand_word_single(shell, word)?),
            BraceItem::Range { start_text, end_text, step, .. } => {
                let mut text = format!("{start_text}..{end_text}");
                if let Some(step) = step {
                    text.push_str(&format!("..{step}"));
                }
                rendered.push(text);
            }
        }
    }
    Ok(format!("{{{}}}", rendered.join(",")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::word_parser::{parse_word, WordContext};
    use crate::shell::Shell;

    fn shell() -> Shell {
        Shell::new("test")
    }

    fn words(shell: &mut Shell, text: &str) -> Vec<String> {
        let word = parse_word(text, WordContext::Normal).unwrap();
        expand_words(shell, &[word]).unwrap()
    }

    #[test]
    fn literal_word() {
        let mut sh = shell();
        assert_eq!(words(&mut sh, "hello"), ["hello"]);
    }

    #[test]
    fn unquoted_expansion_splits() {
        let mut sh = shell();
        sh.state.set_scalar("v", "a b  c").unwrap();
        assert_eq!(words(&mut sh, "$v"), ["a", "b", "c"]);
    }

    #[test]
    fn quoted_expansion_does_not_split() {
        let mut sh = shell();
        sh.state.set_scalar("v", "a b").unwrap();
        assert_eq!(words(&mut sh, "\"$v\""), ["a b"]);
    }

    #[test]
    fn empty_unquoted_expansion_vanishes() {
        let mut sh = shell();
        assert!(words(&mut sh, "$unset_var").is_empty());
        assert_eq!(words(&mut sh, "\"$unset_var\""), [""]);
    }

    #[test]
    fn at_in_quotes_keeps_fields() {
        let mut sh = shell();
        sh.state.set_positional(vec!["a b".into(), "c".into()]);
        assert_eq!(words(&mut sh, "\"$@\""), ["a b", "c"]);
    }

    #[test]
    fn star_in_quotes_joins_with_ifs() {
        let mut sh = shell();
        sh.state.set_positional(vec!["a".into(), "b".into()]);
        assert_eq!(words(&mut sh, "\"$*\""), ["a b"]);
        sh.state.set_scalar("IFS", ":").unwrap();
        assert_eq!(words(&mut sh, "\"$*\""), ["a:b"]);
    }

    #[test]
    fn at_with_prefix_joins_first_field() {
        let mut sh = shell();
        sh.state.set_positional(vec!["a b".into(), "c".into()]);
        assert_eq!(words(&mut sh, "x\"$@\""), ["xa b", "c"]);
    }

    #[test]
    fn empty_at_in_quotes_produces_nothing() {
        let mut sh = shell();
        sh.state.set_positional(vec![]);
        assert!(words(&mut sh, "\"$@\"").is_empty());
    }

    #[test]
    fn brace_then_expansion() {
        let mut sh = shell();
        sh.state.set_scalar("x", "V").unwrap();
        assert_eq!(words(&mut sh, "{$x,y}"), ["V", "y"]);
    }

    #[test]
    fn arith_in_word() {
        let mut sh = shell();
        assert_eq!(words(&mut sh, "n$((2+3))"), ["n5"]);
    }

    #[test]
    fn single_string_expansion() {
        let mut sh = shell();
        sh.state.set_scalar("v", "a b").unwrap();
        let word = parse_word("$v", WordContext::Normal).unwrap();
        assert_eq!(expand_word_single(&mut sh, &word).unwrap(), "a b");
    }

    #[test]
    fn pattern_pieces_keep_provenance() {
        let mut sh = shell();
        let word = parse_word("\"*\"x*", WordContext::Normal).unwrap();
        let pieces = expand_word_pattern(&mut sh, &word).unwrap();
        assert!(pieces[0].quoted);
        assert!(!pieces[1].quoted);
    }
}
