//! Word parsing: raw word text into typed [`WordPart`]s.
//!
//! The lexer hands over words verbatim, quotes and all. This module
//! classifies every span by quoting class and parses the embedded
//! expansions recursively, so the expansion engine never has to look at
//! source text again.

use std::collections::HashMap;

use crate::ast::*;
use crate::parser::arith_parser::parse_arith;

/// Word-level parse failure (bad substitution, unbalanced braces).
#[derive(Debug, Clone)]
pub struct WordError(pub String);

/// Where a word appears changes which expansions are recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordContext {
    /// Command words: brace expansion and leading tilde are live.
    Normal,
    /// Assignment values and `${x:-w}` arguments: no brace expansion,
    /// tilde after the start and after each unquoted `:`.
    Assignment,
    /// Heredoc bodies: only `$`, backquote, and backslash are special.
    HereDoc,
}

pub fn parse_word(text: &str, ctx: WordContext) -> Result<Word, WordError> {
    let chars: Vec<char> = text.chars().collect();
    if ctx == WordContext::HereDoc {
        return parse_heredoc_body(&chars);
    }
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    // Leading tilde.
    if let Some((part, next)) = try_parse_tilde(&chars, 0) {
        parts.push(part);
        i = next;
    }

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                flush(&mut parts, &mut literal);
                if i + 1 < chars.len() {
                    parts.push(WordPart::Escaped(chars[i + 1]));
                    i += 2;
                } else {
                    literal.push('\\');
                    i += 1;
                }
            }
            '\'' => {
                flush(&mut parts, &mut literal);
                let (value, next) = read_single_quoted(&chars, i + 1)?;
                parts.push(WordPart::SingleQuoted(value));
                i = next;
            }
            '"' => {
                flush(&mut parts, &mut literal);
                let (inner, next) = parse_double_quoted(&chars, i + 1)?;
                parts.push(WordPart::DoubleQuoted(inner));
                i = next;
            }
            '`' => {
                flush(&mut parts, &mut literal);
                let (part, next) = parse_backquoted(&chars, i + 1)?;
                parts.push(part);
                i = next;
            }
            '$' => {
                flush(&mut parts, &mut literal);
                let (part, next) = parse_dollar(&chars, i)?;
                match part {
                    Some(part) => {
                        parts.push(part);
                        i = next;
                    }
                    None => {
                        literal.push('$');
                        i += 1;
                    }
                }
            }
            '{' if ctx == WordContext::Normal => {
                match try_parse_brace(&chars, i)? {
                    Some((part, next)) => {
                        flush(&mut parts, &mut literal);
                        parts.push(part);
                        i = next;
                    }
                    None => {
                        literal.push('{');
                        i += 1;
                    }
                }
            }
            ':' if ctx == WordContext::Assignment => {
                literal.push(':');
                i += 1;
                // PATH-style values tilde-expand each `:`-segment.
                if let Some((part, next)) = try_parse_tilde(&chars, i) {
                    flush(&mut parts, &mut literal);
                    parts.push(part);
                    i = next;
                }
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut parts, &mut literal);
    Ok(Word { parts })
}

fn flush(parts: &mut Vec<WordPart>, literal: &mut String) {
    if !literal.is_empty() {
        parts.push(WordPart::Literal(std::mem::take(literal)));
    }
}

fn read_single_quoted(chars: &[char], start: usize) -> Result<(String, usize), WordError> {
    let mut value = String::new();
    let mut i = start;
    while i < chars.len() {
        if chars[i] == '\'' {
            return Ok((value, i + 1));
        }
        value.push(chars[i]);
        i += 1;
    }
    Err(WordError("unterminated single quote".to_string()))
}

fn parse_double_quoted(chars: &[char], start: usize) -> Result<(Vec<WordPart>, usize), WordError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '"' => {
                flush(&mut parts, &mut literal);
                return Ok((parts, i + 1));
            }
            '\\' if i + 1 < chars.len() => {
                let next = chars[i + 1];
                match next {
                    '$' | '`' | '"' | '\\' => {
                        literal.push(next);
                        i += 2;
                    }
                    '\n' => i += 2,
                    _ => {
                        // Backslash stays put before anything else.
                        literal.push('\\');
                        literal.push(next);
                        i += 2;
                    }
                }
            }
            '`' => {
                flush(&mut parts, &mut literal);
                let (part, next) = parse_backquoted(chars, i + 1)?;
                parts.push(part);
                i = next;
            }
            '$' => {
                flush(&mut parts, &mut literal);
                let (part, next) = parse_dollar(chars, i)?;
                match part {
                    Some(part) => {
                        parts.push(part);
                        i = next;
                    }
                    None => {
                        literal.push('$');
                        i += 1;
                    }
                }
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    Err(WordError("unterminated double quote".to_string()))
}

/// Heredoc bodies: quotes are plain characters; backslash escapes only
/// `$`, backquote, backslash, and the line-joining newline.
fn parse_heredoc_body(chars: &[char]) -> Result<Word, WordError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                let next = chars[i + 1];
                match next {
                    '$' | '`' | '\\' => {
                        literal.push(next);
                        i += 2;
                    }
                    '\n' => i += 2,
                    _ => {
                        literal.push('\\');
                        literal.push(next);
                        i += 2;
                    }
                }
            }
            '`' => {
                flush(&mut parts, &mut literal);
                let (part, next) = parse_backquoted(chars, i + 1)?;
                parts.push(part);
                i = next;
            }
            '$' => {
                flush(&mut parts, &mut literal);
                let (part, next) = parse_dollar(chars, i)?;
                match part {
                    Some(part) => {
                        parts.push(part);
                        i = next;
                    }
                    None => {
                        literal.push('$');
                        i += 1;
                    }
                }
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut parts, &mut literal);
    Ok(Word { parts })
}

/// Parse a backquoted command substitution starting after the opening
/// backquote. Inside, `\$`, `` \` ``, and `\\` lose their backslashes.
fn parse_backquoted(chars: &[char], start: usize) -> Result<(WordPart, usize), WordError> {
    let mut body = String::new();
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '`' => {
                let list = parse_substitution_body(&body)?;
                return Ok((WordPart::CommandSubst { body: list, backquoted: true }, i + 1));
            }
            '\\' if i + 1 < chars.len() && matches!(chars[i + 1], '$' | '`' | '\\') => {
                body.push(chars[i + 1]);
                i += 2;
            }
            c => {
                body.push(c);
                i += 1;
            }
        }
    }
    Err(WordError("unterminated command substitution".to_string()))
}

/// Dispatch on what follows a `$`. Returns `None` when the dollar is
/// literal (end of word, `$%`, ...).
fn parse_dollar(chars: &[char], dollar: usize) -> Result<(Option<WordPart>, usize), WordError> {
    let i = dollar + 1;
    match chars.get(i) {
        None => Ok((None, i)),
        Some('\'') => {
            let (value, next) = read_ansi_c_quoted(chars, i + 1)?;
            Ok((Some(WordPart::SingleQuoted(value)), next))
        }
        Some('"') => {
            let (inner, next) = parse_double_quoted(chars, i + 1)?;
            Ok((Some(WordPart::DoubleQuoted(inner)), next))
        }
        Some('(') => {
            if chars.get(i + 1) == Some(&'(') {
                if let Some(close) = scan_arith_close(chars, i + 2) {
                    let text: String = chars[i + 2..close].iter().collect();
                    let expr = parse_arith(&text).map_err(WordError)?;
                    return Ok((Some(WordPart::Arith(expr)), close + 2));
                }
            }
            let close = find_balanced(chars, i, '(', ')')
                .ok_or_else(|| WordError("unterminated command substitution".to_string()))?;
            let body: String = chars[i + 1..close].iter().collect();
            let list = parse_substitution_body(&body)?;
            Ok((Some(WordPart::CommandSubst { body: list, backquoted: false }), close + 1))
        }
        Some('{') => {
            let close = find_balanced(chars, i, '{', '}')
                .ok_or_else(|| WordError("unterminated parameter expansion".to_string()))?;
            let inner: String = chars[i + 1..close].iter().collect();
            let param = parse_braced_param(&inner)?;
            Ok((Some(WordPart::Param(param)), close + 1))
        }
        Some(&c) if c.is_ascii_digit() => Ok((
            Some(WordPart::Param(ParamExpansion::plain(c.to_string()))),
            i + 1,
        )),
        Some(&c) if is_special_param(c) => Ok((
            Some(WordPart::Param(ParamExpansion::plain(c.to_string()))),
            i + 1,
        )),
        Some(&c) if c.is_ascii_alphabetic() || c == '_' => {
            let mut end = i;
            while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            let name: String = chars[i..end].iter().collect();
            Ok((Some(WordPart::Param(ParamExpansion::plain(name))), end))
        }
        Some(_) => Ok((None, i)),
    }
}

fn is_special_param(c: char) -> bool {
    matches!(c, '?' | '#' | '@' | '*' | '!' | '$' | '-')
}

/// Decode `$'...'` ANSI-C escapes.
fn read_ansi_c_quoted(chars: &[char], start: usize) -> Result<(String, usize), WordError> {
    let mut value = String::new();
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\'' => return Ok((value, i + 1)),
            '\\' if i + 1 < chars.len() => {
                let e = chars[i + 1];
                i += 2;
                match e {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    'a' => value.push('\x07'),
                    'b' => value.push('\x08'),
                    'e' | 'E' => value.push('\x1b'),
                    'f' => value.push('\x0c'),
                    'v' => value.push('\x0b'),
                    '\\' => value.push('\\'),
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    '0'..='7' => {
                        let mut code = e.to_digit(8).unwrap();
                        let mut count = 1;
                        while count < 3 {
                            match chars.get(i).and_then(|c| c.to_digit(8)) {
                                Some(d) => {
                                    code = code * 8 + d;
                                    i += 1;
                                    count += 1;
                                }
                                None => break,
                            }
                        }
                        value.push((code & 0xff) as u8 as char);
                    }
                    'x' => {
                        let mut code = 0u32;
                        let mut count = 0;
                        while count < 2 {
                            match chars.get(i).and_then(|c| c.to_digit(16)) {
                                Some(d) => {
                                    code = code * 16 + d;
                                    i += 1;
                                    count += 1;
                                }
                                None => break,
                            }
                        }
                        if count == 0 {
                            value.push('\\');
                            value.push('x');
                        } else {
                            value.push(code as u8 as char);
                        }
                    }
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
            }
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err(WordError("unterminated $'...' quote".to_string()))
}

/// Parse the body of `$(...)` or backquotes with a fresh parser.
fn parse_substitution_body(body: &str) -> Result<CommandList, WordError> {
    crate::parser::parser::Parser::new(HashMap::new())
        .parse(body)
        .map_err(|e| WordError(format!("in command substitution: {}", e.message)))
}

/// Find the close of `$((...))`: returns the index of the first `)` of
/// the final adjacent pair, or `None` when this is `$( (...) ...)`.
fn scan_arith_close(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 2usize;
    let mut i = start;
    let mut quote: Option<char> = None;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '\\' => i += 1,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        if chars.get(i.wrapping_sub(1)) == Some(&')') {
                            return Some(i - 1);
                        }
                        return None;
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Index of the matching close bracket, honoring quotes and nesting.
/// `start` points at the opening bracket.
fn find_balanced(chars: &[char], start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    let mut quote: Option<char> = None;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else if c == '\\' && q == '"' {
                    i += 1;
                }
            }
            None => {
                if c == '\\' {
                    i += 1;
                } else if c == '\'' || c == '"' {
                    quote = Some(c);
                } else if c == open {
                    depth += 1;
                } else if c == close {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
            }
        }
        i += 1;
    }
    None
}

// ---- ${...} ----

fn parse_braced_param(inner: &str) -> Result<ParamExpansion, WordError> {
    if inner.is_empty() {
        return Err(WordError("bad substitution: ${}".to_string()));
    }

    // ${#param} — length; plain ${#} is $#.
    if let Some(rest) = inner.strip_prefix('#') {
        if !rest.is_empty() && !rest.starts_with(|c: char| "-=?+".contains(c)) {
            let (name, index, leftover) = split_param_ref(rest)?;
            if leftover.is_empty() {
                return Ok(ParamExpansion { name, index, op: Some(ParamOp::Length) });
            }
            return Err(WordError(format!("bad substitution: ${{#{rest}}}")));
        }
    }

    // ${!param} — indirection; ${!arr[@]} — key list.
    if let Some(rest) = inner.strip_prefix('!') {
        if !rest.is_empty() {
            let (name, index, leftover) = split_param_ref(rest)?;
            if leftover.is_empty() {
                let op = match index {
                    Some(ArrayIndex::All) | Some(ArrayIndex::Star) => ParamOp::Keys,
                    _ => ParamOp::Indirect,
                };
                return Ok(ParamExpansion { name, index, op: Some(op) });
            }
            return Err(WordError(format!("bad substitution: ${{!{rest}}}")));
        }
    }

    let (name, index, rest) = split_param_ref(inner)?;
    if rest.is_empty() {
        return Ok(ParamExpansion { name, index, op: None });
    }
    let op = parse_param_op(rest)?;
    Ok(ParamExpansion { name, index, op: Some(op) })
}

/// Split `name[subscript]` from the front of a `${...}` body; returns
/// the remaining operator text.
fn split_param_ref(text: &str) -> Result<(String, Option<ArrayIndex>, &str), WordError> {
    let chars: Vec<char> = text.chars().collect();
    // Char index → byte offset, so slicing stays UTF-8 safe.
    let byte_at = |i: usize| -> usize {
        text.char_indices().nth(i).map(|(b, _)| b).unwrap_or(text.len())
    };
    let mut i = 0;

    if i < chars.len() && (chars[i].is_ascii_digit() || is_special_param(chars[i])) {
        // Positional or special parameter: digits run, or one character.
        if chars[i].is_ascii_digit() {
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        } else {
            i += 1;
        }
        let name: String = chars[..i].iter().collect();
        return Ok((name, None, &text[byte_at(i)..]));
    }

    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    if i == 0 {
        return Err(WordError(format!("bad substitution: ${{{text}}}")));
    }
    let name: String = chars[..i].iter().collect();

    let mut index = None;
    if chars.get(i) == Some(&'[') {
        let close = find_balanced(&chars, i, '[', ']')
            .ok_or_else(|| WordError(format!("bad substitution: ${{{text}}}")))?;
        let sub: String = chars[i + 1..close].iter().collect();
        index = Some(match sub.as_str() {
            "@" => ArrayIndex::All,
            "*" => ArrayIndex::Star,
            _ => ArrayIndex::Expr(sub),
        });
        i = close + 1;
    }
    Ok((name, index, &text[byte_at(i)..]))
}

fn parse_param_op(rest: &str) -> Result<ParamOp, WordError> {
    let parse_arg = |s: &str| -> Result<Word, WordError> { parse_word(s, WordContext::Assignment) };

    if let Some(arg) = rest.strip_prefix(":-") {
        return Ok(ParamOp::Default { word: parse_arg(arg)?, check_empty: true });
    }
    if let Some(arg) = rest.strip_prefix(":=") {
        return Ok(ParamOp::Assign { word: parse_arg(arg)?, check_empty: true });
    }
    if let Some(arg) = rest.strip_prefix(":?") {
        let word = if arg.is_empty() { None } else { Some(parse_arg(arg)?) };
        return Ok(ParamOp::Error { word, check_empty: true });
    }
    if let Some(arg) = rest.strip_prefix(":+") {
        return Ok(ParamOp::Alternative { word: parse_arg(arg)?, check_empty: true });
    }
    if let Some(arg) = rest.strip_prefix("##") {
        return Ok(ParamOp::RemovePattern { pattern: parse_arg(arg)?, suffix: false, greedy: true });
    }
    if let Some(arg) = rest.strip_prefix('#') {
        return Ok(ParamOp::RemovePattern { pattern: parse_arg(arg)?, suffix: false, greedy: false });
    }
    if let Some(arg) = rest.strip_prefix("%%") {
        return Ok(ParamOp::RemovePattern { pattern: parse_arg(arg)?, suffix: true, greedy: true });
    }
    if let Some(arg) = rest.strip_prefix('%') {
        return Ok(ParamOp::RemovePattern { pattern: parse_arg(arg)?, suffix: true, greedy: false });
    }
    if let Some(arg) = rest.strip_prefix("^^") {
        let pattern = if arg.is_empty() { None } else { Some(parse_arg(arg)?) };
        return Ok(ParamOp::CaseMod { upper: true, all: true, pattern });
    }
    if let Some(arg) = rest.strip_prefix('^') {
        let pattern = if arg.is_empty() { None } else { Some(parse_arg(arg)?) };
        return Ok(ParamOp::CaseMod { upper: true, all: false, pattern });
    }
    if let Some(arg) = rest.strip_prefix(",,") {
        let pattern = if arg.is_empty() { None } else { Some(parse_arg(arg)?) };
        return Ok(ParamOp::CaseMod { upper: false, all: true, pattern });
    }
    if let Some(arg) = rest.strip_prefix(',') {
        let pattern = if arg.is_empty() { None } else { Some(parse_arg(arg)?) };
        return Ok(ParamOp::CaseMod { upper: false, all: false, pattern });
    }
    if let Some(arg) = rest.strip_prefix('/') {
        return parse_replace_op(arg);
    }
    if let Some(arg) = rest.strip_prefix('-') {
        return Ok(ParamOp::Default { word: parse_arg(arg)?, check_empty: false });
    }
    if let Some(arg) = rest.strip_prefix('=') {
        return Ok(ParamOp::Assign { word: parse_arg(arg)?, check_empty: false });
    }
    if let Some(arg) = rest.strip_prefix('?') {
        let word = if arg.is_empty() { None } else { Some(parse_arg(arg)?) };
        return Ok(ParamOp::Error { word, check_empty: false });
    }
    if let Some(arg) = rest.strip_prefix('+') {
        return Ok(ParamOp::Alternative { word: parse_arg(arg)?, check_empty: false });
    }
    if let Some(arg) = rest.strip_prefix(':') {
        // ${x:offset} / ${x:offset:length}
        let (offset, length) = split_substring_args(arg);
        return Ok(ParamOp::Substring { offset, length });
    }
    Err(WordError(format!("bad substitution: `{rest}'")))
}

fn parse_replace_op(arg: &str) -> Result<ParamOp, WordError> {
    let mut all = false;
    let mut anchor = None;
    let mut body = arg;
    if let Some(rest) = body.strip_prefix('/') {
        all = true;
        body = rest;
    } else if let Some(rest) = body.strip_prefix('#') {
        anchor = Some(ReplaceAnchor::Start);
        body = rest;
    } else if let Some(rest) = body.strip_prefix('%') {
        anchor = Some(ReplaceAnchor::End);
        body = rest;
    }

    // Split pattern from replacement at the first unquoted `/`.
    let chars: Vec<char> = body.chars().collect();
    let mut split = None;
    let mut i = 0;
    let mut quote: Option<char> = None;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\\' => i += 1,
                '\'' | '"' => quote = Some(c),
                '/' => {
                    split = Some(i);
                    break;
                }
                _ => {}
            },
        }
        i += 1;
    }

    let (pattern_text, replacement) = match split {
        Some(at) => {
            let pat: String = chars[..at].iter().collect();
            let rep: String = chars[at + 1..].iter().collect();
            (pat, Some(parse_word(&rep, WordContext::Assignment)?))
        }
        None => (body.to_string(), None),
    };
    let pattern = parse_word(&pattern_text, WordContext::Assignment)?;
    Ok(ParamOp::Replace { pattern, replacement, all, anchor })
}

/// Split `offset[:length]` at a top-level colon. Parens, brackets, and
/// `?:` ternaries shield their colons.
fn split_substring_args(arg: &str) -> (String, Option<String>) {
    let chars: Vec<char> = arg.chars().collect();
    let mut depth = 0i32;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            '?' => depth += 1,
            ':' if depth == 0 => {
                return (
                    chars[..i].iter().collect(),
                    Some(chars[i + 1..].iter().collect()),
                );
            }
            ':' => depth -= 1,
            _ => {}
        }
    }
    (arg.to_string(), None)
}

// ---- tilde ----

/// `~` or `~user` is a tilde prefix only when followed by `/`, `:` (in
/// assignments), or the end of the word text.
fn try_parse_tilde(chars: &[char], start: usize) -> Option<(WordPart, usize)> {
    if chars.get(start) != Some(&'~') {
        return None;
    }
    let mut i = start + 1;
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '-' | '.')) {
        i += 1;
    }
    match chars.get(i) {
        None | Some('/') | Some(':') => {
            let user: String = chars[start + 1..i].iter().collect();
            let user = if user.is_empty() { None } else { Some(user) };
            Some((WordPart::Tilde(user), i))
        }
        _ => None,
    }
}

// ---- brace expansion ----

/// Parse `{...}` into a brace node if the contents alternate or form a
/// range; otherwise the caller keeps the `{` literal.
fn try_parse_brace(chars: &[char], start: usize) -> Result<Option<(WordPart, usize)>, WordError> {
    let close = match find_balanced(chars, start, '{', '}') {
        Some(i) => i,
        None => return Ok(None),
    };
    let inner: String = chars[start + 1..close].iter().collect();

    if let Some(range) = try_parse_range(&inner) {
        return Ok(Some((WordPart::Brace(vec![range]), close + 1)));
    }

    let pieces = split_brace_items(&inner);
    if pieces.len() < 2 {
        return Ok(None);
    }
    let mut items = Vec::new();
    for piece in pieces {
        items.push(BraceItem::Word(parse_word(&piece, WordContext::Normal)?));
    }
    Ok(Some((WordPart::Brace(items), close + 1)))
}

/// Split on top-level commas, honoring nested braces and quotes.
fn split_brace_items(inner: &str) -> Vec<String> {
    let chars: Vec<char> = inner.chars().collect();
    let mut items = vec![String::new()];
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                items.last_mut().unwrap().push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\\' => {
                    items.last_mut().unwrap().push(c);
                    if i + 1 < chars.len() {
                        items.last_mut().unwrap().push(chars[i + 1]);
                        i += 1;
                    }
                }
                '\'' | '"' => {
                    quote = Some(c);
                    items.last_mut().unwrap().push(c);
                }
                '{' => {
                    depth += 1;
                    items.last_mut().unwrap().push(c);
                }
                '}' => {
                    depth = depth.saturating_sub(1);
                    items.last_mut().unwrap().push(c);
                }
                ',' if depth == 0 => items.push(String::new()),
                _ => items.last_mut().unwrap().push(c),
            },
        }
        i += 1;
    }
    items
}

/// `1..5`, `a..z`, `01..10..2`.
fn try_parse_range(inner: &str) -> Option<BraceItem> {
    let sections: Vec<&str> = inner.split("..").collect();
    if sections.len() != 2 && sections.len() != 3 {
        return None;
    }
    let step = if sections.len() == 3 {
        Some(sections[2].parse::<i64>().ok()?)
    } else {
        None
    };
    let (start_text, end_text) = (sections[0], sections[1]);

    if let (Ok(a), Ok(b)) = (start_text.parse::<i64>(), end_text.parse::<i64>()) {
        return Some(BraceItem::Range {
            start: RangeEnd::Int(a),
            end: RangeEnd::Int(b),
            step,
            start_text: start_text.to_string(),
            end_text: end_text.to_string(),
        });
    }

    let (a, b) = (single_alpha(start_text)?, single_alpha(end_text)?);
    Some(BraceItem::Range {
        start: RangeEnd::Char(a),
        end: RangeEnd::Char(b),
        step,
        start_text: start_text.to_string(),
        end_text: end_text.to_string(),
    })
}

fn single_alpha(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    if chars.next().is_some() || !c.is_ascii_alphabetic() {
        return None;
    }
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str) -> Word {
        parse_word(text, WordContext::Normal).expect("word parse failed")
    }

    #[test]
    fn plain_literal() {
        let w = word("hello");
        assert_eq!(w.as_literal().unwrap(), "hello");
    }

    #[test]
    fn mixed_quoting_keeps_parts() {
        let w = word(r#"a"b c"'d e'"#);
        assert_eq!(w.parts.len(), 3);
        assert!(matches!(&w.parts[0], WordPart::Literal(s) if s == "a"));
        assert!(matches!(&w.parts[1], WordPart::DoubleQuoted(_)));
        assert!(matches!(&w.parts[2], WordPart::SingleQuoted(s) if s == "d e"));
    }

    #[test]
    fn simple_param() {
        let w = word("$HOME");
        assert!(matches!(&w.parts[0], WordPart::Param(p) if p.name == "HOME" && p.op.is_none()));
    }

    #[test]
    fn param_stops_at_non_name() {
        let w = word("$HOME/bin");
        assert_eq!(w.parts.len(), 2);
        assert!(matches!(&w.parts[1], WordPart::Literal(s) if s == "/bin"));
    }

    #[test]
    fn special_params() {
        for text in ["$?", "$#", "$@", "$*", "$!", "$$", "$-", "$0", "$9"] {
            let w = word(text);
            assert!(
                matches!(&w.parts[0], WordPart::Param(_)),
                "failed for {text}"
            );
        }
    }

    #[test]
    fn double_quoted_param() {
        let w = word(r#""x $y z""#);
        match &w.parts[0] {
            WordPart::DoubleQuoted(inner) => {
                assert_eq!(inner.len(), 3);
                assert!(matches!(&inner[1], WordPart::Param(p) if p.name == "y"));
            }
            other => panic!("expected double-quoted, got {other:?}"),
        }
    }

    #[test]
    fn braced_default_op() {
        let w = word("${x:-fallback}");
        match &w.parts[0] {
            WordPart::Param(p) => match p.op.as_ref().unwrap() {
                ParamOp::Default { word, check_empty } => {
                    assert!(check_empty);
                    assert_eq!(word.as_literal().unwrap(), "fallback");
                }
                other => panic!("expected default, got {other:?}"),
            },
            other => panic!("expected param, got {other:?}"),
        }
    }

    #[test]
    fn unset_only_default_op() {
        let w = word("${x-fallback}");
        match &w.parts[0] {
            WordPart::Param(p) => {
                assert!(matches!(p.op, Some(ParamOp::Default { check_empty: false, .. })))
            }
            other => panic!("expected param, got {other:?}"),
        }
    }

    #[test]
    fn length_op() {
        let w = word("${#name}");
        match &w.parts[0] {
            WordPart::Param(p) => {
                assert_eq!(p.name, "name");
                assert!(matches!(p.op, Some(ParamOp::Length)));
            }
            other => panic!("expected param, got {other:?}"),
        }
    }

    #[test]
    fn plain_hash_is_argc() {
        let w = word("${#}");
        assert!(matches!(&w.parts[0], WordPart::Param(p) if p.name == "#" && p.op.is_none()));
    }

    #[test]
    fn pattern_removal_ops() {
        for (text, suffix, greedy) in [
            ("${x#p}", false, false),
            ("${x##p}", false, true),
            ("${x%p}", true, false),
            ("${x%%p}", true, true),
        ] {
            let w = parse_word(text, WordContext::Normal).unwrap();
            match &w.parts[0] {
                WordPart::Param(p) => match p.op.as_ref().unwrap() {
                    ParamOp::RemovePattern { suffix: s, greedy: g, .. } => {
                        assert_eq!((*s, *g), (suffix, greedy), "failed for {text}");
                    }
                    other => panic!("expected removal, got {other:?}"),
                },
                other => panic!("expected param, got {other:?}"),
            }
        }
    }

    #[test]
    fn replace_op_with_anchor() {
        let w = word("${x/#pre/rep}");
        match &w.parts[0] {
            WordPart::Param(p) => match p.op.as_ref().unwrap() {
                ParamOp::Replace { all, anchor, replacement, .. } => {
                    assert!(!all);
                    assert_eq!(*anchor, Some(ReplaceAnchor::Start));
                    assert!(replacement.is_some());
                }
                other => panic!("expected replace, got {other:?}"),
            },
            other => panic!("expected param, got {other:?}"),
        }
    }

    #[test]
    fn substring_op() {
        let w = word("${x:2:5}");
        match &w.parts[0] {
            WordPart::Param(p) => match p.op.as_ref().unwrap() {
                ParamOp::Substring { offset, length } => {
                    assert_eq!(offset, "2");
                    assert_eq!(length.as_deref(), Some("5"));
                }
                other => panic!("expected substring, got {other:?}"),
            },
            other => panic!("expected param, got {other:?}"),
        }
    }

    #[test]
    fn array_subscripts() {
        let w = word("${a[@]}");
        assert!(matches!(&w.parts[0], WordPart::Param(p) if p.index == Some(ArrayIndex::All)));
        let w = word("${a[1+1]}");
        assert!(
            matches!(&w.parts[0], WordPart::Param(p) if matches!(&p.index, Some(ArrayIndex::Expr(e)) if e == "1+1"))
        );
    }

    #[test]
    fn indirection_and_keys() {
        let w = word("${!ref}");
        assert!(matches!(&w.parts[0], WordPart::Param(p) if matches!(p.op, Some(ParamOp::Indirect))));
        let w = word("${!a[@]}");
        assert!(matches!(&w.parts[0], WordPart::Param(p) if matches!(p.op, Some(ParamOp::Keys))));
    }

    #[test]
    fn command_substitution() {
        let w = word("$(echo hi)");
        match &w.parts[0] {
            WordPart::CommandSubst { body, backquoted } => {
                assert!(!backquoted);
                assert_eq!(body.items.len(), 1);
            }
            other => panic!("expected command subst, got {other:?}"),
        }
    }

    #[test]
    fn backquoted_substitution_unescapes() {
        let w = word(r"`echo \`x\``");
        match &w.parts[0] {
            WordPart::CommandSubst { backquoted, .. } => assert!(backquoted),
            other => panic!("expected command subst, got {other:?}"),
        }
    }

    #[test]
    fn arith_expansion() {
        let w = word("$((1 + 2))");
        assert!(matches!(&w.parts[0], WordPart::Arith(_)));
    }

    #[test]
    fn nested_subshell_in_dollar_paren() {
        // `$( (echo a; echo b) )`-style: not arithmetic.
        let w = word("$((echo a; echo b) )");
        assert!(matches!(&w.parts[0], WordPart::CommandSubst { .. }));
    }

    #[test]
    fn tilde_prefix() {
        let w = word("~/src");
        assert!(matches!(&w.parts[0], WordPart::Tilde(None)));
        let w = word("~alice/src");
        assert!(matches!(&w.parts[0], WordPart::Tilde(Some(u)) if u == "alice"));
    }

    #[test]
    fn tilde_mid_word_is_literal() {
        let w = word("a~b");
        assert_eq!(w.as_literal().unwrap(), "a~b");
    }

    #[test]
    fn tilde_after_colon_in_assignment() {
        let w = parse_word("/usr/bin:~/bin", WordContext::Assignment).unwrap();
        assert!(w.parts.iter().any(|p| matches!(p, WordPart::Tilde(None))));
    }

    #[test]
    fn brace_alternation() {
        let w = word("{a,b,c}");
        match &w.parts[0] {
            WordPart::Brace(items) => assert_eq!(items.len(), 3),
            other => panic!("expected brace, got {other:?}"),
        }
    }

    #[test]
    fn brace_numeric_range() {
        let w = word("{1..5}");
        match &w.parts[0] {
            WordPart::Brace(items) => assert!(matches!(
                items[0],
                BraceItem::Range { start: RangeEnd::Int(1), end: RangeEnd::Int(5), .. }
            )),
            other => panic!("expected brace, got {other:?}"),
        }
    }

    #[test]
    fn brace_without_comma_is_literal() {
        let w = word("{abc}");
        assert_eq!(w.as_literal().unwrap(), "{abc}");
    }

    #[test]
    fn no_brace_in_assignment_context() {
        let w = parse_word("{a,b}", WordContext::Assignment).unwrap();
        assert_eq!(w.as_literal().unwrap(), "{a,b}");
    }

    #[test]
    fn ansi_c_quoting() {
        let w = word(r"$'a\tb\n'");
        assert!(matches!(&w.parts[0], WordPart::SingleQuoted(s) if s == "a\tb\n"));
    }

    #[test]
    fn escaped_char() {
        let w = word(r"a\*b");
        assert_eq!(w.parts.len(), 3);
        assert!(matches!(&w.parts[1], WordPart::Escaped('*')));
    }

    #[test]
    fn lone_dollar_is_literal() {
        let w = word("$");
        assert_eq!(w.as_literal().unwrap(), "$");
        let w = word("a$ b");
        assert!(matches!(&w.parts[0], WordPart::Literal(_)));
    }

    #[test]
    fn heredoc_body_context() {
        let w = parse_word("x is $x 'not quoted'\n", WordContext::HereDoc).unwrap();
        assert!(w.parts.iter().any(|p| matches!(p, WordPart::Param(_))));
        // Quotes stay literal in heredoc bodies.
        let text: String = w
            .parts
            .iter()
            .filter_map(|p| match p {
                WordPart::Literal(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert!(text.contains('\''));
    }

    #[test]
    fn bad_substitution_errors() {
        assert!(parse_word("${}", WordContext::Normal).is_err());
        assert!(parse_word("${x;y}", WordContext::Normal).is_err());
    }
}
