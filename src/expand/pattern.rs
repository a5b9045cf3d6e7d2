//! Shell pattern matching.
//!
//! Patterns (`*`, `?`, `[...]`) are compiled to `regex_lite` regexes.
//! Input arrives as pieces that remember whether they were quoted;
//! quoted pieces match literally, so `"*"` never globs while an
//! unquoted `*` from the same word does.

use std::collections::HashMap;

use regex_lite::Regex;

/// A run of pattern text with its quoting provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternPiece {
    pub text: String,
    pub quoted: bool,
}

impl PatternPiece {
    pub fn unquoted(text: impl Into<String>) -> Self {
        PatternPiece { text: text.into(), quoted: false }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        PatternPiece { text: text.into(), quoted: true }
    }
}

lazy_static::lazy_static! {
    static ref POSIX_CLASSES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("alnum", "a-zA-Z0-9");
        m.insert("alpha", "a-zA-Z");
        m.insert("ascii", "\\x00-\\x7F");
        m.insert("blank", " \\t");
        m.insert("cntrl", "\\x00-\\x1f\\x7f");
        m.insert("digit", "0-9");
        m.insert("graph", "!-~");
        m.insert("lower", "a-z");
        m.insert("print", " -~");
        m.insert("punct", "!-/:-@\\[-`{-~");
        m.insert("space", " \\t\\n\\r\\x0b\\x0c");
        m.insert("upper", "A-Z");
        m.insert("xdigit", "0-9A-Fa-f");
        m
    };
}

/// True when any unquoted piece contains a live glob character.
pub fn has_glob_chars(pieces: &[PatternPiece]) -> bool {
    pieces.iter().any(|p| {
        if p.quoted {
            return false;
        }
        let mut chars = p.text.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    chars.next();
                }
                '*' | '?' | '[' => return true,
                _ => {}
            }
        }
        false
    })
}

/// The literal text of a pattern with escapes and quoting resolved;
/// used when a pattern has no glob characters and must match exactly.
pub fn literal_text(pieces: &[PatternPiece]) -> String {
    let mut out = String::new();
    for piece in pieces {
        if piece.quoted {
            out.push_str(&piece.text);
        } else {
            let mut chars = piece.text.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    match chars.next() {
                        Some(e) => out.push(e),
                        None => out.push('\\'),
                    }
                } else {
                    out.push(c);
                }
            }
        }
    }
    out
}

/// Compile pieces into an anchored regex matching the whole string.
pub fn compile_pattern(pieces: &[PatternPiece], nocase: bool) -> Result<Regex, String> {
    let mut source = String::new();
    if nocase {
        source.push_str("(?is)");
    } else {
        source.push_str("(?s)");
    }
    source.push('^');
    source.push_str(&pieces_to_regex(pieces, true));
    source.push('$');
    Regex::new(&source).map_err(|e| format!("invalid pattern: {e}"))
}

/// Regex fragment for the pieces, unanchored. `greedy` selects whether
/// `*` prefers the longest run, which pattern-removal operators use to
/// tell `#` from `##`.
pub fn pieces_to_regex(pieces: &[PatternPiece], greedy: bool) -> String {
    let mut out = String::new();
    for piece in pieces {
        if piece.quoted {
            push_literal(&mut out, &piece.text);
        } else {
            out.push_str(&glob_to_regex(&piece.text, greedy));
        }
    }
    out
}

fn push_literal(out: &mut String, text: &str) {
    for c in text.chars() {
        if is_regex_meta(c) {
            out.push('\\');
        }
        out.push(c);
    }
}

fn is_regex_meta(c: char) -> bool {
    matches!(c, '\\' | '^' | '$' | '.' | '|' | '+' | '(' | ')' | '{' | '}' | '[' | ']' | '*' | '?')
}

fn glob_to_regex(pattern: &str, greedy: bool) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                if i + 1 < chars.len() {
                    let next = chars[i + 1];
                    if is_regex_meta(next) {
                        out.push('\\');
                    }
                    out.push(next);
                    i += 2;
                } else {
                    out.push_str("\\\\");
                    i += 1;
                }
            }
            '*' => {
                out.push_str(if greedy { ".*" } else { ".*?" });
                i += 1;
            }
            '?' => {
                out.push('.');
                i += 1;
            }
            '[' => match char_class_end(&chars, i) {
                Some(end) => {
                    let inner: String = chars[i + 1..end].iter().collect();
                    out.push_str(&convert_char_class(&inner));
                    i = end + 1;
                }
                None => {
                    out.push_str("\\[");
                    i += 1;
                }
            },
            c => {
                if is_regex_meta(c) {
                    out.push('\\');
                }
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Index of the `]` that closes a class opened at `open`. A `]` in the
/// first position is literal, per POSIX.
fn char_class_end(chars: &[char], open: usize) -> Option<usize> {
    let mut i = open + 1;
    if matches!(chars.get(i), Some('!') | Some('^')) {
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            ']' => return Some(i),
            '[' if chars.get(i + 1) == Some(&':') => {
                // Skip over [:class:].
                let mut j = i + 2;
                while j + 1 < chars.len() && !(chars[j] == ':' && chars[j + 1] == ']') {
                    j += 1;
                }
                if j + 1 >= chars.len() {
                    return None;
                }
                i = j + 2;
            }
            _ => i += 1,
        }
    }
    None
}

fn convert_char_class(inner: &str) -> String {
    let chars: Vec<char> = inner.chars().collect();
    let mut out = String::from("[");
    let mut i = 0;
    if matches!(chars.first(), Some('!') | Some('^')) {
        out.push('^');
        i = 1;
    }
    while i < chars.len() {
        let c = chars[i];
        if c == '[' && chars.get(i + 1) == Some(&':') {
            let mut j = i + 2;
            while j + 1 < chars.len() && !(chars[j] == ':' && chars[j + 1] == ']') {
                j += 1;
            }
            let name: String = chars[i + 2..j].iter().collect();
            if let Some(expansion) = POSIX_CLASSES.get(name.as_str()) {
                out.push_str(expansion);
            }
            i = j + 2;
            continue;
        }
        match c {
            '\\' => out.push_str("\\\\"),
            ']' => out.push_str("\\]"),
            '^' => out.push_str("\\^"),
            _ => out.push(c),
        }
        i += 1;
    }
    out.push(']');
    out
}

/// Match a whole string against pattern pieces.
pub fn matches(pieces: &[PatternPiece], subject: &str, nocase: bool) -> bool {
    match compile_pattern(pieces, nocase) {
        Ok(re) => re.is_match(subject),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unq(text: &str) -> Vec<PatternPiece> {
        vec![PatternPiece::unquoted(text)]
    }

    #[test]
    fn star_matches_any() {
        assert!(matches(&unq("*.txt"), "file.txt", false));
        assert!(!matches(&unq("*.txt"), "file.rs", false));
        assert!(matches(&unq("*"), "", false));
    }

    #[test]
    fn question_matches_one() {
        assert!(matches(&unq("a?c"), "abc", false));
        assert!(!matches(&unq("a?c"), "ac", false));
    }

    #[test]
    fn char_classes() {
        assert!(matches(&unq("[abc]x"), "bx", false));
        assert!(!matches(&unq("[abc]x"), "dx", false));
        assert!(matches(&unq("[a-z]"), "m", false));
        assert!(matches(&unq("[!a-z]"), "5", false));
        assert!(matches(&unq("[[:digit:]]"), "7", false));
    }

    #[test]
    fn literal_bracket_first() {
        assert!(matches(&unq("[]]"), "]", false));
    }

    #[test]
    fn unclosed_bracket_is_literal() {
        assert!(matches(&unq("a[b"), "a[b", false));
    }

    #[test]
    fn quoted_star_is_literal() {
        let pieces = vec![PatternPiece::quoted("*")];
        assert!(matches(&pieces, "*", false));
        assert!(!matches(&pieces, "anything", false));
    }

    #[test]
    fn mixed_provenance() {
        // "test"*.txt: the star globs, the quoted prefix does not.
        let pieces = vec![
            PatternPiece::quoted("test"),
            PatternPiece::unquoted("*.txt"),
        ];
        assert!(matches(&pieces, "test-data.txt", false));
        assert!(!matches(&pieces, "other.txt", false));
    }

    #[test]
    fn escaped_star_is_literal() {
        assert!(matches(&unq("a\\*b"), "a*b", false));
        assert!(!matches(&unq("a\\*b"), "axxb", false));
    }

    #[test]
    fn nocase() {
        assert!(matches(&unq("*.TXT"), "a.txt", true));
        assert!(!matches(&unq("*.TXT"), "a.txt", false));
    }

    #[test]
    fn glob_char_detection() {
        assert!(has_glob_chars(&unq("*.txt")));
        assert!(!has_glob_chars(&unq("plain")));
        assert!(!has_glob_chars(&[PatternPiece::quoted("*")]));
        // An escaped star is not live.
        assert!(!has_glob_chars(&unq("a\\*")));
    }

    #[test]
    fn literal_text_resolves_escapes() {
        assert_eq!(literal_text(&unq("a\\*b")), "a*b");
        assert_eq!(
            literal_text(&[PatternPiece::quoted("x*"), PatternPiece::unquoted("y")]),
            "x*y"
        );
    }

    #[test]
    fn star_spans_newlines() {
        assert!(matches(&unq("a*b"), "a\nb", false));
    }
}
