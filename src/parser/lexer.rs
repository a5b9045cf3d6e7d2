//! Lexer for shell input.
//!
//! Turns a character stream into tokens: words (with their quoting kept
//! verbatim for the word parser), operators under longest-match, newlines,
//! and captured heredoc bodies. Keywords are NOT classified here; a word
//! token's raw text is compared against keyword strings by the parser's
//! single is-keyword-here helper, so recognition stays positional.

use crate::parser::types::{LexError, LexErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Any word: command names, arguments, assignments, `[[`, `{`, `!`.
    Word,
    /// Captured heredoc body, emitted right after the newline that
    /// triggered its collection.
    HeredocBody,
    Newline,
    Eof,

    // control operators
    Pipe,      // |
    AndIf,     // &&
    OrIf,      // ||
    Semi,      // ;
    Amp,       // &
    DSemi,     // ;;
    SemiAnd,   // ;&
    DSemiAnd,  // ;;&
    LParen,    // (
    RParen,    // )

    // redirection operators
    Less,      // <
    Great,     // >
    DGreat,    // >>
    DLess,     // <<
    DLessDash, // <<-
    TLess,     // <<<
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    Clobber,   // >|
    AndGreat,  // &>
    AndDGreat, // &>>

    /// `(( expr ))` arithmetic; the token text is the inner expression.
    DParen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Verbatim source text. For `Word` this includes quotes and
    /// expansion syntax; for `DParen` it is the inner expression only.
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
    /// True when any part of a word was quoted or escaped.
    pub quoted: bool,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, start: usize, end: usize, line: u32, column: u32) -> Self {
        Token { kind, text: text.into(), start, end, line, column, quoted: false }
    }

    /// True for an unquoted word with exactly this text; used by the
    /// parser's keyword recognition.
    pub fn is_unquoted_word(&self, text: &str) -> bool {
        self.kind == TokenKind::Word && !self.quoted && self.text == text
    }
}

/// Three-character operators, checked before the two-character set.
const THREE_CHAR_OPS: &[(&str, TokenKind)] = &[
    (";;&", TokenKind::DSemiAnd),
    ("<<<", TokenKind::TLess),
    ("<<-", TokenKind::DLessDash),
    ("&>>", TokenKind::AndDGreat),
];

const TWO_CHAR_OPS: &[(&str, TokenKind)] = &[
    ("&&", TokenKind::AndIf),
    ("||", TokenKind::OrIf),
    (";;", TokenKind::DSemi),
    (";&", TokenKind::SemiAnd),
    ("<<", TokenKind::DLess),
    (">>", TokenKind::DGreat),
    ("<&", TokenKind::LessAnd),
    (">&", TokenKind::GreatAnd),
    ("<>", TokenKind::LessGreat),
    (">|", TokenKind::Clobber),
    ("&>", TokenKind::AndGreat),
];

const ONE_CHAR_OPS: &[(char, TokenKind)] = &[
    ('|', TokenKind::Pipe),
    ('&', TokenKind::Amp),
    (';', TokenKind::Semi),
    ('(', TokenKind::LParen),
    (')', TokenKind::RParen),
    ('<', TokenKind::Less),
    ('>', TokenKind::Great),
];

/// Characters that end an unquoted word.
fn is_metachar(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '|' | '&' | ';' | '(' | ')' | '<' | '>')
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A bare variable name with nothing else around it.
fn is_plain_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(is_name_char),
        _ => false,
    }
}

/// Heredoc registered at `<<` time, waiting for the next newline.
#[derive(Debug, Clone)]
struct PendingHeredoc {
    delimiter: String,
    strip_tabs: bool,
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    pending_heredocs: Vec<PendingHeredoc>,
    /// Nesting depth of `[[ ... ]]`; switches `(`/`)`/regex handling.
    cond_depth: usize,
    /// Set after emitting `=~` inside `[[ ]]` so the next chunk is read
    /// as a regular expression.
    regex_next: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            pending_heredocs: Vec::new(),
            cond_depth: 0,
            regex_next: false,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_blanks_and_comments();
            if self.pos >= self.input.len() {
                break;
            }
            let token = self.next_token()?;
            let is_newline = token.kind == TokenKind::Newline;
            tokens.push(token);
            if is_newline && !self.pending_heredocs.is_empty() {
                self.collect_heredoc_bodies(&mut tokens)?;
            }
        }
        if !self.pending_heredocs.is_empty() {
            // `cat <<EOF` with no trailing newline: the body never started.
            return Err(self.incomplete("here-document delimited by end of input"));
        }
        tokens.push(Token::new(TokenKind::Eof, "", self.pos, self.pos, self.line, self.column));
        Ok(tokens)
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.current();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn error(&self, kind: LexErrorKind, message: impl Into<String>) -> LexError {
        LexError { kind, message: message.into(), line: self.line, column: self.column }
    }

    fn incomplete(&self, message: impl Into<String>) -> LexError {
        self.error(LexErrorKind::Incomplete, message)
    }

    fn skip_blanks_and_comments(&mut self) {
        loop {
            match self.current() {
                Some(' ') | Some('\t') => {
                    self.bump();
                }
                Some('\\') if self.peek(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                }
                Some('#') if self.at_word_start() => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// A `#` starts a comment only when it would start a new word.
    fn at_word_start(&self) -> bool {
        if self.pos == 0 {
            return true;
        }
        let prev = self.input[self.pos - 1];
        is_metachar(prev)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        let line = self.line;
        let column = self.column;

        let c0 = self.current().expect("next_token called at EOF");

        if c0 == '\n' {
            self.bump();
            return Ok(Token::new(TokenKind::Newline, "\n", start, self.pos, line, column));
        }

        if self.regex_next {
            self.regex_next = false;
            // Anything but a list terminator starts the regex, including
            // `(` and `[`, which are ordinarily operators.
            if !matches!(c0, ';' | '&' | '|' | ')') {
                return self.read_regex_word(start, line, column);
            }
        }

        // `((`: arithmetic only when a matching `))` closes it; otherwise
        // it is two subshell opens.
        if self.cond_depth == 0 && c0 == '(' && self.peek(1) == Some('(') {
            if let Some(len) = self.scan_dparen() {
                let inner: String = self.input[self.pos + 2..self.pos + 2 + len].iter().collect();
                for _ in 0..len + 4 {
                    self.bump();
                }
                return Ok(Token::new(TokenKind::DParen, inner, start, self.pos, line, column));
            }
        }

        // Inside `[[ ]]`, parens group subexpressions and `<` / `>`
        // compare strings, but `&`/`;` keep their usual meanings.
        for (text, kind) in THREE_CHAR_OPS {
            if self.looking_at(text) {
                if *kind == TokenKind::DLessDash {
                    self.register_heredoc(3)?;
                }
                for _ in 0..3 {
                    self.bump();
                }
                return Ok(Token::new(*kind, *text, start, self.pos, line, column));
            }
        }
        for (text, kind) in TWO_CHAR_OPS {
            if self.looking_at(text) {
                if *kind == TokenKind::DLess {
                    self.register_heredoc(2)?;
                }
                for _ in 0..2 {
                    self.bump();
                }
                return Ok(Token::new(*kind, *text, start, self.pos, line, column));
            }
        }
        for (ch, kind) in ONE_CHAR_OPS {
            if c0 == *ch {
                self.bump();
                return Ok(Token::new(*kind, ch.to_string(), start, self.pos, line, column));
            }
        }

        self.read_word(start, line, column)
    }

    fn looking_at(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.peek(i) == Some(c))
    }

    /// From a `((`, scan for the matching `))`. Returns the inner length
    /// when the construct closes with two adjacent parens, which is the
    /// same disambiguation bash applies before trying `( (`.
    fn scan_dparen(&self) -> Option<usize> {
        let mut depth = 2usize;
        let mut i = self.pos + 2;
        let mut quote: Option<char> = None;
        while i < self.input.len() {
            let c = self.input[i];
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    } else if c == '\\' && q == '"' {
                        i += 1;
                    }
                }
                None => match c {
                    '\'' | '"' => quote = Some(c),
                    '\\' => i += 1,
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            // Arithmetic requires the final two parens to
                            // be adjacent.
                            if self.input.get(i - 1) == Some(&')') {
                                return Some(i - 1 - (self.pos + 2));
                            }
                            return None;
                        }
                    }
                    '\n' => {}
                    _ => {}
                },
            }
            i += 1;
        }
        None
    }

    // ---- heredocs ----

    /// Peek past the `<<` operator for the delimiter word and queue the
    /// body collection for the next newline.
    fn register_heredoc(&mut self, op_len: usize) -> Result<(), LexError> {
        let mut i = self.pos + op_len;
        while matches!(self.input.get(i), Some(' ') | Some('\t')) {
            i += 1;
        }
        let mut delim = String::new();
        let mut any = false;
        while let Some(&c) = self.input.get(i) {
            if is_metachar(c) {
                break;
            }
            any = true;
            match c {
                '\'' => {
                    i += 1;
                    while let Some(&q) = self.input.get(i) {
                        if q == '\'' {
                            break;
                        }
                        delim.push(q);
                        i += 1;
                    }
                    i += 1;
                }
                '"' => {
                    i += 1;
                    while let Some(&q) = self.input.get(i) {
                        if q == '"' {
                            break;
                        }
                        if q == '\\' {
                            i += 1;
                            if let Some(&e) = self.input.get(i) {
                                delim.push(e);
                            }
                        } else {
                            delim.push(q);
                        }
                        i += 1;
                    }
                    i += 1;
                }
                '\\' => {
                    i += 1;
                    if let Some(&e) = self.input.get(i) {
                        delim.push(e);
                        i += 1;
                    }
                }
                _ => {
                    delim.push(c);
                    i += 1;
                }
            }
        }
        if !any {
            return Err(self.error(LexErrorKind::Syntax, "missing here-document delimiter"));
        }
        self.pending_heredocs.push(PendingHeredoc {
            delimiter: delim,
            strip_tabs: op_len == 3,
        });
        Ok(())
    }

    /// Consume heredoc bodies line by line until each pending delimiter
    /// is seen, emitting one `HeredocBody` token per heredoc in order.
    fn collect_heredoc_bodies(&mut self, tokens: &mut Vec<Token>) -> Result<(), LexError> {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for heredoc in pending {
            let start = self.pos;
            let line = self.line;
            let column = self.column;
            let mut body = String::new();
            let mut found = false;
            while self.pos < self.input.len() {
                let mut text_line = String::new();
                while let Some(c) = self.current() {
                    self.bump();
                    if c == '\n' {
                        break;
                    }
                    text_line.push(c);
                }
                let candidate = if heredoc.strip_tabs {
                    text_line.trim_start_matches('\t')
                } else {
                    text_line.as_str()
                };
                if candidate == heredoc.delimiter {
                    found = true;
                    break;
                }
                if heredoc.strip_tabs {
                    body.push_str(text_line.trim_start_matches('\t'));
                } else {
                    body.push_str(&text_line);
                }
                body.push('\n');
            }
            if !found {
                return Err(self.incomplete(format!(
                    "here-document delimited by end of input (wanted `{}')",
                    heredoc.delimiter
                )));
            }
            tokens.push(Token::new(TokenKind::HeredocBody, body, start, self.pos, line, column));
        }
        Ok(())
    }

    // ---- words ----

    /// Read one word, keeping quotes and expansion syntax verbatim.
    /// Balanced `$(..)`, `${..}`, `$((..))`, and backquotes are consumed
    /// whole so the word parser never sees a truncated expansion.
    fn read_word(&mut self, start: usize, line: u32, column: u32) -> Result<Token, LexError> {
        let mut text = String::new();
        let mut quoted = false;

        while let Some(c) = self.current() {
            if is_metachar(c) {
                break;
            }
            match c {
                '\\' => {
                    quoted = true;
                    self.bump();
                    match self.current() {
                        Some('\n') => {
                            // Line continuation disappears entirely.
                            self.bump();
                            quoted = !text.is_empty() && quoted;
                        }
                        Some(e) => {
                            text.push('\\');
                            text.push(e);
                            self.bump();
                        }
                        None => text.push('\\'),
                    }
                }
                '\'' => {
                    quoted = true;
                    text.push('\'');
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('\'') => {
                                text.push('\'');
                                break;
                            }
                            Some(ch) => text.push(ch),
                            None => return Err(self.incomplete("unterminated single quote")),
                        }
                    }
                }
                '"' => {
                    quoted = true;
                    text.push('"');
                    self.bump();
                    self.read_double_quoted(&mut text)?;
                }
                '`' => {
                    text.push('`');
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('\\') => {
                                text.push('\\');
                                if let Some(e) = self.bump() {
                                    text.push(e);
                                }
                            }
                            Some('`') => {
                                text.push('`');
                                break;
                            }
                            Some(ch) => text.push(ch),
                            None => return Err(self.incomplete("unterminated command substitution")),
                        }
                    }
                }
                '$' => {
                    self.bump();
                    text.push('$');
                    match self.current() {
                        Some('\'') => {
                            quoted = true;
                            text.push('\'');
                            self.bump();
                            loop {
                                match self.bump() {
                                    Some('\\') => {
                                        text.push('\\');
                                        if let Some(e) = self.bump() {
                                            text.push(e);
                                        }
                                    }
                                    Some('\'') => {
                                        text.push('\'');
                                        break;
                                    }
                                    Some(ch) => text.push(ch),
                                    None => return Err(self.incomplete("unterminated $'...' quote")),
                                }
                            }
                        }
                        Some('"') => {
                            // $"..." is locale quoting; treated as "...".
                            quoted = true;
                            text.push('"');
                            self.bump();
                            self.read_double_quoted(&mut text)?;
                        }
                        Some('(') => self.read_dollar_paren(&mut text)?,
                        Some('{') => self.read_dollar_brace(&mut text)?,
                        _ => {}
                    }
                }
                '}' if self.cond_depth == 0 && text.is_empty() => {
                    // A lone `}` is a word; the parser decides whether it
                    // closes a brace group.
                    text.push('}');
                    self.bump();
                    break;
                }
                '[' if is_plain_name(&text) => {
                    // NAME[...]= subscript: captured raw through the
                    // balanced `]`, operator characters included. The
                    // lookahead only commits when `=` or `+=` follows,
                    // so `a[1` before a redirect still tokenizes as
                    // usual.
                    match self.scan_subscript_assignment() {
                        Some(close) => {
                            while self.pos <= close {
                                if let Some(ch) = self.bump() {
                                    text.push(ch);
                                }
                            }
                        }
                        None => {
                            text.push('[');
                            self.bump();
                        }
                    }
                }
                '=' if self.ends_assignment_prefix(&text) && self.peek(1) == Some('(') => {
                    // NAME=( and NAME+=( start an array literal; pull the
                    // balanced parens into this word.
                    text.push('=');
                    self.bump();
                    self.read_array_literal(&mut text)?;
                }
                _ => {
                    text.push(c);
                    self.bump();
                }
            }
        }

        // Track `[[ ... ]]` nesting for regex-word mode.
        if !quoted {
            if text == "[[" {
                self.cond_depth += 1;
            } else if text == "]]" && self.cond_depth > 0 {
                self.cond_depth -= 1;
            } else if text == "=~" && self.cond_depth > 0 {
                self.regex_next = true;
            }
        }

        let mut token = Token::new(TokenKind::Word, text, start, self.pos, line, column);
        token.quoted = quoted;
        Ok(token)
    }

    fn read_double_quoted(&mut self, text: &mut String) -> Result<(), LexError> {
        loop {
            match self.current() {
                None => return Err(self.incomplete("unterminated double quote")),
                Some('"') => {
                    text.push('"');
                    self.bump();
                    return Ok(());
                }
                Some('\\') => {
                    text.push('\\');
                    self.bump();
                    if let Some(e) = self.bump() {
                        text.push(e);
                    }
                }
                Some('`') => {
                    text.push('`');
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('\\') => {
                                text.push('\\');
                                if let Some(e) = self.bump() {
                                    text.push(e);
                                }
                            }
                            Some('`') => {
                                text.push('`');
                                break;
                            }
                            Some(ch) => text.push(ch),
                            None => return Err(self.incomplete("unterminated command substitution")),
                        }
                    }
                }
                Some('$') => {
                    text.push('$');
                    self.bump();
                    match self.current() {
                        Some('(') => self.read_dollar_paren(text)?,
                        Some('{') => self.read_dollar_brace(text)?,
                        _ => {}
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Consume `(`...`)` after a `$`, handling nesting, quotes, and the
    /// arithmetic `$((...))` form.
    fn read_dollar_paren(&mut self, text: &mut String) -> Result<(), LexError> {
        text.push('(');
        self.bump();
        let mut depth = 1usize;
        loop {
            match self.current() {
                None => return Err(self.incomplete("unterminated command substitution")),
                Some('(') => {
                    depth += 1;
                    text.push('(');
                    self.bump();
                }
                Some(')') => {
                    depth -= 1;
                    text.push(')');
                    self.bump();
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some('\'') => {
                    text.push('\'');
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('\'') => {
                                text.push('\'');
                                break;
                            }
                            Some(ch) => text.push(ch),
                            None => return Err(self.incomplete("unterminated single quote")),
                        }
                    }
                }
                Some('"') => {
                    text.push('"');
                    self.bump();
                    self.read_double_quoted(text)?;
                }
                Some('\\') => {
                    text.push('\\');
                    self.bump();
                    if let Some(e) = self.bump() {
                        text.push(e);
                    }
                }
                Some('#') if self.at_word_start() => {
                    // Comment inside $( ... ) runs to end of line.
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Consume `{`...`}` after a `$`, handling nested braces and quotes.
    fn read_dollar_brace(&mut self, text: &mut String) -> Result<(), LexError> {
        text.push('{');
        self.bump();
        let mut depth = 1usize;
        loop {
            match self.current() {
                None => return Err(self.incomplete("unterminated parameter expansion")),
                Some('{') => {
                    depth += 1;
                    text.push('{');
                    self.bump();
                }
                Some('}') => {
                    depth -= 1;
                    text.push('}');
                    self.bump();
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some('\'') => {
                    text.push('\'');
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('\'') => {
                                text.push('\'');
                                break;
                            }
                            Some(ch) => text.push(ch),
                            None => return Err(self.incomplete("unterminated single quote")),
                        }
                    }
                }
                Some('"') => {
                    text.push('"');
                    self.bump();
                    self.read_double_quoted(text)?;
                }
                Some('\\') => {
                    text.push('\\');
                    self.bump();
                    if let Some(e) = self.bump() {
                        text.push(e);
                    }
                }
                Some('$') => {
                    text.push('$');
                    self.bump();
                    match self.current() {
                        Some('(') => self.read_dollar_paren(text)?,
                        Some('{') => self.read_dollar_brace(text)?,
                        _ => {}
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Consume the parenthesized list of an array literal `NAME=(...)`.
    fn read_array_literal(&mut self, text: &mut String) -> Result<(), LexError> {
        text.push('(');
        self.bump();
        let mut depth = 1usize;
        loop {
            match self.current() {
                None => return Err(self.incomplete("unterminated array literal")),
                Some('(') => {
                    depth += 1;
                    text.push('(');
                    self.bump();
                }
                Some(')') => {
                    depth -= 1;
                    text.push(')');
                    self.bump();
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some('\'') => {
                    text.push('\'');
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('\'') => {
                                text.push('\'');
                                break;
                            }
                            Some(ch) => text.push(ch),
                            None => return Err(self.incomplete("unterminated single quote")),
                        }
                    }
                }
                Some('"') => {
                    text.push('"');
                    self.bump();
                    self.read_double_quoted(text)?;
                }
                Some('\\') => {
                    text.push('\\');
                    self.bump();
                    if let Some(e) = self.bump() {
                        text.push(e);
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }

    /// From a `[` that follows a plain name, find the balanced `]` of a
    /// subscript assignment. Returns the index of the closing bracket
    /// only when `=` or `+=` comes right after it; anything else, a
    /// newline, or end of input means this is not an assignment and the
    /// bracket keeps no special meaning.
    fn scan_subscript_assignment(&self) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = self.pos;
        let mut quote: Option<char> = None;
        while i < self.input.len() {
            let c = self.input[i];
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    } else if c == '\\' && q == '"' {
                        i += 1;
                    }
                }
                None => match c {
                    '\n' => return None,
                    '\\' => i += 1,
                    '\'' | '"' => quote = Some(c),
                    '[' => depth += 1,
                    ']' => {
                        depth -= 1;
                        if depth == 0 {
                            let next = self.input.get(i + 1);
                            let after = self.input.get(i + 2);
                            if next == Some(&'=')
                                || (next == Some(&'+') && after == Some(&'='))
                            {
                                return Some(i);
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

    /// True when `text` is `NAME` / `NAME[idx]` / either with a trailing
    /// `+`, i.e. adding `=(` starts an array assignment.
    fn ends_assignment_prefix(&self, text: &str) -> bool {
        let body = text.strip_suffix('+').unwrap_or(text);
        let (name, rest) = match body.find('[') {
            Some(i) => (&body[..i], &body[i..]),
            None => (body, ""),
        };
        if name.is_empty() || !name.chars().next().unwrap().is_ascii_alphabetic() && !name.starts_with('_') {
            return false;
        }
        if !name.chars().all(is_name_char) {
            return false;
        }
        rest.is_empty() || (rest.starts_with('[') && rest.ends_with(']'))
    }

    /// After `=~`, read one whitespace-delimited chunk with bracket and
    /// paren balancing so regex metacharacters survive.
    fn read_regex_word(&mut self, start: usize, line: u32, column: u32) -> Result<Token, LexError> {
        let mut text = String::new();
        let mut paren_depth = 0usize;
        let mut bracket_depth = 0usize;
        while let Some(c) = self.current() {
            match c {
                ' ' | '\t' | '\n' if paren_depth == 0 && bracket_depth == 0 => break,
                '\\' => {
                    text.push('\\');
                    self.bump();
                    if let Some(e) = self.bump() {
                        text.push(e);
                    }
                }
                '(' => {
                    paren_depth += 1;
                    text.push(c);
                    self.bump();
                }
                ')' => {
                    paren_depth = paren_depth.saturating_sub(1);
                    text.push(c);
                    self.bump();
                }
                '[' => {
                    bracket_depth += 1;
                    text.push(c);
                    self.bump();
                }
                ']' => {
                    bracket_depth = bracket_depth.saturating_sub(1);
                    text.push(c);
                    self.bump();
                }
                '\'' | '"' => {
                    // Quoted regex parts match literally; keep the quotes
                    // for the word parser.
                    let quote = c;
                    text.push(c);
                    self.bump();
                    loop {
                        match self.bump() {
                            Some(q) if q == quote => {
                                text.push(q);
                                break;
                            }
                            Some(ch) => text.push(ch),
                            None => return Err(self.incomplete("unterminated quote in regex")),
                        }
                    }
                }
                _ => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        Ok(Token::new(TokenKind::Word, text, start, self.pos, line, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().expect("lex failed")
    }

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input).iter().map(|t| t.kind).collect()
    }

    fn texts(input: &str) -> Vec<String> {
        lex(input)
            .iter()
            .filter(|t| t.kind != TokenKind::Eof)
            .map(|t| t.text.clone())
            .collect()
    }

    #[test]
    fn simple_command() {
        assert_eq!(texts("echo hello world"), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn operators_longest_match() {
        assert_eq!(
            kinds("a && b || c ; d & e | f"),
            vec![
                TokenKind::Word,
                TokenKind::AndIf,
                TokenKind::Word,
                TokenKind::OrIf,
                TokenKind::Word,
                TokenKind::Semi,
                TokenKind::Word,
                TokenKind::Amp,
                TokenKind::Word,
                TokenKind::Pipe,
                TokenKind::Word,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn redirect_operators() {
        assert_eq!(
            kinds("< > >> <& >& <> >| <<< &> &>>"),
            vec![
                TokenKind::Less,
                TokenKind::Great,
                TokenKind::DGreat,
                TokenKind::LessAnd,
                TokenKind::GreatAnd,
                TokenKind::LessGreat,
                TokenKind::Clobber,
                TokenKind::TLess,
                TokenKind::AndGreat,
                TokenKind::AndDGreat,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn case_terminators() {
        assert_eq!(
            kinds(";; ;& ;;&"),
            vec![TokenKind::DSemi, TokenKind::SemiAnd, TokenKind::DSemiAnd, TokenKind::Eof]
        );
    }

    #[test]
    fn word_with_quotes_is_one_token() {
        let tokens = lex(r#"echo "a b"'c d'e"#);
        assert_eq!(tokens[1].text, r#""a b"'c d'e"#);
        assert!(tokens[1].quoted);
    }

    #[test]
    fn single_quote_protects_metachars() {
        let tokens = lex("echo 'a|b;c'");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].text, "'a|b;c'");
    }

    #[test]
    fn command_substitution_consumed_whole() {
        let tokens = lex("echo $(ls | wc -l) done");
        assert_eq!(tokens[1].text, "$(ls | wc -l)");
        assert_eq!(tokens[2].text, "done");
    }

    #[test]
    fn nested_command_substitution() {
        let tokens = lex("echo $(echo $(echo x))");
        assert_eq!(tokens[1].text, "$(echo $(echo x))");
    }

    #[test]
    fn parameter_expansion_with_braces() {
        let tokens = lex("echo ${x:-${y}}");
        assert_eq!(tokens[1].text, "${x:-${y}}");
    }

    #[test]
    fn arithmetic_command() {
        let tokens = lex("((x = 1 + 2))");
        assert_eq!(tokens[0].kind, TokenKind::DParen);
        assert_eq!(tokens[0].text, "x = 1 + 2");
    }

    #[test]
    fn nested_subshell_not_arithmetic() {
        // Closing parens are not adjacent, so these are subshells.
        assert_eq!(
            kinds("((echo a) )"),
            vec![
                TokenKind::LParen,
                TokenKind::LParen,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::RParen,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn dollar_arith_stays_in_word() {
        let tokens = lex("echo $((1 + 2))");
        assert_eq!(tokens[1].text, "$((1 + 2))");
    }

    #[test]
    fn comment_skipped() {
        assert_eq!(texts("echo a # trailing comment\necho b"), vec![
            "echo", "a", "\n", "echo", "b"
        ]);
    }

    #[test]
    fn hash_inside_word_not_comment() {
        assert_eq!(texts("echo a#b"), vec!["echo", "a#b"]);
    }

    #[test]
    fn heredoc_body_captured() {
        let tokens = lex("cat <<EOF\nline one\nline two\nEOF\n");
        let body: Vec<_> = tokens.iter().filter(|t| t.kind == TokenKind::HeredocBody).collect();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].text, "line one\nline two\n");
    }

    #[test]
    fn heredoc_strip_tabs() {
        let tokens = lex("cat <<-EOF\n\tindented\n\tEOF\n");
        let body: Vec<_> = tokens.iter().filter(|t| t.kind == TokenKind::HeredocBody).collect();
        assert_eq!(body[0].text, "indented\n");
    }

    #[test]
    fn two_heredocs_in_order() {
        let tokens = lex("cat <<A <<B\nfirst\nA\nsecond\nB\n");
        let bodies: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::HeredocBody)
            .map(|t| t.text.clone())
            .collect();
        assert_eq!(bodies, vec!["first\n", "second\n"]);
    }

    #[test]
    fn unterminated_heredoc_is_incomplete() {
        let err = Lexer::new("cat <<EOF\nbody\n").tokenize().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::Incomplete);
    }

    #[test]
    fn unterminated_quote_is_incomplete() {
        let err = Lexer::new("echo 'oops").tokenize().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::Incomplete);
    }

    #[test]
    fn line_continuation_joins_words() {
        assert_eq!(texts("echo ab\\\ncd"), vec!["echo", "abcd"]);
    }

    #[test]
    fn array_literal_in_assignment_word() {
        let tokens = lex("a=(1 2 3)");
        assert_eq!(tokens[0].text, "a=(1 2 3)");
        assert_eq!(tokens[0].kind, TokenKind::Word);
    }

    #[test]
    fn subscript_assignment_captures_operators() {
        // Operator characters lose their meaning inside `NAME[...]=`.
        let tokens = lex("a[i<5]=yes");
        assert_eq!(tokens[0].text, "a[i<5]=yes");
        assert_eq!(tokens[0].kind, TokenKind::Word);
        assert_eq!(tokens[1].kind, TokenKind::Eof);

        let tokens = lex("a[x>y]+=v");
        assert_eq!(tokens[0].text, "a[x>y]+=v");
        assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn bracket_without_assignment_keeps_operators() {
        // No `=` after the bracket: `<` is still a redirect.
        let kinds = kinds("a[1 <in");
        assert!(kinds.contains(&TokenKind::Less));
    }

    #[test]
    fn regex_word_keeps_parens() {
        let tokens = lex("[[ $x =~ ^(a|b)+$ ]]");
        let words: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Word)
            .map(|t| t.text.clone())
            .collect();
        assert_eq!(words, vec!["[[", "$x", "=~", "^(a|b)+$", "]]"]);
    }

    #[test]
    fn token_positions_are_faithful() {
        let input = "echo  hi";
        for token in lex(input) {
            if token.kind == TokenKind::Word {
                let span: String = input.chars().skip(token.start).take(token.end - token.start).collect();
                assert_eq!(span, token.text);
            }
        }
    }
}
