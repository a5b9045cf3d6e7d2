//! Recursive-descent parser.
//!
//! Consumes the token stream with one-token lookahead (two where the
//! fd-number prefix of a redirect needs it) and produces a `CommandList`.
//!
//! Grammar sketch:
//!   program    := list
//!   list       := and_or ((';' | '&' | newline) and_or)*
//!   and_or     := pipeline (('&&' | '||') pipeline)*
//!   pipeline   := ['!'] command ('|' command)*
//!   command    := compound | function_def | simple
//!   simple     := (assignment | word | redirect)+
//!   compound   := if | while | until | for | case | select
//!               | '(' list ')' | '{' list '}' | '((' expr '))'
//!               | '[[' cond ']]'
//!
//! Keywords are never classified by the lexer; every keyword decision
//! goes through [`Parser::at_keyword`], which checks for an unquoted
//! word at command position.

use std::collections::HashMap;

use crate::ast::*;
use crate::parser::arith_parser::parse_arith;
use crate::parser::cond_parser::parse_cond_tokens;
use crate::parser::lexer::{Lexer, Token, TokenKind};
use crate::parser::types::{ParseError, ParseErrorKind};
use crate::parser::word_parser::{self, WordContext};

/// Keywords that terminate an inner command list; they are meaningful
/// only at command position.
const LIST_TERMINATORS: &[&str] = &["then", "do", "done", "fi", "elif", "else", "esac", "}"];

/// Reserved words take precedence over aliases at command position.
const RESERVED_WORDS: &[&str] = &[
    "if", "then", "else", "elif", "fi", "while", "until", "for", "do", "done", "case", "esac",
    "in", "function", "select", "{", "}", "!", "[[", "]]",
];

/// Parse a complete script or command string.
pub fn parse_script(input: &str, aliases: &HashMap<String, String>) -> Result<CommandList, ParseError> {
    Parser::new(aliases.clone()).parse(input)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Scan position for pairing `<<` redirects with their captured
    /// bodies, which the lexer emits after the line's newline token.
    heredoc_cursor: usize,
    aliases: HashMap<String, String>,
    /// Aliases currently being expanded, to stop recursion.
    expanding: Vec<String>,
}

impl Parser {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Parser {
            tokens: Vec::new(),
            pos: 0,
            heredoc_cursor: 0,
            aliases,
            expanding: Vec::new(),
        }
    }

    pub fn parse(&mut self, input: &str) -> Result<CommandList, ParseError> {
        self.tokens = Lexer::new(input).tokenize()?;
        self.pos = 0;
        self.heredoc_cursor = 0;
        let list = self.parse_list()?;
        if !self.at_eof() {
            return Err(self.syntax_error(format!(
                "unexpected token `{}'",
                self.current().text
            )));
        }
        Ok(list)
    }

    // ---- token helpers ----

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn syntax_error(&self, message: impl Into<String>) -> ParseError {
        let token = self.current();
        if token.kind == TokenKind::Eof {
            ParseError::incomplete(message, token.line, token.column)
        } else {
            ParseError::new(message, token.line, token.column)
        }
    }

    fn word_error(&self, e: word_parser::WordError) -> ParseError {
        let token = self.current();
        ParseError { kind: ParseErrorKind::Syntax, message: e.0, line: token.line, column: token.column }
    }

    /// The single is-keyword-here helper: true when the current token is
    /// the unquoted word `kw`. Callers only invoke it at command
    /// position, which is what makes recognition positional.
    fn at_keyword(&self, kw: &str) -> bool {
        self.current().is_unquoted_word(kw)
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.at_keyword(kw) {
            self.advance();
            Ok(())
        } else {
            Err(self.syntax_error(format!(
                "expected `{}', got `{}'",
                kw,
                self.current().text
            )))
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.syntax_error(format!("expected {what}, got `{}'", self.current().text)))
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.current().kind, TokenKind::Newline | TokenKind::HeredocBody) {
            self.advance();
        }
    }

    // ---- lists ----

    /// True at a token that ends the current command list without being
    /// consumed by it.
    fn at_list_end(&self) -> bool {
        match self.current().kind {
            TokenKind::Eof | TokenKind::RParen | TokenKind::DSemi | TokenKind::SemiAnd | TokenKind::DSemiAnd => true,
            TokenKind::Word => LIST_TERMINATORS.iter().any(|kw| self.at_keyword(kw)),
            _ => false,
        }
    }

    fn parse_list(&mut self) -> Result<CommandList, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_list_end() {
                break;
            }
            let mut and_or = self.parse_and_or()?;
            match self.current().kind {
                TokenKind::Amp => {
                    self.advance();
                    and_or.background = true;
                }
                TokenKind::Semi | TokenKind::Newline => {
                    self.advance();
                }
                _ => {
                    items.push(and_or);
                    break;
                }
            }
            items.push(and_or);
        }
        Ok(CommandList { items })
    }

    fn parse_and_or(&mut self) -> Result<AndOr, ParseError> {
        let line = self.current().line;
        let first = self.parse_pipeline()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.current().kind {
                TokenKind::AndIf => AndOrOp::And,
                TokenKind::OrIf => AndOrOp::Or,
                _ => break,
            };
            self.advance();
            self.skip_newlines();
            rest.push((op, self.parse_pipeline()?));
        }
        Ok(AndOr { first, rest, background: false, line })
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, ParseError> {
        let mut negated = false;
        while self.at_keyword("!") {
            self.advance();
            negated = !negated;
        }
        let mut stages = vec![self.parse_command()?];
        while self.check(TokenKind::Pipe) {
            self.advance();
            self.skip_newlines();
            stages.push(self.parse_command()?);
        }
        Ok(Pipeline { negated, stages })
    }

    // ---- commands ----

    fn parse_command(&mut self) -> Result<Command, ParseError> {
        // Alias expansion happens here, at command position, so an alias
        // may expand to a keyword. The first word of a replacement is
        // itself checked, with in-flight names blocked from recursing.
        self.expanding.clear();
        while self.maybe_expand_alias() {}

        if let Some(compound) = self.try_parse_compound()? {
            return Ok(Command::Compound(compound));
        }
        if self.at_keyword("function") {
            return self.parse_function_def(true);
        }
        if self.looks_like_function_def() {
            return self.parse_function_def(false);
        }
        Ok(Command::Simple(self.parse_simple_command()?))
    }

    /// `name () compound` — name must be an unquoted plain word followed
    /// directly by `(` `)`.
    fn looks_like_function_def(&self) -> bool {
        self.current().kind == TokenKind::Word
            && !self.current().quoted
            && is_name(&self.current().text)
            && self.peek(1).kind == TokenKind::LParen
            && self.peek(2).kind == TokenKind::RParen
    }

    fn parse_function_def(&mut self, keyword_form: bool) -> Result<Command, ParseError> {
        if keyword_form {
            self.advance(); // function
        }
        let name_token = self.expect(TokenKind::Word, "function name")?;
        if !is_name(&name_token.text) {
            return Err(ParseError::new(
                format!("`{}' is not a valid function name", name_token.text),
                name_token.line,
                name_token.column,
            ));
        }
        if self.check(TokenKind::LParen) {
            self.advance();
            self.expect(TokenKind::RParen, "`)'")?;
        } else if !keyword_form {
            return Err(self.syntax_error("expected `()' in function definition"));
        }
        self.skip_newlines();
        let body = match self.try_parse_compound()? {
            Some(body) => body,
            None => return Err(self.syntax_error("expected compound command as function body")),
        };
        Ok(Command::FunctionDef(FunctionDef {
            name: name_token.text,
            body: std::rc::Rc::new(body),
        }))
    }

    fn try_parse_compound(&mut self) -> Result<Option<CompoundCommand>, ParseError> {
        let kind = if self.at_keyword("if") {
            self.parse_if()?
        } else if self.at_keyword("while") {
            self.parse_while(false)?
        } else if self.at_keyword("until") {
            self.parse_while(true)?
        } else if self.at_keyword("for") {
            self.parse_for()?
        } else if self.at_keyword("select") {
            self.parse_select()?
        } else if self.at_keyword("case") {
            self.parse_case()?
        } else if self.at_keyword("[[") {
            self.parse_cond()?
        } else if self.at_keyword("{") {
            self.advance();
            let body = self.parse_list()?;
            self.expect_keyword("}")?;
            CompoundKind::BraceGroup(body)
        } else if self.check(TokenKind::LParen) {
            self.advance();
            let body = self.parse_list()?;
            self.expect(TokenKind::RParen, "`)'")?;
            CompoundKind::Subshell(body)
        } else if self.check(TokenKind::DParen) {
            let token = self.advance();
            let expr = parse_arith(&token.text)
                .map_err(|e| ParseError::new(e, token.line, token.column))?;
            CompoundKind::ArithCommand(expr)
        } else {
            return Ok(None);
        };
        let redirects = self.parse_trailing_redirects()?;
        Ok(Some(CompoundCommand { kind, redirects }))
    }

    fn parse_if(&mut self) -> Result<CompoundKind, ParseError> {
        self.expect_keyword("if")?;
        let mut clauses = Vec::new();
        let condition = self.parse_list()?;
        self.expect_keyword("then")?;
        let body = self.parse_list()?;
        clauses.push(IfClause { condition, body });
        let mut else_body = None;
        loop {
            if self.at_keyword("elif") {
                self.advance();
                let condition = self.parse_list()?;
                self.expect_keyword("then")?;
                let body = self.parse_list()?;
                clauses.push(IfClause { condition, body });
            } else if self.at_keyword("else") {
                self.advance();
                else_body = Some(self.parse_list()?);
                break;
            } else {
                break;
            }
        }
        self.expect_keyword("fi")?;
        Ok(CompoundKind::If { clauses, else_body })
    }

    fn parse_while(&mut self, until: bool) -> Result<CompoundKind, ParseError> {
        self.advance(); // while / until
        let condition = self.parse_list()?;
        self.expect_keyword("do")?;
        let body = self.parse_list()?;
        self.expect_keyword("done")?;
        Ok(if until {
            CompoundKind::Until { condition, body }
        } else {
            CompoundKind::While { condition, body }
        })
    }

    fn parse_for(&mut self) -> Result<CompoundKind, ParseError> {
        self.expect_keyword("for")?;

        if self.check(TokenKind::DParen) {
            let token = self.advance();
            let (init, condition, update) = split_cstyle_header(&token.text)
                .map_err(|e| ParseError::new(e, token.line, token.column))?;
            self.eat(TokenKind::Semi);
            let body = self.parse_do_group()?;
            return Ok(CompoundKind::CStyleFor { init, condition, update, body });
        }

        let var_token = self.expect(TokenKind::Word, "variable name")?;
        if !is_name(&var_token.text) {
            return Err(ParseError::new(
                format!("`{}' is not a valid identifier", var_token.text),
                var_token.line,
                var_token.column,
            ));
        }
        let words = self.parse_in_words()?;
        let body = self.parse_do_group()?;
        Ok(CompoundKind::For { var: var_token.text, words, body })
    }

    fn parse_select(&mut self) -> Result<CompoundKind, ParseError> {
        self.expect_keyword("select")?;
        let var_token = self.expect(TokenKind::Word, "variable name")?;
        if !is_name(&var_token.text) {
            return Err(ParseError::new(
                format!("`{}' is not a valid identifier", var_token.text),
                var_token.line,
                var_token.column,
            ));
        }
        let words = self.parse_in_words()?;
        let body = self.parse_do_group()?;
        Ok(CompoundKind::Select { var: var_token.text, words, body })
    }

    /// `[in word...]` then the separator before `do`. `None` means the
    /// loop iterates over `"$@"`.
    fn parse_in_words(&mut self) -> Result<Option<Vec<Word>>, ParseError> {
        self.skip_newlines();
        if !self.at_keyword("in") {
            // `for x; do` / `for x do`
            if self.check(TokenKind::Semi) {
                self.advance();
            }
            return Ok(None);
        }
        self.advance();
        let mut words = Vec::new();
        while self.check(TokenKind::Word) && !self.at_keyword("do") {
            let token = self.advance();
            words.push(self.parse_word_token(&token)?);
        }
        if self.check(TokenKind::Semi) {
            self.advance();
        }
        Ok(Some(words))
    }

    fn parse_do_group(&mut self) -> Result<CommandList, ParseError> {
        self.skip_newlines();
        self.expect_keyword("do")?;
        let body = self.parse_list()?;
        self.expect_keyword("done")?;
        Ok(body)
    }

    fn parse_case(&mut self) -> Result<CompoundKind, ParseError> {
        self.expect_keyword("case")?;
        let subject_token = self.expect(TokenKind::Word, "word")?;
        let subject = self.parse_word_token(&subject_token)?;
        self.skip_newlines();
        self.expect_keyword("in")?;
        self.skip_newlines();

        let mut arms = Vec::new();
        while !self.at_keyword("esac") {
            if self.at_eof() {
                return Err(self.syntax_error("expected `esac'"));
            }
            self.eat(TokenKind::LParen);
            let mut patterns = Vec::new();
            loop {
                let token = self.expect(TokenKind::Word, "pattern")?;
                patterns.push(self.parse_word_token(&token)?);
                if !self.eat(TokenKind::Pipe) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "`)'")?;
            let body = self.parse_list()?;
            let terminator = match self.current().kind {
                TokenKind::DSemi => {
                    self.advance();
                    CaseTerminator::Break
                }
                TokenKind::SemiAnd => {
                    self.advance();
                    CaseTerminator::FallThrough
                }
                TokenKind::DSemiAnd => {
                    self.advance();
                    CaseTerminator::ContinueMatching
                }
                _ => CaseTerminator::Break,
            };
            arms.push(CaseArm { patterns, body, terminator });
            self.skip_newlines();
        }
        self.expect_keyword("esac")?;
        Ok(CompoundKind::Case { subject, arms })
    }

    fn parse_cond(&mut self) -> Result<CompoundKind, ParseError> {
        let open = self.advance(); // [[
        let mut depth = 1usize;
        let mut inner = Vec::new();
        loop {
            if self.at_eof() {
                return Err(ParseError::incomplete("expected `]]'", open.line, open.column));
            }
            if self.at_keyword("[[") {
                depth += 1;
            } else if self.at_keyword("]]") {
                depth -= 1;
                if depth == 0 {
                    self.advance();
                    break;
                }
            }
            inner.push(self.advance());
        }
        let expr = parse_cond_tokens(&inner)?;
        Ok(CompoundKind::Cond(expr))
    }

    // ---- simple commands ----

    fn parse_simple_command(&mut self) -> Result<SimpleCommand, ParseError> {
        let line = self.current().line;
        let mut cmd = SimpleCommand { line, ..Default::default() };
        let mut seen_command_word = false;

        loop {
            if let Some(redirect) = self.try_parse_redirect()? {
                cmd.redirects.push(redirect);
                continue;
            }
            if !self.check(TokenKind::Word) {
                break;
            }
            // Stop on list terminators only before the first word.
            if !seen_command_word && self.at_list_end() {
                break;
            }

            if !seen_command_word {
                if let Some(assignment) = self.try_parse_assignment()? {
                    cmd.assignments.push(assignment);
                    continue;
                }
            }

            let token = self.advance();
            cmd.words.push(self.parse_word_token(&token)?);
            seen_command_word = true;
        }

        if cmd.assignments.is_empty() && cmd.words.is_empty() && cmd.redirects.is_empty() {
            return Err(self.syntax_error(format!(
                "unexpected token `{}'",
                self.current().text
            )));
        }
        Ok(cmd)
    }

    /// Expand an alias at command-word position by splicing the lexed
    /// replacement into the token stream. Returns true when a splice
    /// happened and the loop should re-examine the current position.
    fn maybe_expand_alias(&mut self) -> bool {
        let token = self.current();
        if token.kind != TokenKind::Word || token.quoted {
            return false;
        }
        if RESERVED_WORDS.contains(&token.text.as_str()) {
            return false;
        }
        let name = token.text.clone();
        if self.expanding.contains(&name) {
            return false;
        }
        let Some(value) = self.aliases.get(&name).cloned() else {
            return false;
        };
        let Ok(mut replacement) = Lexer::new(&value).tokenize() else {
            return false;
        };
        replacement.pop(); // Eof
        if replacement.is_empty() {
            // Alias expands to nothing: drop the word.
            self.tokens.remove(self.pos);
            return true;
        }
        self.expanding.push(name);
        self.tokens.splice(self.pos..self.pos + 1, replacement);
        true
    }

    /// `NAME=value`, `NAME+=value`, `NAME[idx]=value`, `NAME=(a b c)`.
    fn try_parse_assignment(&mut self) -> Result<Option<Assignment>, ParseError> {
        let token = self.current().clone();
        let Some((name, index, append, value_text)) = split_assignment(&token.text) else {
            return Ok(None);
        };
        self.advance();

        if value_text.starts_with('(') && value_text.ends_with(')') {
            let inner = &value_text[1..value_text.len() - 1];
            let mut words = Vec::new();
            let inner_tokens = Lexer::new(inner)
                .tokenize()
                .map_err(|e| ParseError::new(e.message, token.line, token.column))?;
            for t in inner_tokens {
                match t.kind {
                    TokenKind::Word => words.push(
                        word_parser::parse_word(&t.text, WordContext::Assignment)
                            .map_err(|e| self.word_error(e))?,
                    ),
                    TokenKind::Newline | TokenKind::Eof => {}
                    _ => {
                        return Err(ParseError::new(
                            "invalid token in array assignment",
                            token.line,
                            token.column,
                        ))
                    }
                }
            }
            return Ok(Some(Assignment {
                name,
                index,
                value: AssignValue::Array(words),
                append,
            }));
        }

        let value = word_parser::parse_word(&value_text, WordContext::Assignment)
            .map_err(|e| self.word_error(e))?;
        Ok(Some(Assignment { name, index, value: AssignValue::Scalar(value), append }))
    }

    // ---- redirects ----

    fn parse_trailing_redirects(&mut self) -> Result<Vec<Redirect>, ParseError> {
        let mut redirects = Vec::new();
        while let Some(redirect) = self.try_parse_redirect()? {
            redirects.push(redirect);
        }
        Ok(redirects)
    }

    fn try_parse_redirect(&mut self) -> Result<Option<Redirect>, ParseError> {
        // `2>file`: a digits-only word glued to the operator is the fd.
        let mut fd = None;
        let mut op_offset = 0;
        {
            let token = self.current();
            if token.kind == TokenKind::Word
                && !token.quoted
                && !token.text.is_empty()
                && token.text.chars().all(|c| c.is_ascii_digit())
                && token.end == self.peek(1).start
                && is_redirect_op(self.peek(1).kind)
            {
                fd = token.text.parse::<i32>().ok();
                op_offset = 1;
            }
        }

        let op_kind = self.peek(op_offset).kind;
        if !is_redirect_op(op_kind) {
            return Ok(None);
        }
        if op_offset == 1 {
            self.advance(); // fd word
        }
        let op = self.advance();

        if matches!(op_kind, TokenKind::DLess | TokenKind::DLessDash) {
            let delim = self.expect(TokenKind::Word, "here-document delimiter")?;
            let quoted = delim.quoted;
            let body_text = self.take_heredoc_body()?;
            let body = if quoted {
                Word::literal(body_text)
            } else {
                word_parser::parse_word(&body_text, WordContext::HereDoc)
                    .map_err(|e| self.word_error(e))?
            };
            return Ok(Some(Redirect {
                fd,
                kind: RedirKind::HereDoc(HereDoc {
                    delimiter: strip_delimiter_quotes(&delim.text),
                    quoted,
                    strip_tabs: op_kind == TokenKind::DLessDash,
                    body,
                }),
            }));
        }

        let target_token = self.expect(TokenKind::Word, "redirect target")?;
        let target = self.parse_word_token(&target_token)?;
        let kind = match op_kind {
            TokenKind::Less => RedirKind::In(target),
            TokenKind::Great => RedirKind::Out(target),
            TokenKind::DGreat => RedirKind::Append(target),
            TokenKind::Clobber => RedirKind::Clobber(target),
            TokenKind::LessGreat => RedirKind::ReadWrite(target),
            TokenKind::LessAnd => RedirKind::DupIn(target),
            TokenKind::GreatAnd => RedirKind::DupOut(target),
            TokenKind::TLess => RedirKind::HereString(target),
            TokenKind::AndGreat => RedirKind::OutBoth(target),
            TokenKind::AndDGreat => RedirKind::AppendBoth(target),
            _ => unreachable!("not a redirect operator"),
        };
        Ok(Some(Redirect { fd, kind }))
    }

    fn take_heredoc_body(&mut self) -> Result<String, ParseError> {
        let mut i = self.heredoc_cursor.max(self.pos);
        while i < self.tokens.len() {
            if self.tokens[i].kind == TokenKind::HeredocBody {
                self.heredoc_cursor = i + 1;
                return Ok(self.tokens[i].text.clone());
            }
            i += 1;
        }
        Err(self.syntax_error("here-document body is missing"))
    }

    fn parse_word_token(&self, token: &Token) -> Result<Word, ParseError> {
        word_parser::parse_word(&token.text, WordContext::Normal).map_err(|e| {
            ParseError { kind: ParseErrorKind::Syntax, message: e.0, line: token.line, column: token.column }
        })
    }
}

fn is_redirect_op(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Less
            | TokenKind::Great
            | TokenKind::DGreat
            | TokenKind::DLess
            | TokenKind::DLessDash
            | TokenKind::TLess
            | TokenKind::LessAnd
            | TokenKind::GreatAnd
            | TokenKind::LessGreat
            | TokenKind::Clobber
            | TokenKind::AndGreat
            | TokenKind::AndDGreat
    )
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Split raw word text into assignment parts. Returns
/// `(name, index, append, value_text)` or `None` when the word is not an
/// assignment.
fn split_assignment(text: &str) -> Option<(String, Option<String>, bool, String)> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    if i >= chars.len() || (!chars[i].is_ascii_alphabetic() && chars[i] != '_') {
        return None;
    }
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    let name: String = chars[..i].iter().collect();

    let mut index = None;
    if i < chars.len() && chars[i] == '[' {
        let mut depth = 0;
        let start = i + 1;
        while i < chars.len() {
            match chars[i] {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        if i >= chars.len() {
            return None;
        }
        index = Some(chars[start..i].iter().collect());
        i += 1;
    }

    let append = i < chars.len() && chars[i] == '+';
    if append {
        i += 1;
    }
    if i >= chars.len() || chars[i] != '=' {
        return None;
    }
    let value: String = chars[i + 1..].iter().collect();
    Some((name, index, append, value))
}

/// Split `init; cond; update` of a C-style for header.
fn split_cstyle_header(
    text: &str,
) -> Result<(Option<ArithExpr>, Option<ArithExpr>, Option<ArithExpr>), String> {
    let mut sections = vec![String::new()];
    let mut paren_depth = 0usize;
    for c in text.chars() {
        match c {
            '(' => {
                paren_depth += 1;
                sections.last_mut().unwrap().push(c);
            }
            ')' => {
                paren_depth = paren_depth.saturating_sub(1);
                sections.last_mut().unwrap().push(c);
            }
            ';' if paren_depth == 0 => sections.push(String::new()),
            _ => sections.last_mut().unwrap().push(c),
        }
    }
    if sections.len() != 3 {
        return Err("expected `((init; cond; update))'".to_string());
    }
    let parse_opt = |s: &str| -> Result<Option<ArithExpr>, String> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            parse_arith(trimmed).map(Some)
        }
    };
    Ok((
        parse_opt(&sections[0])?,
        parse_opt(&sections[1])?,
        parse_opt(&sections[2])?,
    ))
}

/// Remove the quoting from a heredoc delimiter word.
fn strip_delimiter_quotes(text: &str) -> String {
    let mut out = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    out.push(q);
                }
            }
            '"' => {
                while let Some(q) = chars.next() {
                    if q == '"' {
                        break;
                    }
                    if q == '\\' {
                        if let Some(e) = chars.next() {
                            out.push(e);
                        }
                    } else {
                        out.push(q);
                    }
                }
            }
            '\\' => {
                if let Some(e) = chars.next() {
                    out.push(e);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn parse(input: &str) -> CommandList {
        parse_script(input, &HashMap::new()).expect("parse failed")
    }

    fn parse_err(input: &str) -> ParseError {
        parse_script(input, &HashMap::new()).expect_err("parse unexpectedly succeeded")
    }

    fn first_simple(list: &CommandList) -> &SimpleCommand {
        match &list.items[0].first.stages[0] {
            Command::Simple(cmd) => cmd,
            other => panic!("expected simple command, got {other:?}"),
        }
    }

    #[test]
    fn simple_command_words() {
        let list = parse("echo hello world");
        let cmd = first_simple(&list);
        assert_eq!(cmd.words.len(), 3);
        assert_eq!(cmd.words[0].as_literal().unwrap(), "echo");
    }

    #[test]
    fn and_or_chain() {
        let list = parse("a && b || c");
        let and_or = &list.items[0];
        assert_eq!(and_or.rest.len(), 2);
        assert_eq!(and_or.rest[0].0, AndOrOp::And);
        assert_eq!(and_or.rest[1].0, AndOrOp::Or);
    }

    #[test]
    fn pipeline_stages() {
        let list = parse("a | b | c");
        assert_eq!(list.items[0].first.stages.len(), 3);
    }

    #[test]
    fn negated_pipeline() {
        let list = parse("! false");
        assert!(list.items[0].first.negated);
    }

    #[test]
    fn background_list() {
        let list = parse("sleep 1 &");
        assert!(list.items[0].background);
    }

    #[test]
    fn assignments_before_command() {
        let list = parse("FOO=bar BAZ=qux env");
        let cmd = first_simple(&list);
        assert_eq!(cmd.assignments.len(), 2);
        assert_eq!(cmd.assignments[0].name, "FOO");
        assert_eq!(cmd.words.len(), 1);
    }

    #[test]
    fn assignment_after_command_is_word() {
        let list = parse("echo FOO=bar");
        let cmd = first_simple(&list);
        assert!(cmd.assignments.is_empty());
        assert_eq!(cmd.words.len(), 2);
    }

    #[test]
    fn array_assignment() {
        let list = parse("a=(1 2 3)");
        let cmd = first_simple(&list);
        match &cmd.assignments[0].value {
            AssignValue::Array(words) => assert_eq!(words.len(), 3),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn subscript_assignment() {
        let list = parse("a[1]=x");
        let cmd = first_simple(&list);
        assert_eq!(cmd.assignments[0].index.as_deref(), Some("1"));
    }

    #[test]
    fn subscript_with_operator_chars() {
        // The subscript is raw text; `<` and `>` mean nothing in it.
        let list = parse("a[i<5]=yes");
        let cmd = first_simple(&list);
        assert!(cmd.words.is_empty());
        assert_eq!(cmd.assignments[0].name, "a");
        assert_eq!(cmd.assignments[0].index.as_deref(), Some("i<5"));
        assert_eq!(
            cmd.assignments[0].value,
            AssignValue::Scalar(Word::literal("yes"))
        );
    }

    #[test]
    fn append_assignment() {
        let list = parse("a+=b");
        assert!(first_simple(&list).assignments[0].append);
    }

    #[test]
    fn redirect_with_fd() {
        let list = parse("cmd 2>errors");
        let cmd = first_simple(&list);
        assert_eq!(cmd.redirects[0].fd, Some(2));
        assert!(matches!(cmd.redirects[0].kind, RedirKind::Out(_)));
    }

    #[test]
    fn fd_needs_adjacency() {
        let list = parse("echo 2 >out");
        let cmd = first_simple(&list);
        assert_eq!(cmd.words.len(), 2);
        assert_eq!(cmd.redirects[0].fd, None);
    }

    #[test]
    fn dup_redirect() {
        let list = parse("cmd 2>&1");
        let cmd = first_simple(&list);
        assert_eq!(cmd.redirects[0].fd, Some(2));
        assert!(matches!(cmd.redirects[0].kind, RedirKind::DupOut(_)));
    }

    #[test]
    fn heredoc_attached() {
        let list = parse("cat <<EOF\nbody line\nEOF\n");
        let cmd = first_simple(&list);
        match &cmd.redirects[0].kind {
            RedirKind::HereDoc(doc) => {
                assert_eq!(doc.delimiter, "EOF");
                assert!(!doc.quoted);
            }
            other => panic!("expected heredoc, got {other:?}"),
        }
    }

    #[test]
    fn quoted_heredoc_delimiter() {
        let list = parse("cat <<'EOF'\n$x\nEOF\n");
        let cmd = first_simple(&list);
        match &cmd.redirects[0].kind {
            RedirKind::HereDoc(doc) => {
                assert!(doc.quoted);
                assert_eq!(doc.body.as_literal().unwrap(), "$x\n");
            }
            other => panic!("expected heredoc, got {other:?}"),
        }
    }

    #[test]
    fn if_statement() {
        let list = parse("if true; then echo a; elif false; then echo b; else echo c; fi");
        match &list.items[0].first.stages[0] {
            Command::Compound(c) => match &c.kind {
                CompoundKind::If { clauses, else_body } => {
                    assert_eq!(clauses.len(), 2);
                    assert!(else_body.is_some());
                }
                other => panic!("expected if, got {other:?}"),
            },
            other => panic!("expected compound, got {other:?}"),
        }
    }

    #[test]
    fn while_loop() {
        let list = parse("while true; do echo x; done");
        assert!(matches!(
            &list.items[0].first.stages[0],
            Command::Compound(c) if matches!(c.kind, CompoundKind::While { .. })
        ));
    }

    #[test]
    fn for_loop_words() {
        let list = parse("for i in 1 2 3; do echo $i; done");
        match &list.items[0].first.stages[0] {
            Command::Compound(c) => match &c.kind {
                CompoundKind::For { var, words, .. } => {
                    assert_eq!(var, "i");
                    assert_eq!(words.as_ref().unwrap().len(), 3);
                }
                other => panic!("expected for, got {other:?}"),
            },
            other => panic!("expected compound, got {other:?}"),
        }
    }

    #[test]
    fn for_loop_positional() {
        let list = parse("for arg; do echo $arg; done");
        match &list.items[0].first.stages[0] {
            Command::Compound(c) => {
                assert!(matches!(c.kind, CompoundKind::For { ref words, .. } if words.is_none()))
            }
            other => panic!("expected compound, got {other:?}"),
        }
    }

    #[test]
    fn cstyle_for() {
        let list = parse("for ((i=0; i<3; i++)); do echo $i; done");
        match &list.items[0].first.stages[0] {
            Command::Compound(c) => match &c.kind {
                CompoundKind::CStyleFor { init, condition, update, .. } => {
                    assert!(init.is_some());
                    assert!(condition.is_some());
                    assert!(update.is_some());
                }
                other => panic!("expected c-style for, got {other:?}"),
            },
            other => panic!("expected compound, got {other:?}"),
        }
    }

    #[test]
    fn case_statement_terminators() {
        let list = parse("case $x in a) echo a;; b) echo b;& c) echo c;;& d) echo d;; esac");
        match &list.items[0].first.stages[0] {
            Command::Compound(c) => match &c.kind {
                CompoundKind::Case { arms, .. } => {
                    assert_eq!(arms.len(), 4);
                    assert_eq!(arms[0].terminator, CaseTerminator::Break);
                    assert_eq!(arms[1].terminator, CaseTerminator::FallThrough);
                    assert_eq!(arms[2].terminator, CaseTerminator::ContinueMatching);
                }
                other => panic!("expected case, got {other:?}"),
            },
            other => panic!("expected compound, got {other:?}"),
        }
    }

    #[test]
    fn case_pattern_alternatives() {
        let list = parse("case x in a|b|c) echo hit;; esac");
        match &list.items[0].first.stages[0] {
            Command::Compound(c) => match &c.kind {
                CompoundKind::Case { arms, .. } => assert_eq!(arms[0].patterns.len(), 3),
                other => panic!("expected case, got {other:?}"),
            },
            other => panic!("expected compound, got {other:?}"),
        }
    }

    #[test]
    fn subshell_and_group() {
        let list = parse("(cd /; ls) | { read x; echo $x; }");
        let stages = &list.items[0].first.stages;
        assert!(matches!(
            &stages[0],
            Command::Compound(c) if matches!(c.kind, CompoundKind::Subshell(_))
        ));
        assert!(matches!(
            &stages[1],
            Command::Compound(c) if matches!(c.kind, CompoundKind::BraceGroup(_))
        ));
    }

    #[test]
    fn arith_command() {
        let list = parse("((x = 1 + 2))");
        assert!(matches!(
            &list.items[0].first.stages[0],
            Command::Compound(c) if matches!(c.kind, CompoundKind::ArithCommand(_))
        ));
    }

    #[test]
    fn arith_command_after_and_if() {
        let list = parse("true && ((x++))");
        let and_or = &list.items[0];
        assert!(matches!(
            &and_or.rest[0].1.stages[0],
            Command::Compound(c) if matches!(c.kind, CompoundKind::ArithCommand(_))
        ));
    }

    #[test]
    fn cond_command() {
        let list = parse("[[ -n $x && $y == a* ]]");
        assert!(matches!(
            &list.items[0].first.stages[0],
            Command::Compound(c) if matches!(c.kind, CompoundKind::Cond(_))
        ));
    }

    #[test]
    fn function_definitions() {
        for input in ["f() { echo hi; }", "function f { echo hi; }", "function f() { echo hi; }"] {
            let list = parse(input);
            assert!(
                matches!(&list.items[0].first.stages[0], Command::FunctionDef(d) if d.name == "f"),
                "failed for {input}"
            );
        }
    }

    #[test]
    fn compound_redirects_attach() {
        let list = parse("if true; then echo a; fi > out 2>&1");
        match &list.items[0].first.stages[0] {
            Command::Compound(c) => assert_eq!(c.redirects.len(), 2),
            other => panic!("expected compound, got {other:?}"),
        }
    }

    #[test]
    fn keyword_only_at_command_position() {
        // `if` as an argument is a plain word.
        let list = parse("echo if then fi");
        assert_eq!(first_simple(&list).words.len(), 4);
    }

    #[test]
    fn quoted_keyword_is_not_keyword() {
        let err = parse_err("\"if\" true; then echo; fi");
        assert_eq!(err.kind, ParseErrorKind::Syntax);
    }

    #[test]
    fn brace_arg_passes_through() {
        let list = parse("{ echo }\n}");
        match &list.items[0].first.stages[0] {
            Command::Compound(c) => match &c.kind {
                CompoundKind::BraceGroup(body) => {
                    let cmd = first_simple(body);
                    assert_eq!(cmd.words[1].as_literal().unwrap(), "}");
                }
                other => panic!("expected group, got {other:?}"),
            },
            other => panic!("expected compound, got {other:?}"),
        }
    }

    #[parameterized(
        empty_first_stage = { "| cat" },
        dangling_and = { "foo &&&" },
        lone_semi = { ";" },
        rparen = { ")" },
    )]
    fn syntax_errors(input: &str) {
        assert_eq!(parse_err(input).kind, ParseErrorKind::Syntax);
    }

    #[parameterized(
        open_if = { "if true; then echo" },
        open_while = { "while true; do echo x;" },
        open_quote = { "echo 'abc" },
        open_group = { "{ echo x;" },
        open_subshell = { "(echo x" },
        open_heredoc = { "cat <<EOF\nbody" },
    )]
    fn incomplete_inputs(input: &str) {
        assert!(parse_err(input).is_incomplete(), "expected incomplete for {input}");
    }

    #[test]
    fn alias_expansion_at_command_position() {
        let mut aliases = HashMap::new();
        aliases.insert("ll".to_string(), "ls -l".to_string());
        let list = parse_script("ll /tmp", &aliases).unwrap();
        let cmd = first_simple(&list);
        assert_eq!(cmd.words[0].as_literal().unwrap(), "ls");
        assert_eq!(cmd.words[1].as_literal().unwrap(), "-l");
        assert_eq!(cmd.words[2].as_literal().unwrap(), "/tmp");
    }

    #[test]
    fn alias_not_expanded_in_argument_position() {
        let mut aliases = HashMap::new();
        aliases.insert("ll".to_string(), "ls -l".to_string());
        let list = parse_script("echo ll", &aliases).unwrap();
        let cmd = first_simple(&list);
        assert_eq!(cmd.words[1].as_literal().unwrap(), "ll");
    }

    #[test]
    fn recursive_alias_stops() {
        let mut aliases = HashMap::new();
        aliases.insert("ls".to_string(), "ls -F".to_string());
        let list = parse_script("ls", &aliases).unwrap();
        let cmd = first_simple(&list);
        assert_eq!(cmd.words[0].as_literal().unwrap(), "ls");
        assert_eq!(cmd.words[1].as_literal().unwrap(), "-F");
    }

    #[test]
    fn lineno_recorded() {
        let list = parse("echo a\necho b");
        assert_eq!(list.items[0].line, 1);
        assert_eq!(list.items[1].line, 2);
    }
}
