//! Parser-facing error types.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    Syntax,
    /// More input could complete the construct (unterminated quote,
    /// heredoc, expansion). Interactive drivers keep reading.
    Incomplete,
}

#[derive(Debug, Clone, Error)]
#[error("line {line}: {message}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Syntax,
    /// The construct is unfinished (dangling `fi`, open quote, pending
    /// heredoc); interactive input should be continued, scripts fail.
    Incomplete,
}

#[derive(Debug, Clone, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        ParseError { kind: ParseErrorKind::Syntax, message: message.into(), line, column }
    }

    pub fn incomplete(message: impl Into<String>, line: u32, column: u32) -> Self {
        ParseError { kind: ParseErrorKind::Incomplete, message: message.into(), line, column }
    }

    pub fn is_incomplete(&self) -> bool {
        self.kind == ParseErrorKind::Incomplete
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError {
            kind: match e.kind {
                LexErrorKind::Syntax => ParseErrorKind::Syntax,
                LexErrorKind::Incomplete => ParseErrorKind::Incomplete,
            },
            message: e.message,
            line: e.line,
            column: e.column,
        }
    }
}
