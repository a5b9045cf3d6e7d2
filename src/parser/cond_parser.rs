//! Parser for `[[ ... ]]` conditional expressions.
//!
//! Works over the token slice the main parser collected between `[[`
//! and `]]`. Word splitting and pathname expansion never apply inside,
//! so every operand stays a single [`Word`].

use crate::ast::{CondBinaryOp, CondExpr, CondUnaryOp, Word};
use crate::parser::lexer::{Token, TokenKind};
use crate::parser::types::ParseError;
use crate::parser::word_parser::{parse_word, WordContext};

pub fn parse_cond_tokens(tokens: &[Token]) -> Result<CondExpr, ParseError> {
    let tokens: Vec<&Token> = tokens
        .iter()
        .filter(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::HeredocBody))
        .collect();
    let mut parser = CondParser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected token in conditional expression"));
    }
    Ok(expr)
}

struct CondParser<'a> {
    tokens: Vec<&'a Token>,
    pos: usize,
}

impl<'a> CondParser<'a> {
    fn current(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).copied()
    }

    fn error(&self, message: &str) -> ParseError {
        match self.current() {
            Some(t) => ParseError::new(message, t.line, t.column),
            None => ParseError::new(message, 0, 0),
        }
    }

    fn parse_or(&mut self) -> Result<CondExpr, ParseError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.current().map(|t| t.kind), Some(TokenKind::OrIf)) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = CondExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<CondExpr, ParseError> {
        let mut lhs = self.parse_not()?;
        while matches!(self.current().map(|t| t.kind), Some(TokenKind::AndIf)) {
            self.pos += 1;
            let rhs = self.parse_not()?;
            lhs = CondExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<CondExpr, ParseError> {
        if self.current().is_some_and(|t| t.is_unquoted_word("!")) {
            self.pos += 1;
            let operand = self.parse_not()?;
            return Ok(CondExpr::Not(Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<CondExpr, ParseError> {
        let token = self
            .current()
            .ok_or_else(|| self.error("expected conditional expression"))?;

        if token.kind == TokenKind::LParen {
            self.pos += 1;
            let inner = self.parse_or()?;
            match self.current() {
                Some(t) if t.kind == TokenKind::RParen => {
                    self.pos += 1;
                    Ok(inner)
                }
                _ => Err(self.error("expected `)'")),
            }
        } else if let Some(op) = unary_op(token) {
            // Only a unary test when an operand word follows.
            if self
                .tokens
                .get(self.pos + 1)
                .is_some_and(|t| t.kind == TokenKind::Word && !is_binary_token(t))
            {
                self.pos += 2;
                let operand = self.word(self.tokens[self.pos - 1])?;
                return Ok(CondExpr::Unary { op, operand });
            }
            self.parse_word_or_binary()
        } else {
            self.parse_word_or_binary()
        }
    }

    fn parse_word_or_binary(&mut self) -> Result<CondExpr, ParseError> {
        let token = self
            .current()
            .ok_or_else(|| self.error("expected conditional expression"))?;
        if token.kind != TokenKind::Word {
            return Err(self.error("unexpected token in conditional expression"));
        }
        let lhs = self.word(token)?;
        self.pos += 1;

        let Some(op_token) = self.current() else {
            return Ok(CondExpr::Word(lhs));
        };
        let Some(op) = binary_op(op_token) else {
            return Ok(CondExpr::Word(lhs));
        };
        self.pos += 1;
        let rhs_token = self
            .current()
            .ok_or_else(|| self.error("expected operand"))?;
        if rhs_token.kind != TokenKind::Word {
            return Err(self.error("expected operand"));
        }
        let rhs = self.word(rhs_token)?;
        self.pos += 1;
        Ok(CondExpr::Binary { op, lhs, rhs })
    }

    fn word(&self, token: &Token) -> Result<Word, ParseError> {
        parse_word(&token.text, WordContext::Assignment)
            .map_err(|e| ParseError::new(e.0, token.line, token.column))
    }
}

fn unary_op(token: &Token) -> Option<CondUnaryOp> {
    if token.kind != TokenKind::Word || token.quoted {
        return None;
    }
    Some(match token.text.as_str() {
        "-e" | "-a" => CondUnaryOp::Exists,
        "-f" => CondUnaryOp::IsFile,
        "-d" => CondUnaryOp::IsDir,
        "-h" | "-L" => CondUnaryOp::IsSymlink,
        "-p" => CondUnaryOp::IsFifo,
        "-b" => CondUnaryOp::IsBlock,
        "-c" => CondUnaryOp::IsChar,
        "-S" => CondUnaryOp::IsSocket,
        "-s" => CondUnaryOp::NonEmptyFile,
        "-r" => CondUnaryOp::Readable,
        "-w" => CondUnaryOp::Writable,
        "-x" => CondUnaryOp::Executable,
        "-t" => CondUnaryOp::IsTty,
        "-z" => CondUnaryOp::ZeroLength,
        "-n" => CondUnaryOp::NonZeroLength,
        "-v" => CondUnaryOp::VarSet,
        "-o" => CondUnaryOp::OptionSet,
        _ => return None,
    })
}

fn is_binary_token(token: &Token) -> bool {
    binary_op(token).is_some()
}

fn binary_op(token: &Token) -> Option<CondBinaryOp> {
    match token.kind {
        TokenKind::Less => return Some(CondBinaryOp::StrLt),
        TokenKind::Great => return Some(CondBinaryOp::StrGt),
        TokenKind::Word if !token.quoted => {}
        _ => return None,
    }
    Some(match token.text.as_str() {
        "=" | "==" => CondBinaryOp::Match,
        "!=" => CondBinaryOp::NoMatch,
        "=~" => CondBinaryOp::Regex,
        "-eq" => CondBinaryOp::NumEq,
        "-ne" => CondBinaryOp::NumNe,
        "-lt" => CondBinaryOp::NumLt,
        "-le" => CondBinaryOp::NumLe,
        "-gt" => CondBinaryOp::NumGt,
        "-ge" => CondBinaryOp::NumGe,
        "-nt" => CondBinaryOp::NewerThan,
        "-ot" => CondBinaryOp::OlderThan,
        "-ef" => CondBinaryOp::SameFile,
        _ => return None,
    })
}
