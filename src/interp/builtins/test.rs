//! `test` / `[`.
//!
//! Unlike `[[ ]]`, operands arrive already expanded, `=` compares
//! literally (no pattern matching), and `-a`/`-o` combine expressions.

use crate::ast::{CondExpr, CondUnaryOp, Word};
use crate::interp::cond::eval_cond;
use crate::interp::control::{ExecResult, Interrupt};
use crate::shell::Shell;

pub fn builtin_test(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let mut args: &[String] = &argv[1..];
    if argv[0] == "[" {
        match args.last() {
            Some(bracket) if bracket == "]" => args = &args[..args.len() - 1],
            _ => {
                shell.diagnose("[: missing `]'");
                return Ok(2);
            }
        }
    }

    let mut parser = TestParser { shell, args, pos: 0 };
    match parser.parse_or() {
        Ok(value) => {
            if parser.pos < parser.args.len() {
                parser
                    .shell
                    .diagnose(&format!("test: {}: unexpected operator", parser.args[parser.pos]));
                return Ok(2);
            }
            Ok(if value { 0 } else { 1 })
        }
        Err(TestError::Interrupt(i)) => Err(i),
        Err(TestError::Syntax(message)) => {
            shell.diagnose(&format!("test: {message}"));
            Ok(2)
        }
    }
}

enum TestError {
    Syntax(String),
    Interrupt(Interrupt),
}

impl From<Interrupt> for TestError {
    fn from(i: Interrupt) -> Self {
        TestError::Interrupt(i)
    }
}

struct TestParser<'a> {
    shell: &'a mut Shell,
    args: &'a [String],
    pos: usize,
}

impl TestParser<'_> {
    fn current(&self) -> Option<&str> {
        self.args.get(self.pos).map(|s| s.as_str())
    }

    fn parse_or(&mut self) -> Result<bool, TestError> {
        let mut value = self.parse_and()?;
        while self.current() == Some("-o") {
            self.pos += 1;
            let rhs = self.parse_and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn parse_and(&mut self) -> Result<bool, TestError> {
        let mut value = self.parse_not()?;
        while self.current() == Some("-a") {
            self.pos += 1;
            let rhs = self.parse_not()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn parse_not(&mut self) -> Result<bool, TestError> {
        if self.current() == Some("!") {
            self.pos += 1;
            return Ok(!self.parse_not()?);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<bool, TestError> {
        let Some(first) = self.current() else {
            // `test` with no arguments is false.
            return Ok(false);
        };
        let first = first.to_string();
        let first = first.as_str();

        if first == "(" {
            self.pos += 1;
            let value = self.parse_or()?;
            if self.current() != Some(")") {
                return Err(TestError::Syntax("expected `)'".to_string()));
            }
            self.pos += 1;
            return Ok(value);
        }

        // Binary before unary: `test -n = -n` compares the strings.
        if self.args.len() > self.pos + 2 {
            if let Some(op) = self.args.get(self.pos + 1) {
                if let Some(result) = self.try_binary(first.to_string(), op.clone())? {
                    return Ok(result);
                }
            }
        }

        if let Some(op) = unary_op(first) {
            if let Some(operand) = self.args.get(self.pos + 1).cloned() {
                self.pos += 2;
                let expr = CondExpr::Unary { op, operand: Word::literal(operand) };
                return Ok(eval_cond(self.shell, &expr).map_err(TestError::Interrupt)?);
            }
        }

        // Bare word: true when non-empty.
        let value = !first.is_empty();
        self.pos += 1;
        Ok(value)
    }

    fn try_binary(&mut self, lhs: String, op: String) -> Result<Option<bool>, TestError> {
        let rhs = match self.args.get(self.pos + 2) {
            Some(rhs) => rhs.clone(),
            None => return Ok(None),
        };
        let result = match op.as_str() {
            "=" | "==" => lhs == rhs,
            "!=" => lhs != rhs,
            "<" => lhs < rhs,
            ">" => lhs > rhs,
            "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" => {
                let a = numeric(&lhs)?;
                let b = numeric(&rhs)?;
                match op.as_str() {
                    "-eq" => a == b,
                    "-ne" => a != b,
                    "-lt" => a < b,
                    "-le" => a <= b,
                    "-gt" => a > b,
                    _ => a >= b,
                }
            }
            "-nt" | "-ot" | "-ef" => {
                let expr = CondExpr::Binary {
                    op: match op.as_str() {
                        "-nt" => crate::ast::CondBinaryOp::NewerThan,
                        "-ot" => crate::ast::CondBinaryOp::OlderThan,
                        _ => crate::ast::CondBinaryOp::SameFile,
                    },
                    lhs: Word::literal(lhs),
                    rhs: Word::literal(rhs),
                };
                eval_cond(self.shell, &expr).map_err(TestError::Interrupt)?
            }
            _ => return Ok(None),
        };
        self.pos += 3;
        Ok(Some(result))
    }
}

fn numeric(text: &str) -> Result<i64, TestError> {
    let t = text.trim();
    let t = t.strip_prefix('+').unwrap_or(t);
    t.parse::<i64>()
        .map_err(|_| TestError::Syntax(format!("{text}: integer expression expected")))
}

fn unary_op(text: &str) -> Option<CondUnaryOp> {
    Some(match text {
        "-e" => CondUnaryOp::Exists,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::Shell;

    fn run(shell: &mut Shell, args: &[&str]) -> i32 {
        let argv: Vec<String> = std::iter::once("test".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        builtin_test(shell, &argv).unwrap()
    }

    #[test]
    fn string_tests() {
        let mut sh = Shell::new("test");
        assert_eq!(run(&mut sh, &["abc"]), 0);
        assert_eq!(run(&mut sh, &[""]), 1);
        assert_eq!(run(&mut sh, &["-n", "x"]), 0);
        assert_eq!(run(&mut sh, &["-z", ""]), 0);
        assert_eq!(run(&mut sh, &["a", "=", "a"]), 0);
        assert_eq!(run(&mut sh, &["a", "!=", "a"]), 1);
    }

    #[test]
    fn equals_is_literal_not_pattern() {
        let mut sh = Shell::new("test");
        assert_eq!(run(&mut sh, &["abc", "=", "a*"]), 1);
        assert_eq!(run(&mut sh, &["a*", "=", "a*"]), 0);
    }

    #[test]
    fn numeric_tests() {
        let mut sh = Shell::new("test");
        assert_eq!(run(&mut sh, &["3", "-eq", "3"]), 0);
        assert_eq!(run(&mut sh, &["3", "-lt", "10"]), 0);
        assert_eq!(run(&mut sh, &["3", "-gt", "10"]), 1);
        assert_eq!(run(&mut sh, &["x", "-eq", "3"]), 2);
    }

    #[test]
    fn negation_and_connectives() {
        let mut sh = Shell::new("test");
        assert_eq!(run(&mut sh, &["!", ""]), 0);
        assert_eq!(run(&mut sh, &["a", "-a", "b"]), 0);
        assert_eq!(run(&mut sh, &["", "-o", "b"]), 0);
        assert_eq!(run(&mut sh, &["", "-a", "b"]), 1);
    }

    #[test]
    fn no_args_is_false() {
        let mut sh = Shell::new("test");
        assert_eq!(run(&mut sh, &[]), 1);
    }

    #[test]
    fn empty_string_operand_of_binary() {
        let mut sh = Shell::new("test");
        assert_eq!(run(&mut sh, &["", "=", ""]), 0);
    }
}
