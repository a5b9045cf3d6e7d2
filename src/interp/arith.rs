//! Arithmetic evaluation for `$(( ))`, `(( ))`, array subscripts, and
//! substring offsets.
//!
//! Integer-only, 64-bit two's complement, C precedence (the parser
//! already encoded it). Variable values that are not plain numbers are
//! themselves evaluated as expressions, with a recursion cap so
//! `x=x+1` cannot loop forever.

use crate::ast::{ArithBinaryOp, ArithExpr, ArithTarget, ArithUnaryOp};
use crate::interp::control::{ExecResult, Interrupt, ShellError};
use crate::parser::arith_parser::parse_arith;
use crate::shell::Shell;

const MAX_RECURSION: u32 = 128;

pub fn eval_arith(shell: &mut Shell, expr: &ArithExpr) -> ExecResult<i64> {
    eval(shell, expr, 0)
}

/// Parse and evaluate raw expression text (subscripts, `${x:off}`).
pub fn eval_arith_text(shell: &mut Shell, text: &str) -> ExecResult<i64> {
    eval_text(shell, text, 0)
}

fn arith_err(message: impl Into<String>) -> Interrupt {
    Interrupt::Error(ShellError::Arith(message.into()))
}

fn eval_text(shell: &mut Shell, text: &str, depth: u32) -> ExecResult<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    let expr = parse_arith(trimmed).map_err(|e| arith_err(e))?;
    eval_at(shell, &expr, depth)
}

fn eval_at(shell: &mut Shell, expr: &ArithExpr, depth: u32) -> ExecResult<i64> {
    if depth > MAX_RECURSION {
        return Err(arith_err("expression recursion level exceeded"));
    }
    eval(shell, expr, depth)
}

fn eval(shell: &mut Shell, expr: &ArithExpr, depth: u32) -> ExecResult<i64> {
    match expr {
        ArithExpr::Num(n) => Ok(*n),
        ArithExpr::Var { name, .. } => {
            let value = shell.state.get_str(name).unwrap_or_default();
            value_of(shell, &value, depth)
        }
        ArithExpr::Element { name, index } => {
            let idx = eval_at(shell, index, depth + 1)?;
            let value = element_value(shell, name, idx);
            value_of(shell, &value, depth)
        }
        ArithExpr::Subst(word) => {
            let text = crate::expand::expand_word_single(shell, word)?;
            eval_text(shell, &text, depth + 1)
        }
        ArithExpr::Unary { op, operand } => {
            let v = eval_at(shell, operand, depth + 1)?;
            Ok(match op {
                ArithUnaryOp::Neg => v.wrapping_neg(),
                ArithUnaryOp::Pos => v,
                ArithUnaryOp::Not => i64::from(v == 0),
                ArithUnaryOp::BitNot => !v,
            })
        }
        ArithExpr::IncrDecr { target, delta, prefix } => {
            let old = read_target(shell, target, depth)?;
            let new = old.wrapping_add(*delta);
            write_target(shell, target, new, depth)?;
            Ok(if *prefix { new } else { old })
        }
        ArithExpr::Binary { op, lhs, rhs } => match op {
            ArithBinaryOp::LogAnd => {
                if eval_at(shell, lhs, depth + 1)? == 0 {
                    Ok(0)
                } else {
                    Ok(i64::from(eval_at(shell, rhs, depth + 1)? != 0))
                }
            }
            ArithBinaryOp::LogOr => {
                if eval_at(shell, lhs, depth + 1)? != 0 {
                    Ok(1)
                } else {
                    Ok(i64::from(eval_at(shell, rhs, depth + 1)? != 0))
                }
            }
            ArithBinaryOp::Comma => {
                eval_at(shell, lhs, depth + 1)?;
                eval_at(shell, rhs, depth + 1)
            }
            _ => {
                let a = eval_at(shell, lhs, depth + 1)?;
                let b = eval_at(shell, rhs, depth + 1)?;
                apply_binary(*op, a, b)
            }
        },
        ArithExpr::Ternary { cond, then, otherwise } => {
            if eval_at(shell, cond, depth + 1)? != 0 {
                eval_at(shell, then, depth + 1)
            } else {
                eval_at(shell, otherwise, depth + 1)
            }
        }
        ArithExpr::Assign { target, op, value } => {
            let rhs = eval_at(shell, value, depth + 1)?;
            let new = match op {
                None => rhs,
                Some(op) => {
                    let old = read_target(shell, target, depth)?;
                    apply_binary(*op, old, rhs)?
                }
            };
            write_target(shell, target, new, depth)?;
            Ok(new)
        }
    }
}

fn apply_binary(op: ArithBinaryOp, a: i64, b: i64) -> ExecResult<i64> {
    Ok(match op {
        ArithBinaryOp::Add => a.wrapping_add(b),
        ArithBinaryOp::Sub => a.wrapping_sub(b),
        ArithBinaryOp::Mul => a.wrapping_mul(b),
        ArithBinaryOp::Div => {
            if b == 0 {
                return Err(arith_err("division by 0"));
            }
            a.wrapping_div(b)
        }
        ArithBinaryOp::Mod => {
            if b == 0 {
                return Err(arith_err("division by 0"));
            }
            a.wrapping_rem(b)
        }
        ArithBinaryOp::Pow => {
            if b < 0 {
                return Err(arith_err("exponent less than 0"));
            }
            let mut result: i64 = 1;
            let mut base = a;
            let mut exp = b as u64;
            while exp > 0 {
                if exp & 1 == 1 {
                    result = result.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            result
        }
        ArithBinaryOp::Shl => a.wrapping_shl((b & 63) as u32),
        ArithBinaryOp::Shr => a.wrapping_shr((b & 63) as u32),
        ArithBinaryOp::Lt => i64::from(a < b),
        ArithBinaryOp::Le => i64::from(a <= b),
        ArithBinaryOp::Gt => i64::from(a > b),
        ArithBinaryOp::Ge => i64::from(a >= b),
        ArithBinaryOp::Eq => i64::from(a == b),
        ArithBinaryOp::Ne => i64::from(a != b),
        ArithBinaryOp::BitAnd => a & b,
        ArithBinaryOp::BitXor => a ^ b,
        ArithBinaryOp::BitOr => a | b,
        ArithBinaryOp::LogAnd | ArithBinaryOp::LogOr | ArithBinaryOp::Comma => {
            unreachable!("handled before operand evaluation")
        }
    })
}

/// A variable's numeric value: a plain number, or an expression to
/// evaluate recursively. Empty and unset are zero.
fn value_of(shell: &mut Shell, value: &str, depth: u32) -> ExecResult<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n);
    }
    eval_text(shell, trimmed, depth + 1)
}

fn element_value(shell: &Shell, name: &str, index: i64) -> String {
    use crate::interp::state::Value;
    match shell.state.get(name).map(|v| &v.value) {
        Some(Value::Array(items)) => {
            let len = items.len() as i64;
            let idx = if index < 0 { len + index } else { index };
            if idx < 0 || idx >= len {
                String::new()
            } else {
                items[idx as usize].clone().unwrap_or_default()
            }
        }
        Some(Value::Scalar(s)) => {
            if index == 0 {
                s.clone()
            } else {
                String::new()
            }
        }
        None => String::new(),
    }
}

fn read_target(shell: &mut Shell, target: &ArithTarget, depth: u32) -> ExecResult<i64> {
    match &target.index {
        None => {
            let value = shell.state.get_str(&target.name).unwrap_or_default();
            value_of(shell, &value, depth)
        }
        Some(index) => {
            let idx = eval_at(shell, index, depth + 1)?;
            let value = element_value(shell, &target.name, idx);
            value_of(shell, &value, depth)
        }
    }
}

fn write_target(shell: &mut Shell, target: &ArithTarget, value: i64, depth: u32) -> ExecResult<()> {
    match &target.index {
        None => shell
            .state
            .set_scalar(&target.name, value.to_string())
            .map_err(Interrupt::Error),
        Some(index) => {
            let idx = eval_at(shell, index, depth + 1)?;
            if idx < 0 {
                return Err(arith_err(format!("bad array subscript: {idx}")));
            }
            shell
                .state
                .set_element(&target.name, idx as usize, value.to_string())
                .map_err(Interrupt::Error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::Shell;

    fn shell() -> Shell {
        Shell::new("test")
    }

    fn eval_str(shell: &mut Shell, text: &str) -> i64 {
        eval_arith_text(shell, text).expect("eval failed")
    }

    #[test]
    fn basic_math() {
        let mut sh = shell();
        assert_eq!(eval_str(&mut sh, "1 + 2 * 3"), 7);
        assert_eq!(eval_str(&mut sh, "(1 + 2) * 3"), 9);
        assert_eq!(eval_str(&mut sh, "7 / 2"), 3);
        assert_eq!(eval_str(&mut sh, "7 % 3"), 1);
        assert_eq!(eval_str(&mut sh, "2 ** 10"), 1024);
        assert_eq!(eval_str(&mut sh, "-5 + 3"), -2);
    }

    #[test]
    fn comparisons_and_logic() {
        let mut sh = shell();
        assert_eq!(eval_str(&mut sh, "3 < 5"), 1);
        assert_eq!(eval_str(&mut sh, "3 >= 5"), 0);
        assert_eq!(eval_str(&mut sh, "1 && 2"), 1);
        assert_eq!(eval_str(&mut sh, "0 || 0"), 0);
        assert_eq!(eval_str(&mut sh, "!0"), 1);
        assert_eq!(eval_str(&mut sh, "~0"), -1);
    }

    #[test]
    fn short_circuit_skips_side_effects() {
        let mut sh = shell();
        assert_eq!(eval_str(&mut sh, "0 && (x = 5)"), 0);
        assert!(!sh.state.is_set("x"));
        assert_eq!(eval_str(&mut sh, "1 || (y = 5)"), 1);
        assert!(!sh.state.is_set("y"));
    }

    #[test]
    fn variables_and_assignment() {
        let mut sh = shell();
        assert_eq!(eval_str(&mut sh, "x = 5"), 5);
        assert_eq!(sh.state.get_str("x").unwrap(), "5");
        assert_eq!(eval_str(&mut sh, "x += 3"), 8);
        assert_eq!(eval_str(&mut sh, "x"), 8);
        // Unset is zero.
        assert_eq!(eval_str(&mut sh, "nosuch + 1"), 1);
    }

    #[test]
    fn variable_value_is_expression() {
        let mut sh = shell();
        sh.state.set_scalar("a", "2 + 3").unwrap();
        assert_eq!(eval_str(&mut sh, "a * 2"), 10);
    }

    #[test]
    fn recursion_cap() {
        let mut sh = shell();
        sh.state.set_scalar("r", "r + 1").unwrap();
        assert!(eval_arith_text(&mut sh, "r").is_err());
    }

    #[test]
    fn increments() {
        let mut sh = shell();
        sh.state.set_scalar("i", "5").unwrap();
        assert_eq!(eval_str(&mut sh, "i++"), 5);
        assert_eq!(eval_str(&mut sh, "i"), 6);
        assert_eq!(eval_str(&mut sh, "++i"), 7);
        assert_eq!(eval_str(&mut sh, "i--"), 7);
        assert_eq!(eval_str(&mut sh, "--i"), 5);
    }

    #[test]
    fn ternary_and_comma() {
        let mut sh = shell();
        assert_eq!(eval_str(&mut sh, "1 ? 10 : 20"), 10);
        assert_eq!(eval_str(&mut sh, "0 ? 10 : 20"), 20);
        assert_eq!(eval_str(&mut sh, "x = 1, x + 1"), 2);
    }

    #[test]
    fn division_by_zero() {
        let mut sh = shell();
        assert!(eval_arith_text(&mut sh, "1 / 0").is_err());
        assert!(eval_arith_text(&mut sh, "1 % 0").is_err());
    }

    #[test]
    fn array_elements() {
        let mut sh = shell();
        assert_eq!(eval_str(&mut sh, "a[2] = 7"), 7);
        assert_eq!(eval_str(&mut sh, "a[2] * 2"), 14);
        assert_eq!(eval_str(&mut sh, "a[1 + 1]"), 7);
    }

    #[test]
    fn shifts_wrap_like_bash() {
        let mut sh = shell();
        assert_eq!(eval_str(&mut sh, "1 << 4"), 16);
        assert_eq!(eval_str(&mut sh, "1 << 64"), 1);
        assert_eq!(eval_str(&mut sh, "256 >> 4"), 16);
    }
}
