//! `echo` and `printf`.

use std::io::Write;

use crate::interp::control::ExecResult;
use crate::shell::Shell;

pub fn builtin_echo(_shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let mut newline = true;
    let mut escapes = false;
    let mut args = &argv[1..];
    while let Some(first) = args.first() {
        match first.as_str() {
            "-n" => newline = false,
            "-e" => escapes = true,
            "-E" => escapes = false,
            "-ne" | "-en" => {
                newline = false;
                escapes = true;
            }
            _ => break,
        }
        args = &args[1..];
    }

    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        if escapes {
            let (text, stop) = decode_echo_escapes(arg);
            out.push_str(&text);
            if stop {
                // \c suppresses everything after it, newline included.
                super::out(&out);
                return Ok(0);
            }
        } else {
            out.push_str(arg);
        }
    }
    if newline {
        super::outln(&out);
    } else {
        super::out(&out);
    }
    Ok(0)
}

/// Returns the decoded text and whether `\c` cut output short.
fn decode_echo_escapes(arg: &str) -> (String, bool) {
    let mut out = String::new();
    let mut chars = arg.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('e') | Some('E') => out.push('\x1b'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some('\\') => out.push('\\'),
            Some('c') => return (out, true),
            Some('0') => {
                let mut code = 0u32;
                for _ in 0..3 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push((code & 0xff) as u8 as char);
            }
            Some('x') => {
                let mut code = 0u32;
                let mut seen = 0;
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            code = code * 16 + d;
                            chars.next();
                            seen += 1;
                        }
                        None => break,
                    }
                }
                if seen == 0 {
                    out.push_str("\\x");
                } else {
                    out.push(code as u8 as char);
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    (out, false)
}

pub fn builtin_printf(shell: &mut Shell, argv: &[String]) -> ExecResult<i32> {
    let Some(format) = argv.get(1) else {
        shell.diagnose("printf: usage: printf format [arguments]");
        return Ok(2);
    };
    let args = &argv[2..];

    let mut out = Vec::new();
    let mut arg_index = 0;
    // The format string is reused until all arguments are consumed.
    loop {
        let consumed = render_format(format, args, &mut arg_index, &mut out);
        if arg_index >= args.len() || !consumed {
            break;
        }
    }
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    let _ = handle.write_all(&out);
    let _ = handle.flush();
    Ok(0)
}

/// One pass over the format; returns whether any conversion consumed an
/// argument (which drives format reuse).
fn render_format(format: &str, args: &[String], arg_index: &mut usize, out: &mut Vec<u8>) -> bool {
    let mut consumed = false;
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push(b'\n'),
                Some('t') => out.push(b'\t'),
                Some('r') => out.push(b'\r'),
                Some('a') => out.push(0x07),
                Some('b') => out.push(0x08),
                Some('f') => out.push(0x0c),
                Some('v') => out.push(0x0b),
                Some('\\') => out.push(b'\\'),
                Some('"') => out.push(b'"'),
                Some('0') => {
                    let mut code = 0u32;
                    for _ in 0..3 {
                        match chars.peek().and_then(|c| c.to_digit(8)) {
                            Some(d) => {
                                code = code * 8 + d;
                                chars.next();
                            }
                            None => break,
                        }
                    }
                    out.push((code & 0xff) as u8);
                }
                Some(other) => {
                    out.push(b'\\');
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
                None => out.push(b'\\'),
            }
            continue;
        }
        if c != '%' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push(b'%');
            continue;
        }

        // Flags, width, precision.
        let mut spec = String::from("%");
        while matches!(chars.peek(), Some('-') | Some('+') | Some(' ') | Some('0') | Some('#')) {
            spec.push(chars.next().unwrap());
        }
        while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
            spec.push(chars.next().unwrap());
        }
        if chars.peek() == Some(&'.') {
            spec.push(chars.next().unwrap());
            while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                spec.push(chars.next().unwrap());
            }
        }
        let Some(conv) = chars.next() else {
            out.extend_from_slice(spec.as_bytes());
            break;
        };

        let arg = args.get(*arg_index).cloned().unwrap_or_default();
        if !matches!(conv, '%') {
            *arg_index += 1;
            consumed = true;
        }
        let rendered = format_one(&spec, conv, &arg);
        out.extend_from_slice(rendered.as_bytes());
    }
    consumed
}

fn format_one(spec: &str, conv: char, arg: &str) -> String {
    let (flags, width, precision) = parse_spec(spec);
    match conv {
        's' => pad_str(arg, &flags, width, precision),
        'c' => pad_str(&arg.chars().next().map(String::from).unwrap_or_default(), &flags, width, None),
        'd' | 'i' => {
            let n = parse_int(arg);
            pad_num(&n.to_string(), &flags, width)
        }
        'u' => {
            let n = parse_int(arg);
            pad_num(&(n as u64).to_string(), &flags, width)
        }
        'x' => pad_num(&format!("{:x}", parse_int(arg)), &flags, width),
        'X' => pad_num(&format!("{:X}", parse_int(arg)), &flags, width),
        'o' => pad_num(&format!("{:o}", parse_int(arg)), &flags, width),
        'q' => shell_quote(arg),
        _ => format!("{spec}{conv}"),
    }
}

fn parse_spec(spec: &str) -> (String, Option<usize>, Option<usize>) {
    let body = &spec[1..];
    let flags: String = body.chars().take_while(|c| "-+ 0#".contains(*c)).collect();
    let rest = &body[flags.len()..];
    let (width_text, precision_text) = match rest.split_once('.') {
        Some((w, p)) => (w, Some(p)),
        None => (rest, None),
    };
    let width = width_text.parse().ok();
    let precision = precision_text.and_then(|p| if p.is_empty() { Some(0) } else { p.parse().ok() });
    (flags, width, precision)
}

fn parse_int(arg: &str) -> i64 {
    let t = arg.trim();
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    // A leading quote yields the character code, as POSIX printf does.
    if let Some(rest) = t.strip_prefix('\'').or_else(|| t.strip_prefix('"')) {
        return rest.chars().next().map(|c| c as i64).unwrap_or(0);
    }
    t.parse().unwrap_or(0)
}

fn pad_str(s: &str, flags: &str, width: Option<usize>, precision: Option<usize>) -> String {
    let mut text = s.to_string();
    if let Some(p) = precision {
        text = text.chars().take(p).collect();
    }
    pad(&text, flags, width, false)
}

fn pad_num(s: &str, flags: &str, width: Option<usize>) -> String {
    pad(s, flags, width, true)
}

fn pad(s: &str, flags: &str, width: Option<usize>, numeric: bool) -> String {
    let Some(width) = width else { return s.to_string() };
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    let fill = width - len;
    if flags.contains('-') {
        format!("{s}{}", " ".repeat(fill))
    } else if numeric && flags.contains('0') {
        if let Some(rest) = s.strip_prefix('-') {
            format!("-{}{rest}", "0".repeat(fill))
        } else {
            format!("{}{s}", "0".repeat(fill))
        }
    } else {
        format!("{}{s}", " ".repeat(fill))
    }
}

fn shell_quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    if arg.chars().all(|c| c.is_ascii_alphanumeric() || "_./:=-".contains(c)) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_escape_decoding() {
        assert_eq!(decode_echo_escapes(r"a\tb\n"), ("a\tb\n".to_string(), false));
        assert_eq!(decode_echo_escapes(r"x\cy"), ("x".to_string(), true));
        assert_eq!(decode_echo_escapes(r"\060"), ("0".to_string(), false));
    }

    #[test]
    fn printf_format_one() {
        assert_eq!(format_one("%", 's', "abc"), "abc");
        assert_eq!(format_one("%5", 'd', "42"), "   42");
        assert_eq!(format_one("%-5", 'd', "42"), "42   ");
        assert_eq!(format_one("%05", 'd', "-42"), "-0042");
        assert_eq!(format_one("%", 'x', "255"), "ff");
        assert_eq!(format_one("%.2", 's', "abcdef"), "ab");
        assert_eq!(format_one("%", 'd', "oops"), "0");
    }

    #[test]
    fn format_reuse_consumes_args() {
        let args: Vec<String> = vec!["a".into(), "b".into()];
        let mut out = Vec::new();
        let mut idx = 0;
        loop {
            let consumed = render_format("[%s]", &args, &mut idx, &mut out);
            if idx >= args.len() || !consumed {
                break;
            }
        }
        assert_eq!(String::from_utf8(out).unwrap(), "[a][b]");
    }
}
