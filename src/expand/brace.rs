//! Brace expansion.
//!
//! Purely structural, before any variable lookup: each word containing
//! a brace node becomes one word per alternative, with the surrounding
//! parts distributed over every element. Nested braces expand through
//! recursion.

use crate::ast::{BraceItem, RangeEnd, Word, WordPart};

const MAX_RANGE_ITEMS: i64 = 100_000;

/// Expand every brace node in `word`, left to right.
pub fn brace_expand(word: &Word) -> Vec<Word> {
    let brace_at = word
        .parts
        .iter()
        .position(|p| matches!(p, WordPart::Brace(_)));
    let Some(at) = brace_at else {
        return vec![word.clone()];
    };

    let WordPart::Brace(items) = &word.parts[at] else { unreachable!() };
    let prefix = &word.parts[..at];
    let suffix = &word.parts[at + 1..];

    let mut results = Vec::new();
    for item in items {
        match item {
            BraceItem::Word(item_word) => {
                // The item may itself contain brace nodes.
                for expanded_item in brace_expand(item_word) {
                    let mut parts = prefix.to_vec();
                    parts.extend(expanded_item.parts);
                    parts.extend(suffix.to_vec());
                    results.extend(brace_expand(&Word { parts }));
                }
            }
            BraceItem::Range { start, end, step, start_text, end_text } => {
                for text in expand_range(*start, *end, *step, start_text, end_text) {
                    let mut parts = prefix.to_vec();
                    parts.push(WordPart::Literal(text));
                    parts.extend(suffix.to_vec());
                    results.extend(brace_expand(&Word { parts }));
                }
            }
        }
    }
    results
}

fn expand_range(
    start: RangeEnd,
    end: RangeEnd,
    step: Option<i64>,
    start_text: &str,
    end_text: &str,
) -> Vec<String> {
    match (start, end) {
        (RangeEnd::Int(a), RangeEnd::Int(b)) => {
            let width = zero_pad_width(start_text, end_text);
            numeric_range(a, b, step)
                .into_iter()
                .map(|n| format_padded(n, width))
                .collect()
        }
        (RangeEnd::Char(a), RangeEnd::Char(b)) => {
            // Mixed case produces nothing, as in bash.
            if a.is_ascii_uppercase() != b.is_ascii_uppercase() {
                return Vec::new();
            }
            numeric_range(a as i64, b as i64, step)
                .into_iter()
                .filter_map(|n| char::from_u32(n as u32))
                .map(|c| c.to_string())
                .collect()
        }
        _ => Vec::new(),
    }
}

/// A step of zero counts as one; the sign of the step is ignored and
/// the natural direction of the range wins.
fn numeric_range(start: i64, end: i64, step: Option<i64>) -> Vec<i64> {
    let step = match step.unwrap_or(1).abs() {
        0 => 1,
        s => s,
    };
    let mut out = Vec::new();
    if start <= end {
        let mut i = start;
        while i <= end && out.len() < MAX_RANGE_ITEMS as usize {
            out.push(i);
            i += step;
        }
    } else {
        let mut i = start;
        while i >= end && out.len() < MAX_RANGE_ITEMS as usize {
            out.push(i);
            i -= step;
        }
    }
    out
}

/// `{01..10}` pads every element to the widest zero-padded endpoint.
fn zero_pad_width(start_text: &str, end_text: &str) -> usize {
    let mut width = 0;
    for text in [start_text, end_text] {
        let digits = text.strip_prefix('-').unwrap_or(text);
        if digits.len() > 1 && digits.starts_with('0') {
            width = width.max(digits.len());
        }
    }
    width
}

fn format_padded(n: i64, width: usize) -> String {
    if width == 0 {
        return n.to_string();
    }
    if n < 0 {
        format!("-{:0>width$}", -n, width = width)
    } else {
        format!("{n:0>width$}")
    }
}
