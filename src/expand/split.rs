//! IFS field splitting.
//!
//! Expansion evaluates word parts into [`Seg`]s: text runs that know
//! their quoting and whether they came from an unquoted expansion (and
//! are therefore splittable), plus hard field breaks from `"$@"`.
//! Splitting turns a word's segments into fields of [`Piece`]s, keeping
//! per-piece quoting so pathname expansion can honor provenance.

/// A run of expanded text within a field. `quoted` text is inert for
/// pattern matching.
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub text: String,
    pub quoted: bool,
}

/// One expanded element of a word, before field splitting.
#[derive(Debug, Clone, PartialEq)]
pub enum Seg {
    Text {
        text: String,
        quoted: bool,
        /// True for the result of an unquoted `$`-expansion.
        splittable: bool,
    },
    /// Unconditional field boundary (between `"$@"` elements).
    Break,
}

impl Seg {
    pub fn literal(text: impl Into<String>) -> Self {
        Seg::Text { text: text.into(), quoted: false, splittable: false }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Seg::Text { text: text.into(), quoted: true, splittable: false }
    }

    pub fn expansion(text: impl Into<String>) -> Self {
        Seg::Text { text: text.into(), quoted: false, splittable: true }
    }
}

/// A field is a sequence of pieces that concatenate into one argv
/// element.
pub type Field = Vec<Piece>;

pub fn join_field(field: &Field) -> String {
    field.iter().map(|p| p.text.as_str()).collect()
}

/// Split one word's segments into fields. Unquoted expansion text is
/// split on `ifs`; everything else joins adjacent fields. Words that
/// expand to nothing produce no field unless a quoted part anchors one.
pub fn split_fields(segs: &[Seg], ifs: &str) -> Vec<Field> {
    let mut fields: Vec<Field> = Vec::new();
    let mut current: Field = Vec::new();
    let mut has_quoted = false;

    let mut finish = |current: &mut Field, has_quoted: &mut bool, fields: &mut Vec<Field>| {
        let keep = *has_quoted || current.iter().any(|p| !p.text.is_empty());
        if keep {
            fields.push(std::mem::take(current));
        } else {
            current.clear();
        }
        *has_quoted = false;
    };

    for seg in segs {
        match seg {
            Seg::Break => {
                finish(&mut current, &mut has_quoted, &mut fields);
            }
            Seg::Text { text, quoted, splittable } => {
                if !*splittable || ifs.is_empty() {
                    current.push(Piece { text: text.clone(), quoted: *quoted });
                    has_quoted = has_quoted || *quoted;
                    continue;
                }
                let split = split_ifs(text, ifs);
                if split.leading_delim {
                    finish(&mut current, &mut has_quoted, &mut fields);
                }
                for (i, part) in split.parts.iter().enumerate() {
                    if i > 0 {
                        // A delimiter between parts always closes the
                        // field, even an empty one.
                        fields.push(std::mem::take(&mut current));
                        has_quoted = false;
                    }
                    if !part.is_empty() {
                        current.push(Piece { text: part.clone(), quoted: false });
                    }
                }
                if split.trailing_delim {
                    finish(&mut current, &mut has_quoted, &mut fields);
                }
            }
        }
    }
    finish(&mut current, &mut has_quoted, &mut fields);
    fields
}

struct IfsSplit {
    parts: Vec<String>,
    leading_delim: bool,
    trailing_delim: bool,
}

/// POSIX field splitting of a single expansion result. Whitespace IFS
/// characters coalesce; non-whitespace IFS characters each delimit,
/// optionally wrapped in IFS whitespace.
fn split_ifs(text: &str, ifs: &str) -> IfsSplit {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let is_ifs = |c: char| ifs.contains(c);
    let is_ws = |c: char| is_ifs(c) && matches!(c, ' ' | '\t' | '\n');
    let is_nws = |c: char| is_ifs(c) && !matches!(c, ' ' | '\t' | '\n');

    let leading_delim = n > 0 && is_ifs(chars[0]);
    let trailing_delim = n > 0 && is_ifs(chars[n - 1]);

    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut i = 0;
    while i < n && is_ws(chars[i]) {
        i += 1;
    }
    let mut have_field = i < n;
    while i < n {
        let c = chars[i];
        if is_nws(c) {
            parts.push(std::mem::take(&mut cur));
            i += 1;
            while i < n && is_ws(chars[i]) {
                i += 1;
            }
            have_field = i < n;
        } else if is_ws(c) {
            parts.push(std::mem::take(&mut cur));
            while i < n && is_ws(chars[i]) {
                i += 1;
            }
            if i < n && is_nws(chars[i]) {
                // ws + one non-ws + ws is a single delimiter
                i += 1;
                while i < n && is_ws(chars[i]) {
                    i += 1;
                }
            }
            have_field = i < n;
        } else {
            cur.push(c);
            i += 1;
            have_field = true;
        }
    }
    if have_field {
        parts.push(cur);
    }
    IfsSplit { parts, leading_delim, trailing_delim }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IFS: &str = " \t\n";

    fn texts(fields: Vec<Field>) -> Vec<String> {
        fields.iter().map(join_field).collect()
    }

    #[test]
    fn plain_expansion_splits() {
        let segs = [Seg::expansion("a b  c")];
        assert_eq!(texts(split_fields(&segs, IFS)), ["a", "b", "c"]);
    }

    #[test]
    fn literal_never_splits() {
        let segs = [Seg::literal("a b")];
        assert_eq!(texts(split_fields(&segs, IFS)), ["a b"]);
    }

    #[test]
    fn quoted_joins_with_split_neighbor() {
        // $a"$b" with a="1 2", b="3 4" -> ["1", "23 4"]
        let segs = [Seg::expansion("1 2"), Seg::quoted("3 4")];
        assert_eq!(texts(split_fields(&segs, IFS)), ["1", "23 4"]);
    }

    #[test]
    fn empty_expansion_vanishes() {
        let segs = [Seg::expansion("")];
        assert!(split_fields(&segs, IFS).is_empty());
    }

    #[test]
    fn quoted_empty_survives() {
        let segs = [Seg::quoted("")];
        assert_eq!(texts(split_fields(&segs, IFS)), [""]);
    }

    #[test]
    fn trailing_space_starts_new_field() {
        // a="x "; $a"q" -> ["x", "q"]
        let segs = [Seg::expansion("x "), Seg::quoted("q")];
        assert_eq!(texts(split_fields(&segs, IFS)), ["x", "q"]);
    }

    #[test]
    fn leading_space_closes_previous() {
        // "a"$b with b=" x" -> ["a", "x"]
        let segs = [Seg::literal("a"), Seg::expansion(" x")];
        assert_eq!(texts(split_fields(&segs, IFS)), ["a", "x"]);
    }

    #[test]
    fn field_breaks_are_hard() {
        let segs = [Seg::quoted("a b"), Seg::Break, Seg::quoted("c")];
        assert_eq!(texts(split_fields(&segs, IFS)), ["a b", "c"]);
    }

    #[test]
    fn non_whitespace_ifs() {
        let segs = [Seg::expansion("a::b:")];
        assert_eq!(texts(split_fields(&segs, ":")), ["a", "", "b"]);
    }

    #[test]
    fn leading_non_ws_delimiter_makes_empty_field() {
        let segs = [Seg::expansion(":a")];
        assert_eq!(texts(split_fields(&segs, ":")), ["", "a"]);
    }

    #[test]
    fn mixed_ifs_coalesces_whitespace_around_colon() {
        let segs = [Seg::expansion("a : b")];
        assert_eq!(texts(split_fields(&segs, ": ")), ["a", "b"]);
    }

    #[test]
    fn empty_ifs_disables_splitting() {
        let segs = [Seg::expansion("a b")];
        assert_eq!(texts(split_fields(&segs, "")), ["a b"]);
    }

    #[test]
    fn provenance_preserved() {
        let segs = [Seg::quoted("*"), Seg::expansion("x*")];
        let fields = split_fields(&segs, IFS);
        assert_eq!(fields.len(), 1);
        assert!(fields[0][0].quoted);
        assert!(!fields[0][1].quoted);
    }
}
