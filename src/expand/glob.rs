//! Pathname expansion.
//!
//! Each field that still carries live glob characters is matched
//! against the filesystem component by component. Quoted pieces never
//! contribute metacharacters. `dotglob`, `nullglob`, `failglob`, and
//! `nocaseglob` adjust the edges.

use crate::expand::pattern::{self, PatternPiece};
use crate::expand::split::{join_field, Field};
use crate::interp::control::{ExecResult, Interrupt, ShellError};
use crate::shell::Shell;

pub fn glob_field(shell: &Shell, field: &Field) -> ExecResult<Vec<String>> {
    let pieces: Vec<PatternPiece> = field
        .iter()
        .map(|p| PatternPiece { text: p.text.clone(), quoted: p.quoted })
        .collect();

    if shell.state.options.noglob || !pattern::has_glob_chars(&pieces) {
        return Ok(vec![join_field(field)]);
    }

    let mut matches = glob_paths(&pieces, shell);
    if matches.is_empty() {
        if shell.state.shopts.failglob {
            return Err(Interrupt::Error(ShellError::Expansion(format!(
                "no match: {}",
                join_field(field)
            ))));
        }
        if shell.state.shopts.nullglob {
            return Ok(Vec::new());
        }
        return Ok(vec![join_field(field)]);
    }
    matches.sort();
    Ok(matches)
}

/// One path component of the pattern, with provenance.
type Component = Vec<PatternPiece>;

fn glob_paths(pieces: &[PatternPiece], shell: &Shell) -> Vec<String> {
    let (components, absolute, trailing_slash) = split_components(pieces);
    if components.is_empty() {
        return Vec::new();
    }

    let mut candidates: Vec<String> = vec![if absolute { "/".to_string() } else { String::new() }];
    let last = components.len() - 1;
    for (i, component) in components.iter().enumerate() {
        let is_last = i == last;
        let mut next = Vec::new();
        if !pattern::has_glob_chars(component) {
            let literal = pattern::literal_text(component);
            for candidate in &candidates {
                let path = join_path(candidate, &literal);
                if !is_last || path_exists(&path) {
                    next.push(path);
                }
            }
        } else {
            let Ok(re) = pattern::compile_pattern(component, shell.state.shopts.nocaseglob) else {
                return Vec::new();
            };
            let explicit_dot = component_starts_with_dot(component);
            for candidate in &candidates {
                let dir = if candidate.is_empty() { "." } else { candidate.as_str() };
                let Ok(entries) = std::fs::read_dir(dir) else { continue };
                for entry in entries.flatten() {
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else { continue };
                    if name.starts_with('.') && !shell.state.shopts.dotglob && !explicit_dot {
                        continue;
                    }
                    if re.is_match(name) {
                        next.push(join_path(candidate, name));
                    }
                }
            }
        }
        candidates = next;
        if candidates.is_empty() {
            return Vec::new();
        }
    }

    if trailing_slash {
        candidates.retain(|p| std::fs::metadata(p).map(|m| m.is_dir()).unwrap_or(false));
        for c in &mut candidates {
            c.push('/');
        }
    }
    candidates
}

/// Split pattern pieces into `/`-separated components. Slashes keep
/// their meaning regardless of quoting.
fn split_components(pieces: &[PatternPiece]) -> (Vec<Component>, bool, bool) {
    let mut components: Vec<Component> = Vec::new();
    let mut current: Component = Vec::new();
    let mut absolute = false;
    let mut seen_any = false;

    for piece in pieces {
        let mut run = String::new();
        let mut chars = piece.text.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\\' && !piece.quoted {
                // Keep the escape with its char; `\/` is still a slash.
                if let Some(&next) = chars.peek() {
                    if next == '/' {
                        chars.next();
                        // flush and break component below
                        if !run.is_empty() {
                            current.push(PatternPiece { text: std::mem::take(&mut run), quoted: piece.quoted });
                        }
                        close_component(&mut components, &mut current, &mut absolute, &mut seen_any);
                        continue;
                    }
                    run.push('\\');
                    run.push(next);
                    chars.next();
                    continue;
                }
                run.push('\\');
                continue;
            }
            if c == '/' {
                if !run.is_empty() {
                    current.push(PatternPiece { text: std::mem::take(&mut run), quoted: piece.quoted });
                }
                close_component(&mut components, &mut current, &mut absolute, &mut seen_any);
            } else {
                run.push(c);
            }
        }
        if !run.is_empty() {
            current.push(PatternPiece { text: run, quoted: piece.quoted });
            seen_any = true;
        }
    }

    let trailing_slash = seen_any && current.is_empty() && !components.is_empty();
    if !current.is_empty() {
        components.push(std::mem::take(&mut current));
    }
    (components, absolute, trailing_slash)
}

fn close_component(
    components: &mut Vec<Component>,
    current: &mut Component,
    absolute: &mut bool,
    seen_any: &mut bool,
) {
    if current.is_empty() && components.is_empty() {
        // Leading slash.
        if !*seen_any {
            *absolute = true;
        }
        return;
    }
    if !current.is_empty() {
        components.push(std::mem::take(current));
    }
    *seen_any = true;
}

fn component_starts_with_dot(component: &Component) -> bool {
    for piece in component {
        if piece.text.is_empty() {
            continue;
        }
        let first = piece.text.chars().next().unwrap();
        if piece.quoted {
            return first == '.';
        }
        return first == '.' || (first == '\\' && piece.text.chars().nth(1) == Some('.'));
    }
    false
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

fn path_exists(path: &str) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::split::Piece;
    use crate::shell::Shell;

    static CWD_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    struct Fixture {
        _guard: std::sync::MutexGuard<'static, ()>,
        _dir: tempfile::TempDir,
        old_cwd: std::path::PathBuf,
    }

    // The glob walker works relative to the process cwd, so tests set
    // it to a scratch directory for their duration; the lock keeps the
    // cwd stable across the parallel test harness.
    fn fixture(files: &[&str]) -> Fixture {
        let guard = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "").unwrap();
        }
        let old_cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        Fixture { _guard: guard, _dir: dir, old_cwd }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.old_cwd);
        }
    }

    fn field(text: &str) -> Field {
        vec![Piece { text: text.to_string(), quoted: false }]
    }

    #[test]
    fn star_matches_files() {
        let _fx = fixture(&["a.txt", "b.txt", "c.rs"]);
        let shell = Shell::new("test");
        let mut out = glob_field(&shell, &field("*.txt")).unwrap();
        out.sort();
        assert_eq!(out, ["a.txt", "b.txt"]);
    }

    #[test]
    fn no_match_keeps_pattern() {
        let _fx = fixture(&["a.txt"]);
        let shell = Shell::new("test");
        assert_eq!(glob_field(&shell, &field("*.nope")).unwrap(), ["*.nope"]);
    }

    #[test]
    fn nullglob_drops_unmatched() {
        let _fx = fixture(&["a.txt"]);
        let mut shell = Shell::new("test");
        shell.state.shopts.nullglob = true;
        assert!(glob_field(&shell, &field("*.nope")).unwrap().is_empty());
    }

    #[test]
    fn failglob_errors() {
        let _fx = fixture(&["a.txt"]);
        let mut shell = Shell::new("test");
        shell.state.shopts.failglob = true;
        assert!(glob_field(&shell, &field("*.nope")).is_err());
    }

    #[test]
    fn hidden_files_need_dotglob() {
        let _fx = fixture(&[".hidden", "shown"]);
        let mut shell = Shell::new("test");
        let out = glob_field(&shell, &field("*")).unwrap();
        assert_eq!(out, ["shown"]);
        shell.state.shopts.dotglob = true;
        let out = glob_field(&shell, &field("*")).unwrap();
        assert_eq!(out, [".hidden", "shown"]);
    }

    #[test]
    fn explicit_dot_matches_hidden() {
        let _fx = fixture(&[".hidden", "shown"]);
        let shell = Shell::new("test");
        let out = glob_field(&shell, &field(".h*")).unwrap();
        assert_eq!(out, [".hidden"]);
    }

    #[test]
    fn directory_components() {
        let _fx = fixture(&["src/a.rs", "src/b.rs", "doc/a.md"]);
        let shell = Shell::new("test");
        let out = glob_field(&shell, &field("src/*.rs")).unwrap();
        assert_eq!(out, ["src/a.rs", "src/b.rs"]);
        let out = glob_field(&shell, &field("*/a.*")).unwrap();
        assert_eq!(out, ["doc/a.md", "src/a.rs"]);
    }

    #[test]
    fn trailing_slash_requires_dir() {
        let _fx = fixture(&["dir/file", "plain"]);
        let shell = Shell::new("test");
        let out = glob_field(&shell, &field("*/")).unwrap();
        assert_eq!(out, ["dir/"]);
    }

    #[test]
    fn quoted_star_never_globs() {
        let _fx = fixture(&["a.txt"]);
        let shell = Shell::new("test");
        let field = vec![Piece { text: "*".to_string(), quoted: true }];
        assert_eq!(glob_field(&shell, &field).unwrap(), ["*"]);
    }

    #[test]
    fn noglob_disables_everything() {
        let _fx = fixture(&["a.txt"]);
        let mut shell = Shell::new("test");
        shell.state.options.noglob = true;
        assert_eq!(glob_field(&shell, &field("*")).unwrap(), ["*"]);
    }
}
