//! Tilde expansion.

use crate::interp::state::ShellState;

/// Expand `~` / `~user`. Unknown users keep the literal text, matching
/// bash. The result is never subject to splitting or globbing.
pub fn tilde_expand(state: &ShellState, user: Option<&str>) -> String {
    match user {
        None => state
            .get_str("HOME")
            .unwrap_or_else(|| home_of_uid().unwrap_or_else(|| "~".to_string())),
        Some(name) => match home_of_user(name) {
            Some(dir) => dir,
            None => format!("~{name}"),
        },
    }
}

fn home_of_user(name: &str) -> Option<String> {
    nix::unistd::User::from_name(name)
        .ok()
        .flatten()
        .map(|u| u.dir.to_string_lossy().into_owned())
}

fn home_of_uid() -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|u| u.dir.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_from_state() {
        let mut state = ShellState::from_env("test");
        state.set_scalar("HOME", "/custom/home").unwrap();
        assert_eq!(tilde_expand(&state, None), "/custom/home");
    }

    #[test]
    fn unknown_user_stays_literal() {
        let state = ShellState::from_env("test");
        assert_eq!(
            tilde_expand(&state, Some("no-such-user-xyzzy")),
            "~no-such-user-xyzzy"
        );
    }

    #[test]
    fn root_user_resolves() {
        let state = ShellState::from_env("test");
        let home = tilde_expand(&state, Some("root"));
        assert!(home.starts_with('/'), "got {home}");
    }
}
