//! Shell state: variables, functions, aliases, options, positional
//! parameters, and the special parameters the shell maintains itself.
//!
//! Variables live in a stack of scopes. The global scope is always
//! index 0; each function call pushes a scope that holds its `local`
//! declarations. Lookup walks top-down; plain assignment writes to the
//! scope that already holds the variable, else the global scope, which
//! gives bash's dynamic scoping.

use std::collections::HashMap;

use crate::ast::FunctionDef;
use crate::interp::control::ShellError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(String),
    /// Indexed array; holes stay `None` so indices are stable.
    Array(Vec<Option<String>>),
}

impl Value {
    pub fn scalar(s: impl Into<String>) -> Self {
        Value::Scalar(s.into())
    }

    /// The value used where a string is expected: the scalar itself, or
    /// element zero of an array.
    pub fn as_str(&self) -> &str {
        match self {
            Value::Scalar(s) => s,
            Value::Array(items) => items
                .first()
                .and_then(|v| v.as_deref())
                .unwrap_or(""),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub value: Value,
    pub exported: bool,
    pub readonly: bool,
}

impl Variable {
    fn new(value: Value) -> Self {
        Variable { value, exported: false, readonly: false }
    }
}

/// A scope entry: a value, or a `local` declaration with no value yet.
/// The latter still shadows outer bindings.
#[derive(Debug, Clone)]
enum Slot {
    Set(Variable),
    DeclaredUnset { exported: bool },
}

#[derive(Debug, Clone, Default)]
struct Scope {
    vars: HashMap<String, Slot>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// set -e
    pub errexit: bool,
    /// set -u
    pub nounset: bool,
    /// set -o pipefail
    pub pipefail: bool,
    /// set -x
    pub xtrace: bool,
    /// set -f
    pub noglob: bool,
    /// set -C
    pub noclobber: bool,
    /// set -n
    pub noexec: bool,
    /// set -m: job control
    pub monitor: bool,
    /// set -o vi / emacs — settable, nothing in the core reads them
    pub vi: bool,
    pub emacs: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShOpts {
    pub dotglob: bool,
    pub nullglob: bool,
    pub failglob: bool,
    pub nocaseglob: bool,
    pub nocasematch: bool,
}

pub struct ShellState {
    scopes: Vec<Scope>,
    pub functions: HashMap<String, FunctionDef>,
    pub aliases: HashMap<String, String>,
    pub options: Options,
    pub shopts: ShOpts,

    /// `$0`.
    pub arg0: String,
    positional: Vec<String>,
    positional_stack: Vec<Vec<String>>,

    /// `$?`
    pub last_status: i32,
    /// `$!`
    pub last_bg_pid: Option<i32>,
    /// `$$` — never changes in subshells.
    pub shell_pid: i32,
    /// `$LINENO`
    pub lineno: u32,
    /// `FUNCNAME` stack, innermost last.
    pub funcname: Vec<String>,
    pub interactive: bool,
}

impl ShellState {
    /// Build the initial state from the process environment; inherited
    /// variables are marked exported, as they came from an exporter.
    pub fn from_env(arg0: &str) -> Self {
        let mut global = Scope::default();
        for (name, value) in std::env::vars() {
            global.vars.insert(
                name,
                Slot::Set(Variable {
                    value: Value::Scalar(value),
                    exported: true,
                    readonly: false,
                }),
            );
        }
        ShellState {
            scopes: vec![global],
            functions: HashMap::new(),
            aliases: HashMap::new(),
            options: Options::default(),
            shopts: ShOpts::default(),
            arg0: arg0.to_string(),
            positional: Vec::new(),
            positional_stack: Vec::new(),
            last_status: 0,
            last_bg_pid: None,
            shell_pid: std::process::id() as i32,
            lineno: 0,
            funcname: Vec::new(),
            interactive: false,
        }
    }

    // ---- lookup ----

    pub fn get(&self, name: &str) -> Option<&Variable> {
        for scope in self.scopes.iter().rev() {
            match scope.vars.get(name) {
                Some(Slot::Set(var)) => return Some(var),
                Some(Slot::DeclaredUnset { .. }) => return None,
                None => {}
            }
        }
        None
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| v.value.as_str().to_string())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// `$IFS`, defaulting to space-tab-newline when unset.
    pub fn ifs(&self) -> String {
        self.get_str("IFS").unwrap_or_else(|| " \t\n".to_string())
    }

    // ---- assignment ----

    fn check_readonly(&self, name: &str) -> Result<(), ShellError> {
        if self.get(name).map(|v| v.readonly).unwrap_or(false) {
            return Err(ShellError::ReadonlyVariable(name.to_string()));
        }
        Ok(())
    }

    /// Index of the scope a plain assignment writes to: the innermost
    /// scope that declares the name, else the global scope.
    fn target_scope(&self, name: &str) -> usize {
        for (i, scope) in self.scopes.iter().enumerate().rev() {
            if scope.vars.contains_key(name) {
                return i;
            }
        }
        0
    }

    pub fn set_scalar(&mut self, name: &str, value: impl Into<String>) -> Result<(), ShellError> {
        self.check_readonly(name)?;
        let idx = self.target_scope(name);
        let slot = self.scopes[idx].vars.entry(name.to_string()).or_insert_with(|| {
            Slot::Set(Variable::new(Value::Scalar(String::new())))
        });
        let value = Value::Scalar(value.into());
        match slot {
            Slot::Set(var) => var.value = value,
            Slot::DeclaredUnset { exported } => {
                let mut var = Variable::new(value);
                var.exported = *exported;
                *slot = Slot::Set(var);
            }
        }
        Ok(())
    }

    pub fn set_array(&mut self, name: &str, items: Vec<Option<String>>) -> Result<(), ShellError> {
        self.check_readonly(name)?;
        let idx = self.target_scope(name);
        self.scopes[idx]
            .vars
            .insert(name.to_string(), Slot::Set(Variable::new(Value::Array(items))));
        Ok(())
    }

    pub fn set_element(&mut self, name: &str, index: usize, value: String) -> Result<(), ShellError> {
        self.check_readonly(name)?;
        let idx = self.target_scope(name);
        let slot = self.scopes[idx]
            .vars
            .entry(name.to_string())
            .or_insert_with(|| Slot::Set(Variable::new(Value::Array(Vec::new()))));
        let var = match slot {
            Slot::Set(var) => var,
            Slot::DeclaredUnset { exported } => {
                let mut v = Variable::new(Value::Array(Vec::new()));
                v.exported = *exported;
                *slot = Slot::Set(v);
                match slot {
                    Slot::Set(var) => var,
                    _ => unreachable!(),
                }
            }
        };
        // Converting a scalar: the old value becomes element zero.
        if let Value::Scalar(s) = &var.value {
            let old = s.clone();
            var.value = Value::Array(if old.is_empty() && index != 0 {
                Vec::new()
            } else {
                vec![Some(old)]
            });
        }
        if let Value::Array(items) = &mut var.value {
            if items.len() <= index {
                items.resize(index + 1, None);
            }
            items[index] = Some(value);
        }
        Ok(())
    }

    pub fn append_scalar(&mut self, name: &str, suffix: &str) -> Result<(), ShellError> {
        let current = self.get_str(name).unwrap_or_default();
        self.set_scalar(name, format!("{current}{suffix}"))
    }

    /// Declare a name in the current (function) scope.
    pub fn set_local(&mut self, name: &str, value: Option<Value>) {
        let scope = self.scopes.last_mut().expect("scope stack never empty");
        match value {
            Some(value) => {
                scope.vars.insert(name.to_string(), Slot::Set(Variable::new(value)));
            }
            None => {
                scope
                    .vars
                    .entry(name.to_string())
                    .or_insert(Slot::DeclaredUnset { exported: false });
            }
        }
    }

    pub fn unset(&mut self, name: &str) -> Result<(), ShellError> {
        self.check_readonly(name)?;
        for scope in self.scopes.iter_mut().rev() {
            if scope.vars.remove(name).is_some() {
                return Ok(());
            }
        }
        Ok(())
    }

    pub fn export(&mut self, name: &str) {
        let idx = self.target_scope(name);
        let slot = self.scopes[idx]
            .vars
            .entry(name.to_string())
            .or_insert(Slot::DeclaredUnset { exported: false });
        match slot {
            Slot::Set(var) => var.exported = true,
            Slot::DeclaredUnset { exported } => *exported = true,
        }
    }

    pub fn mark_readonly(&mut self, name: &str) {
        let idx = self.target_scope(name);
        let slot = self.scopes[idx]
            .vars
            .entry(name.to_string())
            .or_insert(Slot::DeclaredUnset { exported: false });
        if let Slot::Set(var) = slot {
            var.readonly = true;
        }
    }

    // ---- scopes ----

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn in_function(&self) -> bool {
        !self.funcname.is_empty()
    }

    // ---- positional parameters ----

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn set_positional(&mut self, args: Vec<String>) {
        self.positional = args;
    }

    pub fn push_positional(&mut self, args: Vec<String>) {
        self.positional_stack.push(std::mem::replace(&mut self.positional, args));
    }

    pub fn pop_positional(&mut self) {
        if let Some(saved) = self.positional_stack.pop() {
            self.positional = saved;
        }
    }

    pub fn shift_positional(&mut self, n: usize) -> bool {
        if n > self.positional.len() {
            return false;
        }
        self.positional.drain(..n);
        true
    }

    // ---- environment for children ----

    /// Snapshot of exported variables, innermost binding winning.
    pub fn exported_env(&self) -> Vec<(String, String)> {
        let mut seen = HashMap::new();
        for scope in self.scopes.iter().rev() {
            for (name, slot) in &scope.vars {
                if seen.contains_key(name) {
                    continue;
                }
                match slot {
                    Slot::Set(var) => {
                        seen.insert(name.clone(), if var.exported {
                            Some(var.value.as_str().to_string())
                        } else {
                            None
                        });
                    }
                    Slot::DeclaredUnset { .. } => {
                        seen.insert(name.clone(), None);
                    }
                }
            }
        }
        seen.into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect()
    }

    /// All set variable names, for `${!prefix@}`-free introspection and
    /// the `set` builtin's listing.
    pub fn all_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for scope in self.scopes.iter().rev() {
            for (name, slot) in &scope.vars {
                if matches!(slot, Slot::Set(_)) && !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ShellState {
        let mut s = ShellState::from_env("test");
        // Isolate from the test process environment.
        s.scopes = vec![Scope::default()];
        s
    }

    #[test]
    fn scalar_roundtrip() {
        let mut s = state();
        s.set_scalar("x", "1").unwrap();
        assert_eq!(s.get_str("x").unwrap(), "1");
    }

    #[test]
    fn local_shadows_and_restores() {
        let mut s = state();
        s.set_scalar("y", "outer").unwrap();
        s.push_scope();
        s.set_local("y", Some(Value::scalar("inner")));
        assert_eq!(s.get_str("y").unwrap(), "inner");
        s.pop_scope();
        assert_eq!(s.get_str("y").unwrap(), "outer");
    }

    #[test]
    fn declared_unset_local_shadows() {
        let mut s = state();
        s.set_scalar("y", "outer").unwrap();
        s.push_scope();
        s.set_local("y", None);
        assert!(!s.is_set("y"));
        s.pop_scope();
        assert_eq!(s.get_str("y").unwrap(), "outer");
    }

    #[test]
    fn assignment_in_function_writes_outer() {
        let mut s = state();
        s.set_scalar("g", "old").unwrap();
        s.push_scope();
        s.set_scalar("g", "new").unwrap();
        s.pop_scope();
        assert_eq!(s.get_str("g").unwrap(), "new");
    }

    #[test]
    fn assignment_without_declaration_goes_global() {
        let mut s = state();
        s.push_scope();
        s.set_scalar("fresh", "v").unwrap();
        s.pop_scope();
        assert_eq!(s.get_str("fresh").unwrap(), "v");
    }

    #[test]
    fn local_assignment_stays_local() {
        let mut s = state();
        s.push_scope();
        s.set_local("only_here", Some(Value::scalar("v")));
        s.pop_scope();
        assert!(!s.is_set("only_here"));
    }

    #[test]
    fn readonly_rejected() {
        let mut s = state();
        s.set_scalar("r", "1").unwrap();
        s.mark_readonly("r");
        assert!(matches!(
            s.set_scalar("r", "2"),
            Err(ShellError::ReadonlyVariable(_))
        ));
    }

    #[test]
    fn array_elements() {
        let mut s = state();
        s.set_element("a", 2, "two".into()).unwrap();
        s.set_element("a", 0, "zero".into()).unwrap();
        match &s.get("a").unwrap().value {
            Value::Array(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0].as_deref(), Some("zero"));
                assert_eq!(items[1], None);
                assert_eq!(items[2].as_deref(), Some("two"));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn scalar_promotes_to_array() {
        let mut s = state();
        s.set_scalar("a", "first").unwrap();
        s.set_element("a", 1, "second".into()).unwrap();
        match &s.get("a").unwrap().value {
            Value::Array(items) => {
                assert_eq!(items[0].as_deref(), Some("first"));
                assert_eq!(items[1].as_deref(), Some("second"));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn exported_env_respects_shadowing() {
        let mut s = state();
        s.set_scalar("E", "global").unwrap();
        s.export("E");
        s.push_scope();
        s.set_local("E", Some(Value::scalar("local")));
        // The local is not exported, so the child sees nothing for E.
        let env = s.exported_env();
        assert!(!env.iter().any(|(n, _)| n == "E"));
        s.pop_scope();
        let env = s.exported_env();
        assert!(env.iter().any(|(n, v)| n == "E" && v == "global"));
    }

    #[test]
    fn positional_stack() {
        let mut s = state();
        s.set_positional(vec!["a".into(), "b".into()]);
        s.push_positional(vec!["f1".into()]);
        assert_eq!(s.positional(), ["f1"]);
        s.pop_positional();
        assert_eq!(s.positional(), ["a", "b"]);
    }

    #[test]
    fn shift() {
        let mut s = state();
        s.set_positional(vec!["a".into(), "b".into(), "c".into()]);
        assert!(s.shift_positional(2));
        assert_eq!(s.positional(), ["c"]);
        assert!(!s.shift_positional(5));
    }
}
