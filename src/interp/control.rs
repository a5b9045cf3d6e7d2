//! The executor's control-flow channel.
//!
//! `break`, `continue`, `return`, and `exit` travel alongside real
//! errors in [`Interrupt`], but as distinct variants, so nothing that
//! handles a [`ShellError`] can accidentally swallow a loop control.

use thiserror::Error;

/// Anything that stops the ordinary downward walk of the AST.
#[derive(Debug, Clone)]
pub enum Interrupt {
    /// `break n`
    Break(u32),
    /// `continue n`
    Continue(u32),
    /// `return n` — caught by function calls and `.`/`source`.
    Return(i32),
    /// `exit n` — unwinds to the top-level driver.
    Exit(i32),
    /// A real error; aborts the current command only.
    Error(ShellError),
}

impl From<ShellError> for Interrupt {
    fn from(e: ShellError) -> Self {
        Interrupt::Error(e)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ShellError {
    #[error("{0}")]
    Expansion(String),

    #[error("{0}: unbound variable")]
    UnsetVariable(String),

    #[error("{0}")]
    BadSubstitution(String),

    #[error("{0}")]
    Arith(String),

    #[error("{context}: {message}")]
    Redirect { context: String, message: String },

    #[error("{0}: command not found")]
    CommandNotFound(String),

    #[error("{0}: {1}")]
    NotExecutable(String, String),

    #[error("{0}: is a directory")]
    IsDirectory(String),

    #[error("{0}: readonly variable")]
    ReadonlyVariable(String),

    #[error("{0}")]
    System(String),

    #[error("{0}")]
    Custom(String),
}

impl ShellError {
    /// Exit status the failed command reports.
    pub fn status(&self) -> i32 {
        match self {
            ShellError::CommandNotFound(_) => 127,
            ShellError::NotExecutable(..) | ShellError::IsDirectory(_) => 126,
            _ => 1,
        }
    }
}

/// Executor result: exit status or an interrupt.
pub type ExecResult<T = i32> = Result<T, Interrupt>;
