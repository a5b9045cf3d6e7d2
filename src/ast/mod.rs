//! Abstract syntax tree for shell programs.

pub mod types;

pub use types::*;
