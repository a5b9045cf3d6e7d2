//! File-descriptor plumbing.

pub mod redirect;
