//! Shared helpers for binaries and long-running loops.

pub mod bootstrap;
pub mod retry;
