//! Execution engine module.
//!
//! Runs commands against a resolved session, remote (SSH exec channel) or
//! local (child process), with shared environment-merging semantics.

mod engine;
mod env;
mod result;

pub use engine::{ExecOptions, ExecutionEngine};
pub use env::{build_remote_command, escape_value, export_prefix};
pub use result::ExecOutput;
