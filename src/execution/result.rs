//! Execution result types.

/// Collected output of one command execution.
///
/// Both streams are returned verbatim, with no trimming. A non-zero exit is
/// never surfaced as an error; `exit_status` lets callers distinguish
/// "command failed" from "command printed to stderr".
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    /// Standard output, accumulated until the channel or process closed.
    pub stdout: String,
    /// Standard error, accumulated independently of stdout.
    pub stderr: String,
    /// Exit status, when the channel or process reported one.
    pub exit_status: Option<u32>,
}

impl ExecOutput {
    /// Whether the command reported a zero exit status.
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}
