//! Execution results.

use serde::{Deserialize, Serialize};
use std::process::ExitStatus;

/// Outcome of a tool run that actually started.
///
/// `success == false` means the tool ran and reported failure; jail-level
/// failures are [`JailError`](crate::JailError) instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Absent when the child was terminated by a signal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    /// Build from raw captured bytes. Invalid UTF-8 is replaced, not rejected.
    pub fn from_captured(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            success: status.success(),
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
            exit_code: status.code(),
        }
    }
}
