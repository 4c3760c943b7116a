//! Error types for crush_jail.
//!
//! Failures are split by who has to act on them:
//! - [`ValidationError`]: the request itself is malformed; the caller can fix it and retry
//! - [`PathEscape`]: the request tried to leave its workspace; a security event
//! - [`InfraError`]: the host is misconfigured (missing tool, unwritable sandbox root)
//! - [`JailError`]: everything above, plus runtime limits hit during execution
//!
//! A command that runs and exits non-zero is *not* an error here. It comes back
//! as an [`ExecutionResult`](crate::ExecutionResult) with `success == false`.

use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a [`JailError`], stable for callers and audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request.
    Validation,
    /// Resolved path left the workspace root.
    PathEscape,
    /// Host or deployment problem.
    Infrastructure,
    /// Child exceeded its wall-clock budget.
    Timeout,
    /// Child produced more output than allowed.
    OutputLimit,
}

impl ErrorKind {
    /// Short machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::PathEscape => "path_escape",
            ErrorKind::Infrastructure => "infrastructure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::OutputLimit => "output_limit",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request rejected before touching the filesystem.
///
/// All messages are safe to echo back to a model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Workspace id is empty or outside `[A-Za-z0-9_-]`
    #[error("invalid workspace id {id:?}: {reason}")]
    InvalidWorkspaceId { id: String, reason: &'static str },

    /// Verb is not in the whitelist
    #[error("command not allowed: {command:?}")]
    CommandNotAllowed { command: String },

    /// `put` without content
    #[error("command {command} requires content")]
    MissingContent { command: &'static str },

    /// Content supplied to a verb that does not take any
    #[error("command {command} does not accept content")]
    UnexpectedContent { command: &'static str },

    /// Verb addresses a single entry but no path was given
    #[error("command {command} requires a path")]
    MissingPath { command: &'static str },

    /// Path is empty or contains a NUL byte
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// Content contains a NUL byte
    #[error("invalid content: {reason}")]
    InvalidContent { reason: &'static str },

    /// Raw request could not be decoded
    #[error("malformed request: {reason}")]
    Malformed { reason: String },
}

/// Resolved path is outside its workspace.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathEscape {
    /// Target resolved outside the workspace root
    #[error("path {path:?} escapes workspace {root} (resolved to {resolved})")]
    OutsideRoot {
        path: String,
        resolved: String,
        root: String,
    },

    /// Too many symlink hops while resolving, confinement cannot be proven
    #[error("path {path:?} could not be resolved: too many symbolic links")]
    SymlinkLoop { path: String },
}

impl PathEscape {
    /// The path as the caller supplied it.
    pub fn requested_path(&self) -> &str {
        match self {
            PathEscape::OutsideRoot { path, .. } => path,
            PathEscape::SymlinkLoop { path } => path,
        }
    }
}

/// The deployment is broken rather than the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InfraError {
    /// Tool executable not found on disk or `PATH`
    #[error("executable not found: {path}")]
    ExecutableNotFound { path: String },

    /// Tool executable path could not be canonicalized
    #[error("failed to resolve executable {path}: {reason}")]
    ExecutableUnresolvable { path: String, reason: String },

    /// Tool executable is not a regular file
    #[error("executable is not a regular file: {path}")]
    ExecutableNotRegularFile { path: String },

    /// Tool executable lacks an execute bit for us
    #[error("executable is not executable: {path}")]
    ExecutableNotExecutable { path: String },

    /// Configured executable is a shell, interpreter, spawner or privilege tool
    #[error("refusing risky executable ({category}): {path}")]
    RiskyExecutable {
        path: String,
        category: RiskCategory,
    },

    /// Workspace root could not be created or inspected
    #[error("workspace {path} unavailable: {reason}")]
    WorkspaceUnavailable { path: String, reason: String },

    /// Process could not be started or its pipes failed
    #[error("failed to spawn process: {reason}")]
    SpawnFailed { reason: String },

    /// Configuration could not be loaded
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

/// Risk category for executables that could run arbitrary code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskCategory {
    /// Shell interpreters (sh, bash, zsh, etc.)
    Shell,
    /// Script interpreters (python, perl, ruby, node, etc.)
    Interpreter,
    /// Process spawners (env, xargs, nohup, etc.)
    Spawner,
    /// Privilege escalation tools (sudo, su, pkexec, etc.)
    Privilege,
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskCategory::Shell => write!(f, "shell"),
            RiskCategory::Interpreter => write!(f, "interpreter"),
            RiskCategory::Spawner => write!(f, "spawner"),
            RiskCategory::Privilege => write!(f, "privilege"),
        }
    }
}

/// Which captured stream hit its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Combined error type for the validate-resolve-execute flow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JailError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    PathEscape(#[from] PathEscape),

    #[error(transparent)]
    Infrastructure(#[from] InfraError),

    /// Process exceeded timeout and was killed
    #[error("process timed out after {elapsed:?} (limit: {limit:?})")]
    Timeout { limit: Duration, elapsed: Duration },

    /// Process exceeded an output limit and was killed
    #[error("{stream} limit exceeded: {limit} bytes")]
    OutputLimitExceeded { stream: Stream, limit: usize },
}

impl JailError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            JailError::Validation(_) => ErrorKind::Validation,
            JailError::PathEscape(_) => ErrorKind::PathEscape,
            JailError::Infrastructure(_) => ErrorKind::Infrastructure,
            JailError::Timeout { .. } => ErrorKind::Timeout,
            JailError::OutputLimitExceeded { .. } => ErrorKind::OutputLimit,
        }
    }

    /// Whether the caller can fix the request and try again.
    ///
    /// Only malformed requests qualify. Escapes are not retried, and the rest
    /// point at the host.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Error body returned to agents and printed by the CLI:
    /// `{success: false, error_kind, message, retryable}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error_kind": self.kind().as_str(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let v: JailError = ValidationError::CommandNotAllowed {
            command: "rm".into(),
        }
        .into();
        assert_eq!(v.kind(), ErrorKind::Validation);
        assert!(v.is_retryable());

        let e: JailError = PathEscape::SymlinkLoop { path: "a".into() }.into();
        assert_eq!(e.kind(), ErrorKind::PathEscape);
        assert!(!e.is_retryable());

        let i: JailError = InfraError::ExecutableNotFound {
            path: "/opt/crush".into(),
        }
        .into();
        assert_eq!(i.kind(), ErrorKind::Infrastructure);
        assert!(!i.is_retryable());

        let t = JailError::Timeout {
            limit: Duration::from_secs(1),
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(t.kind().as_str(), "timeout");
    }

    #[test]
    fn test_transparent_messages() {
        let err: JailError = ValidationError::MissingContent { command: "put" }.into();
        assert_eq!(err.to_string(), "command put requires content");

        let err = JailError::OutputLimitExceeded {
            stream: Stream::Stderr,
            limit: 16,
        };
        assert_eq!(err.to_string(), "stderr limit exceeded: 16 bytes");
    }

    #[test]
    fn test_error_body() {
        let err: JailError = PathEscape::OutsideRoot {
            path: "../x".into(),
            resolved: "/ws/x".into(),
            root: "/ws/p".into(),
        }
        .into();
        let body = err.to_json();
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "path_escape");
        assert_eq!(body["retryable"], false);
        assert_eq!(body["message"], err.to_string());

        let err: JailError = ValidationError::MissingPath { command: "cat" }.into();
        assert_eq!(err.to_json()["retryable"], true);
    }
}
