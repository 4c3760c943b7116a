//! Audit trail.
//!
//! Every jail decision is emitted as a `tracing` event under [`AUDIT_TARGET`]
//! and, if configured, appended as one JSON line to an audit file.
//! Path escapes are logged at `warn` so they stand out from ordinary rejections.

use crate::error::{ErrorKind, InfraError, JailError};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// `tracing` target for audit events.
pub const AUDIT_TARGET: &str = "crush_jail::audit";

/// One auditable decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Request failed validation.
    Rejected {
        workspace_id: String,
        command: String,
        reason: String,
    },
    /// Request tried to leave its workspace.
    PathEscape {
        workspace_id: String,
        command: String,
        path: String,
        reason: String,
    },
    /// Jail could not run anything: host or deployment problem.
    InfraFailure {
        workspace_id: String,
        command: String,
        reason: String,
    },
    /// Child was killed for exceeding a limit.
    Aborted {
        workspace_id: String,
        command: String,
        kind: String,
        reason: String,
    },
    /// Child ran to completion.
    Finished {
        workspace_id: String,
        command: String,
        path: Option<String>,
        success: bool,
        exit_code: Option<i32>,
        duration_ms: u64,
    },
}

impl AuditEvent {
    /// Build the event matching a jail error.
    pub fn from_error(workspace_id: &str, command: &str, path: Option<&str>, err: &JailError) -> Self {
        let workspace_id = workspace_id.to_string();
        let command = command.to_string();
        let reason = err.to_string();
        match err.kind() {
            ErrorKind::Validation => AuditEvent::Rejected {
                workspace_id,
                command,
                reason,
            },
            ErrorKind::PathEscape => AuditEvent::PathEscape {
                workspace_id,
                command,
                path: path.unwrap_or_default().to_string(),
                reason,
            },
            ErrorKind::Infrastructure => AuditEvent::InfraFailure {
                workspace_id,
                command,
                reason,
            },
            kind @ (ErrorKind::Timeout | ErrorKind::OutputLimit) => AuditEvent::Aborted {
                workspace_id,
                command,
                kind: kind.as_str().to_string(),
                reason,
            },
        }
    }

    fn emit(&self) {
        match self {
            AuditEvent::Rejected {
                workspace_id,
                command,
                reason,
            } => tracing::info!(
                target: AUDIT_TARGET,
                workspace_id = ?workspace_id,
                command = ?command,
                reason = %reason,
                "request rejected"
            ),
            AuditEvent::PathEscape {
                workspace_id,
                command,
                path,
                reason,
            } => tracing::warn!(
                target: AUDIT_TARGET,
                workspace_id = ?workspace_id,
                command = ?command,
                path = ?path,
                reason = %reason,
                "path escape blocked"
            ),
            AuditEvent::InfraFailure {
                workspace_id,
                command,
                reason,
            } => tracing::error!(
                target: AUDIT_TARGET,
                workspace_id = ?workspace_id,
                command = ?command,
                reason = %reason,
                "jail infrastructure failure"
            ),
            AuditEvent::Aborted {
                workspace_id,
                command,
                kind,
                reason,
            } => tracing::warn!(
                target: AUDIT_TARGET,
                workspace_id = ?workspace_id,
                command = ?command,
                kind = %kind,
                reason = %reason,
                "tool aborted"
            ),
            AuditEvent::Finished {
                workspace_id,
                command,
                path,
                success,
                exit_code,
                duration_ms,
            } => tracing::info!(
                target: AUDIT_TARGET,
                workspace_id = ?workspace_id,
                command = ?command,
                path = ?path,
                success = success,
                exit_code = ?exit_code,
                duration_ms = duration_ms,
                "tool finished"
            ),
        }
    }
}

#[derive(Serialize)]
struct Record<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// Audit sink shared by clones of a [`Jail`](crate::Jail).
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    file: Option<Arc<Mutex<File>>>,
}

impl AuditLog {
    /// Emit `tracing` events only.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Also append JSON lines to `path`, creating it and its parent directories.
    pub fn open(path: &Path) -> Result<Self, InfraError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| InfraError::Config {
                reason: format!("cannot create audit directory {}: {}", parent.display(), e),
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| InfraError::Config {
                reason: format!("cannot open audit log {}: {}", path.display(), e),
            })?;
        Ok(Self {
            file: Some(Arc::new(Mutex::new(file))),
        })
    }

    /// Record an event. A failed file write is logged, never propagated.
    pub fn record(&self, event: &AuditEvent) {
        event.emit();

        let Some(file) = &self.file else {
            return;
        };

        let record = Record {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode audit record");
                return;
            }
        };

        let mut file = match file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{}", line) {
            tracing::error!(error = %e, "failed to write audit record");
        }
    }
}
