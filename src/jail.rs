//! The command jail.
//!
//! `Jail` is the entry point: it turns a validated [`CommandRequest`] into a
//! [`ResolvedExecution`] confined to one workspace directory, and drives the
//! whole validate-resolve-execute flow with auditing via [`Jail::run`].

use crate::audit::{AuditEvent, AuditLog};
use crate::canonical::{is_within, locate_executable, relative_arg, resolve_lenient, ResolveError};
use crate::env_policy::EnvPolicy;
use crate::error::{InfraError, JailError, PathEscape, ValidationError};
use crate::file_check::check_executable;
use crate::output::ExecutionResult;
use crate::request::{CommandRequest, RawCommandRequest, WorkspaceId};
use crate::resolved::{ResolvedExecution, ResourceLimits};
use crate::risky::{check_risky, RiskyExecutablePolicy};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Default sandbox root.
pub const DEFAULT_WORKSPACES_DIR: &str = "/workspaces";

/// Default tool executable, looked up on `PATH`.
pub const DEFAULT_EXECUTABLE: &str = "crush";

/// Workspace-confined executor for the file tool.
///
/// Holds configuration only; cloning is cheap and clones share the audit sink.
/// Create using `Jail::builder()`.
#[derive(Debug, Clone)]
pub struct Jail {
    base_dir: PathBuf,
    executable: PathBuf,
    search_path: Option<OsString>,
    env_policy: EnvPolicy,
    risky_policy: RiskyExecutablePolicy,
    limits: ResourceLimits,
    audit: AuditLog,
}

impl Jail {
    /// Create a new jail builder.
    pub fn builder() -> JailBuilder {
        JailBuilder::new()
    }

    /// Sandbox root under which workspaces are created.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    /// Validate a raw request.
    pub fn validate(&self, raw: RawCommandRequest) -> Result<CommandRequest, ValidationError> {
        CommandRequest::validate(raw)
    }

    /// Create (if needed) and canonicalize the root directory of a workspace.
    ///
    /// Creation is `mkdir -p`: repeating it, or racing another caller, is fine.
    pub fn workspace_root(&self, workspace_id: &WorkspaceId) -> Result<PathBuf, InfraError> {
        let root = self.base_dir.join(workspace_id.as_str());

        std::fs::create_dir_all(&root).map_err(|e| InfraError::WorkspaceUnavailable {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

        let canonical_base =
            std::fs::canonicalize(&self.base_dir).map_err(|e| InfraError::WorkspaceUnavailable {
                path: self.base_dir.display().to_string(),
                reason: e.to_string(),
            })?;
        let canonical_root =
            std::fs::canonicalize(&root).map_err(|e| InfraError::WorkspaceUnavailable {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;

        // base/<id> must not be a planted symlink to somewhere else
        if canonical_root.parent() != Some(canonical_base.as_path()) {
            return Err(InfraError::WorkspaceUnavailable {
                path: root.display().to_string(),
                reason: format!("resolves outside sandbox root ({})", canonical_root.display()),
            });
        }

        Ok(canonical_root)
    }

    /// Resolve a validated request into a confined execution.
    ///
    /// Does blocking filesystem I/O (directory creation, `lstat` per path
    /// component); async callers should go through [`Jail::run`].
    ///
    /// # Errors
    ///
    /// - `PathEscape` if the target resolves outside the workspace root
    /// - `InfraError` if the workspace or the executable is unusable
    pub fn resolve(&self, request: &CommandRequest) -> Result<ResolvedExecution, JailError> {
        let workspace_root = self.workspace_root(request.workspace_id())?;

        let target = match request.path() {
            Some(path) => Some(confine(&workspace_root, path)?),
            None => None,
        };

        let program = locate_executable(&self.executable, self.search_path.as_deref())?;
        check_executable(&program)?;
        check_risky(&program, self.risky_policy)?;

        let verb = request.verb();
        let mut args = vec![verb.as_str().to_string()];
        if let Some(target) = &target {
            let rel = relative_arg(target, &workspace_root).ok_or_else(|| PathEscape::OutsideRoot {
                path: request.path().unwrap_or_default().to_string(),
                resolved: target.display().to_string(),
                root: workspace_root.display().to_string(),
            })?;
            args.push(rel);
        }
        if let Some(content) = request.content() {
            args.push(content.to_string());
        }

        Ok(ResolvedExecution {
            program,
            verb,
            args,
            workspace_root,
            target,
            env: self.env_policy.build(),
            limits: self.limits,
        })
    }

    /// Validate, resolve and execute one raw request, auditing the outcome.
    ///
    /// Resolution runs on tokio's blocking pool so it never stalls the
    /// caller's executor.
    pub async fn run(&self, raw: RawCommandRequest) -> Result<ExecutionResult, JailError> {
        let start = Instant::now();
        let workspace_id = raw.workspace_id.clone();
        let command = raw.command.clone();
        let path = raw.path.clone();

        let outcome = self.run_unaudited(raw).await;

        let event = match &outcome {
            Ok(result) => AuditEvent::Finished {
                workspace_id,
                command,
                path,
                success: result.success,
                exit_code: result.exit_code,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(err) => AuditEvent::from_error(&workspace_id, &command, path.as_deref(), err),
        };
        self.audit.record(&event);

        outcome
    }

    async fn run_unaudited(&self, raw: RawCommandRequest) -> Result<ExecutionResult, JailError> {
        let request = CommandRequest::validate(raw)?;

        let jail = self.clone();
        let resolved = tokio::task::spawn_blocking(move || jail.resolve(&request))
            .await
            .map_err(|e| InfraError::SpawnFailed {
                reason: format!("resolver task failed: {}", e),
            })??;

        resolved.execute().await
    }
}

/// Resolve `path` under `root` and prove it stays there.
fn confine(root: &Path, path: &str) -> Result<PathBuf, JailError> {
    let candidate = root.join(path);
    let resolved = resolve_lenient(&candidate).map_err(|e| match e {
        ResolveError::TooManyLinks => JailError::from(PathEscape::SymlinkLoop {
            path: path.to_string(),
        }),
        ResolveError::Io(e) if e.raw_os_error() == Some(libc::ENAMETOOLONG) => {
            ValidationError::InvalidPath {
                path: path.to_string(),
                reason: "name too long",
            }
            .into()
        }
        ResolveError::Io(e) => InfraError::WorkspaceUnavailable {
            path: root.display().to_string(),
            reason: e.to_string(),
        }
        .into(),
    })?;

    if !is_within(&resolved, root) {
        return Err(PathEscape::OutsideRoot {
            path: path.to_string(),
            resolved: resolved.display().to_string(),
            root: root.display().to_string(),
        }
        .into());
    }

    Ok(resolved)
}

/// Builder for `Jail`.
#[derive(Debug, Clone)]
pub struct JailBuilder {
    base_dir: PathBuf,
    executable: PathBuf,
    search_path: Option<OsString>,
    env_policy: EnvPolicy,
    risky_policy: RiskyExecutablePolicy,
    limits: ResourceLimits,
    audit: AuditLog,
}

impl JailBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_WORKSPACES_DIR),
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            search_path: None,
            env_policy: EnvPolicy::default(),
            risky_policy: RiskyExecutablePolicy::default(),
            limits: ResourceLimits::default(),
            audit: AuditLog::disabled(),
        }
    }

    /// Set the sandbox root. Must be absolute.
    pub fn workspaces_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_dir = path.into();
        self
    }

    /// Set the tool executable: an absolute path or a bare name.
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = path.into();
        self
    }

    /// Directories searched for a bare executable name.
    ///
    /// Defaults to the jail process's `PATH` at build time.
    pub fn search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// Set the child environment policy.
    pub fn env_policy(mut self, policy: EnvPolicy) -> Self {
        self.env_policy = policy;
        self
    }

    /// Set the policy for shells and interpreters configured as the tool.
    pub fn risky_executable_policy(mut self, policy: RiskyExecutablePolicy) -> Self {
        self.risky_policy = policy;
        self
    }

    /// Set the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.limits.timeout = timeout;
        self
    }

    /// Set maximum stdout bytes.
    pub fn max_stdout(mut self, max: usize) -> Self {
        self.limits.max_stdout = max;
        self
    }

    /// Set maximum stderr bytes.
    pub fn max_stderr(mut self, max: usize) -> Self {
        self.limits.max_stderr = max;
        self
    }

    /// Set resource limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the audit sink.
    pub fn audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    /// Build the jail.
    ///
    /// Neither the sandbox root nor the executable is touched here; both are
    /// checked on every resolution so a broken host shows up as an
    /// infrastructure error on the request that hits it.
    ///
    /// # Errors
    ///
    /// Returns `InfraError::Config` if the sandbox root is relative or the
    /// timeout is zero.
    pub fn build(self) -> Result<Jail, InfraError> {
        if !self.base_dir.is_absolute() {
            return Err(InfraError::Config {
                reason: format!(
                    "workspaces dir must be absolute: {}",
                    self.base_dir.display()
                ),
            });
        }
        if self.limits.timeout.is_zero() {
            return Err(InfraError::Config {
                reason: "timeout must be greater than zero".to_string(),
            });
        }

        Ok(Jail {
            base_dir: self.base_dir,
            executable: self.executable,
            search_path: self.search_path.or_else(|| std::env::var_os("PATH")),
            env_policy: self.env_policy,
            risky_policy: self.risky_policy,
            limits: self.limits,
            audit: self.audit,
        })
    }
}

impl Default for JailBuilder {
    fn default() -> Self {
        Self::new()
    }
}
