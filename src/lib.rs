//! # crush_jail
//!
//! Workspace-confined command execution for LLM agent file tools.
//!
//! An agent proposes a filesystem action (`ls`, `get`, `put`, `del`, `info`,
//! `glob`, `cat`) against a project workspace. `crush_jail` checks it against a
//! closed verb whitelist, proves the target path stays inside the workspace
//! directory (symlinks included), and runs the file tool as a child process
//! with a literal argument vector, an explicit environment and a timeout.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crush_jail::{Jail, RawCommandRequest};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let jail = Jail::builder()
//!     .workspaces_dir("/workspaces")
//!     .executable("/usr/local/bin/crush")
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! let request = RawCommandRequest::new("proj-1", "put")
//!     .with_path("notes/a.txt")
//!     .with_content("hello");
//!
//! let result = jail.run(request).await?;
//! println!("success={} stderr={}", result.success, result.stderr);
//! # Ok(())
//! # }
//! ```
//!
//! ## Flow
//!
//! `RawCommandRequest` → [`CommandRequest::validate`] → [`Jail::resolve`] →
//! [`ResolvedExecution::execute`]. Each stage can only be entered with the
//! output of the previous one.
//!
//! ## Guarantees
//!
//! - **No shell**: the tool is spawned with an argv; content is one argument, verbatim
//! - **Closed whitelist**: verbs are an enum, nothing extends it at runtime
//! - **Confinement**: targets resolve inside `<workspaces_dir>/<workspace_id>` or are refused
//! - **Explicit environment**: the child gets only what the [`EnvPolicy`] builds
//! - **Bounded**: timeouts and output caps kill the child
//! - **Classified failures**: see [`ErrorKind`]
//!
//! ## Platform Support
//!
//! Unix only.

#[cfg(windows)]
compile_error!(
    "crush_jail does not support Windows: CreateProcess passes arguments as a \
     single string that the child re-parses, so argv integrity cannot be guaranteed."
);

mod audit;
mod canonical;
mod config;
mod env_policy;
mod error;
mod file_check;
mod jail;
mod output;
mod request;
mod resolved;
mod risky;
mod tool;
mod verb;

pub use audit::{AuditEvent, AuditLog, AUDIT_TARGET};
pub use config::{EnvConfig, EnvMode, JailConfig};
pub use env_policy::{EnvPolicy, ALWAYS_STRIP};
pub use error::{
    ErrorKind, InfraError, JailError, PathEscape, RiskCategory, Stream, ValidationError,
};
pub use jail::{Jail, JailBuilder, DEFAULT_EXECUTABLE, DEFAULT_WORKSPACES_DIR};
pub use output::ExecutionResult;
pub use request::{CommandRequest, RawCommandRequest, WorkspaceId};
pub use resolved::{ResolvedExecution, ResourceLimits};
pub use risky::RiskyExecutablePolicy;
pub use tool::FilesystemTool;
pub use verb::Verb;
