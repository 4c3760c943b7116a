//! Resolved executions ready to run.
//!
//! A `ResolvedExecution` can only be produced by
//! [`Jail::resolve`](crate::Jail::resolve), so every child process the crate
//! starts has passed validation and confinement first.

use crate::error::{InfraError, JailError, Stream};
use crate::output::ExecutionResult;
use crate::verb::Verb;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

/// Bounds on one tool run. Crossing any of them kills the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Wall-clock budget from spawn to exit (30s).
    pub timeout: Duration,
    /// Stdout bytes kept before the run is aborted (10 MiB).
    pub max_stdout: usize,
    /// Stderr bytes kept before the run is aborted (1 MiB).
    pub max_stderr: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_stdout: 10 * 1024 * 1024,
            max_stderr: 1024 * 1024,
        }
    }
}

impl ResourceLimits {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_stdout(mut self, bytes: usize) -> Self {
        self.max_stdout = bytes;
        self
    }

    pub fn with_max_stderr(mut self, bytes: usize) -> Self {
        self.max_stderr = bytes;
        self
    }

    fn cap(&self, stream: Stream) -> usize {
        match stream {
            Stream::Stdout => self.max_stdout,
            Stream::Stderr => self.max_stderr,
        }
    }
}

/// A confined, fully resolved tool invocation.
#[derive(Debug, Clone)]
pub struct ResolvedExecution {
    pub(crate) program: PathBuf,
    pub(crate) verb: Verb,
    pub(crate) args: Vec<String>,
    pub(crate) workspace_root: PathBuf,
    pub(crate) target: Option<PathBuf>,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) limits: ResourceLimits,
}

impl ResolvedExecution {
    /// Run the tool.
    ///
    /// A non-zero exit is `Ok` with `success == false`.
    ///
    /// # Errors
    ///
    /// - `InfraError::ExecutableNotFound` / `SpawnFailed` if the child could not start
    /// - `JailError::Timeout` if the child outlived the timeout
    /// - `JailError::OutputLimitExceeded` if a stream exceeded its cap
    pub async fn execute(self) -> Result<ExecutionResult, JailError> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.workspace_root)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => InfraError::ExecutableNotFound {
                path: self.program.display().to_string(),
            },
            _ => InfraError::SpawnFailed {
                reason: e.to_string(),
            },
        })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill().await;
            return Err(InfraError::SpawnFailed {
                reason: "child pipes unavailable".to_string(),
            }
            .into());
        };

        let limits = self.limits;

        let run = async {
            // First cap error drops the other reader; the child is killed below
            let (out, err) = tokio::try_join!(
                read_capped(stdout, limits.cap(Stream::Stdout), Stream::Stdout),
                read_capped(stderr, limits.cap(Stream::Stderr), Stream::Stderr),
            )?;
            let status = child.wait().await.map_err(|e| InfraError::SpawnFailed {
                reason: format!("wait error: {}", e),
            })?;
            Ok::<_, JailError>(ExecutionResult::from_captured(status, &out, &err))
        };

        let outcome = timeout(limits.timeout, run).await;

        match outcome {
            Ok(Ok(result)) => {
                tracing::debug!(
                    program = %self.program.display(),
                    verb = %self.verb,
                    exit_code = ?result.exit_code,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "tool finished"
                );
                Ok(result)
            }
            Ok(Err(error)) => {
                let _ = child.kill().await;
                Err(error)
            }
            Err(_) => {
                let elapsed = start.elapsed();
                let _ = child.kill().await;
                Err(JailError::Timeout {
                    limit: limits.timeout,
                    elapsed,
                })
            }
        }
    }

    /// Run the tool from synchronous code.
    ///
    /// Runs on a throwaway current-thread runtime. Inside an existing runtime
    /// that runtime is moved to a scoped helper thread, since a runtime
    /// cannot be started from within another.
    pub fn execute_blocking(self) -> Result<ExecutionResult, JailError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return block_on_fresh_runtime(self);
        }

        std::thread::scope(|s| {
            s.spawn(|| block_on_fresh_runtime(self))
                .join()
                .unwrap_or_else(|_| {
                    Err(InfraError::SpawnFailed {
                        reason: "execution thread panicked".to_string(),
                    }
                    .into())
                })
        })
    }

    /// Canonical path of the tool that will run.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments after the program: verb, optional path, optional content.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Full argument vector including the program.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Canonical workspace root. Also the child's cwd.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn cwd(&self) -> &Path {
        &self.workspace_root
    }

    /// Resolved absolute target, if the request named a path.
    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    /// Environment the child receives, and nothing else.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }
}

fn block_on_fresh_runtime(exec: ResolvedExecution) -> Result<ExecutionResult, JailError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| InfraError::SpawnFailed {
            reason: format!("failed to create runtime: {}", e),
        })?;
    rt.block_on(exec.execute())
}

/// Read a stream to EOF, failing once more than `limit` bytes arrive.
async fn read_capped<R>(mut reader: R, limit: usize, stream: Stream) -> Result<Vec<u8>, JailError>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| InfraError::SpawnFailed {
                reason: format!("{} read error: {}", stream, e),
            })?;
        if n == 0 {
            return Ok(captured);
        }
        if captured.len() + n > limit {
            return Err(JailError::OutputLimitExceeded { stream, limit });
        }
        captured.extend_from_slice(&buf[..n]);
    }
}
