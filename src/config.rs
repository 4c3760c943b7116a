//! Jail configuration.
//!
//! Loaded from TOML, then optionally overlaid with `CRUSH_JAIL_*` environment
//! variables. Example:
//!
//! ```toml
//! workspaces_dir = "/workspaces"
//! executable = "/usr/local/bin/crush"
//! timeout_secs = 30
//! audit_log = "/var/log/crush-jail/audit.log"
//!
//! [env]
//! mode = "inherit"
//! allow = ["PATH", "HOME"]
//! ```

use crate::audit::AuditLog;
use crate::env_policy::EnvPolicy;
use crate::error::InfraError;
use crate::jail::{Jail, DEFAULT_EXECUTABLE, DEFAULT_WORKSPACES_DIR};
use crate::resolved::ResourceLimits;
use crate::risky::RiskyExecutablePolicy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024;

pub const ENV_WORKSPACES_DIR: &str = "CRUSH_JAIL_WORKSPACES_DIR";
pub const ENV_EXECUTABLE: &str = "CRUSH_JAIL_EXECUTABLE";
pub const ENV_TIMEOUT_SECS: &str = "CRUSH_JAIL_TIMEOUT_SECS";
pub const ENV_AUDIT_LOG: &str = "CRUSH_JAIL_AUDIT_LOG";

/// Serializable jail settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JailConfig {
    pub workspaces_dir: PathBuf,
    pub executable: PathBuf,
    pub timeout_secs: u64,
    pub max_stdout_bytes: usize,
    pub max_stderr_bytes: usize,
    pub allow_risky_executable: bool,
    pub audit_log: Option<PathBuf>,
    pub env: EnvConfig,
}

impl Default for JailConfig {
    fn default() -> Self {
        let limits = ResourceLimits::default();
        Self {
            workspaces_dir: PathBuf::from(DEFAULT_WORKSPACES_DIR),
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            timeout_secs: limits.timeout.as_secs(),
            max_stdout_bytes: limits.max_stdout,
            max_stderr_bytes: limits.max_stderr,
            allow_risky_executable: false,
            audit_log: None,
            env: EnvConfig::default(),
        }
    }
}

/// `[env]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvConfig {
    pub mode: EnvMode,
    /// Names copied from the host in `inherit` mode.
    pub allow: Vec<String>,
    /// Exact variables in `fixed` mode.
    pub vars: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvMode {
    Empty,
    #[default]
    Locale,
    Inherit,
    Fixed,
}

impl EnvConfig {
    fn to_policy(&self) -> Result<EnvPolicy, InfraError> {
        let stray = match self.mode {
            EnvMode::Inherit => !self.vars.is_empty(),
            EnvMode::Fixed => !self.allow.is_empty(),
            EnvMode::Empty | EnvMode::Locale => !self.allow.is_empty() || !self.vars.is_empty(),
        };
        if stray {
            return Err(InfraError::Config {
                reason: "env.allow is only valid with mode = \"inherit\", env.vars only with mode = \"fixed\""
                    .to_string(),
            });
        }

        Ok(match self.mode {
            EnvMode::Empty => EnvPolicy::Empty,
            EnvMode::Locale => EnvPolicy::LocaleOnly,
            EnvMode::Inherit => EnvPolicy::Inherit(self.allow.iter().cloned().collect()),
            EnvMode::Fixed => EnvPolicy::Fixed(self.vars.clone()),
        })
    }
}

impl FromStr for JailConfig {
    type Err = InfraError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        toml::from_str(content).map_err(|e| InfraError::Config {
            reason: e.to_string(),
        })
    }
}

impl JailConfig {
    /// Load from a TOML file. Checks file size before reading.
    pub fn load(path: &Path) -> Result<Self, InfraError> {
        let metadata = std::fs::metadata(path).map_err(|e| InfraError::Config {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(InfraError::Config {
                reason: format!("config file exceeds {} byte limit", MAX_CONFIG_FILE_SIZE),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| InfraError::Config {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        content.parse()
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, InfraError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Overlay `CRUSH_JAIL_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), InfraError> {
        self.apply_overrides_with(|name| std::env::var(name).ok())
    }

    /// Overlay settings using `lookup` as the environment.
    pub fn apply_overrides_with<F>(&mut self, lookup: F) -> Result<(), InfraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_WORKSPACES_DIR) {
            self.workspaces_dir = PathBuf::from(dir);
        }
        if let Some(exe) = lookup(ENV_EXECUTABLE) {
            self.executable = PathBuf::from(exe);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = secs.trim().parse().map_err(|_| InfraError::Config {
                reason: format!("{} must be a whole number of seconds, got {:?}", ENV_TIMEOUT_SECS, secs),
            })?;
        }
        if let Some(path) = lookup(ENV_AUDIT_LOG) {
            self.audit_log = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Resource limits described by this config.
    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits::default()
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_stdout(self.max_stdout_bytes)
            .with_max_stderr(self.max_stderr_bytes)
    }

    /// Build a jail. Opens the audit log if one is configured.
    pub fn build(&self) -> Result<Jail, InfraError> {
        let audit = match &self.audit_log {
            Some(path) => AuditLog::open(path)?,
            None => AuditLog::disabled(),
        };
        let risky = if self.allow_risky_executable {
            RiskyExecutablePolicy::AllowWithWarning
        } else {
            RiskyExecutablePolicy::Deny
        };

        Jail::builder()
            .workspaces_dir(&self.workspaces_dir)
            .executable(&self.executable)
            .env_policy(self.env.to_policy()?)
            .risky_executable_policy(risky)
            .limits(self.limits())
            .audit_log(audit)
            .build()
    }
}
