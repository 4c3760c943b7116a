//! Risky executable detection.
//!
//! The jail only ever runs one configured tool. If that tool turns out to be a
//! shell or an interpreter, the "no shell interpretation" guarantee is gone, so
//! such executables are refused unless the operator opts in.

use crate::error::{InfraError, RiskCategory};
use std::path::Path;

/// Policy for a configured executable that falls in a risky category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RiskyExecutablePolicy {
    /// Refuse it (default).
    #[default]
    Deny,

    /// Run it, but log a warning on every resolution.
    AllowWithWarning,
}

/// Shell interpreters that can execute arbitrary commands.
pub const RISKY_SHELLS: &[&str] = &[
    "sh", "bash", "zsh", "dash", "ksh", "csh", "tcsh", "fish", "ash", "busybox",
];

/// Script interpreters that can execute arbitrary code.
pub const RISKY_INTERPRETERS: &[&str] = &[
    "python", "perl", "ruby", "node", "nodejs", "deno", "bun", "php", "lua", "luajit", "tclsh",
    "awk", "gawk", "nawk", "mawk",
];

/// Process spawners that can execute other binaries.
pub const RISKY_SPAWNERS: &[&str] = &[
    "env", "xargs", "parallel", "nohup", "timeout", "nice", "ionice", "strace", "watch",
];

/// Privilege escalation tools.
pub const RISKY_PRIVILEGE: &[&str] = &["sudo", "su", "doas", "pkexec", "runuser", "chroot"];

/// Categorize an executable by file name.
///
/// Version suffixes are ignored, so `python3.11` counts as `python`.
pub fn categorize(path: &Path) -> Option<RiskCategory> {
    let filename = path.file_name()?.to_str()?;
    let base = filename
        .split('.')
        .next()
        .unwrap_or(filename)
        .trim_end_matches(|c: char| c.is_ascii_digit());

    let table: [(&[&str], RiskCategory); 4] = [
        (RISKY_SHELLS, RiskCategory::Shell),
        (RISKY_INTERPRETERS, RiskCategory::Interpreter),
        (RISKY_SPAWNERS, RiskCategory::Spawner),
        (RISKY_PRIVILEGE, RiskCategory::Privilege),
    ];

    table
        .into_iter()
        .find(|(names, _)| names.iter().any(|&n| n == base || n == filename))
        .map(|(_, category)| category)
}

/// Apply the policy to a canonical executable path.
pub fn check_risky(path: &Path, policy: RiskyExecutablePolicy) -> Result<(), InfraError> {
    let Some(category) = categorize(path) else {
        return Ok(());
    };

    match policy {
        RiskyExecutablePolicy::Deny => Err(InfraError::RiskyExecutable {
            path: path.display().to_string(),
            category,
        }),
        RiskyExecutablePolicy::AllowWithWarning => {
            tracing::warn!(
                path = %path.display(),
                category = %category,
                "running risky executable as file tool"
            );
            Ok(())
        }
    }
}
