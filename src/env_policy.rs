//! Child environment policy.
//!
//! The tool never inherits the jail's environment wholesale. Each policy
//! builds the child environment from scratch, then the names in
//! [`ALWAYS_STRIP`] are removed regardless of how they got there.

use std::collections::{BTreeMap, BTreeSet};

/// Variables removed from every child environment.
///
/// They inject code, redirect interpreters, or hijack traffic.
pub const ALWAYS_STRIP: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "LD_DEBUG",
    "LD_PROFILE",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    "DYLD_FALLBACK_LIBRARY_PATH",
    "PYTHONPATH",
    "PYTHONSTARTUP",
    "PYTHONHOME",
    "RUBYLIB",
    "RUBYOPT",
    "PERL5LIB",
    "PERL5OPT",
    "NODE_PATH",
    "NODE_OPTIONS",
    "BASH_ENV",
    "ENV",
    "SHELLOPTS",
    "BASHOPTS",
    "IFS",
    "CDPATH",
    "PROMPT_COMMAND",
    "EDITOR",
    "VISUAL",
    "PAGER",
    "SHELL",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "FTP_PROXY",
    "ALL_PROXY",
    "NO_PROXY",
    "GIT_EXEC_PATH",
    "GIT_TEMPLATE_DIR",
];

/// How the child environment is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EnvPolicy {
    /// No variables at all.
    Empty,

    /// `LANG=C.UTF-8` and `LC_ALL=C.UTF-8` only (default).
    #[default]
    LocaleOnly,

    /// Exactly these variables.
    Fixed(BTreeMap<String, String>),

    /// Copy the named variables from the jail's own environment, if set.
    Inherit(BTreeSet<String>),
}

impl EnvPolicy {
    /// Build the child environment, reading the host environment through `lookup`.
    pub fn build_with<F>(&self, lookup: F) -> BTreeMap<String, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = match self {
            EnvPolicy::Empty => BTreeMap::new(),
            EnvPolicy::LocaleOnly => BTreeMap::from([
                ("LANG".to_string(), "C.UTF-8".to_string()),
                ("LC_ALL".to_string(), "C.UTF-8".to_string()),
            ]),
            EnvPolicy::Fixed(fixed) => fixed.clone(),
            EnvPolicy::Inherit(names) => names
                .iter()
                .filter_map(|name| lookup(name).map(|value| (name.clone(), value)))
                .collect(),
        };

        env.retain(|key, _| !Self::is_forbidden(key));
        env
    }

    /// Build the child environment from the current process environment.
    pub fn build(&self) -> BTreeMap<String, String> {
        self.build_with(|name| std::env::var(name).ok())
    }

    /// Whether `key` is always stripped. Case-insensitive, since some
    /// tools honour lowercase proxy variables.
    pub fn is_forbidden(key: &str) -> bool {
        ALWAYS_STRIP.iter().any(|s| s.eq_ignore_ascii_case(key))
    }
}
