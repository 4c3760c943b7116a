//! The command whitelist.
//!
//! `Verb` is the only set of operations the jail will ever hand to the tool.
//! There is no way to add a verb at runtime.

use crate::error::ValidationError;
use std::str::FromStr;

/// A whitelisted file-tool operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// List a directory (defaults to the workspace root).
    Ls,
    /// Fetch an entry.
    Get,
    /// Write content to an entry.
    Put,
    /// Delete an entry.
    Del,
    /// Describe an entry or the workspace.
    Info,
    /// Match entries against a pattern.
    Glob,
    /// Print an entry's content.
    Cat,
}

impl Verb {
    /// Every verb, in tool order.
    pub const ALL: [Verb; 7] = [
        Verb::Ls,
        Verb::Get,
        Verb::Put,
        Verb::Del,
        Verb::Info,
        Verb::Glob,
        Verb::Cat,
    ];

    /// Spelling passed to the tool as `argv[1]`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Ls => "ls",
            Verb::Get => "get",
            Verb::Put => "put",
            Verb::Del => "del",
            Verb::Info => "info",
            Verb::Glob => "glob",
            Verb::Cat => "cat",
        }
    }

    /// Parse a verb. Accepts the tool spelling plus the long forms
    /// `list` and `delete`.
    pub fn parse(s: &str) -> Option<Verb> {
        match s {
            "ls" | "list" => Some(Verb::Ls),
            "get" => Some(Verb::Get),
            "put" => Some(Verb::Put),
            "del" | "delete" => Some(Verb::Del),
            "info" => Some(Verb::Info),
            "glob" => Some(Verb::Glob),
            "cat" => Some(Verb::Cat),
            _ => None,
        }
    }

    /// Whether the verb addresses exactly one entry and needs a path.
    pub fn requires_path(&self) -> bool {
        matches!(self, Verb::Get | Verb::Put | Verb::Del | Verb::Cat)
    }

    /// Whether the verb carries a content payload.
    pub fn takes_content(&self) -> bool {
        matches!(self, Verb::Put)
    }
}

impl FromStr for Verb {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::parse(s).ok_or_else(|| ValidationError::CommandNotAllowed {
            command: s.to_string(),
        })
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_tool_spelling() {
        for verb in Verb::ALL {
            assert_eq!(verb.as_str().parse::<Verb>().unwrap(), verb);
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!(Verb::parse("list"), Some(Verb::Ls));
        assert_eq!(Verb::parse("delete"), Some(Verb::Del));
        assert_eq!(Verb::Del.as_str(), "del");
    }

    #[test]
    fn test_unknown_verbs_rejected() {
        for bad in [
            "rm", "LS", " ls", "ls ", "cat;rm", "", "sh", "put\0", "mv", "exec", "--help",
        ] {
            assert!(
                matches!(bad.parse::<Verb>(), Err(ValidationError::CommandNotAllowed { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_path_and_content_requirements() {
        assert!(Verb::Put.requires_path());
        assert!(Verb::Put.takes_content());
        assert!(!Verb::Ls.requires_path());
        assert!(!Verb::Glob.requires_path());
        assert!(!Verb::Cat.takes_content());
    }
}
