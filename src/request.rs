//! Command requests.
//!
//! [`RawCommandRequest`] is what arrives from an agent adapter or HTTP handler.
//! [`CommandRequest`] is the same thing after validation, and is the only
//! input [`Jail::resolve`](crate::Jail::resolve) accepts.

use crate::error::ValidationError;
use crate::verb::Verb;
use serde::{Deserialize, Serialize};

/// Unvalidated request, shaped like the wire contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCommandRequest {
    pub workspace_id: String,
    pub command: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl RawCommandRequest {
    /// Create a request with no path and no content.
    pub fn new(workspace_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            command: command.into(),
            path: None,
            content: None,
        }
    }

    /// Set the target path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the content payload.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Decode a request from JSON.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::Malformed {
            reason: e.to_string(),
        })
    }

    /// Validate into a [`CommandRequest`].
    pub fn validate(self) -> Result<CommandRequest, ValidationError> {
        CommandRequest::validate(self)
    }
}

/// A workspace identifier restricted to `[A-Za-z0-9_-]+`.
///
/// The charset alone excludes `/`, `\`, `.` and therefore `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Maximum accepted length; longer ids would risk `ENAMETOOLONG` on the directory.
    pub const MAX_LEN: usize = 128;

    /// Check and wrap an identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if let Err(reason) = check_workspace_id(&id) {
            return Err(ValidationError::InvalidWorkspaceId { id, reason });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_workspace_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("must not be empty");
    }
    if id.len() > WorkspaceId::MAX_LEN {
        return Err("too long");
    }
    if id.contains("..") {
        return Err("must not contain '..'");
    }
    if id.contains('/') || id.contains('\\') {
        return Err("must not contain path separators");
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err("only letters, digits, '_' and '-' are allowed");
    }
    Ok(())
}

/// A validated command request.
///
/// Fields are private so a value can only come out of [`CommandRequest::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    workspace_id: WorkspaceId,
    verb: Verb,
    path: Option<String>,
    content: Option<String>,
}

impl CommandRequest {
    /// Validate a raw request.
    ///
    /// Checks run in order and the first failure is returned: workspace id,
    /// verb, content presence, path presence, then path shape, then NUL bytes in content.
    pub fn validate(raw: RawCommandRequest) -> Result<Self, ValidationError> {
        let workspace_id = WorkspaceId::new(raw.workspace_id)?;
        let verb: Verb = raw.command.parse()?;

        match (&raw.content, verb.takes_content()) {
            (None, true) => return Err(ValidationError::MissingContent { command: verb.as_str() }),
            (Some(_), false) => {
                return Err(ValidationError::UnexpectedContent {
                    command: verb.as_str(),
                })
            }
            _ => {}
        }

        if raw.path.is_none() && verb.requires_path() {
            return Err(ValidationError::MissingPath {
                command: verb.as_str(),
            });
        }

        match &raw.path {
            Some(path) if path.is_empty() => {
                return Err(ValidationError::InvalidPath {
                    path: path.clone(),
                    reason: "must not be empty",
                })
            }
            Some(path) if path.contains('\0') => {
                return Err(ValidationError::InvalidPath {
                    path: path.clone(),
                    reason: "must not contain NUL bytes",
                })
            }
            _ => {}
        }

        if raw.content.as_deref().is_some_and(|c| c.contains('\0')) {
            return Err(ValidationError::InvalidContent {
                reason: "must not contain NUL bytes",
            });
        }

        Ok(Self {
            workspace_id,
            verb,
            path: raw.path,
            content: raw.content,
        })
    }

    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

impl TryFrom<RawCommandRequest> for CommandRequest {
    type Error = ValidationError;

    fn try_from(raw: RawCommandRequest) -> Result<Self, Self::Error> {
        Self::validate(raw)
    }
}
