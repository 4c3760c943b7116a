//! Agent-facing tool adapter.
//!
//! Wraps a [`Jail`] as a JSON tool an LLM can call. The workspace always comes
//! from the caller's trusted context; the model only supplies `command`,
//! `path` and `content`.

use crate::error::{JailError, ValidationError};
use crate::jail::Jail;
use crate::request::RawCommandRequest;
use crate::verb::Verb;
use serde::Deserialize;
use serde_json::{json, Value};

/// Parameters the model is allowed to set.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolParams {
    command: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Filesystem tool backed by the jail.
#[derive(Debug, Clone)]
pub struct FilesystemTool {
    jail: Jail,
}

impl FilesystemTool {
    pub fn new(jail: Jail) -> Self {
        Self { jail }
    }

    pub fn name(&self) -> &str {
        "crush"
    }

    pub fn description(&self) -> &str {
        "Read and modify files in the current project workspace. \
         Paths are relative to the workspace root and cannot leave it."
    }

    /// JSON schema for [`FilesystemTool::invoke`] parameters.
    pub fn parameters_schema(&self) -> Value {
        let commands: Vec<&str> = Verb::ALL.iter().map(Verb::as_str).collect();
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": commands,
                    "description": "Operation to perform"
                },
                "path": {
                    "type": "string",
                    "description": "Target path relative to the workspace root; required for get, put, del and cat"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write; required for put, not allowed otherwise"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    /// Run a model-issued call inside `workspace_id`.
    ///
    /// Always returns a JSON object: the execution result when the tool ran,
    /// otherwise `{success: false, error_kind, message, retryable}`.
    pub async fn invoke(&self, workspace_id: &str, params: &Value) -> Value {
        let params: ToolParams = match ToolParams::deserialize(params) {
            Ok(params) => params,
            Err(e) => {
                return JailError::Validation(ValidationError::Malformed {
                    reason: e.to_string(),
                })
                .to_json()
            }
        };

        let raw = RawCommandRequest {
            workspace_id: workspace_id.to_string(),
            command: params.command,
            path: params.path,
            content: params.content,
        };

        match self.jail.run(raw).await {
            Ok(result) => serde_json::to_value(&result).unwrap_or_else(|e| {
                json!({
                    "success": false,
                    "error_kind": "infrastructure",
                    "message": format!("failed to encode result: {}", e),
                    "retryable": false,
                })
            }),
            Err(err) => err.to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tool(tmp: &TempDir) -> FilesystemTool {
        let jail = Jail::builder()
            .workspaces_dir(tmp.path())
            .executable("/nonexistent/crush")
            .build()
            .unwrap();
        FilesystemTool::new(jail)
    }

    #[test]
    fn test_schema_lists_whitelist() {
        let tmp = TempDir::new().unwrap();
        let schema = tool(&tmp).parameters_schema();
        let commands = schema["properties"]["command"]["enum"].as_array().unwrap();
        assert_eq!(commands.len(), Verb::ALL.len());
        assert!(commands.contains(&json!("put")));
        assert!(!commands.contains(&json!("rm")));
    }

    #[tokio::test]
    async fn test_model_cannot_choose_workspace() {
        let tmp = TempDir::new().unwrap();
        let out = tool(&tmp)
            .invoke("proj-1", &json!({"command": "ls", "workspace_id": "other"}))
            .await;
        assert_eq!(out["error_kind"], "validation");
        assert_eq!(out["retryable"], true);
    }

    #[tokio::test]
    async fn test_unknown_verb_is_retryable_validation() {
        let tmp = TempDir::new().unwrap();
        let out = tool(&tmp).invoke("proj-1", &json!({"command": "rm"})).await;
        assert_eq!(out["success"], false);
        assert_eq!(out["error_kind"], "validation");
        assert_eq!(out["retryable"], true);
    }

    #[tokio::test]
    async fn test_escape_is_not_retryable() {
        let tmp = TempDir::new().unwrap();
        let out = tool(&tmp)
            .invoke("proj-1", &json!({"command": "cat", "path": "../../etc/passwd"}))
            .await;
        assert_eq!(out["error_kind"], "path_escape");
        assert_eq!(out["retryable"], false);
    }

    #[tokio::test]
    async fn test_missing_tool_is_infrastructure() {
        let tmp = TempDir::new().unwrap();
        let out = tool(&tmp).invoke("proj-1", &json!({"command": "ls"})).await;
        assert_eq!(out["error_kind"], "infrastructure");
    }
}
