//! Integration tests for crush_jail.
//!
//! These run the full validate-resolve-execute flow against a fake tool script.

mod common;

use common::Sandbox;
use crush_jail::{
    ErrorKind, FilesystemTool, InfraError, JailConfig, JailError, RawCommandRequest, Verb,
};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_put_then_cat() {
    let sandbox = Sandbox::new();
    let jail = sandbox.jail();

    let put = RawCommandRequest::new("proj-1", "put")
        .with_path("notes/a.txt")
        .with_content("hello");
    let result = jail.run(put).await.unwrap();
    assert!(result.success, "stderr: {}", result.stderr);
    assert_eq!(result.exit_code, Some(0));

    let on_disk = std::fs::read_to_string(sandbox.workspace("proj-1").join("notes/a.txt")).unwrap();
    assert_eq!(on_disk, "hello");

    let cat = RawCommandRequest::new("proj-1", "cat").with_path("notes/a.txt");
    let result = jail.run(cat).await.unwrap();
    assert!(result.success);
    assert_eq!(result.stdout, "hello");
}

#[tokio::test]
async fn test_ls_and_del() {
    let sandbox = Sandbox::new();
    let jail = sandbox.jail();

    for name in ["a.txt", "b.txt"] {
        let put = RawCommandRequest::new("proj-1", "put")
            .with_path(name)
            .with_content("x");
        assert!(jail.run(put).await.unwrap().success);
    }

    let ls = jail.run(RawCommandRequest::new("proj-1", "ls")).await.unwrap();
    assert_eq!(ls.stdout, "a.txt\nb.txt\n");

    let del = RawCommandRequest::new("proj-1", "delete").with_path("a.txt");
    assert!(jail.run(del).await.unwrap().success);
    assert!(!sandbox.workspace("proj-1").join("a.txt").exists());

    let ls = jail.run(RawCommandRequest::new("proj-1", "list")).await.unwrap();
    assert_eq!(ls.stdout, "b.txt\n");
}

#[tokio::test]
async fn test_child_runs_in_workspace_root() {
    let sandbox = Sandbox::new();
    let jail = sandbox.jail();

    let result = jail.run(RawCommandRequest::new("proj-1", "info")).await.unwrap();
    let expected = format!("cwd={}\n", sandbox.workspace("proj-1").display());
    assert!(result.stdout.starts_with(&expected), "stdout: {}", result.stdout);
}

#[tokio::test]
async fn test_child_environment_is_explicit() {
    let sandbox = Sandbox::new();
    let jail = sandbox.jail();

    let result = jail.run(RawCommandRequest::new("proj-1", "info")).await.unwrap();
    assert!(result.stdout.contains("JAIL_MARKER=1"));
    assert!(!result.stdout.contains("LD_PRELOAD"));
    // cargo sets CARGO_* for the test process; none of it may leak through
    assert!(!result.stdout.contains("CARGO"));
}

#[tokio::test]
async fn test_non_zero_exit_keeps_tool_stderr() {
    let sandbox = Sandbox::new();
    let jail = sandbox.jail();

    let cat = RawCommandRequest::new("proj-1", "cat").with_path("missing.txt");
    let result = jail.run(cat).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.stderr, "no such entry: missing.txt\n");
    assert_eq!(result.stdout, "");
}

#[tokio::test]
async fn test_timeout_kills_tool() {
    let sandbox = Sandbox::new();
    let jail = sandbox.builder().timeout(Duration::from_millis(300)).build().unwrap();

    let slow = RawCommandRequest::new("proj-1", "info").with_path("slow");
    let start = std::time::Instant::now();
    let result = jail.run(slow).await;

    assert!(matches!(result, Err(JailError::Timeout { .. })), "{:?}", result);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_output_limit_kills_tool() {
    let sandbox = Sandbox::new();
    let jail = sandbox.builder().max_stdout(1024).build().unwrap();

    let flood = RawCommandRequest::new("proj-1", "info").with_path("flood");
    let result = jail.run(flood).await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutputLimit);
}

#[tokio::test]
async fn test_output_limit_kills_quiet_tool_at_once() {
    let sandbox = Sandbox::new();
    let jail = sandbox
        .builder()
        .max_stdout(1024)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    // Overruns stdout, then sleeps holding stderr open
    let burst = RawCommandRequest::new("proj-1", "info").with_path("burst");
    let start = std::time::Instant::now();
    let result = jail.run(burst).await;

    assert!(
        matches!(result, Err(JailError::OutputLimitExceeded { limit: 1024, .. })),
        "{:?}",
        result
    );
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_missing_tool_is_infrastructure_error() {
    let sandbox = Sandbox::new();
    let jail = sandbox
        .builder()
        .executable("/nonexistent/bin/crush")
        .build()
        .unwrap();

    let result = jail.run(RawCommandRequest::new("proj-1", "ls")).await;
    assert!(matches!(
        result,
        Err(JailError::Infrastructure(InfraError::ExecutableNotFound { .. }))
    ));
}

#[tokio::test]
async fn test_bare_tool_name_found_on_search_path() {
    let sandbox = Sandbox::new();
    let dir = common::fake_crush().parent().unwrap().to_path_buf();
    let jail = sandbox
        .builder()
        .executable("crush")
        .search_path(dir)
        .build()
        .unwrap();

    let result = jail.run(RawCommandRequest::new("proj-1", "ls")).await.unwrap();
    assert!(result.success);
}

#[tokio::test]
async fn test_workspace_created_lazily_and_idempotently() {
    let sandbox = Sandbox::new();
    let jail = sandbox.jail();
    assert!(!sandbox.workspace("fresh").exists());

    let first = jail.run(RawCommandRequest::new("fresh", "ls")).await.unwrap();
    let second = jail.run(RawCommandRequest::new("fresh", "ls")).await.unwrap();
    assert!(first.success && second.success);
    assert!(sandbox.workspace("fresh").is_dir());
}

#[tokio::test]
async fn test_concurrent_workspaces() {
    let sandbox = Sandbox::new();
    let jail = sandbox.jail();

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8 {
        let jail = jail.clone();
        tasks.spawn(async move {
            let ws = format!("proj-{}", i);
            let put = RawCommandRequest::new(&ws, "put")
                .with_path("id.txt")
                .with_content(ws.clone());
            jail.run(put).await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        assert!(joined.unwrap().unwrap().success);
    }

    for i in 0..8 {
        let ws = format!("proj-{}", i);
        let content = std::fs::read_to_string(sandbox.workspace(&ws).join("id.txt")).unwrap();
        assert_eq!(content, ws);
    }
}

#[tokio::test]
async fn test_resolve_then_execute_blocking() {
    let sandbox = Sandbox::new();
    let jail = sandbox.jail();

    let request = RawCommandRequest::new("proj-1", "glob")
        .with_path("*.txt")
        .validate()
        .unwrap();
    let resolved = jail.resolve(&request).unwrap();
    assert_eq!(resolved.verb(), Verb::Glob);

    let result = resolved.execute_blocking().unwrap();
    assert_eq!(result.stdout, "*.txt\n");
}

#[test]
fn test_execute_blocking_outside_runtime() {
    let sandbox = Sandbox::new();
    let jail = sandbox.jail();

    let request = RawCommandRequest::new("proj-1", "ls").validate().unwrap();
    let result = jail.resolve(&request).unwrap().execute_blocking().unwrap();
    assert!(result.success);
}

#[tokio::test]
async fn test_tool_adapter_round_trip() {
    let sandbox = Sandbox::new();
    let tool = FilesystemTool::new(sandbox.jail());

    let out = tool
        .invoke("proj-1", &json!({"command": "put", "path": "a.txt", "content": "hi"}))
        .await;
    assert_eq!(out["success"], true);
    assert_eq!(out["exit_code"], 0);

    let out = tool.invoke("proj-1", &json!({"command": "cat", "path": "a.txt"})).await;
    assert_eq!(out["stdout"], "hi");

    let out = tool.invoke("proj-1", &json!({"command": "cat", "path": "nope"})).await;
    assert_eq!(out["success"], false);
    assert_eq!(out["exit_code"], 3);
    assert!(out.get("error_kind").is_none());
}

#[tokio::test]
async fn test_config_built_jail_audits_to_file() {
    let sandbox = Sandbox::new();
    let audit = sandbox.base.with_file_name("audit.log");
    let config: JailConfig = format!(
        r#"
workspaces_dir = "{}"
executable = "{}"
audit_log = "{}"

[env]
mode = "fixed"
vars = {{ PATH = "/usr/local/bin:/usr/bin:/bin" }}
"#,
        sandbox.base.display(),
        common::fake_crush().display(),
        audit.display()
    )
    .parse()
    .unwrap();
    let jail = config.build().unwrap();

    let ok = jail.run(RawCommandRequest::new("proj-1", "ls")).await;
    assert!(ok.unwrap().success);
    let escape = jail
        .run(RawCommandRequest::new("proj-1", "cat").with_path("../../etc/passwd"))
        .await;
    assert!(matches!(escape, Err(JailError::PathEscape(_))));

    let log = std::fs::read_to_string(&audit).unwrap();
    let events: Vec<serde_json::Value> = log
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event"], "finished");
    assert_eq!(events[1]["event"], "path_escape");
    assert_eq!(events[1]["path"], "../../etc/passwd");
}
