//! Shared fixtures: a fake `crush` tool and a jail wired to it.

#![allow(dead_code)]

use crush_jail::{EnvPolicy, Jail, JailBuilder};
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;

/// Minimal stand-in for the real file tool: `crush <verb> [path] [content]`.
///
/// `info slow` sleeps, `info flood` writes forever and `info burst` writes
/// 4 KiB then goes quiet, for limit tests.
const FAKE_CRUSH: &str = r#"#!/bin/sh
verb="$1"
case "$verb" in
  put)
    mkdir -p "$(dirname -- "$2")" || exit 1
    printf '%s' "$3" > "$2"
    ;;
  get|cat)
    if [ ! -f "$2" ]; then
      printf 'no such entry: %s\n' "$2" >&2
      exit 3
    fi
    cat -- "$2"
    ;;
  del)
    rm -- "$2"
    ;;
  ls)
    ls -1A -- "${2:-.}"
    ;;
  glob)
    printf '%s\n' "$2"
    ;;
  info)
    case "$2" in
      slow) exec sleep 10 ;;
      flood) exec yes flood ;;
      burst)
        head -c 4096 /dev/zero
        exec sleep 20
        ;;
      *)
        printf 'cwd=%s\n' "$(pwd -P)"
        env
        ;;
    esac
    ;;
  *)
    printf 'unknown verb: %s\n' "$verb" >&2
    exit 64
    ;;
esac
"#;

/// Path to the fake tool, written once per test binary.
///
/// Written once so no other test thread can be mid-fork while the file is
/// still open for writing (which makes exec fail with ETXTBSY).
pub fn fake_crush() -> &'static Path {
    static TOOL: OnceLock<PathBuf> = OnceLock::new();
    TOOL.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("crush-jail-tool-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("crush");
        std::fs::write(&path, FAKE_CRUSH).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::canonicalize(path).unwrap()
    })
}

/// Environment for the fake tool: it needs `PATH` for coreutils.
pub fn tool_env() -> EnvPolicy {
    EnvPolicy::Fixed(BTreeMap::from([
        ("PATH".to_string(), "/usr/local/bin:/usr/bin:/bin".to_string()),
        ("JAIL_MARKER".to_string(), "1".to_string()),
        ("LD_PRELOAD".to_string(), "/nonexistent/evil.so".to_string()),
    ]))
}

pub struct Sandbox {
    _tmp: TempDir,
    pub base: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let base = std::fs::canonicalize(tmp.path()).unwrap().join("workspaces");
        Self { _tmp: tmp, base }
    }

    pub fn builder(&self) -> JailBuilder {
        Jail::builder()
            .workspaces_dir(&self.base)
            .executable(fake_crush())
            .env_policy(tool_env())
            .timeout(Duration::from_secs(10))
    }

    pub fn jail(&self) -> Jail {
        self.builder().build().unwrap()
    }

    pub fn workspace(&self, id: &str) -> PathBuf {
        self.base.join(id)
    }
}
