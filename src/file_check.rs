//! File type and permission checks for the tool executable.

use crate::error::InfraError;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Check that a canonical path points to something we can execute.
///
/// # Errors
///
/// - `ExecutableNotFound` if the file vanished since canonicalization
/// - `ExecutableNotRegularFile` for directories, devices, sockets
/// - `ExecutableNotExecutable` if no execute bit applies to the current user
pub fn check_executable(path: &Path) -> Result<(), InfraError> {
    let path_str = path.display().to_string();

    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => InfraError::ExecutableNotFound {
            path: path_str.clone(),
        },
        _ => InfraError::ExecutableUnresolvable {
            path: path_str.clone(),
            reason: e.to_string(),
        },
    })?;

    if !metadata.is_file() {
        return Err(InfraError::ExecutableNotRegularFile { path: path_str });
    }

    if !is_executable(&metadata) {
        return Err(InfraError::ExecutableNotExecutable { path: path_str });
    }

    Ok(())
}

/// Owner, group, then other execute bits; root only needs any of them.
fn is_executable(metadata: &Metadata) -> bool {
    let mode = metadata.permissions().mode();

    // SAFETY: getuid/getgid cannot fail and touch no memory.
    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };

    if uid == 0 {
        return mode & 0o111 != 0;
    }
    if uid == metadata.uid() {
        return mode & 0o100 != 0;
    }
    if gid == metadata.gid() {
        return mode & 0o010 != 0;
    }
    mode & 0o001 != 0
}
