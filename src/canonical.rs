//! Path canonicalization.
//!
//! Two jobs live here: resolving a requested path against the workspace the
//! way the kernel would see it (symlinks followed, missing tail kept), and
//! locating the tool executable.

use crate::error::InfraError;
use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Symlink hops allowed during one resolution. Matches Linux `MAXSYMLINKS`.
pub const MAX_SYMLINK_HOPS: usize = 40;

/// Failure while resolving a path leniently.
#[derive(Debug)]
pub enum ResolveError {
    /// More than [`MAX_SYMLINK_HOPS`] links were followed.
    TooManyLinks,
    /// The filesystem refused to answer (permissions, I/O).
    Io(io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Root,
    Parent,
    Name(OsString),
}

fn parts(path: &Path) -> impl DoubleEndedIterator<Item = Part> + '_ {
    path.components().filter_map(|c| match c {
        Component::RootDir => Some(Part::Root),
        Component::ParentDir => Some(Part::Parent),
        Component::Normal(name) => Some(Part::Name(name.to_os_string())),
        Component::CurDir | Component::Prefix(_) => None,
    })
}

/// Resolve an absolute path without requiring it to exist.
///
/// Every component that exists is checked with `lstat`; symlinks are replaced
/// by their target (relative targets resolve against the link's parent).
/// Components that do not exist are kept as-is. `..` removes the previous
/// component after links to its left have been resolved, so
/// `link/../x` means "the parent of wherever `link` points".
pub fn resolve_lenient(path: &Path) -> Result<PathBuf, ResolveError> {
    let mut queue: VecDeque<Part> = parts(path).collect();
    let mut resolved = PathBuf::from("/");
    let mut hops = 0;

    while let Some(part) = queue.pop_front() {
        match part {
            Part::Root => resolved = PathBuf::from("/"),
            Part::Parent => {
                resolved.pop();
            }
            Part::Name(name) => {
                resolved.push(&name);
                match std::fs::symlink_metadata(&resolved) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        hops += 1;
                        if hops > MAX_SYMLINK_HOPS {
                            return Err(ResolveError::TooManyLinks);
                        }
                        let target = std::fs::read_link(&resolved).map_err(ResolveError::Io)?;
                        resolved.pop();
                        for p in parts(&target).rev() {
                            queue.push_front(p);
                        }
                    }
                    Ok(_) => {}
                    Err(e) if is_missing(&e) => {}
                    Err(e) => return Err(ResolveError::Io(e)),
                }
            }
        }
    }

    Ok(resolved)
}

fn is_missing(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ENOTDIR)
}

/// Whether `candidate` is `root` or lives beneath it.
///
/// Comparison is per component, so `/ws/a-1` is not inside `/ws/a`.
pub fn is_within(candidate: &Path, root: &Path) -> bool {
    candidate == root || candidate.starts_with(root)
}

/// Express `target` relative to `root` for the tool's argv.
///
/// The root itself becomes `.`. A leading `-` gets a `./` prefix so the tool
/// never mistakes the path for a flag.
pub fn relative_arg(target: &Path, root: &Path) -> Option<String> {
    let rel = target.strip_prefix(root).ok()?;
    let rel = rel.to_string_lossy();
    Some(if rel.is_empty() {
        ".".to_string()
    } else if rel.starts_with('-') {
        format!("./{}", rel)
    } else {
        rel.into_owned()
    })
}

/// Locate and canonicalize the tool executable.
///
/// Absolute paths are canonicalized directly. A bare name (no `/`) is looked
/// up in `search_path`, using the first directory that has it. Relative paths
/// with a separator are refused since they depend on the process cwd.
///
/// # Errors
///
/// - `ExecutableNotFound` if nothing exists at the path or on the search path
/// - `ExecutableUnresolvable` for relative paths and other canonicalization failures
pub fn locate_executable(exe: &Path, search_path: Option<&OsStr>) -> Result<PathBuf, InfraError> {
    if exe.is_absolute() {
        return canonicalize_executable(exe);
    }

    let mut components = exe.components();
    let bare = match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => name,
        _ => {
            return Err(InfraError::ExecutableUnresolvable {
                path: exe.display().to_string(),
                reason: "must be an absolute path or a bare name".to_string(),
            })
        }
    };

    if let Some(search_path) = search_path {
        for dir in std::env::split_paths(search_path) {
            if !dir.is_absolute() {
                continue;
            }
            let candidate = dir.join(bare);
            if candidate.is_file() {
                return canonicalize_executable(&candidate);
            }
        }
    }

    Err(InfraError::ExecutableNotFound {
        path: exe.display().to_string(),
    })
}

fn canonicalize_executable(path: &Path) -> Result<PathBuf, InfraError> {
    std::fs::canonicalize(path).map_err(|e| {
        let path_str = path.display().to_string();
        match e.kind() {
            io::ErrorKind::NotFound => InfraError::ExecutableNotFound { path: path_str },
            _ => InfraError::ExecutableUnresolvable {
                path: path_str,
                reason: e.to_string(),
            },
        }
    })
}
