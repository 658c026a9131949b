//! Maps bucket names and object keys onto paths beneath a root directory.
//!
//! Resolution is lexical: `.` and `..` segments are folded before the result
//! is compared against the root, so a key can never climb out of it no matter
//! how the segments are arranged. Symlinks inside the root are not followed
//! or checked.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// The key would resolve outside of its base directory.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("path `{0}` escapes its base directory")]
pub struct PathTraversalError(pub String);

/// Join `relative_key` under `base`, rejecting anything that escapes `base`.
///
/// The returned path is either `base` itself (for keys such as `""` or
/// `"a/.."`) or nested strictly below it. Absolute keys and keys whose
/// normalized form starts with `..` fail with [`PathTraversalError`].
pub fn resolve(base: &Path, relative_key: &str) -> Result<PathBuf, PathTraversalError> {
    let mut normalized = PathBuf::new();
    for component in Path::new(relative_key).components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(PathTraversalError(relative_key.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathTraversalError(relative_key.to_string()));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Ok(base.to_path_buf());
    }
    Ok(base.join(normalized))
}
