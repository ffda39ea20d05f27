//! Lexical path normalization.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Resolve `path` against the current directory and clean it lexically.
///
/// `.` components are dropped and `..` pops the previous component. Symlinks
/// are not followed, so the path need not exist.
///
/// # Errors
///
/// Returns an error if `path` is relative and the current directory cannot be
/// determined.
pub fn absolute_path(path: impl AsRef<Path>) -> io::Result<PathBuf> {
    let path = path.as_ref();
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut cleaned = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `pop` refuses to remove the root.
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    Ok(cleaned)
}
