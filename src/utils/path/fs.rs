//! Lexical path normalization.
//!
//! Build keys are compared by exact equality, so every path that becomes a
//! key goes through [`normalize`] first. Nothing here touches the disk:
//! entry points may not exist yet when they are registered.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without consulting the filesystem.
///
/// `..` never climbs above the root of an absolute path.
///
/// # Example
/// ```ignore
/// assert_eq!(normalize(Path::new("/a/./b/../c.js")), PathBuf::from("/a/c.js"));
/// ```
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Normalize `path`, joining it to `base` first when relative.
#[inline]
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// Relative path from directory `from` to `to`, both normalized absolute.
///
/// Returns `to` unchanged when the two share no root (different drives).
pub fn relative(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from.components().collect();
    let to_parts: Vec<_> = to.components().collect();

    if from.first() != to_parts.first() {
        return to.to_path_buf();
    }

    let shared = from
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in shared..from.len() {
        out.push("..");
    }
    for part in &to_parts[shared..] {
        out.push(part.as_os_str());
    }
    out
}

/// Module specifier importing `file` from a module located in `dir`.
///
/// Always `/`-separated and always explicitly relative, so a bundler never
/// mistakes it for a package name.
pub fn relative_import(dir: &Path, file: &Path) -> String {
    let rel = relative(dir, file);
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    if joined.starts_with("../") || rel.is_absolute() {
        joined
    } else {
        format!("./{joined}")
    }
}

/// Replace the final extension with `.js` (`foo.test.ts` -> `foo.test.js`).
pub fn with_js_extension(path: &Path) -> PathBuf {
    path.with_extension("js")
}
