//! Lexical path helpers shared by the materializer, staging and cache code.
//!
//! None of these functions touch the filesystem except [`absolute`] and
//! [`current_dir`], which need the process working directory.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::io;
use std::path::PathBuf;

/// Collapse `.` and `..` components without resolving symbolic links.
///
/// Leading `..` components of a relative path are kept; `..` directly below
/// the root is dropped. An empty result becomes `.`.
pub fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut parts: Vec<Utf8Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match parts.last() {
                Some(Utf8Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Utf8Component::RootDir) | Some(Utf8Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Utf8PathBuf::from(".");
    }

    parts.iter().collect()
}

/// The process working directory as a UTF-8 path.
pub fn current_dir() -> io::Result<Utf8PathBuf> {
    from_std(std::env::current_dir()?)
}

/// Absolute, normalized form of `path`, resolved against the working directory.
pub fn absolute(path: &Utf8Path) -> io::Result<Utf8PathBuf> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    Ok(normalize(&current_dir()?.join(path)))
}

/// Convert a path coming from `std` APIs, failing on non UTF-8 names.
pub fn from_std(path: PathBuf) -> io::Result<Utf8PathBuf> {
    Utf8PathBuf::try_from(path).map_err(|e| e.into_io_error())
}

/// Parent directory of `path`, with `.` standing in for "no parent".
pub fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

/// True when both paths start with at least one common named directory.
///
/// Two absolute paths that only share the filesystem root do not count.
pub fn shares_ancestor(a: &Utf8Path, b: &Utf8Path) -> bool {
    a.components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .any(|(x, _)| matches!(x, Utf8Component::Normal(_)))
}

/// Express `target` relative to the directory `base`.
///
/// Both paths should be normalized and of the same kind (both absolute or
/// both relative to the same directory). Returns `None` when no purely
/// lexical relative form exists, e.g. when `base` climbs out with `..`.
pub fn relative_to(target: &Utf8Path, base: &Utf8Path) -> Option<Utf8PathBuf> {
    if target.is_absolute() != base.is_absolute() {
        return None;
    }

    let target_parts: Vec<_> = target
        .components()
        .filter(|c| *c != Utf8Component::CurDir)
        .collect();
    let base_parts: Vec<_> = base
        .components()
        .filter(|c| *c != Utf8Component::CurDir)
        .collect();

    let common = target_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();

    if base_parts[common..]
        .iter()
        .any(|c| !matches!(c, Utf8Component::Normal(_)))
    {
        return None;
    }

    let mut relative = Utf8PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part);
    }

    if relative.as_str().is_empty() {
        relative.push(".");
    }
    Some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Utf8Path::new("a/./b/../c")), "a/c");
        assert_eq!(normalize(Utf8Path::new("../a/b/")), "../a/b");
        assert_eq!(normalize(Utf8Path::new("/../x")), "/x");
        assert_eq!(normalize(Utf8Path::new("./")), ".");
        assert_eq!(normalize(Utf8Path::new("a/..")), ".");
    }

    #[test]
    fn test_relative_to_sibling_directories() {
        let rel = relative_to(Utf8Path::new("/p/one/src/a.c"), Utf8Path::new("/p/two/out"));
        assert_eq!(rel, Some(Utf8PathBuf::from("../../one/src/a.c")));
    }

    #[test]
    fn test_relative_to_same_directory() {
        let rel = relative_to(Utf8Path::new("dir/a.c"), Utf8Path::new("dir"));
        assert_eq!(rel, Some(Utf8PathBuf::from("a.c")));
    }

    #[test]
    fn test_relative_to_rejects_mixed_kinds() {
        assert_eq!(relative_to(Utf8Path::new("/a/b"), Utf8Path::new("a")), None);
        assert_eq!(relative_to(Utf8Path::new("a/b"), Utf8Path::new("../c")), None);
    }

    #[test]
    fn test_shares_ancestor() {
        assert!(shares_ancestor(Utf8Path::new("/p/a"), Utf8Path::new("/p/b")));
        assert!(!shares_ancestor(Utf8Path::new("/p/a"), Utf8Path::new("/q/b")));
        assert!(!shares_ancestor(Utf8Path::new("a"), Utf8Path::new("b")));
    }

    #[test]
    fn test_parent_dir_defaults_to_current() {
        assert_eq!(parent_dir(Utf8Path::new("file.c")), Utf8Path::new("."));
        assert_eq!(parent_dir(Utf8Path::new("dir/file.c")), Utf8Path::new("dir"));
    }
}
