//! Recognising and enumerating C/C++ source files below a project root.

use crate::services::paths;
use camino::{Utf8Path, Utf8PathBuf};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Name of the untouched source tree inside every project directory.
pub const SOURCE_FOLDER: &str = "source";

/// Extensions of files that are prepared (case matters: `.cc` is not included).
pub const SOURCE_EXTENSIONS: [&str; 4] = ["c", "C", "h", "H"];

/// Extensions of header files, the only files with include guards.
pub const HEADER_EXTENSIONS: [&str; 2] = ["h", "H"];

/// Version-control directories that are never descended into.
pub const VCS_DIRECTORIES: [&str; 3] = [".git", ".cvs", ".svn"];

/// Errors raised while enumerating a tree
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Failed to walk {root}: {source}")]
    Walk {
        root: Utf8PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Path below {root} is not valid UTF-8: {source}")]
    NonUtf8 {
        root: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

pub fn is_source_file(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

pub fn is_header_file(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| HEADER_EXTENSIONS.contains(&ext))
}

fn is_vcs_directory(name: &str) -> bool {
    VCS_DIRECTORIES.contains(&name)
}

/// Source files below `root`, in sorted walk order, skipping VCS directories.
pub fn source_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, TreeError> {
    Ok(walk_files(root, true)?
        .into_iter()
        .filter(|path| is_source_file(path))
        .collect())
}

/// Every regular file below `root` (links followed), with no filtering.
pub fn all_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, TreeError> {
    walk_files(root, false)
}

/// Path of `file` relative to `root`.
///
/// `file` is expected to come from walking `root`; anything else is returned
/// unchanged.
pub fn relative_name(file: &Utf8Path, root: &Utf8Path) -> Utf8PathBuf {
    file.strip_prefix(root)
        .map(Utf8Path::to_path_buf)
        .unwrap_or_else(|_| file.to_path_buf())
}

fn walk_files(root: &Utf8Path, skip_vcs: bool) -> Result<Vec<Utf8PathBuf>, TreeError> {
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            !(skip_vcs
                && entry.depth() > 0
                && entry.file_type().is_dir()
                && entry.file_name().to_str().is_some_and(is_vcs_directory))
        });

    let utf8 = |path: PathBuf| {
        paths::from_std(path).map_err(|source| TreeError::NonUtf8 {
            root: root.to_path_buf(),
            source,
        })
    };

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if let Some(link) = dangling_link(&err) {
                    tracing::debug!("Dangling link listed as a file: {}", link.display());
                    files.push(utf8(link.to_path_buf())?);
                    continue;
                }
                if let Some(ancestor) = err.loop_ancestor() {
                    tracing::warn!(
                        "Skipping link loop at {} (back to {})",
                        err.path().unwrap_or(ancestor).display(),
                        ancestor.display()
                    );
                    continue;
                }
                return Err(TreeError::Walk {
                    root: root.to_path_buf(),
                    source: err,
                });
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        files.push(utf8(entry.into_path())?);
    }
    Ok(files)
}

/// The link behind a walk error whose target does not exist.
fn dangling_link(err: &walkdir::Error) -> Option<&Path> {
    let path = err.path()?;
    let missing = err
        .io_error()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound);
    let is_link = std::fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink());
    (missing && is_link).then_some(path)
}
