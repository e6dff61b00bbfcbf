//! Place a file at a destination, preferring a symbolic link over a full copy.
//!
//! The result cache leans on this contract: after a successful
//! [`Materializer::materialize`] the destination always yields the same bytes
//! as the source, whether it ended up as a link or as a copy.

use crate::services::paths;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use thiserror::Error;

/// Upper bound on links followed while resolving a source path.
pub const MAX_LINK_HOPS: usize = 64;

/// Errors that can occur while materializing a file
#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Source file not found: {0}")]
    NotFound(Utf8PathBuf),

    #[error("Source is a directory: {0}")]
    IsDirectory(Utf8PathBuf),

    #[error("Destination directory does not exist: {0}")]
    DestinationMissingParent(Utf8PathBuf),

    #[error("Source and destination point to the same file: {src} and {dest}")]
    SameFile { src: Utf8PathBuf, dest: Utf8PathBuf },

    #[error("Destination already exists: {0}")]
    AlreadyExists(Utf8PathBuf),

    #[error("Too many levels of symbolic links while resolving {0}")]
    TooManyReferences(Utf8PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How the destination was created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    Linked,
    Copied,
}

/// Places files, linking when allowed and supported, copying otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Materializer {
    prefer_links: bool,
}

impl Materializer {
    pub fn new(prefer_links: bool) -> Self {
        Self { prefer_links }
    }

    /// A materializer that never creates links.
    pub fn copying() -> Self {
        Self::new(false)
    }

    pub fn prefers_links(&self) -> bool {
        self.prefer_links
    }

    /// Make `dest` hold the content of `src`.
    ///
    /// A chain of links at `src` itself is collapsed first (links in the
    /// directories above `src` are left alone). An existing `dest` is only
    /// replaced when `overwrite` is set.
    ///
    /// # Errors
    /// See [`MaterializeError`]; `dest` is untouched whenever an error is
    /// returned before the removal of an existing destination.
    pub fn materialize(
        &self,
        src: &Utf8Path,
        dest: &Utf8Path,
        overwrite: bool,
    ) -> Result<Materialized, MaterializeError> {
        let src = resolve_links(src)?;

        let src_meta = fs::symlink_metadata(&src).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => MaterializeError::NotFound(src.clone()),
            _ => MaterializeError::Io {
                path: src.clone(),
                source,
            },
        })?;

        if src_meta.is_dir() {
            return Err(MaterializeError::IsDirectory(src));
        }

        let dest_dir = paths::parent_dir(dest);
        if !dest_dir.is_dir() {
            return Err(MaterializeError::DestinationMissingParent(
                dest_dir.to_path_buf(),
            ));
        }

        if let Ok(dest_meta) = fs::symlink_metadata(dest) {
            // A link pointing at `src` is fine to replace; the file itself is not.
            if !dest_meta.file_type().is_symlink()
                && same_file(&src, &src_meta, dest, &dest_meta)
            {
                return Err(MaterializeError::SameFile {
                    src,
                    dest: dest.to_path_buf(),
                });
            }

            if !overwrite {
                return Err(MaterializeError::AlreadyExists(dest.to_path_buf()));
            }

            remove_existing(dest, &dest_meta)?;
        }

        self.place(&src, dest, &src_meta)
    }

    fn place(
        &self,
        src: &Utf8Path,
        dest: &Utf8Path,
        src_meta: &fs::Metadata,
    ) -> Result<Materialized, MaterializeError> {
        if self.prefer_links {
            let target = link_target(src, dest)?;
            match create_link(&target, dest) {
                Ok(()) => {
                    tracing::debug!("{}@ -> {}", dest, target);
                    return Ok(Materialized::Linked);
                }
                Err(e) if e.kind() == io::ErrorKind::Unsupported => {
                    tracing::debug!("Links unavailable for {} ({}), copying instead", dest, e);
                }
                Err(source) => return Err(io_error(dest, source)),
            }
        }

        copy_with_metadata(src, dest, src_meta).map_err(|source| io_error(dest, source))?;
        tracing::debug!("{} -> {}", src, dest);
        Ok(Materialized::Copied)
    }
}

impl Default for Materializer {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Copy file content, permissions and modification time.
pub(crate) fn copy_with_metadata(
    src: &Utf8Path,
    dest: &Utf8Path,
    src_meta: &fs::Metadata,
) -> io::Result<()> {
    fs::copy(src, dest)?;
    let Ok(modified) = src_meta.modified() else {
        return Ok(());
    };
    // Read-only copies keep the copy time.
    match fs::OpenOptions::new().write(true).open(dest) {
        Ok(file) => file.set_modified(modified),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            tracing::debug!("Cannot set modification time of read-only {}", dest);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn io_error(path: &Utf8Path, source: io::Error) -> MaterializeError {
    MaterializeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn is_symlink(path: &Utf8Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// Follow links at `src` until a non-link is reached.
fn resolve_links(src: &Utf8Path) -> Result<Utf8PathBuf, MaterializeError> {
    let mut resolved = src.to_path_buf();
    let mut hops = 0;

    while is_symlink(&resolved) {
        hops += 1;
        if hops > MAX_LINK_HOPS {
            return Err(MaterializeError::TooManyReferences(src.to_path_buf()));
        }

        let target = fs::read_link(&resolved)
            .and_then(paths::from_std)
            .map_err(|source| io_error(&resolved, source))?;
        resolved = paths::normalize(&paths::parent_dir(&resolved).join(target));
    }

    if hops > 0 {
        tracing::debug!("Resolved source path {} to {}", src, resolved);
    }
    Ok(resolved)
}

/// Link text for a link at `dest` pointing to `src`.
///
/// Relative when both sit below a common directory (or are both relative),
/// absolute otherwise.
fn link_target(src: &Utf8Path, dest: &Utf8Path) -> Result<Utf8PathBuf, MaterializeError> {
    let src_dir = paths::normalize(paths::parent_dir(src));
    let dest_dir = paths::normalize(paths::parent_dir(dest));
    let either_absolute = src.is_absolute() || dest.is_absolute();

    if !(either_absolute && !paths::shares_ancestor(&src_dir, &dest_dir)) {
        if let Some(relative) = paths::relative_to(&paths::normalize(src), &dest_dir) {
            return Ok(relative);
        }
    }

    paths::absolute(src).map_err(|source| io_error(src, source))
}

fn remove_existing(dest: &Utf8Path, dest_meta: &fs::Metadata) -> Result<(), MaterializeError> {
    let removed = if dest_meta.is_dir() {
        tracing::debug!("Destination is a directory, removing it: {}", dest);
        fs::remove_dir(dest)
    } else {
        tracing::debug!("Removing destination file: {}", dest);
        fs::remove_file(dest)
    };
    removed.map_err(|source| io_error(dest, source))
}

#[cfg(unix)]
fn same_file(
    _src: &Utf8Path,
    src_meta: &fs::Metadata,
    _dest: &Utf8Path,
    dest_meta: &fs::Metadata,
) -> bool {
    use std::os::unix::fs::MetadataExt;
    src_meta.dev() == dest_meta.dev() && src_meta.ino() == dest_meta.ino()
}

#[cfg(not(unix))]
fn same_file(
    src: &Utf8Path,
    _src_meta: &fs::Metadata,
    dest: &Utf8Path,
    _dest_meta: &fs::Metadata,
) -> bool {
    match (src.canonicalize(), dest.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
fn create_link(target: &Utf8Path, dest: &Utf8Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(windows)]
fn create_link(target: &Utf8Path, dest: &Utf8Path) -> io::Result<()> {
    // Unprivileged accounts cannot create links; treat that as "unsupported".
    std::os::windows::fs::symlink_file(target, dest)
        .map_err(|e| io::Error::new(io::ErrorKind::Unsupported, e))
}

#[cfg(not(any(unix, windows)))]
fn create_link(_target: &Utf8Path, _dest: &Utf8Path) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_target_relative_within_common_directory() {
        let target = link_target(
            Utf8Path::new("/work/old/_cppstats/a.c"),
            Utf8Path::new("/work/new/_cppstats/a.c"),
        )
        .unwrap();
        assert_eq!(target, Utf8PathBuf::from("../../old/_cppstats/a.c"));
    }

    #[test]
    fn test_link_target_absolute_without_common_directory() {
        let target = link_target(
            Utf8Path::new("/srv/old/a.c"),
            Utf8Path::new("/home/new/a.c"),
        )
        .unwrap();
        assert_eq!(target, Utf8PathBuf::from("/srv/old/a.c"));
    }

    #[test]
    fn test_link_target_relative_paths() {
        let target = link_target(Utf8Path::new("a/x.c"), Utf8Path::new("b/y.c")).unwrap();
        assert_eq!(target, Utf8PathBuf::from("../a/x.c"));
    }

    #[test]
    fn test_default_prefers_links() {
        assert!(Materializer::default().prefers_links());
        assert!(!Materializer::copying().prefers_links());
    }
}
