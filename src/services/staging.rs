//! Building the working copy a preparation run operates on.

use crate::models::PreparationKind;
use crate::services::cache::{CacheError, ResultCache};
use crate::services::materialize::{self, Materializer};
use crate::services::source_tree::{self, TreeError};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use std::fs;
use std::io;
use thiserror::Error;

/// Errors raised while staging a tree
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Source folder not found: {0}")]
    MissingSource(Utf8PathBuf),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Failed to stage {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What a staging pass did, by path relative to the source root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingReport {
    /// Files copied from the source tree.
    pub copied: Vec<Utf8PathBuf>,
    /// Files whose staged copy and result came from the result cache.
    pub reused: HashSet<Utf8PathBuf>,
    /// Files already present from an earlier lazy run and left alone.
    pub kept: usize,
}

impl StagingReport {
    pub fn was_reused(&self, relative: &Utf8Path) -> bool {
        self.reused.contains(relative)
    }
}

/// Mirror the source files of `source_root` below `dest_root`.
///
/// Without `lazy` the destination is wiped and rebuilt from scratch. With
/// `lazy` the destination is kept: files matching an entry of `cache` are
/// taken from the earlier preparation, every other source file is copied
/// only when it is missing. Stale files whose original was deleted upstream
/// are not removed.
pub fn stage_tree(
    source_root: &Utf8Path,
    dest_root: &Utf8Path,
    lazy: bool,
    cache: &ResultCache,
    kind: PreparationKind,
    materializer: &Materializer,
) -> Result<StagingReport, StagingError> {
    if !source_root.is_dir() {
        return Err(StagingError::MissingSource(source_root.to_path_buf()));
    }

    let mut report = StagingReport::default();
    let sources = source_tree::source_files(source_root)?;

    if lazy {
        create_dir(dest_root)?;

        if !cache.is_empty() {
            for file in &sources {
                let relative = source_tree::relative_name(file, source_root);
                if cache
                    .try_reuse(file, &relative, dest_root, kind, materializer)?
                    .is_some()
                {
                    report.reused.insert(relative);
                }
            }
        }
    } else if dest_root.exists() {
        tracing::debug!("Removing previous working copy: {}", dest_root);
        fs::remove_dir_all(dest_root).map_err(|source| StagingError::Io {
            path: dest_root.to_path_buf(),
            source,
        })?;
    }

    for file in &sources {
        let relative = source_tree::relative_name(file, source_root);
        let dest = dest_root.join(&relative);

        if lazy && fs::symlink_metadata(&dest).is_ok() {
            if !report.reused.contains(&relative) {
                report.kept += 1;
            }
            continue;
        }

        if let Some(dir) = dest.parent() {
            create_dir(dir)?;
        }
        copy_file(file, &dest)?;
        report.copied.push(relative);
    }

    tracing::debug!(
        "Staged {} into {}: {} copied, {} reused, {} kept",
        source_root,
        dest_root,
        report.copied.len(),
        report.reused.len(),
        report.kept
    );
    Ok(report)
}

/// Copy one file into `dest`, with no filtering.
pub fn stage_single_file(input: &Utf8Path, dest: &Utf8Path) -> Result<(), StagingError> {
    if !input.is_file() {
        return Err(StagingError::MissingSource(input.to_path_buf()));
    }
    if let Some(dir) = dest.parent() {
        create_dir(dir)?;
    }
    copy_file(input, dest)
}

fn create_dir(dir: &Utf8Path) -> Result<(), StagingError> {
    fs::create_dir_all(dir).map_err(|source| StagingError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

fn copy_file(src: &Utf8Path, dest: &Utf8Path) -> Result<(), StagingError> {
    fs::metadata(src)
        .and_then(|meta| materialize::copy_with_metadata(src, dest, &meta))
        .map_err(|source| StagingError::Io {
            path: dest.to_path_buf(),
            source,
        })
}
