//! Reuse of preparation results from previously prepared projects.
//!
//! The cache maps a path relative to a project's `source` folder to every
//! earlier preparation of a file with that name. A new file reuses an earlier
//! result only when its content is byte-identical to the earlier original.

use crate::models::PreparationKind;
use crate::services::materialize::{MaterializeError, Materializer};
use crate::services::source_tree::{self, SOURCE_FOLDER, TreeError};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use thiserror::Error;

/// Errors raised while building or consulting the cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One earlier preparation of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFile {
    /// The untouched file below the earlier project's `source` folder.
    pub original: Utf8PathBuf,
    /// Its staged copy below the earlier project's kind subfolder.
    pub staged: Utf8PathBuf,
    /// The final preparation result for that staged copy.
    pub result: Utf8PathBuf,
}

/// Registry of earlier preparations, keyed by relative source path
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    entries: IndexMap<Utf8PathBuf, Vec<PreparedFile>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every complete preparation of `kind` found in `projects`.
    ///
    /// Projects lacking either their `source` folder or the kind subfolder
    /// are skipped, as are files whose staged copy or result is missing.
    pub fn build(projects: &[Utf8PathBuf], kind: PreparationKind) -> Result<Self, CacheError> {
        let mut cache = Self::new();

        for project in projects {
            let source_root = project.join(SOURCE_FOLDER);
            let prepared_root = project.join(kind.subfolder());

            if !source_root.is_dir() || !prepared_root.is_dir() {
                tracing::debug!("Not a prepared '{}' project, ignoring: {}", kind, project);
                continue;
            }

            for original in source_tree::all_files(&source_root)? {
                let relative = source_tree::relative_name(&original, &source_root);
                let staged = prepared_root.join(&relative);
                let result = kind.result_path(&staged);

                if !staged.is_file() || !result.is_file() {
                    continue;
                }

                cache.insert(
                    relative,
                    PreparedFile {
                        original,
                        staged,
                        result,
                    },
                );
            }
        }

        tracing::debug!(
            "Result cache holds {} prepared files under {} names",
            cache.len(),
            cache.entries.len()
        );
        Ok(cache)
    }

    pub fn insert(&mut self, relative: Utf8PathBuf, prepared: PreparedFile) {
        self.entries.entry(relative).or_default().push(prepared);
    }

    /// Total number of registered preparations.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earlier preparations of files named `relative`, in registration order.
    pub fn candidates(&self, relative: &Utf8Path) -> &[PreparedFile] {
        self.entries
            .get(relative)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Place an earlier result for `file` below `dest_root`, if one matches.
    ///
    /// `file` is the new original and `relative` its path below the new
    /// `source` folder. Nothing happens when the destination result already
    /// exists. Candidates are compared in registration order and the first
    /// byte-identical original wins.
    pub fn try_reuse(
        &self,
        file: &Utf8Path,
        relative: &Utf8Path,
        dest_root: &Utf8Path,
        kind: PreparationKind,
        materializer: &Materializer,
    ) -> Result<Option<&PreparedFile>, CacheError> {
        let candidates = self.candidates(relative);
        if candidates.is_empty() {
            return Ok(None);
        }

        let staged_dest = dest_root.join(relative);
        let result_dest = kind.result_path(&staged_dest);
        if fs::symlink_metadata(&result_dest).is_ok() {
            tracing::debug!(
                "Not reusing an earlier result for {}: {} already exists",
                relative,
                result_dest
            );
            return Ok(None);
        }

        for candidate in candidates {
            if !files_identical(file, &candidate.original)? {
                continue;
            }

            tracing::info!("Reusing preparation result for {} from {}", relative, candidate.original);
            place_prepared(candidate, &staged_dest, &result_dest, materializer)?;
            return Ok(Some(candidate));
        }

        Ok(None)
    }
}

fn place_prepared(
    prepared: &PreparedFile,
    staged_dest: &Utf8Path,
    result_dest: &Utf8Path,
    materializer: &Materializer,
) -> Result<(), CacheError> {
    if let Some(dir) = staged_dest.parent() {
        fs::create_dir_all(dir).map_err(io_error(dir))?;
    }

    // A stale staged copy from an interrupted run is replaced.
    materializer.materialize(&prepared.staged, staged_dest, true)?;

    // In-place kinds: the staged copy is the result.
    if result_dest == staged_dest {
        return Ok(());
    }

    if result_dest.extension() == Some("xml") {
        relocate_srcml(&prepared.result, result_dest, &prepared.staged, staged_dest)
    } else {
        materializer.materialize(&prepared.result, result_dest, false)?;
        Ok(())
    }
}

/// Copy a srcML document, pointing its `filename` attribute at the new staged file.
fn relocate_srcml(
    src: &Utf8Path,
    dest: &Utf8Path,
    old_staged: &Utf8Path,
    new_staged: &Utf8Path,
) -> Result<(), CacheError> {
    let old_attr = format!("filename=\"{old_staged}\"");
    let new_attr = format!("filename=\"{new_staged}\"");

    let bytes = fs::read(src).map_err(io_error(src))?;
    let patched = replace_first_per_line(&bytes, old_attr.as_bytes(), new_attr.as_bytes());

    fs::write(dest, patched).map_err(io_error(dest))
}

/// Byte-level `replacen(.., 1)` on every line; bytes outside the match are kept as is.
fn replace_first_per_line(content: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut patched = Vec::with_capacity(content.len());

    for line in content.split_inclusive(|&b| b == b'\n') {
        match line.windows(needle.len()).position(|window| window == needle) {
            Some(at) => {
                patched.extend_from_slice(&line[..at]);
                patched.extend_from_slice(replacement);
                patched.extend_from_slice(&line[at + needle.len()..]);
            }
            None => patched.extend_from_slice(line),
        }
    }
    patched
}

/// Byte-for-byte comparison of two files.
pub fn files_identical(a: &Utf8Path, b: &Utf8Path) -> Result<bool, CacheError> {
    let file_a = File::open(a).map_err(io_error(a))?;
    let file_b = File::open(b).map_err(io_error(b))?;

    let len_a = file_a.metadata().map_err(io_error(a))?.len();
    let len_b = file_b.metadata().map_err(io_error(b))?.len();
    if len_a != len_b {
        return Ok(false);
    }

    let mut reader_a = BufReader::new(file_a);
    let mut reader_b = BufReader::new(file_b);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];

    loop {
        let read_a = read_full(&mut reader_a, &mut buf_a).map_err(io_error(a))?;
        let read_b = read_full(&mut reader_b, &mut buf_b).map_err(io_error(b))?;

        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

fn io_error(path: &Utf8Path) -> impl FnOnce(io::Error) -> CacheError {
    let path = path.to_path_buf();
    move |source| CacheError::Io { path, source }
}

/// Fill `buf` as far as the reader allows, returning the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
