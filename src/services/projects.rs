//! Input lists of project folders and the batch drivers built on them.

use crate::models::PreparationKind;
use crate::services::paths;
use crate::services::preparation::{PrepareError, Preparer, RunInput, RunSummary};
use crate::services::tools::ToolRunner;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;

/// Read a newline separated list of project folders.
pub fn read_input_list(path: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_input_list(&text))
}

/// Project folders named in `text`.
///
/// Lines starting with `#` are comments. Entries that are not existing
/// directories are dropped; the rest are normalized lexically.
pub fn parse_input_list(text: &str) -> Vec<Utf8PathBuf> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let path = Utf8Path::new(line);
            if path.is_dir() {
                Some(paths::normalize(path))
            } else {
                tracing::debug!("Dropping input list entry, not a directory: {}", line);
                None
            }
        })
        .collect()
}

/// Prepare one file and write its result to `output`.
pub async fn apply_file<R: ToolRunner>(
    preparer: &Preparer<R>,
    kind: PreparationKind,
    input: &Utf8Path,
    output: &Utf8Path,
) -> Result<RunSummary, PrepareError> {
    let run = RunInput::File {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
    };
    preparer.run(kind, &run).await
}

/// Prepare every listed project with one kind, in list order.
pub async fn apply_folders<R: ToolRunner>(
    preparer: &Preparer<R>,
    kind: PreparationKind,
    folders: &[Utf8PathBuf],
) -> Result<Vec<RunSummary>, PrepareError> {
    let mut summaries = Vec::with_capacity(folders.len());
    for folder in folders {
        let summary = preparer
            .run(kind, &RunInput::Folder(folder.clone()))
            .await?;
        summaries.push(summary);
    }
    Ok(summaries)
}

/// Prepare every listed project with every kind.
///
/// Kinds run in table order; each kind covers all projects before the next starts.
pub async fn apply_all_kinds<R: ToolRunner>(
    preparer: &Preparer<R>,
    folders: &[Utf8PathBuf],
) -> Result<Vec<RunSummary>, PrepareError> {
    let mut summaries = Vec::with_capacity(folders.len() * PreparationKind::ALL.len());
    for kind in PreparationKind::ALL {
        summaries.extend(apply_folders(preparer, kind, folders).await?);
    }
    Ok(summaries)
}
