//! Candidate enumeration: notebook files one directory level below a root.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::notebook::OUTPUT_SUFFIX;

/// Find all `*/*.ipynb` files exactly one directory level below `root`,
/// excluding anything already bearing the executed-output suffix.
///
/// Hidden directories and files are skipped, and results are sorted
/// lexically so batch order is stable across platforms.
pub fn find_notebooks(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    let entries = fs::read_dir(root)
        .with_context(|| format!("failed to read directory `{}`", root.display()))?;

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() || is_hidden(&entry.file_name()) {
            continue;
        }

        for file in fs::read_dir(entry.path())? {
            let file = file?;
            if !file.file_type()?.is_file() || is_hidden(&file.file_name()) {
                continue;
            }

            let path = file.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(".ipynb") && !name.ends_with(OUTPUT_SUFFIX) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}
