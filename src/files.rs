//! Small file-system helpers.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use tracing::debug;

/// Whether an entry named like the last component of `possible_location`
/// exists in its directory.
///
/// A bare file name is looked up in the current directory. Any failure to
/// list the directory counts as "not there".
pub fn check_if_file<P: AsRef<Path>>(possible_location: P) -> bool {
    let path = possible_location.as_ref();
    let Some(file_name) = path.file_name() else {
        return false;
    };
    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    match std::fs::read_dir(directory) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name() == file_name),
        Err(_) => false,
    }
}

/// Lexically normalize a path.
///
/// Drops `.` components, resolves `..` against the preceding normal
/// component and collapses repeated separators. `..` above the root of an
/// absolute path is dropped; leading `..` of a relative path is kept. The
/// file system is not consulted, so symlinks are not resolved.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// Recursively list the files under `dir`, sorted.
///
/// With `extension` set, only files with that extension are returned; the
/// comparison ignores case and a leading dot (`"fits"` and `".FITS"` match
/// the same files).
pub fn list_files<P: AsRef<Path>>(dir: P, extension: Option<&str>) -> anyhow::Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let wanted = extension.map(|ext| ext.trim_start_matches('.').to_ascii_lowercase());
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current)
            .with_context(|| format!("Failed to list directory: {}", current.display()))?;
        for entry in entries {
            let entry = entry
                .with_context(|| format!("Failed to read entry in {}", current.display()))?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if matches_extension(&path, wanted.as_deref()) {
                files.push(path);
            }
        }
    }

    files.sort();
    debug!("Found {} files under {}", files.len(), dir.display());
    Ok(files)
}

fn matches_extension(path: &Path, wanted: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted)),
    }
}
