#![forbid(unsafe_code)]

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use ignore::{DirEntry, WalkBuilder};
use tracing::{debug, warn};

use crate::error::{BuildError, Result};
use crate::mode::BuildMode;

pub const DEFAULT_OUT_DIR: &str = "dist";
pub const DEFAULT_EXCLUDED_MODULE: &str = "modules/types";
/// Gitignore-syntax exclusions honoured by production builds.
pub const PACKIGNORE_FILE: &str = ".packignore";

/// A file chosen for the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the project root, `/`-separated.
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// Exclusion rules for one selection pass.
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    pub mode: BuildMode,
    /// Output directory, excluded in every mode. Must be spelled the same way
    /// as the walked root (both canonical) for the prefix match to hold.
    pub out_dir: PathBuf,
    /// Subtree relative to the project root that production builds never ship.
    pub excluded_module: PathBuf,
}

impl SelectionPolicy {
    pub fn new(project_root: &Path, mode: BuildMode) -> Self {
        Self {
            mode,
            out_dir: project_root.join(DEFAULT_OUT_DIR),
            excluded_module: PathBuf::from(DEFAULT_EXCLUDED_MODULE),
        }
    }

    fn excludes(&self, project_root: &Path, path: &Path) -> bool {
        if path.starts_with(&self.out_dir) {
            return true;
        }
        if self.mode.is_development() {
            return false;
        }

        let Ok(relative) = path.strip_prefix(project_root) else {
            return false;
        };
        is_hidden(relative)
            || (!self.excluded_module.as_os_str().is_empty()
                && relative.starts_with(&self.excluded_module))
    }
}

/// Walks `project_root` and returns the files to archive, sorted by relative path.
pub fn select(project_root: &Path, policy: &SelectionPolicy) -> Result<Vec<FileEntry>> {
    let mut builder = WalkBuilder::new(project_root);
    builder
        .standard_filters(false)
        .git_ignore(false)
        .git_exclude(false)
        .git_global(false)
        .hidden(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b));

    if !policy.mode.is_development() {
        builder.add_custom_ignore_filename(PACKIGNORE_FILE);
    }

    let filter_root = project_root.to_path_buf();
    let filter_policy = policy.clone();
    builder.filter_entry(move |entry| {
        entry.depth() == 0 || !filter_policy.excludes(&filter_root, entry.path())
    });

    let mut entries = Vec::new();
    for result in builder.build() {
        let entry = result.map_err(|err| walk_error(project_root, err))?;
        if entry.depth() == 0 {
            continue;
        }
        if let Some(err) = entry.error() {
            warn!(path = %entry.path().display(), "ignore file problem: {err}");
        }
        if !is_selectable_file(&entry) {
            continue;
        }

        let absolute_path = entry.into_path();
        let relative = absolute_path
            .strip_prefix(project_root)
            .map_err(|_| BuildError::SelectionFailed {
                path: absolute_path.clone(),
                source: io::Error::other("path escapes the project root"),
            })?;
        let relative_path =
            normalize_path(relative).ok_or_else(|| BuildError::SelectionFailed {
                path: absolute_path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, "path is not valid UTF-8"),
            })?;

        entries.push(FileEntry {
            relative_path,
            absolute_path,
        });
    }

    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    debug!(count = entries.len(), mode = %policy.mode, "selected files");
    Ok(entries)
}

/// Regular files, plus symlinks that resolve to one. Directory symlinks are not followed.
fn is_selectable_file(entry: &DirEntry) -> bool {
    let Some(file_type) = entry.file_type() else {
        return false;
    };
    if file_type.is_file() {
        return true;
    }
    if !file_type.is_symlink() {
        return false;
    }

    match fs::metadata(entry.path()) {
        Ok(target) if target.is_file() => true,
        Ok(_) => {
            debug!(path = %entry.path().display(), "skipping symlink to directory");
            false
        }
        Err(err) => {
            debug!(path = %entry.path().display(), "skipping dangling symlink: {err}");
            false
        }
    }
}

fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

fn walk_error(project_root: &Path, err: ignore::Error) -> BuildError {
    let path = error_path(&err)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| project_root.to_path_buf());
    let message = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::other(message));
    BuildError::SelectionFailed { path, source }
}

/// Path the walker was visiting when `err` occurred, if it recorded one.
fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Loop { child, .. } => Some(child.as_path()),
        _ => None,
    }
}

fn normalize_path(path: &Path) -> Option<String> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(seg) => segments.push(seg.to_str()?),
            Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => return None,
        }
    }

    Some(segments.join("/"))
}
