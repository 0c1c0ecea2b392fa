#![forbid(unsafe_code)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::archive::{ARCHIVE_EXTENSION, ArchiveArtifact};
use crate::error::{BuildError, Result};
use crate::manifest::PackIdentity;
use crate::mode::BuildMode;

/// Destination of one build: `<dir>/<id>_<version>[_dev].zip`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub dir: PathBuf,
    pub path: PathBuf,
}

impl OutputTarget {
    pub fn resolve(
        project_root: &Path,
        out_dir: &Path,
        identity: &PackIdentity,
        mode: BuildMode,
    ) -> Self {
        let dir = resolve_dir(project_root, out_dir);
        let file_name = format!("{}.{}", identity.archive_stem(mode), ARCHIVE_EXTENSION);
        Self {
            path: dir.join(file_name),
            dir,
        }
    }

    /// Creates the output directory and returns its canonical path.
    ///
    /// `project_root` must already be canonical. An output directory that is,
    /// or contains, the project root is rejected before anything is removed.
    pub fn prepare(&self, project_root: &Path) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|source| unwritable(&self.dir, source))?;
        let canonical = self
            .dir
            .canonicalize()
            .map_err(|source| unwritable(&self.dir, source))?;

        if project_root.starts_with(&canonical) {
            return Err(BuildError::OutputOverlapsProject {
                out_dir: canonical,
                project_root: project_root.to_path_buf(),
            });
        }
        Ok(canonical)
    }

    pub fn has_stale_artifact(&self) -> bool {
        self.path.symlink_metadata().is_ok()
    }

    /// Removes a previous artifact at the target path. Other files in the
    /// directory are left alone.
    ///
    /// Returns `true` when a stale artifact was removed.
    pub fn remove_stale(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "removed previous build");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(unwritable(&self.path, source)),
        }
    }

    /// Writes the artifact to a temporary file beside the target and renames
    /// it into place, so the target is either absent or complete.
    pub fn place(&self, artifact: &ArchiveArtifact) -> Result<PathBuf> {
        let mut staged = tempfile::Builder::new()
            .prefix(".vcpm-")
            .suffix(".zip.tmp")
            .tempfile_in(&self.dir)
            .map_err(|source| unwritable(&self.dir, source))?;
        debug!(temp = %staged.path().display(), "staging archive");

        staged
            .write_all(&artifact.bytes)
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|source| unwritable(staged.path(), source))?;
        set_default_permissions(staged.as_file()).map_err(|source| unwritable(staged.path(), source))?;

        staged
            .persist(&self.path)
            .map_err(|err| unwritable(&self.path, err.error))?;
        info!(path = %self.path.display(), bytes = artifact.bytes.len(), "wrote archive");

        Ok(self.path.clone())
    }
}

/// Relative output directories are anchored at the project root.
pub fn resolve_dir(project_root: &Path, out_dir: &Path) -> PathBuf {
    if out_dir.is_absolute() {
        out_dir.to_path_buf()
    } else {
        project_root.join(out_dir)
    }
}

#[cfg(unix)]
fn set_default_permissions(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_file: &fs::File) -> io::Result<()> {
    Ok(())
}

fn unwritable(path: &Path, source: io::Error) -> BuildError {
    BuildError::OutputUnwritable {
        path: path.to_path_buf(),
        source,
    }
}
