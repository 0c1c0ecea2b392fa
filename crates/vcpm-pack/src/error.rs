#![forbid(unsafe_code)]

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Manifest field subject to a format check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestField {
    Id,
    Version,
}

impl fmt::Display for ManifestField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Id => "id",
            Self::Version => "version",
        })
    }
}

/// Errors surfaced by a single build invocation.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("pack manifest does not exist in {}", root.display())]
    ManifestMissing { root: PathBuf },
    #[error("{} is not a content pack manifest: {reason}", path.display())]
    ManifestInvalid { path: PathBuf, reason: String },
    #[error("invalid package {field}: {field} {expected}")]
    ManifestFieldInvalid {
        field: ManifestField,
        expected: &'static str,
    },
    #[error("failed to walk {}: {source}", path.display())]
    SelectionFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(
        "output directory {} must not be or contain the project root {}",
        out_dir.display(),
        project_root.display()
    )]
    OutputOverlapsProject {
        out_dir: PathBuf,
        project_root: PathBuf,
    },
    #[error("failed to encode archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("build cancelled")]
    Cancelled,
}

/// Payload-free discriminant of [`BuildError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ManifestMissing,
    ManifestInvalid,
    ManifestFieldInvalid,
    SelectionFailed,
    FileUnreadable,
    OutputUnwritable,
    OutputOverlapsProject,
    Archive,
    Cancelled,
}

impl ErrorKind {
    /// Process exit code the command layer reports for this kind.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::ManifestMissing | Self::ManifestInvalid | Self::ManifestFieldInvalid => 2,
            Self::SelectionFailed | Self::FileUnreadable => 3,
            Self::OutputUnwritable | Self::OutputOverlapsProject | Self::Archive => 4,
            Self::Cancelled => 130,
        }
    }
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ManifestMissing { .. } => ErrorKind::ManifestMissing,
            Self::ManifestInvalid { .. } => ErrorKind::ManifestInvalid,
            Self::ManifestFieldInvalid { .. } => ErrorKind::ManifestFieldInvalid,
            Self::SelectionFailed { .. } => ErrorKind::SelectionFailed,
            Self::FileUnreadable { .. } => ErrorKind::FileUnreadable,
            Self::OutputUnwritable { .. } => ErrorKind::OutputUnwritable,
            Self::OutputOverlapsProject { .. } => ErrorKind::OutputOverlapsProject,
            Self::Archive(_) => ErrorKind::Archive,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }

    pub fn is_manifest_error(&self) -> bool {
        self.exit_code() == 2
    }
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;
