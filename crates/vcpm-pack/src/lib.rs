#![forbid(unsafe_code)]

//! Packaging engine for content packs.
//!
//! A build validates the pack manifest, clears the previous artifact for the
//! same target, selects project files according to the [`BuildMode`], packs
//! them into a zip archive and moves it into place atomically.

pub mod archive;
pub mod build;
pub mod error;
pub mod manifest;
pub mod mode;
pub mod output;
pub mod select;

pub use archive::{ARCHIVE_EXTENSION, ArchiveArtifact};
pub use build::{BuildEvent, BuildOptions, BuildReport, BuildState, Builder, CancelHandle, run};
pub use error::{BuildError, ErrorKind, ManifestField};
pub use manifest::PackIdentity;
pub use mode::BuildMode;
pub use output::OutputTarget;
pub use select::{FileEntry, SelectionPolicy};
