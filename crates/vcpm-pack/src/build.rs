#![forbid(unsafe_code)]

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info};

use crate::archive;
use crate::error::{BuildError, ErrorKind, Result};
use crate::manifest::{self, PackIdentity};
use crate::mode::BuildMode;
use crate::output::OutputTarget;
use crate::select::{self, DEFAULT_EXCLUDED_MODULE, DEFAULT_OUT_DIR, SelectionPolicy};

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub project_root: PathBuf,
    pub mode: BuildMode,
    /// Relative paths are resolved against `project_root`.
    pub out_dir: PathBuf,
    /// Production builds never ship this subtree (relative to `project_root`).
    pub excluded_module: PathBuf,
    pub max_concurrent_reads: usize,
}

impl BuildOptions {
    pub fn new(project_root: impl Into<PathBuf>, mode: BuildMode) -> Self {
        Self {
            project_root: project_root.into(),
            mode,
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            excluded_module: PathBuf::from(DEFAULT_EXCLUDED_MODULE),
            max_concurrent_reads: default_concurrency(),
        }
    }
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Shared flag a caller sets to stop a build at the next state transition.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    ValidatingManifest,
    PreparingOutput,
    SelectingFiles,
    Archiving,
    Writing,
    Done,
    Failed(ErrorKind),
}

impl BuildState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub output_path: PathBuf,
    pub mode: BuildMode,
    pub identity: PackIdentity,
    pub entries: usize,
    pub uncompressed_bytes: u64,
    pub archive_bytes: u64,
    pub sha256: String,
    pub removed_previous: bool,
}

/// Progress notifications delivered to an observer while a build runs.
#[derive(Debug, Clone, Copy)]
pub enum BuildEvent<'a> {
    ManifestLoaded(&'a PackIdentity),
    /// Sent just before the stale artifact at this path is deleted.
    RemovingPrevious(&'a Path),
    FilesSelected(usize),
    /// The build is past its last cancellation point.
    Writing(&'a Path),
}

type Observer = Box<dyn Fn(BuildEvent<'_>) + Send + Sync>;

/// Runs one build through its states. Failures are terminal; nothing is retried.
pub struct Builder {
    options: BuildOptions,
    cancel: CancelHandle,
    observer: Option<Observer>,
    state: BuildState,
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("options", &self.options)
            .field("cancel", &self.cancel)
            .field("observer", &self.observer.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl Builder {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            cancel: CancelHandle::new(),
            observer: None,
            state: BuildState::Idle,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(BuildEvent<'_>) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub async fn run(&mut self) -> Result<BuildReport> {
        let outcome = self.execute().await;
        self.state = match &outcome {
            Ok(_) => BuildState::Done,
            Err(err) => BuildState::Failed(err.kind()),
        };
        debug!(state = ?self.state, "build finished");
        outcome
    }

    async fn execute(&mut self) -> Result<BuildReport> {
        let options = self.options.clone();
        let root = options.project_root.as_path();
        info!(
            project_root = %root.display(),
            mode = %options.mode,
            out_dir = %options.out_dir.display(),
            "building content pack"
        );

        self.enter(BuildState::ValidatingManifest)?;
        let identity = manifest::load(root)?;
        info!(id = identity.id(), version = identity.version(), "loaded pack manifest");
        self.notify(BuildEvent::ManifestLoaded(&identity));

        self.enter(BuildState::PreparingOutput)?;
        let canonical_root = root
            .canonicalize()
            .map_err(|source| BuildError::SelectionFailed {
                path: root.to_path_buf(),
                source,
            })?;
        let target = OutputTarget::resolve(root, &options.out_dir, &identity, options.mode);
        let canonical_out_dir = target.prepare(&canonical_root)?;
        let removed_previous = if target.has_stale_artifact() {
            self.notify(BuildEvent::RemovingPrevious(&target.path));
            target.remove_stale()?
        } else {
            false
        };

        self.enter(BuildState::SelectingFiles)?;
        let policy = SelectionPolicy {
            mode: options.mode,
            out_dir: canonical_out_dir,
            excluded_module: options.excluded_module.clone(),
        };
        let files = select::select(&canonical_root, &policy)?;
        info!(count = files.len(), "selected files");
        self.notify(BuildEvent::FilesSelected(files.len()));

        self.enter(BuildState::Archiving)?;
        let artifact = archive::write(&files, options.max_concurrent_reads).await?;
        info!(
            entries = artifact.entries.len(),
            bytes = artifact.bytes.len(),
            sha256 = %artifact.sha256,
            "encoded archive"
        );

        // Last cancellation point; writing always runs to completion.
        self.enter(BuildState::Writing)?;
        self.notify(BuildEvent::Writing(&target.path));
        let output_path = target.place(&artifact)?;

        Ok(BuildReport {
            output_path,
            mode: options.mode,
            identity,
            entries: artifact.entries.len(),
            uncompressed_bytes: artifact.uncompressed_bytes,
            archive_bytes: artifact.bytes.len() as u64,
            sha256: artifact.sha256,
            removed_previous,
        })
    }

    fn notify(&self, event: BuildEvent<'_>) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }

    fn enter(&mut self, next: BuildState) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        debug!(from = ?self.state, to = ?next, "build state");
        self.state = next;
        Ok(())
    }
}

pub async fn run(options: &BuildOptions) -> Result<BuildReport> {
    Builder::new(options.clone()).run().await
}
