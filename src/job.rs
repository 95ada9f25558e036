// src/job.rs

//! Conversion jobs and their scoped working directories

use crate::error::{Error, Result};
use crate::mode::PackageMode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use tracing::debug;

/// One conversion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    /// ROM archive, image, or extracted directory
    pub input: PathBuf,
    /// Directory receiving the finished package
    pub output_dir: PathBuf,
    /// Requested package flavor
    pub mode: PackageMode,
}

impl ConversionJob {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, mode: PackageMode) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            mode,
        }
    }

    /// Fail fast when the input is missing
    pub fn validate(&self) -> Result<()> {
        if !self.input.exists() {
            return Err(Error::MissingInput(self.input.clone()));
        }
        Ok(())
    }
}

/// Per-job working directory
///
/// The whole tree is removed when this value drops, whether the job
/// succeeded, failed, or was cancelled.
#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    /// Subdirectory the input bundle is unpacked into
    pub const BUNDLE: &'static str = "bundle";
    /// Subdirectory for payload-extracted images
    pub const PAYLOAD: &'static str = "payload";
    /// Subdirectory for super-unpacked images
    pub const SUPER: &'static str = "super";
    /// Subdirectory for provider scratch output
    pub const SCRATCH: &'static str = "scratch";
    /// Subdirectory for the rebuilt container
    pub const CONTAINER: &'static str = "container";

    /// Create a fresh working directory under `root` (system temp dir if `None`)
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("romforge-");
            b
        };
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let work = Self { dir };
        for sub in [Self::BUNDLE, Self::PAYLOAD, Self::SUPER, Self::SCRATCH, Self::CONTAINER] {
            std::fs::create_dir_all(work.path().join(sub))?;
        }
        debug!("Created working directory {}", work.path().display());
        Ok(work)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn bundle(&self) -> PathBuf {
        self.path().join(Self::BUNDLE)
    }

    pub fn payload(&self) -> PathBuf {
        self.path().join(Self::PAYLOAD)
    }

    pub fn super_out(&self) -> PathBuf {
        self.path().join(Self::SUPER)
    }

    pub fn scratch(&self) -> PathBuf {
        self.path().join(Self::SCRATCH)
    }

    pub fn container(&self) -> PathBuf {
        self.path().join(Self::CONTAINER)
    }

    /// Remove the tree now, reporting errors instead of ignoring them
    pub fn close(self) -> Result<()> {
        let path = self.path().to_path_buf();
        self.dir.close()?;
        debug!("Removed working directory {}", path.display());
        Ok(())
    }
}

/// Cooperative cancellation flag shared between a job and its controller
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
