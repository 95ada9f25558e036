// src/tools/mod.rs

//! External capability providers
//!
//! The pipeline never parses sparse images, logical-partition metadata or
//! OTA payloads itself. It hands each of those jobs to a separate program
//! through the [`Toolbox`] trait:
//!
//! | Method                 | Default provider      |
//! |------------------------|-----------------------|
//! | `sparse_to_raw`        | `simg2img`            |
//! | `lp_unpack`            | `lpunpack`            |
//! | `lp_make`              | `lpmake`              |
//! | `extract_payload`      | `payload-dumper-go`   |
//! | `fetch_platform_tools` | Google platform-tools |
//!
//! [`ExternalTools`] is the process-backed implementation. Tests swap in a
//! scripted implementation to force provider failures.

mod external;
mod platform;
pub mod process;

pub use external::{ExternalTools, ToolStatus};
pub use platform::fetch_platform_tools;
pub use process::{ProcessOutput, ProcessRunner};

use crate::container::ContainerSpec;
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Directory name of the bundled flashing tools inside a Super package
pub const PLATFORM_TOOLS_DIR: &str = "platform-tools";

/// The capability providers consumed by the pipeline
pub trait Toolbox {
    /// Expand one sparse image (possibly split into ordered chunks) into a raw image
    fn sparse_to_raw(&self, chunks: &[PathBuf], output: &Path) -> Result<()>;

    /// Write one raw image per logical partition of `image` into `out_dir`
    fn lp_unpack(&self, image: &Path, out_dir: &Path) -> Result<()>;

    /// Build a combined logical-partition image described by `spec`
    fn lp_make(&self, spec: &ContainerSpec, output: &Path) -> Result<()>;

    /// Write one raw image per partition update in `payload` into `out_dir`
    fn extract_payload(&self, payload: &Path, out_dir: &Path) -> Result<()>;

    /// Place a `platform-tools/` directory inside `dest`
    fn fetch_platform_tools(&self, dest: &Path) -> Result<()>;
}
