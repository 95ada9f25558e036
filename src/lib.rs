// src/lib.rs

//! romforge: Android ROM conversion
//!
//! Converts a base ROM (loose partition images, a raw or sparse `super`
//! image, or an OTA `payload.bin`) into one of three flashable packages:
//!
//! - **Super**: fastboot directory with a rebuilt super image and `flash-all.bat`
//! - **Hybrid**: recovery zip writing both A/B slots
//! - **Recovery**: recovery zip writing the active slot only
//!
//! # Architecture
//!
//! - One pipeline for all modes; mode differences are [`ModePolicy`] values
//! - Image work is delegated to external providers behind [`tools::Toolbox`]
//! - Provider fallbacks are two explicit attempts with typed outcomes
//! - Installers are rendered as text from an [`installer::InstallPlan`] and never run here
//! - Each job owns a scoped working directory, removed on every exit path

pub mod assemble;
pub mod bundle;
pub mod collect;
pub mod config;
pub mod container;
pub mod detect;
mod error;
pub mod installer;
pub mod job;
pub mod metadata;
pub mod mode;
pub mod partition;
pub mod payload;
pub mod pipeline;
pub mod progress;
pub mod tools;
pub mod unpack;

pub use assemble::Package;
pub use collect::{Collision, PartitionSet};
pub use config::ForgeConfig;
pub use detect::{BundleFormat, BundleScan, ExtractionStep};
pub use error::{Error, Result};
pub use job::{CancelToken, ConversionJob, WorkDir};
pub use metadata::RomMetadata;
pub use mode::{ModePolicy, PackageMode};
pub use partition::{PartitionImage, PartitionSource};
pub use pipeline::{ConversionReport, Pipeline, Step};
pub use progress::{CliProgress, LogProgress, ProgressTracker, SilentProgress};
pub use tools::{ExternalTools, Toolbox};
