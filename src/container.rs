// src/container.rs

//! Building a new combined logical-partition image
//!
//! The container holds one group sized to the aggregate of its members.
//! The device is 10% larger than the aggregate, rounded up to the
//! logical block size:
//!
//! ```text
//! aggregate = sum(member sizes)
//! device    = align_up(ceil(aggregate * 1.1), 4096)
//! ```
//!
//! If the full build fails, a second build with only the `system`
//! partition is attempted. That is the last attempt.

use crate::collect::PartitionSet;
use crate::config::SuperImageConfig;
use crate::error::{Error, Result};
use crate::partition::{PartitionImage, image_file_name};
use crate::tools::Toolbox;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Metadata region reserved at the start of the container
pub const METADATA_SIZE: u64 = 65536;

/// Metadata copies kept, one per slot
pub const METADATA_SLOTS: u32 = 2;

/// Logical block size; partition extents and the device size are aligned to it
pub const BLOCK_SIZE: u64 = 4096;

/// Partition the minimal build falls back to
pub const BASIS_PARTITION: &str = "system";

/// One partition inside a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalPartition {
    pub name: String,
    pub size: u64,
    pub image: PathBuf,
    pub read_only: bool,
}

impl LogicalPartition {
    /// Space the partition occupies once rounded up to whole blocks
    pub fn extent(&self) -> u64 {
        align_up(self.size)
    }
}

/// A named group of partitions sharing a size budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionGroup {
    pub name: String,
    /// Upper bound on the sum of member extents
    pub max_size: u64,
    pub partitions: Vec<LogicalPartition>,
}

impl PartitionGroup {
    /// Sum of member partition extents
    pub fn used(&self) -> u64 {
        self.partitions.iter().map(LogicalPartition::extent).sum()
    }
}

/// Everything the container maker needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub super_name: String,
    pub metadata_size: u64,
    pub metadata_slots: u32,
    /// Total container size in bytes
    pub device_size: u64,
    pub groups: Vec<PartitionGroup>,
}

impl ContainerSpec {
    /// Single-group spec over `images`, with the 10% device margin applied
    pub fn for_images<'a, I>(config: &SuperImageConfig, images: I) -> Self
    where
        I: IntoIterator<Item = &'a PartitionImage>,
    {
        let partitions: Vec<LogicalPartition> = images
            .into_iter()
            .map(|image| LogicalPartition {
                name: image.name.clone(),
                size: image.size,
                image: image.path.clone(),
                read_only: true,
            })
            .collect();
        let aggregate = partitions.iter().map(LogicalPartition::extent).sum();

        Self {
            super_name: config.super_name.clone(),
            metadata_size: METADATA_SIZE,
            metadata_slots: METADATA_SLOTS,
            device_size: device_size_for(aggregate),
            groups: vec![PartitionGroup {
                name: config.group_name.clone(),
                max_size: aggregate,
                partitions,
            }],
        }
    }

    pub fn partition_count(&self) -> usize {
        self.groups.iter().map(|g| g.partitions.len()).sum()
    }

    /// Sum of every partition extent
    pub fn aggregate_size(&self) -> u64 {
        self.groups.iter().map(PartitionGroup::used).sum()
    }

    /// Check the sizing rules hold
    pub fn validate(&self) -> Result<()> {
        for group in &self.groups {
            if group.used() > group.max_size {
                return Err(Error::ContainerBuild(format!(
                    "group '{}' holds {} bytes but allows {}",
                    group.name,
                    group.used(),
                    group.max_size
                )));
            }
        }
        if self.device_size < overhead_size(self.aggregate_size()) {
            return Err(Error::ContainerBuild(format!(
                "device size {} leaves less than 10% over {} bytes of partitions",
                self.device_size,
                self.aggregate_size()
            )));
        }
        Ok(())
    }

    /// Arguments for `lpmake`
    pub fn lpmake_args(&self, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--metadata-size".into(),
            self.metadata_size.to_string().into(),
            "--super-name".into(),
            self.super_name.clone().into(),
            "--metadata-slots".into(),
            self.metadata_slots.to_string().into(),
            "--device".into(),
            format!("{}:{}", self.super_name, self.device_size).into(),
        ];

        for group in &self.groups {
            args.push("--group".into());
            args.push(format!("{}:{}", group.name, group.max_size).into());
            for partition in &group.partitions {
                let attrs = if partition.read_only { "readonly" } else { "none" };
                args.push("--partition".into());
                args.push(
                    format!("{}:{}:{}:{}", partition.name, attrs, partition.size, group.name).into(),
                );
                let mut image = OsString::from(format!("{}=", partition.name));
                image.push(partition.image.as_os_str());
                args.push("--image".into());
                args.push(image);
            }
        }

        args.push("--output".into());
        args.push(output.as_os_str().to_owned());
        args
    }
}

/// `ceil(aggregate * 1.1)` in integer arithmetic
pub fn overhead_size(aggregate: u64) -> u64 {
    (aggregate * 11).div_ceil(10)
}

/// Device size for an aggregate partition size
pub fn device_size_for(aggregate: u64) -> u64 {
    align_up(overhead_size(aggregate))
}

/// Round `bytes` up to a whole number of blocks
pub fn align_up(bytes: u64) -> u64 {
    bytes.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Outcome of one build attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildAttempt {
    Built,
    FallbackNeeded(String),
}

/// A finished container image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltContainer {
    pub image: PathBuf,
    pub spec: ContainerSpec,
    /// Whether the `system`-only fallback produced it
    pub minimal: bool,
}

/// Build the container for `logical` into `dest_dir`
pub fn build_container(
    toolbox: &dyn Toolbox,
    logical: &PartitionSet,
    config: &SuperImageConfig,
    dest_dir: &Path,
) -> Result<BuiltContainer> {
    fs::create_dir_all(dest_dir)?;
    let output = dest_dir.join(image_file_name(&config.super_name));

    let full = ContainerSpec::for_images(config, logical.in_flash_order());
    let first = if logical.is_empty() {
        BuildAttempt::FallbackNeeded("no logical partitions collected".to_string())
    } else {
        attempt(toolbox, &full, &output)?
    };

    let reason = match first {
        BuildAttempt::Built => {
            info!(
                "Built {} with {} partition(s), {} bytes",
                output.display(),
                full.partition_count(),
                full.device_size
            );
            return Ok(BuiltContainer {
                image: output,
                spec: full,
                minimal: false,
            });
        }
        BuildAttempt::FallbackNeeded(reason) => reason,
    };

    warn!("Full container build failed ({}), trying {} only", reason, BASIS_PARTITION);
    let basis = logical
        .get(BASIS_PARTITION)
        .filter(|image| image.size > 0)
        .ok_or_else(|| Error::ZeroSizeBasis(BASIS_PARTITION.to_string()))?;

    let minimal = ContainerSpec::for_images(config, [basis]);
    match attempt(toolbox, &minimal, &output)? {
        BuildAttempt::Built => {
            info!("Built minimal {} ({} bytes)", output.display(), minimal.device_size);
            Ok(BuiltContainer {
                image: output,
                spec: minimal,
                minimal: true,
            })
        }
        BuildAttempt::FallbackNeeded(fallback_reason) => Err(Error::ContainerBuild(format!(
            "full build: {reason}; {BASIS_PARTITION}-only build: {fallback_reason}"
        ))),
    }
}

fn attempt(toolbox: &dyn Toolbox, spec: &ContainerSpec, output: &Path) -> Result<BuildAttempt> {
    if let Err(e) = spec.validate() {
        return Ok(BuildAttempt::FallbackNeeded(e.to_string()));
    }
    match toolbox.lp_make(spec, output) {
        Ok(()) => Ok(BuildAttempt::Built),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => {
            if output.exists() {
                fs::remove_file(output)?;
            }
            Ok(BuildAttempt::FallbackNeeded(e.to_string()))
        }
    }
}
