// src/partition.rs

//! Partition images and the naming rules shared by detection, collection
//! and installer generation

use crate::error::Result;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Partitions recognized as flashable when found loose in a bundle, in the
/// order an installer writes them.
///
/// Names missing from this list still flash, after every listed name.
pub const FLASH_ORDER: &[&str] = &[
    "boot",
    "init_boot",
    "dtbo",
    "vbmeta",
    "vbmeta_system",
    "vbmeta_vendor",
    "vendor_boot",
    "recovery",
    "super",
    "system",
    "vendor",
    "product",
    "system_ext",
    "odm",
    "system_dlkm",
    "vendor_dlkm",
    "odm_dlkm",
    "mi_ext",
];

/// Name of the combined logical-partition image inside a bundle
pub const SUPER_NAME: &str = "super";

/// Partitions that carry a mountable filesystem on the device
pub const FILESYSTEM_PARTITIONS: &[&str] = &[
    "system",
    "vendor",
    "product",
    "system_ext",
    "odm",
    "system_dlkm",
    "vendor_dlkm",
    "odm_dlkm",
    "mi_ext",
];

/// Where an image was obtained from
///
/// Ordering follows collision precedence: a later variant wins over an
/// earlier one when two sources produce the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionSource {
    /// Already present as a loose file in the bundle
    Discrete,
    /// Produced by the OTA payload extractor
    Payload,
    /// Split out of a combined super image
    Super,
}

impl PartitionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discrete => "discrete",
            Self::Payload => "payload",
            Self::Super => "super",
        }
    }
}

impl std::fmt::Display for PartitionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw partition image in the working set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionImage {
    /// Partition name, unique within a job
    pub name: String,
    /// Image size in bytes
    pub size: u64,
    /// Where the image came from
    pub source: PartitionSource,
    /// Location of the image inside the working directory
    pub path: PathBuf,
}

impl PartitionImage {
    /// Describe an image file on disk, reading its size
    pub fn from_file(name: impl Into<String>, path: &Path, source: PartitionSource) -> Result<Self> {
        let size = std::fs::metadata(path)?.len();
        Ok(Self {
            name: name.into(),
            size,
            source,
            path: path.to_path_buf(),
        })
    }

    /// File name the image carries inside a package
    pub fn file_name(&self) -> String {
        image_file_name(&self.name)
    }
}

/// `<name>.img`
pub fn image_file_name(name: &str) -> String {
    format!("{name}.img")
}

/// Partition name of an `<name>.img` file, if it is one
pub fn partition_name(path: &Path) -> Option<&str> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(".img")?;
    if stem.is_empty() { None } else { Some(stem) }
}

/// Whether a name is in the recognized flashable set
pub fn is_recognized(name: &str) -> bool {
    FLASH_ORDER.contains(&name)
}

/// Whether a partition holds a mountable filesystem
pub fn is_filesystem(name: &str) -> bool {
    FILESYSTEM_PARTITIONS.contains(&name)
}

/// Split a trailing A/B slot suffix off a partition name
pub fn split_slot_suffix(name: &str) -> (&str, Option<char>) {
    for (suffix, slot) in [("_a", 'a'), ("_b", 'b')] {
        if let Some(base) = name.strip_suffix(suffix)
            && !base.is_empty()
        {
            return (base, Some(slot));
        }
    }
    (name, None)
}

/// Compare two partition names by flash priority
///
/// Listed names follow [`FLASH_ORDER`]; unlisted names come after, sorted
/// alphabetically.
pub fn flash_priority(a: &str, b: &str) -> Ordering {
    let rank = |name: &str| FLASH_ORDER.iter().position(|n| *n == name);
    match (rank(a), rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
