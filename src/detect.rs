// src/detect.rs

//! Format detection for extracted ROM bundles
//!
//! A bundle is classified by what it carries, in priority order:
//!
//! 1. an OTA `payload.bin`, which must be expanded first
//! 2. a combined `super` image, raw or sparse (possibly split into chunks)
//! 3. loose partition images with recognized names
//!
//! The detector only plans. It never runs a provider; the pipeline walks
//! the returned [`ExtractionStep`]s and re-scans the payload output for a
//! super image once the payload has been expanded.

use crate::error::Result;
use crate::partition::{SUPER_NAME, is_recognized, partition_name};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Name of the OTA payload file
pub const PAYLOAD_NAME: &str = "payload.bin";

/// Android sparse image magic, as stored on disk (little-endian `0xED26FF3A`)
pub const SPARSE_MAGIC: [u8; 4] = [0x3A, 0xFF, 0x26, 0xED];

/// How deep below the bundle root images are searched for
pub const SCAN_DEPTH: usize = 3;

/// Bundle classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleFormat {
    OtaPayload,
    SparseSuper,
    RawSuper,
    DiscretePartitions,
}

impl std::fmt::Display for BundleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OtaPayload => write!(f, "OTA payload"),
            Self::SparseSuper => write!(f, "sparse super image"),
            Self::RawSuper => write!(f, "raw super image"),
            Self::DiscretePartitions => write!(f, "discrete partitions"),
        }
    }
}

/// A combined logical-partition image found in a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperImage {
    /// Image file, or its sparse chunks in order
    pub chunks: Vec<PathBuf>,
    /// Whether the image must go through the sparse converter
    pub sparse: bool,
}

impl SuperImage {
    /// Describe a single-file super image, sniffing the sparse magic
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self {
            chunks: vec![path.to_path_buf()],
            sparse: is_sparse(path)?,
        })
    }

    /// First file of the image
    pub fn path(&self) -> &Path {
        &self.chunks[0]
    }

    pub fn is_split(&self) -> bool {
        self.chunks.len() > 1
    }
}

/// Everything the detector found in one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleScan {
    pub payload: Option<PathBuf>,
    pub super_image: Option<SuperImage>,
    /// Recognized loose images keyed by partition name
    pub discrete: BTreeMap<String, PathBuf>,
}

/// One extraction step, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStep {
    /// Run the payload extractor on this file
    ExpandPayload(PathBuf),
    /// Split this combined image into partitions
    UnpackSuper(SuperImage),
    /// Take the loose partition images as they are
    CollectDiscrete,
}

impl BundleScan {
    /// Classify the bundle
    pub fn format(&self) -> BundleFormat {
        match (&self.payload, &self.super_image) {
            (Some(_), _) => BundleFormat::OtaPayload,
            (None, Some(s)) if s.sparse => BundleFormat::SparseSuper,
            (None, Some(_)) => BundleFormat::RawSuper,
            (None, None) => BundleFormat::DiscretePartitions,
        }
    }

    /// Ordered steps that apply to this bundle
    ///
    /// Loose images are always collected last; when no payload or super
    /// image exists they are the only source.
    pub fn plan(&self) -> Vec<ExtractionStep> {
        let mut steps = Vec::new();
        if let Some(payload) = &self.payload {
            steps.push(ExtractionStep::ExpandPayload(payload.clone()));
        }
        if let Some(super_image) = &self.super_image {
            steps.push(ExtractionStep::UnpackSuper(super_image.clone()));
        }
        steps.push(ExtractionStep::CollectDiscrete);
        steps
    }
}

/// Scan a directory for a payload, a super image and loose partitions
pub fn scan(dir: &Path) -> Result<BundleScan> {
    let mut payload: Option<(usize, PathBuf)> = None;
    let mut whole_super: Option<(usize, PathBuf)> = None;
    let mut chunks: Vec<(u32, PathBuf)> = Vec::new();
    let mut discrete: BTreeMap<String, (usize, PathBuf)> = BTreeMap::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(SCAN_DEPTH)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let depth = entry.depth();
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if file_name == PAYLOAD_NAME {
            keep_shallowest(&mut payload, depth, path);
        } else if let Some(index) = sparse_chunk_index(file_name) {
            chunks.push((index, path.to_path_buf()));
        } else if let Some(name) = partition_name(path) {
            if name == SUPER_NAME {
                keep_shallowest(&mut whole_super, depth, path);
            } else if is_recognized(name) {
                let slot = discrete.entry(name.to_string()).or_insert((depth, path.to_path_buf()));
                if depth < slot.0 {
                    *slot = (depth, path.to_path_buf());
                }
            }
        }
    }

    let super_image = match (whole_super, chunks.is_empty()) {
        (Some((_, path)), _) => Some(SuperImage::from_file(&path)?),
        (None, false) => {
            chunks.sort_by_key(|(index, _)| *index);
            Some(SuperImage {
                chunks: chunks.into_iter().map(|(_, p)| p).collect(),
                sparse: true,
            })
        }
        (None, true) => None,
    };

    let scan = BundleScan {
        payload: payload.map(|(_, p)| p),
        super_image,
        discrete: discrete.into_iter().map(|(k, (_, p))| (k, p)).collect(),
    };
    debug!(
        "Scanned {}: payload={}, super={}, {} loose image(s)",
        dir.display(),
        scan.payload.is_some(),
        scan.super_image.is_some(),
        scan.discrete.len()
    );
    Ok(scan)
}

/// Whether a file starts with the sparse image magic
pub fn is_sparse(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == SPARSE_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Index of a split sparse super chunk (`super.img_sparsechunk.3`, `super_sparsechunk.3`)
fn sparse_chunk_index(file_name: &str) -> Option<u32> {
    let rest = file_name
        .strip_prefix("super.img_sparsechunk.")
        .or_else(|| file_name.strip_prefix("super_sparsechunk."))?;
    rest.parse().ok()
}

fn keep_shallowest(slot: &mut Option<(usize, PathBuf)>, depth: usize, path: &Path) {
    if slot.as_ref().is_none_or(|(d, _)| depth < *d) {
        *slot = Some((depth, path.to_path_buf()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, data: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, data).unwrap();
    }

    fn sparse_bytes() -> Vec<u8> {
        let mut data = SPARSE_MAGIC.to_vec();
        data.extend_from_slice(&[0u8; 28]);
        data
    }

    #[test]
    fn test_payload_bundle() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("payload.bin"), b"CrAU");
        write(&dir.path().join("META-INF/com/android/metadata"), b"pre-device=foo\n");

        let scan = scan(dir.path()).unwrap();
        assert_eq!(scan.format(), BundleFormat::OtaPayload);
        assert_eq!(
            scan.plan(),
            vec![
                ExtractionStep::ExpandPayload(dir.path().join("payload.bin")),
                ExtractionStep::CollectDiscrete,
            ]
        );
    }

    #[test]
    fn test_raw_and_sparse_super() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("super.img"), &[0u8; 64]);
        write(&dir.path().join("boot.img"), b"boot");
        let scan_raw = scan(dir.path()).unwrap();
        assert_eq!(scan_raw.format(), BundleFormat::RawSuper);
        assert!(scan_raw.discrete.contains_key("boot"));
        assert!(!scan_raw.discrete.contains_key("super"));

        write(&dir.path().join("super.img"), &sparse_bytes());
        let scan_sparse = scan(dir.path()).unwrap();
        assert_eq!(scan_sparse.format(), BundleFormat::SparseSuper);
        assert!(scan_sparse.super_image.unwrap().sparse);
    }

    #[test]
    fn test_split_sparse_chunks_ordered() {
        let dir = tempfile::tempdir().unwrap();
        for i in [10, 2, 0, 1] {
            write(
                &dir.path().join(format!("images/super.img_sparsechunk.{i}")),
                &sparse_bytes(),
            );
        }
        let scan = scan(dir.path()).unwrap();
        let image = scan.super_image.unwrap();
        assert!(image.sparse);
        assert!(image.is_split());
        let names: Vec<_> = image
            .chunks
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "super.img_sparsechunk.0",
                "super.img_sparsechunk.1",
                "super.img_sparsechunk.2",
                "super.img_sparsechunk.10",
            ]
        );
    }

    #[test]
    fn test_discrete_only_prefers_shallow_and_ignores_unknown() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("a/boot.img"), b"deep");
        write(&dir.path().join("boot.img"), b"top");
        write(&dir.path().join("vbmeta.img"), b"vb");
        write(&dir.path().join("userdata.img"), b"ignored");
        write(&dir.path().join("README.txt"), b"hi");

        let scan = scan(dir.path()).unwrap();
        assert_eq!(scan.format(), BundleFormat::DiscretePartitions);
        assert_eq!(scan.plan(), vec![ExtractionStep::CollectDiscrete]);
        assert_eq!(scan.discrete.get("boot"), Some(&dir.path().join("boot.img")));
        assert!(scan.discrete.contains_key("vbmeta"));
        assert!(!scan.discrete.contains_key("userdata"));
    }

    #[test]
    fn test_empty_bundle_plans_discrete() {
        let dir = tempfile::tempdir().unwrap();
        let scan = scan(dir.path()).unwrap();
        assert_eq!(scan.plan(), vec![ExtractionStep::CollectDiscrete]);
        assert!(scan.discrete.is_empty());
    }

    #[test]
    fn test_is_sparse_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.img");
        fs::write(&path, b"ab").unwrap();
        assert!(!is_sparse(&path).unwrap());
    }
}
