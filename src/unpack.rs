// src/unpack.rs

//! Splitting a combined super image into partition images
//!
//! Two attempts at most:
//!
//! 1. **direct**: hand the image to the unpacker as-is (skipped when the
//!    image is known to be sparse)
//! 2. **sparse fallback**: convert sparse to raw into scratch space, then
//!    unpack the raw copy
//!
//! The fallback runs if and only if the image is sparse or the direct
//! attempt failed. If it fails too, the step is fatal.

use crate::detect::SuperImage;
use crate::error::{Error, Result};
use crate::partition::partition_name;
use crate::tools::Toolbox;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of one unpack attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpackAttempt {
    /// The unpacker succeeded; these images were written
    Unpacked(Vec<PathBuf>),
    /// This attempt cannot produce partitions; try the sparse fallback
    FallbackNeeded(String),
}

/// What the unpack step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackReport {
    /// Images written to the destination directory
    pub images: Vec<PathBuf>,
    /// Whether the sparse-conversion path produced them
    pub used_fallback: bool,
}

/// Unpack `image` into `dest`, using `scratch` for the raw conversion
pub fn unpack_super(
    toolbox: &dyn Toolbox,
    image: &SuperImage,
    dest: &Path,
    scratch: &Path,
) -> Result<UnpackReport> {
    fs::create_dir_all(dest)?;

    let first = if image.sparse {
        UnpackAttempt::FallbackNeeded("image is sparse".to_string())
    } else {
        unpack_direct(toolbox, image.path(), dest)?
    };

    let report = match first {
        UnpackAttempt::Unpacked(images) => UnpackReport {
            images,
            used_fallback: false,
        },
        UnpackAttempt::FallbackNeeded(reason) => {
            info!("Using sparse conversion for {}: {}", image.path().display(), reason);
            match unpack_via_raw(toolbox, image, dest, scratch)? {
                UnpackAttempt::Unpacked(images) => UnpackReport {
                    images,
                    used_fallback: true,
                },
                UnpackAttempt::FallbackNeeded(fallback_reason) => {
                    return Err(Error::SuperUnpack(format!(
                        "direct unpack: {reason}; sparse fallback: {fallback_reason}"
                    )));
                }
            }
        }
    };

    // The partitions are out; the combined image is no longer needed.
    for chunk in &image.chunks {
        if let Err(e) = fs::remove_file(chunk) {
            warn!("Could not remove {}: {}", chunk.display(), e);
        }
    }

    info!(
        "Unpacked {} partition image(s){}",
        report.images.len(),
        if report.used_fallback { " via sparse conversion" } else { "" }
    );
    Ok(report)
}

/// First attempt: unpack the image as it is
fn unpack_direct(toolbox: &dyn Toolbox, image: &Path, dest: &Path) -> Result<UnpackAttempt> {
    match toolbox.lp_unpack(image, dest) {
        Ok(()) => Ok(UnpackAttempt::Unpacked(list_images(dest)?)),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => {
            warn!("Direct unpack of {} failed: {}", image.display(), e);
            clear_images(dest)?;
            Ok(UnpackAttempt::FallbackNeeded(e.to_string()))
        }
    }
}

/// Second attempt: sparse to raw, then unpack the raw copy
fn unpack_via_raw(
    toolbox: &dyn Toolbox,
    image: &SuperImage,
    dest: &Path,
    scratch: &Path,
) -> Result<UnpackAttempt> {
    fs::create_dir_all(scratch)?;
    let raw = scratch.join("super.raw.img");

    let converted = toolbox.sparse_to_raw(&image.chunks, &raw);
    let attempt = match converted {
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => UnpackAttempt::FallbackNeeded(format!("sparse conversion: {e}")),
        Ok(()) => match toolbox.lp_unpack(&raw, dest) {
            Ok(()) => UnpackAttempt::Unpacked(list_images(dest)?),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => UnpackAttempt::FallbackNeeded(e.to_string()),
        },
    };

    if raw.exists() {
        fs::remove_file(&raw)?;
    }
    Ok(attempt)
}

/// `<name>.img` files directly inside `dir`, sorted
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && partition_name(&path).is_some() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Drop partial output of a failed attempt
fn clear_images(dir: &Path) -> Result<()> {
    for image in list_images(dir)? {
        fs::remove_file(image)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerSpec;
    use std::cell::RefCell;

    /// Unpacker that can fail its first call and records every call
    #[derive(Default)]
    struct ScriptedUnpacker {
        fail_direct: bool,
        fail_convert: bool,
        calls: RefCell<Vec<String>>,
    }

    impl Toolbox for ScriptedUnpacker {
        fn sparse_to_raw(&self, chunks: &[PathBuf], output: &Path) -> Result<()> {
            self.calls.borrow_mut().push(format!("convert:{}", chunks.len()));
            if self.fail_convert {
                return Err(Error::ToolFailed {
                    tool: "simg2img".into(),
                    code: 255,
                    stderr: "not sparse".into(),
                });
            }
            fs::write(output, b"raw").unwrap();
            Ok(())
        }

        fn lp_unpack(&self, image: &Path, out_dir: &Path) -> Result<()> {
            let raw = image.file_name().unwrap() == "super.raw.img";
            self.calls
                .borrow_mut()
                .push(format!("unpack:{}", if raw { "raw" } else { "direct" }));
            if !raw && self.fail_direct {
                fs::write(out_dir.join("partial.img"), b"junk").unwrap();
                return Err(Error::ToolFailed {
                    tool: "lpunpack".into(),
                    code: 1,
                    stderr: "invalid geometry".into(),
                });
            }
            fs::write(out_dir.join("system_a.img"), vec![1u8; 16]).unwrap();
            fs::write(out_dir.join("vendor_a.img"), vec![2u8; 8]).unwrap();
            Ok(())
        }

        fn lp_make(&self, _: &ContainerSpec, _: &Path) -> Result<()> {
            unreachable!()
        }
        fn extract_payload(&self, _: &Path, _: &Path) -> Result<()> {
            unreachable!()
        }
        fn fetch_platform_tools(&self, _: &Path) -> Result<()> {
            unreachable!()
        }
    }

    fn super_image(dir: &Path, sparse: bool) -> SuperImage {
        let path = dir.join("super.img");
        fs::write(&path, b"image").unwrap();
        SuperImage {
            chunks: vec![path],
            sparse,
        }
    }

    #[test]
    fn test_raw_image_direct_success_no_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ScriptedUnpacker::default();
        let image = super_image(dir.path(), false);
        let out = dir.path().join("out");

        let report = unpack_super(&tools, &image, &out, &dir.path().join("scratch")).unwrap();
        assert!(!report.used_fallback);
        assert_eq!(report.images.len(), 2);
        assert_eq!(*tools.calls.borrow(), vec!["unpack:direct"]);
        assert!(!image.path().exists());
    }

    #[test]
    fn test_sparse_image_goes_straight_to_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ScriptedUnpacker::default();
        let image = super_image(dir.path(), true);

        let report =
            unpack_super(&tools, &image, &dir.path().join("out"), &dir.path().join("scratch")).unwrap();
        assert!(report.used_fallback);
        assert_eq!(*tools.calls.borrow(), vec!["convert:1", "unpack:raw"]);
        assert!(!dir.path().join("scratch/super.raw.img").exists());
    }

    #[test]
    fn test_failed_direct_falls_back_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ScriptedUnpacker {
            fail_direct: true,
            ..Default::default()
        };
        let image = super_image(dir.path(), false);
        let out = dir.path().join("out");

        let report = unpack_super(&tools, &image, &out, &dir.path().join("scratch")).unwrap();
        assert!(report.used_fallback);
        assert_eq!(report.images, vec![out.join("system_a.img"), out.join("vendor_a.img")]);
        assert!(!out.join("partial.img").exists());
        assert_eq!(
            *tools.calls.borrow(),
            vec!["unpack:direct", "convert:1", "unpack:raw"]
        );
    }

    #[test]
    fn test_both_attempts_failing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ScriptedUnpacker {
            fail_direct: true,
            fail_convert: true,
            ..Default::default()
        };
        let image = super_image(dir.path(), false);

        let err = unpack_super(&tools, &image, &dir.path().join("out"), &dir.path().join("scratch"))
            .unwrap_err();
        match err {
            Error::SuperUnpack(msg) => {
                assert!(msg.contains("invalid geometry"));
                assert!(msg.contains("not sparse"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(image.path().exists());
    }
}
