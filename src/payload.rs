// src/payload.rs

//! OTA payload expansion
//!
//! The payload extractor writes into a scratch directory of its own; the
//! resulting `<partition>.img` files are moved into the destination and
//! both the payload and the scratch directory are deleted. A provider
//! failure is fatal and not retried.

use crate::error::{Error, Result};
use crate::partition::partition_name;
use crate::tools::Toolbox;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Expand `payload` into raw images in `dest`
///
/// Returns the image files now in `dest`, which may be empty.
pub fn expand_payload(
    toolbox: &dyn Toolbox,
    payload: &Path,
    dest: &Path,
    scratch: &Path,
) -> Result<Vec<PathBuf>> {
    let scratch_out = scratch.join("payload-extract");
    fs::create_dir_all(&scratch_out)?;
    fs::create_dir_all(dest)?;

    toolbox
        .extract_payload(payload, &scratch_out)
        .map_err(|e| match e {
            Error::Cancelled => Error::Cancelled,
            other => Error::PayloadExtraction(other.to_string()),
        })?;

    let mut images = Vec::new();
    for entry in WalkDir::new(&scratch_out).min_depth(1).max_depth(2).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = partition_name(entry.path()) else {
            continue;
        };
        let target = dest.join(format!("{name}.img"));
        if target.exists() {
            warn!("Payload produced {} twice, keeping the first", name);
            continue;
        }
        move_file(entry.path(), &target)?;
        images.push(target);
    }

    fs::remove_file(payload)?;
    fs::remove_dir_all(&scratch_out)?;

    info!("Payload expanded into {} image(s)", images.len());
    Ok(images)
}

/// Rename, falling back to copy-and-delete across filesystems
pub(crate) fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}
